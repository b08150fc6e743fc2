use std::collections::BTreeMap;

use metering_client::domain::TemperatureSample;

use super::timestamp::{epoch_millis_to_utc, format_day};

/// Mean daily temperature keyed by UTC calendar day (`YYYY-MM-DD`).
///
/// A day maps to the last sample seen for it, including a null one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemperatureByDay {
    days: BTreeMap<String, Option<f64>>,
}

impl TemperatureByDay {
    pub fn from_samples<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a TemperatureSample>,
    {
        let mut days = BTreeMap::new();
        for sample in samples {
            let Some(ms) = sample.time_ms else {
                continue;
            };
            let Some(day) = epoch_millis_to_utc(ms).and_then(format_day) else {
                tracing::debug!(time_ms = ms, "temperature sample time out of range, dropped");
                continue;
            };
            days.insert(day, sample.value);
        }
        Self { days }
    }

    pub fn mean_for_day(&self, day: &str) -> Option<f64> {
        self.days.get(day).copied().flatten()
    }

    pub fn contains_day(&self, day: &str) -> bool {
        self.days.contains_key(day)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}
