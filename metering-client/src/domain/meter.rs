use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// A meter as listed by the upstream meter search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Meter {
    #[serde(rename = "meterId", deserialize_with = "string_or_number")]
    pub meter_id: String,
    #[serde(rename = "siteId", default, deserialize_with = "string_or_number")]
    pub site_id: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub name: String,
}

impl Meter {
    /// Case-insensitive check of the display name against a keyword set.
    pub fn name_matches_any<S: AsRef<str>>(&self, keywords: &[S]) -> bool {
        let upper = self.name.to_uppercase();
        keywords
            .iter()
            .any(|k| upper.contains(&k.as_ref().to_uppercase()))
    }
}

/// Current property bag of a meter, kept exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct MeterProperties(pub Map<String, Value>);

impl MeterProperties {
    /// Identifier linking the meter to its temperature feed.
    ///
    /// Null, empty and non-scalar codes count as absent.
    pub fn import_code(&self) -> Option<String> {
        match self.0.get("importCode")? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Site attribute bag, kept exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SiteInfo(pub Map<String, Value>);

impl SiteInfo {
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identifiers show up as both JSON strings and numbers depending on the endpoint.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number identifier, got {other}"
        ))),
    }
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
