use std::{collections::HashMap, fs, path::Path};

use metering_client::domain::{AnomalyRecord, OutputRecord};
use serde_json::{Map, Value};

/// Flatten a report record into ordered, dot-qualified columns.
///
/// Reading fields come first, then meter/site identity, the flattened
/// `meter_properties.*` and `site_info.*` bags, then `mdt` and `cdd`. A key
/// written twice keeps its first position and its last value.
pub fn flatten_record(rec: &OutputRecord) -> Map<String, Value> {
    let mut row = Map::new();
    flatten_into("", &rec.reading, &mut row);
    row.insert("meter_id".to_string(), Value::String(rec.meter_id.clone()));
    row.insert("meter_name".to_string(), Value::String(rec.meter_name.clone()));
    row.insert("site_id".to_string(), Value::String(rec.site_id.clone()));
    flatten_into("meter_properties.", &rec.meter_properties.0, &mut row);
    flatten_into("site_info.", &rec.site_info.0, &mut row);
    row.insert("mdt".to_string(), rec.mdt.map_or(Value::Null, Value::from));
    row.insert("cdd".to_string(), rec.cdd.map_or(Value::Null, Value::from));
    row
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, out: &mut Map<String, Value>) {
    for (key, value) in map {
        let column = format!("{prefix}{key}");
        match value {
            Value::Object(inner) => flatten_into(&format!("{column}."), inner, out),
            other => {
                out.insert(column, other.clone());
            }
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Arrays (and anything else non-scalar) are kept as JSON text.
        other => other.to_string(),
    }
}

fn ensure_parent(path: &Path) -> Result<(), csv::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write the meter report. Columns are the union of all flattened records in
/// first-seen order; cells a record does not have stay empty. With no records
/// the file is created empty.
pub fn write_report_csv(path: &Path, records: &[OutputRecord]) -> Result<usize, csv::Error> {
    ensure_parent(path)?;

    let rows: Vec<Map<String, Value>> = records.iter().map(flatten_record).collect();

    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in &rows {
        for key in row.keys() {
            if !index.contains_key(key) {
                index.insert(key.clone(), columns.len());
                columns.push(key.clone());
            }
        }
    }

    let mut wtr = csv::Writer::from_path(path)?;
    if !columns.is_empty() {
        wtr.write_record(&columns)?;
        for row in &rows {
            let mut cells = vec![String::new(); columns.len()];
            for (key, value) in row {
                if let Some(&i) = index.get(key) {
                    cells[i] = cell(value);
                }
            }
            wtr.write_record(&cells)?;
        }
    }
    wtr.flush()?;

    Ok(rows.len())
}

/// Write the faulty-meter report. The header is always written.
pub fn write_anomaly_csv(path: &Path, anomalies: &[AnomalyRecord]) -> Result<usize, csv::Error> {
    ensure_parent(path)?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    wtr.write_record(AnomalyRecord::COLUMNS)?;
    for anomaly in anomalies {
        wtr.serialize(anomaly)?;
    }
    wtr.flush()?;

    Ok(anomalies.len())
}
