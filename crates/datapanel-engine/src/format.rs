//! Text data parsing for literal content and HTTP bodies

use crate::error::EvalError;
use datapanel_model::DataFormat;
use serde_json::{Map, Number, Value};

/// Parse `text` as `format`
///
/// # Errors
/// - `EvalError::Format` if the text is not valid in the declared format
pub fn parse(format: DataFormat, text: &str, infer_types: bool) -> Result<Value, EvalError> {
    match format {
        DataFormat::Csv => parse_csv(text, infer_types),
        DataFormat::Json => serde_json::from_str(text).map_err(|e| EvalError::format(format, e)),
    }
}

/// Parse CSV with a header row into an array of row objects
///
/// Rows shorter than the header leave the trailing fields out; cells past
/// the header are ignored.
///
/// # Errors
/// - `EvalError::Format` on malformed CSV
pub fn parse_csv(text: &str, infer_types: bool) -> Result<Value, EvalError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| EvalError::format(DataFormat::Csv, e))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| EvalError::format(DataFormat::Csv, e))?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.to_string(), cell_value(cell, infer_types)))
            .collect();
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}

fn cell_value(cell: &str, infer_types: bool) -> Value {
    if !infer_types || cell.is_empty() {
        return Value::String(cell.to_string());
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    match cell {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}
