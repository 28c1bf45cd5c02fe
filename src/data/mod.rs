//! Record-oriented dataset loading
//!
//! The transport layer hands the engine raw rows (JSON objects) plus a
//! declared column order. This module turns them into a Polars DataFrame
//! with column-wise dtype inference: a column is numeric iff every non-null
//! value it holds is a number, otherwise it is treated as categorical text.

use crate::error::{Result, TabtrainError};
use polars::prelude::*;
use serde_json::Value;

/// Build a DataFrame from JSON-style records.
///
/// Every row must carry exactly the declared columns; a missing or extra
/// key is a schema violation, not a cleaning concern (cleaning happens
/// upstream of the engine).
pub fn records_to_frame(columns: &[String], rows: &[serde_json::Map<String, Value>]) -> Result<DataFrame> {
    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(c)) {
            return Err(TabtrainError::Schema(format!(
                "row {} does not match declared columns ({} declared, {} present)",
                i,
                columns.len(),
                row.len()
            )));
        }
    }

    let mut out: Vec<Column> = Vec::with_capacity(columns.len());
    for name in columns {
        let values: Vec<&Value> = rows.iter().map(|r| &r[name]).collect();
        out.push(infer_column(name, &values)?);
    }

    DataFrame::new(out).map_err(|e| TabtrainError::Data(e.to_string()))
}

fn infer_column(name: &str, values: &[&Value]) -> Result<Column> {
    let numeric = values.iter().all(|v| match v {
        Value::Number(_) | Value::Null => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    });
    // All-null columns stay numeric; the cleaner should have dropped them.
    if numeric {
        let vals: Vec<Option<f64>> = values
            .iter()
            .map(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            })
            .collect();
        Ok(Column::new(name.into(), vals))
    } else {
        let vals: Vec<Option<String>> = values
            .iter()
            .map(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        Ok(Column::new(name.into(), vals))
    }
}
