//! Command surface.
//!
//! Each command takes a JSON payload and the database state and answers with
//! JSON, so the CLI and any other front end drive the engine the same way.
//! Payload keys are accepted in camelCase or snake_case.

pub mod consolidation;
pub mod settings;
pub mod snapshot;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;

use crate::orders::{DateRange, OrderFilter};
use crate::settings::ConfigValues;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FilterPayload {
    #[serde(default, alias = "business_unit", alias = "unit")]
    business_unit: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default, alias = "dateFrom", alias = "date_from")]
    from: Option<String>,
    #[serde(default, alias = "dateTo", alias = "date_to")]
    to: Option<String>,
}

/// `None` and a bare business unit string are accepted as shorthands.
fn normalize_payload(payload: Value) -> Value {
    match payload {
        Value::Null => serde_json::json!({}),
        Value::String(unit) => serde_json::json!({ "businessUnit": unit }),
        other => other,
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_day(raw: Option<String>, field: &str) -> Result<Option<NaiveDate>, String> {
    trimmed(raw)
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|_| format!("Invalid {field} '{s}': expected YYYY-MM-DD"))
        })
        .transpose()
}

/// Read the order selection from a payload, without any defaults.
pub(crate) fn parse_filter(payload: &Value) -> Result<OrderFilter, String> {
    let parsed: FilterPayload = serde_json::from_value(normalize_payload(payload.clone()))
        .map_err(|e| format!("Invalid filter payload: {e}"))?;
    let date = DateRange::from_parts(
        parse_day(parsed.date, "date")?,
        parse_day(parsed.from, "from")?,
        parse_day(parsed.to, "to")?,
    )?;
    Ok(OrderFilter {
        business_unit: trimmed(parsed.business_unit),
        date,
    })
}

/// Like [`parse_filter`], falling back to the configured business unit when
/// the payload names none. Without either, every unit is included.
pub(crate) fn resolve_filter(conn: &Connection, payload: &Value) -> Result<OrderFilter, String> {
    let mut filter = parse_filter(payload)?;
    if filter.business_unit.is_none() {
        filter.business_unit = ConfigValues::load(conn).business_unit;
    }
    Ok(filter)
}
