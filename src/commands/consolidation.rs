use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::consolidation::{consolidate, ConsolidationReport};
use crate::db::{self, DbState};
use crate::formula::FormulaDefinitions;
use crate::production_sheet::{self, SheetLayout};

use super::{normalize_payload, resolve_filter};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PrintPayload {
    #[serde(default, alias = "columns")]
    width: Option<usize>,
}

/// Consolidate the cached orders selected by `payload`.
pub fn build_report(db: &DbState, payload: &Value) -> Result<ConsolidationReport, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let filter = resolve_filter(&conn, payload)?;
    let orders = db::load_orders(&conn, &filter)?;
    let definitions = FormulaDefinitions::from_rows(db::load_formula_settings(&conn)?);
    drop(conn);

    if definitions.is_empty() && !orders.is_empty() {
        info!("no formula texts cached, formula orders will contribute nothing");
    }
    Ok(ConsolidationReport::new(
        consolidate(&orders, &definitions),
        filter,
    ))
}

pub fn consolidation_compute(db: &DbState, payload: Value) -> Result<Value, String> {
    let report = build_report(db, &payload)?;
    serde_json::to_value(&report).map_err(|e| format!("serialize report: {e}"))
}

pub fn consolidation_print(db: &DbState, payload: Value) -> Result<Value, String> {
    let print: PrintPayload = serde_json::from_value(normalize_payload(payload.clone()))
        .map_err(|e| format!("Invalid print payload: {e}"))?;
    let layout = print
        .width
        .map(SheetLayout::with_width)
        .unwrap_or_default();
    let report = build_report(db, &payload)?;
    Ok(serde_json::json!({
        "reportId": report.report_id,
        "sheet": production_sheet::render(&report, layout),
    }))
}
