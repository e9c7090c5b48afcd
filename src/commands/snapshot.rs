use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::api;
use crate::db::DbState;
use crate::settings::ConfigValues;
use crate::sync;

use super::{parse_filter, resolve_filter};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ImportPayload {
    #[serde(default)]
    orders: Vec<Value>,
    #[serde(default, alias = "formulaSettings", alias = "formula_settings")]
    settings: Value,
}

/// Settings come either as a `{key: value}` map or as `{key, value}` rows.
fn settings_rows(settings: Value) -> Result<Vec<(String, Value)>, String> {
    match settings {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Array(rows) => Ok(api::parse_setting_rows(rows)),
        _ => Err("Invalid settings: expected an object or a list of {key, value} rows".into()),
    }
}

/// Pull a fresh snapshot from the backend for the selected scope.
pub async fn snapshot_refresh(db: &DbState, payload: Value) -> Result<Value, String> {
    let (cfg, filter) = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        let cfg = ConfigValues::load(&conn)
            .backend()
            .map_err(|e| e.to_string())?;
        (cfg, resolve_filter(&conn, &payload)?)
    };
    let summary = sync::refresh_snapshot(db, &cfg, &filter).await?;
    serde_json::to_value(summary).map_err(|e| format!("serialize summary: {e}"))
}

/// Load an exported snapshot for offline use.
///
/// The payload holds `orders` (backend rows) and `settings`; its optional
/// filter keys limit which cached orders are replaced, everything otherwise.
pub fn snapshot_import(db: &DbState, payload: Value) -> Result<Value, String> {
    let filter = parse_filter(&payload)?;
    let parsed: ImportPayload =
        serde_json::from_value(payload).map_err(|e| format!("Invalid snapshot payload: {e}"))?;
    let received = parsed.orders.len();
    let orders = api::parse_order_rows(parsed.orders);
    let settings = settings_rows(parsed.settings)?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let summary = sync::apply_snapshot(&conn, &filter, &orders, &settings)?;
    info!(
        received,
        orders = summary.orders,
        settings = summary.settings,
        "snapshot imported"
    );
    serde_json::to_value(summary).map_err(|e| format!("serialize summary: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::orders::OrderFilter;
    use serde_json::json;
    use serial_test::serial;

    fn snapshot() -> Value {
        json!({
            "orders": [
                {
                    "id": 1,
                    "type": "COMMANDE_MENU",
                    "status": "IN_PREP",
                    "request_date": "2026-03-02",
                    "business_unit": "traiteur",
                    "details": {"formulaName": "Standard"}
                },
                {
                    "id": 2,
                    "type": "COMMANDE_SPECIALE",
                    "status": "IN_PREP",
                    "request_date": "2026-03-02",
                    "business_unit": "traiteur",
                    "details": "[{\"name\":\"Pho\",\"portion\":\"L\",\"quantity\":1}]"
                },
                "garbage"
            ],
            "settings": {"menu_standard": {"fr": "2x Riz"}}
        })
    }

    #[test]
    fn import_writes_orders_and_settings() {
        let state = db::test_state();
        let summary = snapshot_import(&state, snapshot()).expect("import");
        assert_eq!(summary["orders"], 2);
        assert_eq!(summary["settings"], 1);
        assert!(summary["syncedAt"].is_string());

        let conn = state.conn.lock().expect("lock");
        let orders = db::load_orders(&conn, &OrderFilter::default()).expect("load");
        assert_eq!(orders.len(), 2);
        // The string-encoded payload is kept as received.
        assert!(orders[1].details.is_string());
        assert_eq!(db::load_formula_settings(&conn).expect("settings").len(), 1);
    }

    #[test]
    fn import_accepts_setting_rows() {
        let rows = json!([{"key": "menu_confort", "value": "{\"fr\":\"1x Canard\"}"}]);
        let rows = settings_rows(rows).expect("rows");
        assert_eq!(rows[0].0, "menu_confort");
        assert!(settings_rows(json!(3)).is_err());
        assert!(settings_rows(Value::Null).expect("null").is_empty());
    }

    #[test]
    fn import_rejects_non_object_payload() {
        let state = db::test_state();
        assert!(snapshot_import(&state, json!([1, 2])).is_err());
    }

    #[tokio::test]
    #[serial]
    async fn refresh_requires_backend_config() {
        std::env::remove_var(crate::settings::ENV_SUPABASE_URL);
        std::env::remove_var(crate::settings::ENV_ANON_KEY);
        let state = db::test_state();
        let err = snapshot_refresh(&state, json!({}))
            .await
            .expect_err("missing config");
        assert!(err.contains("backend URL is not configured"));
    }
}
