use serde::Deserialize;
use serde_json::Value;

use crate::db::DbState;
use crate::diagnostics;
use crate::settings::{self as config, ConfigValues};
use crate::sync;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsSetPayload {
    #[serde(alias = "setting_key", alias = "settingKey")]
    key: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportConnectionPayload {
    #[serde(alias = "connection_string", alias = "connection")]
    connection_string: String,
}

fn value_to_settings_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Effective configuration with the API key masked.
pub fn settings_show(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let values = ConfigValues::load(&conn);
    Ok(serde_json::json!({
        "backend": values.masked(),
        "backendReady": values.backend().is_ok(),
        "lastSyncedAt": sync::last_synced_at(&conn),
        "database": db.db_path.display().to_string(),
        "about": diagnostics::get_about_info(),
    }))
}

pub fn settings_set(db: &DbState, payload: Value) -> Result<Value, String> {
    let parsed: SettingsSetPayload =
        serde_json::from_value(payload).map_err(|e| format!("Invalid settings payload: {e}"))?;
    let key = parsed.key.trim();
    if key.is_empty() {
        return Err("Missing setting key".into());
    }
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    config::set_value(&conn, key, &value_to_settings_string(&parsed.value))?;
    Ok(serde_json::json!({ "success": true, "key": key }))
}

/// Accepts `{connectionString}` or the bare string.
pub fn settings_import_connection(db: &DbState, payload: Value) -> Result<Value, String> {
    let payload = match payload {
        Value::String(raw) => serde_json::json!({ "connectionString": raw }),
        other => other,
    };
    let parsed: ImportConnectionPayload = serde_json::from_value(payload)
        .map_err(|e| format!("Invalid connection payload: {e}"))?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let imported = config::import_connection(&conn, &parsed.connection_string)?;
    Ok(serde_json::json!({
        "success": true,
        "url": imported.url,
        "key": config::mask_secret(&imported.key),
        "businessUnit": imported.unit,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            config::ENV_SUPABASE_URL,
            config::ENV_ANON_KEY,
            config::ENV_BUSINESS_UNIT,
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn set_then_show_masks_key() {
        clear_env();
        let state = db::test_state();
        settings_set(&state, json!({"key": "supabase_url", "value": "abc.supabase.co/"}))
            .expect("set url");
        settings_set(&state, json!({"setting_key": "supabase_anon_key", "value": "anon-key-4321"}))
            .expect("set key");

        let shown = settings_show(&state).expect("show");
        assert_eq!(shown["backend"]["supabase_url"], "https://abc.supabase.co");
        assert_eq!(shown["backend"]["supabase_anon_key"], "***4321");
        assert_eq!(shown["backendReady"], true);
        assert!(shown["lastSyncedAt"].is_null());
    }

    #[test]
    fn set_rejects_unknown_or_missing_key() {
        let state = db::test_state();
        assert!(settings_set(&state, json!({"key": "printer", "value": "x"})).is_err());
        assert!(settings_set(&state, json!({"key": " ", "value": "x"})).is_err());
        assert!(settings_set(&state, json!({"value": "x"})).is_err());
    }

    #[test]
    #[serial]
    fn import_connection_from_bare_string() {
        clear_env();
        let state = db::test_state();
        let out = settings_import_connection(
            &state,
            json!(r#"{"url":"abc.supabase.co","key":"anon-key-4321","unit":"traiteur"}"#),
        )
        .expect("import");
        assert_eq!(out["key"], "***4321");
        assert_eq!(out["businessUnit"], "traiteur");

        let shown = settings_show(&state).expect("show");
        assert_eq!(shown["backend"]["business_unit"], "traiteur");
    }

    #[test]
    fn import_connection_reports_bad_input() {
        let state = db::test_state();
        let err = settings_import_connection(&state, json!({"connectionString": "%%%"}))
            .expect_err("bad string");
        assert!(err.starts_with("invalid connection string"));
    }
}
