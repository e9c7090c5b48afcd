//! Backend configuration.
//!
//! Values live in the `local_settings` table under the `backend` category.
//! Environment variables override stored values, which lets a scheduled job
//! run without touching the database settings.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::api::normalize_backend_url;
use crate::db;

pub const BACKEND_CATEGORY: &str = "backend";

pub const KEY_SUPABASE_URL: &str = "supabase_url";
pub const KEY_ANON_KEY: &str = "supabase_anon_key";
pub const KEY_BUSINESS_UNIT: &str = "business_unit";

/// Keys accepted by `config set`.
pub const SETTING_KEYS: &[&str] = &[KEY_SUPABASE_URL, KEY_ANON_KEY, KEY_BUSINESS_UNIT];

pub const ENV_SUPABASE_URL: &str = "KITCHEN_SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "KITCHEN_SUPABASE_ANON_KEY";
pub const ENV_BUSINESS_UNIT: &str = "KITCHEN_BUSINESS_UNIT";
pub const ENV_DATA_DIR: &str = "KITCHEN_DATA_DIR";

const APP_DIR_NAME: &str = "kitchen-consolidation";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("backend URL is not configured (set KITCHEN_SUPABASE_URL or `config set supabase_url <URL>`)")]
    MissingBackendUrl,
    #[error("backend API key is not configured (set KITCHEN_SUPABASE_ANON_KEY or `config set supabase_anon_key <KEY>`)")]
    MissingApiKey,
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("unknown setting '{0}' (expected one of: supabase_url, supabase_anon_key, business_unit)")]
    UnknownSetting(String),
}

/// Everything needed to talk to the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub supabase_url: String,
    pub anon_key: String,
    pub default_business_unit: Option<String>,
}

/// Effective values after environment overrides. Any of them may be unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigValues {
    pub supabase_url: Option<String>,
    pub anon_key: Option<String>,
    pub business_unit: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_value(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

impl ConfigValues {
    /// Read stored values, then apply environment overrides.
    pub fn load(conn: &Connection) -> Self {
        let stored = |key: &str| non_empty(db::get_setting(conn, BACKEND_CATEGORY, key));
        Self {
            supabase_url: env_value(ENV_SUPABASE_URL)
                .or_else(|| stored(KEY_SUPABASE_URL))
                .map(|u| normalize_backend_url(&u)),
            anon_key: env_value(ENV_ANON_KEY).or_else(|| stored(KEY_ANON_KEY)),
            business_unit: env_value(ENV_BUSINESS_UNIT).or_else(|| stored(KEY_BUSINESS_UNIT)),
        }
    }

    pub fn backend(&self) -> Result<BackendConfig, ConfigError> {
        let supabase_url = self
            .supabase_url
            .clone()
            .ok_or(ConfigError::MissingBackendUrl)?;
        let anon_key = self.anon_key.clone().ok_or(ConfigError::MissingApiKey)?;
        Ok(BackendConfig {
            supabase_url,
            anon_key,
            default_business_unit: self.business_unit.clone(),
        })
    }

    /// Values safe to print: the API key keeps only its last 4 characters.
    pub fn masked(&self) -> Value {
        serde_json::json!({
            KEY_SUPABASE_URL: self.supabase_url,
            KEY_ANON_KEY: self.anon_key.as_deref().map(mask_secret),
            KEY_BUSINESS_UNIT: self.business_unit,
        })
    }
}

/// `***` followed by the last 4 characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

/// Store one backend setting. The URL is normalised before it is written.
pub fn set_value(conn: &Connection, key: &str, value: &str) -> Result<(), String> {
    if !SETTING_KEYS.contains(&key) {
        return Err(ConfigError::UnknownSetting(key.to_string()).to_string());
    }
    let value = if key == KEY_SUPABASE_URL {
        normalize_backend_url(value)
    } else {
        value.trim().to_string()
    };
    db::set_setting(conn, BACKEND_CATEGORY, key, &value)?;
    info!(setting_key = key, "backend setting updated");
    Ok(())
}

// ---------------------------------------------------------------------------
// Connection strings
// ---------------------------------------------------------------------------

/// Decoded `{"url", "key", "unit"}` connection string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionString {
    pub url: String,
    pub key: String,
    pub unit: Option<String>,
}

fn decode_connection_string_payload(raw: &str) -> Option<Value> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with('{') {
        return serde_json::from_str::<Value>(&compact).ok();
    }

    let base64 = compact
        .trim_end_matches('=')
        .replace('-', "+")
        .replace('_', "/");
    let padded = format!("{}{}", base64, "=".repeat((4 - base64.len() % 4) % 4));
    let decoded = BASE64_STANDARD.decode(padded).ok()?;
    serde_json::from_slice::<Value>(&decoded).ok()
}

/// Parse a raw-JSON or base64url connection string.
pub fn parse_connection_string(raw: &str) -> Result<ConnectionString, ConfigError> {
    let payload = decode_connection_string_payload(raw).ok_or_else(|| {
        ConfigError::InvalidConnectionString("not JSON or base64-encoded JSON".into())
    })?;
    let field = |name: &str| {
        non_empty(
            payload
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string),
        )
    };
    let url = field("url")
        .map(|u| normalize_backend_url(&u))
        .ok_or_else(|| ConfigError::InvalidConnectionString("missing url".into()))?;
    let key = field("key")
        .ok_or_else(|| ConfigError::InvalidConnectionString("missing key".into()))?;
    Ok(ConnectionString {
        url,
        key,
        unit: field("unit"),
    })
}

/// Decode a connection string and store its values.
pub fn import_connection(conn: &Connection, raw: &str) -> Result<ConnectionString, String> {
    let parsed = parse_connection_string(raw).map_err(|e| e.to_string())?;
    set_value(conn, KEY_SUPABASE_URL, &parsed.url)?;
    set_value(conn, KEY_ANON_KEY, &parsed.key)?;
    if let Some(unit) = &parsed.unit {
        set_value(conn, KEY_BUSINESS_UNIT, unit)?;
    }
    info!(url = %parsed.url, "connection string imported");
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Data directory
// ---------------------------------------------------------------------------

/// Data directory: explicit flag, then `KITCHEN_DATA_DIR`, then the XDG data
/// home, then `~/.local/share`.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf, String> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = env_value(ENV_DATA_DIR) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = env_value("XDG_DATA_HOME") {
        return Ok(PathBuf::from(xdg).join(APP_DIR_NAME));
    }
    let home = env_value("HOME")
        .ok_or("Cannot locate a data directory: set --data-dir or KITCHEN_DATA_DIR")?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join(APP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serial_test::serial;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        conn
    }

    fn clear_env() {
        for name in [ENV_SUPABASE_URL, ENV_ANON_KEY, ENV_BUSINESS_UNIT, ENV_DATA_DIR] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_missing_values_are_reported() {
        clear_env();
        let conn = test_db();
        let values = ConfigValues::load(&conn);
        assert_eq!(values, ConfigValues::default());
        assert_eq!(values.backend(), Err(ConfigError::MissingBackendUrl));

        set_value(&conn, KEY_SUPABASE_URL, "abc.supabase.co/").expect("set url");
        assert_eq!(
            ConfigValues::load(&conn).backend(),
            Err(ConfigError::MissingApiKey)
        );
    }

    #[test]
    #[serial]
    fn test_stored_values_and_env_override() {
        clear_env();
        let conn = test_db();
        set_value(&conn, KEY_SUPABASE_URL, "https://abc.supabase.co/rest/v1").expect("set url");
        set_value(&conn, KEY_ANON_KEY, "stored-key").expect("set key");
        set_value(&conn, KEY_BUSINESS_UNIT, "traiteur").expect("set unit");

        let cfg = ConfigValues::load(&conn).backend().expect("complete config");
        assert_eq!(cfg.supabase_url, "https://abc.supabase.co");
        assert_eq!(cfg.default_business_unit.as_deref(), Some("traiteur"));

        std::env::set_var(ENV_BUSINESS_UNIT, "restaurant");
        std::env::set_var(ENV_ANON_KEY, "  ");
        let cfg = ConfigValues::load(&conn).backend().expect("complete config");
        assert_eq!(cfg.default_business_unit.as_deref(), Some("restaurant"));
        assert_eq!(cfg.anon_key, "stored-key");
        clear_env();
    }

    #[test]
    fn test_unknown_setting_is_rejected() {
        let conn = test_db();
        let err = set_value(&conn, "printer", "x").expect_err("unknown key");
        assert!(err.contains("unknown setting 'printer'"));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("eyJhbGciOiJIUzI1NiJ9.abcd"), "***abcd");
        assert_eq!(mask_secret("abc"), "***");
    }

    #[test]
    fn test_masked_view_hides_key() {
        let values = ConfigValues {
            supabase_url: Some("https://abc.supabase.co".into()),
            anon_key: Some("secret-key-9876".into()),
            business_unit: None,
        };
        let masked = values.masked();
        assert_eq!(masked[KEY_ANON_KEY], "***9876");
        assert!(masked[KEY_BUSINESS_UNIT].is_null());
    }

    #[test]
    fn test_parse_raw_json_connection_string() {
        let parsed = parse_connection_string(r#" {"url": "abc.supabase.co", "key": "k-1"} "#)
            .expect("valid json");
        assert_eq!(parsed.url, "https://abc.supabase.co");
        assert_eq!(parsed.key, "k-1");
        assert_eq!(parsed.unit, None);
    }

    #[test]
    fn test_parse_base64url_connection_string() {
        let raw = URL_SAFE_NO_PAD
            .encode(r#"{"url":"https://abc.supabase.co/","key":"anon?key>>","unit":"traiteur"}"#);
        let parsed = parse_connection_string(&raw).expect("valid base64url");
        assert_eq!(
            parsed,
            ConnectionString {
                url: "https://abc.supabase.co".into(),
                key: "anon?key>>".into(),
                unit: Some("traiteur".into()),
            }
        );
    }

    #[test]
    fn test_invalid_connection_strings() {
        assert!(matches!(
            parse_connection_string("not a connection string"),
            Err(ConfigError::InvalidConnectionString(_))
        ));
        assert_eq!(
            parse_connection_string(r#"{"url": "abc.supabase.co"}"#),
            Err(ConfigError::InvalidConnectionString("missing key".into()))
        );
    }

    #[test]
    #[serial]
    fn test_import_connection_stores_values() {
        clear_env();
        let conn = test_db();
        import_connection(
            &conn,
            r#"{"url": "abc.supabase.co", "key": "k-1", "unit": "traiteur"}"#,
        )
        .expect("import");
        let values = ConfigValues::load(&conn);
        assert_eq!(values.supabase_url.as_deref(), Some("https://abc.supabase.co"));
        assert_eq!(values.anon_key.as_deref(), Some("k-1"));
        assert_eq!(values.business_unit.as_deref(), Some("traiteur"));
    }

    #[test]
    #[serial]
    fn test_resolve_data_dir_precedence() {
        clear_env();
        let explicit = resolve_data_dir(Some(PathBuf::from("/tmp/explicit"))).expect("explicit");
        assert_eq!(explicit, PathBuf::from("/tmp/explicit"));

        std::env::set_var(ENV_DATA_DIR, "/tmp/from-env");
        assert_eq!(
            resolve_data_dir(None).expect("env"),
            PathBuf::from("/tmp/from-env")
        );
        clear_env();

        let previous_xdg = std::env::var("XDG_DATA_HOME").ok();
        std::env::set_var("XDG_DATA_HOME", "/tmp/xdg");
        assert_eq!(
            resolve_data_dir(None).expect("xdg"),
            PathBuf::from("/tmp/xdg/kitchen-consolidation")
        );
        match previous_xdg {
            Some(v) => std::env::set_var("XDG_DATA_HOME", v),
            None => std::env::remove_var("XDG_DATA_HOME"),
        }
    }
}
