//! Hosted backend client.
//!
//! Reads order rows and formula settings through the backend's PostgREST
//! interface (`{url}/rest/v1/{table}`), authenticating with the anon key.

use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::formula::FORMULA_SETTING_KEYS;
use crate::orders::{OrderFilter, OrderRecord, IN_PRODUCTION_STATUS_TAGS};
use crate::settings::BackendConfig;

/// Timeout for backend requests (20 seconds).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const ORDER_COLUMNS: &str = "id,type,status,request_date,business_unit,details";

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/rest/v1` segment
pub fn normalize_backend_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if url.ends_with("/rest/v1") {
        url.truncate(url.len() - "/rest/v1".len());
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

/// Build `{base}/rest/v1/{table}` with the given query pairs.
pub fn build_rest_url(base: &str, table: &str, params: &[(&str, String)]) -> Result<Url, String> {
    let base = normalize_backend_url(base);
    let mut url = Url::parse(&format!("{base}/rest/v1/{table}"))
        .map_err(|e| format!("Invalid backend URL: {e}"))?;
    {
        let mut qp = url.query_pairs_mut();
        for (k, v) in params {
            qp.append_pair(k, v);
        }
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid backend URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API key is invalid or expired (HTTP 401)".to_string(),
        403 => "Access to backend table refused (HTTP 403)".to_string(),
        404 => "Backend table not found (HTTP 404)".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// PostgREST `in.(...)` list.
fn in_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    format!("in.({})", values.into_iter().collect::<Vec<_>>().join(","))
}

/// Query pairs selecting in-production orders for `filter`.
pub fn orders_query(filter: &OrderFilter) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", ORDER_COLUMNS.to_string()),
        ("status", in_list(IN_PRODUCTION_STATUS_TAGS.iter().copied())),
        ("order", "request_date.asc".to_string()),
    ];
    if let Some(unit) = filter
        .business_unit
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
    {
        params.push(("business_unit", format!("eq.{unit}")));
    }
    match filter.date.bounds() {
        Some((from, to)) if from == to => {
            params.push(("request_date", format!("eq.{}", from.format("%Y-%m-%d"))));
        }
        Some((from, to)) => {
            params.push(("request_date", format!("gte.{}", from.format("%Y-%m-%d"))));
            params.push(("request_date", format!("lte.{}", to.format("%Y-%m-%d"))));
        }
        None => {}
    }
    params
}

fn formula_settings_query() -> Vec<(&'static str, String)> {
    vec![
        ("select", "key,value".to_string()),
        ("key", in_list(FORMULA_SETTING_KEYS.iter().copied())),
    ]
}

/// GET a table and return its rows.
async fn fetch_rows(
    cfg: &BackendConfig,
    table: &str,
    params: &[(&str, String)],
) -> Result<Vec<Value>, String> {
    let url = build_rest_url(&cfg.supabase_url, table, params)?;
    debug!(table, url = %url, "fetching backend rows");

    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

    let resp = client
        .get(url)
        .header("apikey", &cfg.anon_key)
        .header("Authorization", format!("Bearer {}", cfg.anon_key))
        .header("Content-Type", "application/json")
        .send()
        .await
        .map_err(|e| friendly_error(&cfg.supabase_url, &e))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let body = body.trim();
        let message = status_error(status);
        return Err(if body.is_empty() {
            message
        } else {
            format!("{message}: {body}")
        });
    }

    match resp
        .json::<Value>()
        .await
        .map_err(|e| format!("Invalid JSON from backend: {e}"))?
    {
        Value::Array(rows) => Ok(rows),
        other => Err(format!(
            "Expected a list of rows from {table}, got {}",
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Decode order rows, skipping the ones that do not deserialize.
pub fn parse_order_rows(rows: Vec<Value>) -> Vec<OrderRecord> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<OrderRecord>(row) {
            Ok(order) => Some(order),
            Err(e) => {
                warn!(error = %e, "skipping malformed order row");
                None
            }
        })
        .collect()
}

/// Decode `{key, value}` settings rows.
pub fn parse_setting_rows(rows: Vec<Value>) -> Vec<(String, Value)> {
    rows.into_iter()
        .filter_map(|mut row| {
            let key = row.get("key").and_then(Value::as_str)?.to_string();
            let value = row.get_mut("value").map(Value::take).unwrap_or(Value::Null);
            Some((key, value))
        })
        .collect()
}

/// Fetch the in-production orders selected by `filter`.
pub async fn fetch_orders(
    cfg: &BackendConfig,
    filter: &OrderFilter,
) -> Result<Vec<OrderRecord>, String> {
    let rows = fetch_rows(cfg, "orders", &orders_query(filter)).await?;
    let received = rows.len();
    let orders = parse_order_rows(rows);
    info!(received, kept = orders.len(), "fetched orders");
    Ok(orders)
}

/// Fetch the formula text settings rows.
pub async fn fetch_formula_settings(cfg: &BackendConfig) -> Result<Vec<(String, Value)>, String> {
    let rows = fetch_rows(cfg, "settings", &formula_settings_query()).await?;
    let settings = parse_setting_rows(rows);
    info!(count = settings.len(), "fetched formula settings");
    Ok(settings)
}
