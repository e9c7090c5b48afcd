//! Snapshot refresh.
//!
//! Pulls in-production orders and formula texts from the hosted backend and
//! writes them into the local store. Consolidation only ever reads the local
//! snapshot, so a refresh followed by a recompute always reflects the
//! latest backend state.

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::api;
use crate::db::{self, DbState};
use crate::orders::{OrderFilter, OrderRecord};
use crate::settings::BackendConfig;

const SYNC_CATEGORY: &str = "sync";
const LAST_SYNCED_KEY: &str = "last_synced_at";

/// Outcome of a refresh or an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub orders: usize,
    pub settings: usize,
    pub synced_at: String,
}

/// Write a fetched or imported snapshot.
///
/// Orders inside the filter's scope are replaced; formula texts are replaced
/// only when `settings` is non-empty so a partial import keeps known texts.
/// All writes commit together or not at all.
pub fn apply_snapshot(
    conn: &Connection,
    filter: &OrderFilter,
    orders: &[OrderRecord],
    settings: &[(String, Value)],
) -> Result<SyncSummary, String> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("begin apply_snapshot: {e}"))?;
    let written = db::replace_orders_in_scope(&tx, filter, orders)?;
    if settings.is_empty() {
        warn!("snapshot carries no formula settings, keeping cached ones");
    } else {
        db::replace_formula_settings(&tx, settings)?;
    }

    let synced_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    db::set_setting(&tx, SYNC_CATEGORY, LAST_SYNCED_KEY, &synced_at)?;
    tx.commit()
        .map_err(|e| format!("commit apply_snapshot: {e}"))?;

    Ok(SyncSummary {
        orders: written,
        settings: settings.len(),
        synced_at,
    })
}

/// When the snapshot was last written, if ever.
pub fn last_synced_at(conn: &Connection) -> Option<String> {
    db::get_setting(conn, SYNC_CATEGORY, LAST_SYNCED_KEY)
}

/// Fetch orders and formula settings concurrently, then store them.
///
/// Nothing is written unless both requests succeed.
pub async fn refresh_snapshot(
    db: &DbState,
    cfg: &BackendConfig,
    filter: &OrderFilter,
) -> Result<SyncSummary, String> {
    info!(
        business_unit = filter.business_unit.as_deref().unwrap_or("*"),
        dates = %filter.date.label(),
        "refreshing snapshot"
    );

    let (orders, settings) = tokio::try_join!(
        api::fetch_orders(cfg, filter),
        api::fetch_formula_settings(cfg)
    )?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let summary = apply_snapshot(&conn, filter, &orders, &settings)?;
    info!(
        orders = summary.orders,
        settings = summary.settings,
        "snapshot refreshed"
    );
    Ok(summary)
}
