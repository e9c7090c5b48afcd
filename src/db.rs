//! Local SQLite snapshot store.
//!
//! Holds the last orders and formula texts pulled from the hosted backend so
//! consolidation can run offline and be recomputed at will. Uses rusqlite
//! with WAL mode and versioned migrations, plus a category/key/value
//! settings table for configuration.

use rusqlite::{params, Connection};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::orders::{OrderFilter, OrderRecord};

/// Shared state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{data_dir}/kitchen.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once; the snapshot can always be pulled
/// again from the backend.
pub fn init(data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = data_dir.join("kitchen.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: settings and the order snapshot.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_type TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            request_date TEXT,
            business_unit TEXT,
            details TEXT NOT NULL DEFAULT 'null',
            synced_at TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_orders_scope
            ON orders(business_unit, request_date);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        format!("migration v1: {e}")
    })?;

    info!("Applied migration v1 (local_settings, orders)");
    Ok(())
}

/// Migration v2: formula texts cached next to the orders.
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS formula_settings (
            setting_key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now'))
        );

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        format!("migration v2: {e}")
    })?;

    info!("Applied migration v2 (formula_settings)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Order snapshot
// ---------------------------------------------------------------------------

fn insert_order(conn: &Connection, order: &OrderRecord) -> Result<(), String> {
    let details = serde_json::to_string(&order.details)
        .map_err(|e| format!("serialize details for {}: {e}", order.id))?;
    conn.execute(
        "INSERT INTO orders (id, order_type, status, request_date, business_unit, details, synced_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            order_type = excluded.order_type,
            status = excluded.status,
            request_date = excluded.request_date,
            business_unit = excluded.business_unit,
            details = excluded.details,
            synced_at = excluded.synced_at",
        params![
            order.id,
            order.order_type,
            order.status,
            order.request_date,
            order.business_unit,
            details
        ],
    )
    .map_err(|e| format!("upsert order {}: {e}", order.id))?;
    Ok(())
}

/// Insert or update orders in one transaction. Returns the number written.
pub fn upsert_orders(conn: &Connection, orders: &[OrderRecord]) -> Result<usize, String> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("begin upsert_orders: {e}"))?;
    for order in orders {
        insert_order(&tx, order)?;
    }
    tx.commit()
        .map_err(|e| format!("commit upsert_orders: {e}"))?;
    Ok(orders.len())
}

/// Replace every cached order inside the filter's business unit and date
/// scope (whatever its status) with `orders`.
///
/// Opens no transaction of its own; callers that need the delete and the
/// inserts to land together wrap the call in one.
pub fn replace_orders_in_scope(
    conn: &Connection,
    filter: &OrderFilter,
    orders: &[OrderRecord],
) -> Result<usize, String> {
    let (from, to) = scope_bounds(filter);
    let removed = conn
        .execute(
            "DELETE FROM orders
             WHERE (?1 IS NULL OR TRIM(business_unit) = ?1)
               AND (?2 IS NULL OR substr(request_date, 1, 10) >= ?2)
               AND (?3 IS NULL OR substr(request_date, 1, 10) <= ?3)",
            params![filter.business_unit.as_deref().map(str::trim), from, to],
        )
        .map_err(|e| format!("clear order scope: {e}"))?;
    for order in orders {
        insert_order(conn, order)?;
    }
    info!(
        removed,
        inserted = orders.len(),
        "order snapshot replaced for scope"
    );
    Ok(orders.len())
}

fn scope_bounds(filter: &OrderFilter) -> (Option<String>, Option<String>) {
    match filter.date.bounds() {
        Some((from, to)) => (
            Some(from.format("%Y-%m-%d").to_string()),
            Some(to.format("%Y-%m-%d").to_string()),
        ),
        None => (None, None),
    }
}

/// Load the cached orders selected by `filter`.
///
/// Business unit and date are narrowed in SQL; the status check runs on
/// the decoded records so every status alias is honoured.
pub fn load_orders(conn: &Connection, filter: &OrderFilter) -> Result<Vec<OrderRecord>, String> {
    let (from, to) = scope_bounds(filter);
    let mut stmt = conn
        .prepare(
            "SELECT id, order_type, status, request_date, business_unit, details
             FROM orders
             WHERE (?1 IS NULL OR TRIM(business_unit) = ?1)
               AND (?2 IS NULL OR substr(request_date, 1, 10) >= ?2)
               AND (?3 IS NULL OR substr(request_date, 1, 10) <= ?3)
             ORDER BY request_date, id",
        )
        .map_err(|e| format!("prepare load_orders: {e}"))?;

    let rows = stmt
        .query_map(
            params![filter.business_unit.as_deref().map(str::trim), from, to],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .map_err(|e| format!("query load_orders: {e}"))?;

    let mut orders = Vec::new();
    for row in rows {
        let (id, order_type, status, request_date, business_unit, raw_details) =
            row.map_err(|e| format!("read order row: {e}"))?;
        let details = serde_json::from_str::<Value>(&raw_details).unwrap_or_else(|e| {
            warn!(order_id = %id, error = %e, "cached order details are corrupt");
            Value::Null
        });
        let order = OrderRecord {
            id,
            order_type,
            status,
            request_date,
            business_unit,
            details,
        };
        if filter.matches(&order) {
            orders.push(order);
        }
    }
    Ok(orders)
}

// ---------------------------------------------------------------------------
// Formula settings
// ---------------------------------------------------------------------------

/// Replace the cached formula texts with `rows`. Runs in the caller's
/// transaction, if any.
pub fn replace_formula_settings(conn: &Connection, rows: &[(String, Value)]) -> Result<(), String> {
    conn.execute("DELETE FROM formula_settings", [])
        .map_err(|e| format!("clear formula_settings: {e}"))?;
    for (key, value) in rows {
        conn.execute(
            "INSERT INTO formula_settings (setting_key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))",
            params![key, value.to_string()],
        )
        .map_err(|e| format!("insert formula setting {key}: {e}"))?;
    }
    Ok(())
}

/// Load the cached formula texts as `(key, value)` rows.
pub fn load_formula_settings(conn: &Connection) -> Result<Vec<(String, Value)>, String> {
    let mut stmt = conn
        .prepare("SELECT setting_key, value FROM formula_settings ORDER BY setting_key")
        .map_err(|e| format!("prepare load_formula_settings: {e}"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| format!("query load_formula_settings: {e}"))?;

    let mut settings = Vec::new();
    for row in rows {
        let (key, raw) = row.map_err(|e| format!("read formula setting: {e}"))?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => settings.push((key, value)),
            Err(e) => warn!(setting_key = %key, error = %e, "cached formula setting is corrupt"),
        }
    }
    Ok(settings)
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

/// In-memory database with the full schema (test helper).
#[cfg(test)]
pub fn test_state() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .expect("set pragmas");
    run_migrations_for_test(&conn);
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::DateRange;
    use chrono::NaiveDate;
    use serde_json::json;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("pragma setup");
        run_migrations(&conn).expect("run_migrations should succeed");
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
    }

    fn order(id: &str, status: &str, unit: &str, date: &str, details: Value) -> OrderRecord {
        OrderRecord {
            id: id.into(),
            order_type: "COMMANDE_MENU".into(),
            status: status.into(),
            request_date: Some(date.into()),
            business_unit: Some(unit.into()),
            details,
        }
    }

    #[test]
    fn test_migrations_create_tables() {
        let conn = test_db();
        let tables = table_names(&conn);
        for table in ["formula_settings", "local_settings", "orders", "schema_version"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .expect("read version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("second run should succeed");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .expect("count versions");
        assert_eq!(count, i64::from(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_init_on_disk_uses_wal() {
        let dir = std::env::temp_dir().join(format!("kitchen-db-test-{}", uuid::Uuid::new_v4()));
        let state = init(&dir).expect("init on disk");
        {
            let conn = state.conn.lock().expect("lock");
            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .expect("journal mode");
            assert_eq!(mode.to_lowercase(), "wal");
        }
        drop(state);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_details_round_trip_keeps_encoding() {
        let conn = test_db();
        let as_string = json!("{\"formulaName\":\"Standard\"}");
        let split = json!({"0": "{\"formulaName\"", "1": ":\"Duo\"}"});
        upsert_orders(
            &conn,
            &[
                order("a", "IN_PREP", "traiteur", "2026-03-02", as_string.clone()),
                order("b", "IN_PREP", "traiteur", "2026-03-02", split.clone()),
            ],
        )
        .expect("upsert");

        let loaded = load_orders(&conn, &OrderFilter::default()).expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].details, as_string);
        assert_eq!(loaded[1].details, split);
    }

    #[test]
    fn test_load_orders_applies_filter() {
        let conn = test_db();
        upsert_orders(
            &conn,
            &[
                order("1", "EN_PREPARATION", "traiteur", "2026-03-02", json!({})),
                order("2", "LIVREE", "traiteur", "2026-03-02", json!({})),
                order("3", "IN_PREP", "restaurant", "2026-03-02", json!({})),
                order("4", "IN_PREP", "traiteur", "2026-03-10T09:00:00Z", json!({})),
            ],
        )
        .expect("upsert");

        let filter = OrderFilter {
            business_unit: Some("traiteur".into()),
            date: DateRange::between(day("2026-03-01"), day("2026-03-07")),
        };
        let ids: Vec<String> = load_orders(&conn, &filter)
            .expect("load")
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec!["1".to_string()]);

        let wide = OrderFilter {
            business_unit: Some("traiteur".into()),
            date: DateRange::Any,
        };
        assert_eq!(load_orders(&conn, &wide).expect("load").len(), 2);
    }

    #[test]
    fn test_corrupt_details_load_as_null() {
        let conn = test_db();
        conn.execute(
            "INSERT INTO orders (id, order_type, status, details)
             VALUES ('x', 'COMMANDE_MENU', 'IN_PREP', '{bad')",
            [],
        )
        .expect("insert raw row");
        let loaded = load_orders(&conn, &OrderFilter::default()).expect("load");
        assert_eq!(loaded[0].details, Value::Null);
    }

    #[test]
    fn test_replace_orders_in_scope_keeps_other_scopes() {
        let conn = test_db();
        upsert_orders(
            &conn,
            &[
                order("old", "IN_PREP", "traiteur", "2026-03-03", json!({})),
                order("done", "LIVREE", "traiteur", "2026-03-04", json!({})),
                order("other-week", "IN_PREP", "traiteur", "2026-03-12", json!({})),
                order("other-unit", "IN_PREP", "restaurant", "2026-03-03", json!({})),
            ],
        )
        .expect("upsert");

        let filter = OrderFilter {
            business_unit: Some("traiteur".into()),
            date: DateRange::between(day("2026-03-02"), day("2026-03-08")),
        };
        replace_orders_in_scope(
            &conn,
            &filter,
            &[order("new", "IN_PREP", "traiteur", "2026-03-05", json!({}))],
        )
        .expect("replace");

        let ids: Vec<String> = load_orders(&conn, &OrderFilter::default())
            .expect("load")
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec!["other-unit", "new", "other-week"]);
    }

    #[test]
    fn test_formula_settings_replace_and_load() {
        let conn = test_db();
        replace_formula_settings(
            &conn,
            &[
                ("menu_standard".into(), json!({"fr": "1x Riz"})),
                ("menu_confort".into(), json!({"fr": "1x Canard"})),
            ],
        )
        .expect("first replace");
        replace_formula_settings(&conn, &[("menu_standard".into(), json!({"fr": "2x Riz"}))])
            .expect("second replace");

        let rows = load_formula_settings(&conn).expect("load");
        assert_eq!(rows, vec![("menu_standard".to_string(), json!({"fr": "2x Riz"}))]);
    }

    #[test]
    fn test_settings_crud() {
        let conn = test_db();
        assert!(get_setting(&conn, "backend", "business_unit").is_none());
        set_setting(&conn, "backend", "business_unit", "traiteur").expect("set");
        set_setting(&conn, "backend", "business_unit", "restaurant").expect("overwrite");
        assert_eq!(
            get_setting(&conn, "backend", "business_unit").as_deref(),
            Some("restaurant")
        );
        assert!(get_setting(&conn, "sync", "business_unit").is_none());
    }
}
