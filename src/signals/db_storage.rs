//! SQLite-backed trade store
//!
//! Same contract as the JSON store: load returns the stored sequence newest
//! first, save replaces it wholesale inside one transaction. Decimals are kept
//! as TEXT so nothing is rounded through a float.

use super::persistence::{StoreError, StoreLoad, TradeStore};
use crate::models::{Side, Tier, TradeRecord};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS whale_trades (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    market TEXT NOT NULL,
    outcome_index INTEGER NOT NULL,
    side TEXT NOT NULL,
    size TEXT NOT NULL,
    price TEXT NOT NULL,
    usd_value TEXT NOT NULL,
    maker_address TEXT NOT NULL,
    tier TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_whale_trades_recent
    ON whale_trades(timestamp DESC, id);
"#;

pub struct SqliteTradeStore {
    conn: Arc<Mutex<Connection>>,
    label: String,
    /// Set when `open` had to replace an unusable file
    recovered: Mutex<Option<StoreError>>,
}

impl SqliteTradeStore {
    /// Open or create the database. A file that is not a usable SQLite
    /// database is moved aside and replaced with an empty one; the first
    /// `load()` then reports it as corrupt.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        match Self::open_file(db_path) {
            Ok(store) => Ok(store),
            Err(e) if db_path.exists() => {
                let aside = quarantine(db_path)?;
                warn!(
                    "⚠️ {} is unusable ({}), moved to {}",
                    db_path.display(),
                    e,
                    aside.display()
                );
                let store = Self::open_file(db_path)?;
                *store.recovered.lock() = Some(StoreError::Corrupt(format!(
                    "{}: {} (moved to {})",
                    db_path.display(),
                    e,
                    aside.display()
                )));
                Ok(store)
            }
            Err(e) => Err(e),
        }
    }

    fn open_file(db_path: &Path) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)?;
        Self::init(conn, db_path.display().to_string())
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn init(conn: Connection, label: String) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if label != ":memory:" && !journal_mode.eq_ignore_ascii_case("wal") {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        info!("📊 Trade database ready at {}", label);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            label,
            recovered: Mutex::new(None),
        })
    }

    pub fn len(&self) -> usize {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM whale_trades", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_all(&self) -> Result<Vec<TradeRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, timestamp, market, outcome_index, side, size, price, usd_value, maker_address, tier
             FROM whale_trades ORDER BY timestamp DESC, id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(RawRow {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                market: row.get(2)?,
                outcome_index: row.get(3)?,
                side: row.get(4)?,
                size: row.get(5)?,
                price: row.get(6)?,
                usd_value: row.get(7)?,
                maker_address: row.get(8)?,
                tier: row.get(9)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

/// Rename an unusable database (and any WAL side files) out of the way
fn quarantine(db_path: &Path) -> Result<PathBuf, StoreError> {
    let name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store.db".to_string());
    let aside = db_path.with_file_name(format!(
        "{}.corrupt-{}",
        name,
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::rename(db_path, &aside)?;
    for suffix in ["-wal", "-shm"] {
        let _ = std::fs::remove_file(db_path.with_file_name(format!("{}{}", name, suffix)));
    }
    Ok(aside)
}

/// Row as stored, before the text columns are parsed back into domain types
struct RawRow {
    id: String,
    timestamp: i64,
    market: String,
    outcome_index: u32,
    side: String,
    size: String,
    price: String,
    usd_value: String,
    maker_address: String,
    tier: String,
}

impl RawRow {
    fn into_record(self) -> Result<TradeRecord, StoreError> {
        let decimal = |field: &str, raw: &str| -> Result<Decimal, StoreError> {
            raw.parse::<Decimal>().map_err(|e| {
                StoreError::Corrupt(format!("row {} has bad {} '{}': {}", self.id, field, raw, e))
            })
        };

        let size = decimal("size", &self.size)?;
        let price = decimal("price", &self.price)?;
        let usd_value = decimal("usd_value", &self.usd_value)?;
        let side = Side::parse(&self.side)
            .ok_or_else(|| StoreError::Corrupt(format!("row {} has bad side '{}'", self.id, self.side)))?;
        let tier = Tier::parse(&self.tier)
            .ok_or_else(|| StoreError::Corrupt(format!("row {} has bad tier '{}'", self.id, self.tier)))?;

        Ok(TradeRecord {
            id: self.id,
            timestamp: self.timestamp,
            market: self.market,
            outcome_index: self.outcome_index,
            side,
            size,
            price,
            usd_value,
            maker_address: self.maker_address,
            tier,
        })
    }
}

impl TradeStore for SqliteTradeStore {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.label)
    }

    fn load(&self) -> StoreLoad {
        if let Some(recovered) = self.recovered.lock().take() {
            return StoreLoad::empty_with(recovered);
        }
        match self.read_all() {
            Ok(records) => {
                debug!("Loaded {} records from {}", records.len(), self.label);
                StoreLoad {
                    records,
                    warning: None,
                }
            }
            Err(e) => {
                warn!("⚠️ Starting from an empty store: {}", e);
                StoreLoad {
                    records: Vec::new(),
                    warning: Some(e),
                }
            }
        }
    }

    fn save(&self, records: &[TradeRecord]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM whale_trades", [])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO whale_trades
                 (id, timestamp, market, outcome_index, side, size, price, usd_value, maker_address, tier)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for r in records {
                stmt.execute(params![
                    &r.id,
                    r.timestamp,
                    &r.market,
                    r.outcome_index,
                    r.side.as_str(),
                    r.size.to_string(),
                    r.price.to_string(),
                    r.usd_value.to_string(),
                    &r.maker_address,
                    r.tier.as_str(),
                ])?;
            }
        }
        tx.commit()?;

        info!("💾 Saved {} trades to {}", records.len(), self.label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ZERO_ADDRESS;

    fn record(id: &str, ts: i64, tier: Tier) -> TradeRecord {
        TradeRecord {
            id: id.into(),
            timestamp: ts,
            market: "Fed cuts in March?".into(),
            outcome_index: 0,
            side: Side::Buy,
            size: "20000.123456".parse().unwrap(),
            price: "0.61".parse().unwrap(),
            usd_value: "12200.07530816".parse().unwrap(),
            maker_address: ZERO_ADDRESS.into(),
            tier,
        }
    }

    #[test]
    fn test_empty_database_loads_empty() {
        let store = SqliteTradeStore::in_memory().expect("Failed to create database");
        let loaded = store.load();
        assert!(loaded.records.is_empty());
        assert!(loaded.warning.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_load_preserves_order_and_precision() {
        let store = SqliteTradeStore::in_memory().expect("Failed to create database");
        let records = vec![
            record("b", 300, Tier::Whale),
            record("a", 200, Tier::Whale),
            record("c", 200, Tier::Shark),
        ];

        store.save(&records).expect("Failed to save");
        let loaded = store.load();

        assert_eq!(loaded.records, records);
        assert_eq!(loaded.records[0].size.to_string(), "20000.123456");
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let store = SqliteTradeStore::in_memory().expect("Failed to create database");
        store
            .save(&[record("old", 1, Tier::Shark), record("keep", 2, Tier::Shark)])
            .expect("Failed to save");
        store.save(&[record("keep", 2, Tier::Whale)]).expect("Failed to save");

        let loaded = store.load();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].id, "keep");
        assert_eq!(loaded.records[0].tier, Tier::Whale);
    }

    #[test]
    fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("whales.db");

        SqliteTradeStore::open(&path)
            .expect("Failed to open")
            .save(&[record("x", 10, Tier::Leviathan)])
            .expect("Failed to save");

        let reopened = SqliteTradeStore::open(&path).expect("Failed to reopen");
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.load().records[0].tier, Tier::Leviathan);
    }

    #[test]
    fn test_garbage_file_is_replaced_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whales.db");
        std::fs::write(&path, b"this is definitely not a sqlite database, just bytes").unwrap();

        let store = SqliteTradeStore::open(&path).expect("corrupt store must not be fatal");

        let loaded = store.load();
        assert!(loaded.records.is_empty());
        assert!(matches!(loaded.warning, Some(StoreError::Corrupt(_))));

        let moved_aside = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("whales.db.corrupt-"));
        assert!(moved_aside);

        store.save(&[record("fresh", 5, Tier::Shark)]).expect("Failed to save");
        let reloaded = store.load();
        assert!(reloaded.warning.is_none());
        assert_eq!(reloaded.records.len(), 1);
    }
}
