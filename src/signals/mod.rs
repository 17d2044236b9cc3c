pub mod db_storage;
pub mod normalizer;
pub mod persistence;
pub mod severity;
pub mod storage;

pub use db_storage::SqliteTradeStore;
pub use normalizer::SchemaNormalizer;
pub use persistence::{open_store, JsonFileStore, StoreError, StoreLoad, TradeStore};
pub use severity::{ClassifiedBatch, SeverityClassifier};
pub use storage::{MaintenanceStats, WhaleLog};
