pub mod backfill; // Cursor-driven historical pagination
pub mod feed;
pub mod poller; // Single-window incremental fetch
pub mod schema; // Versioned feed shape adapters
pub mod subgraph;

pub use backfill::{BackfillOutcome, BackfillPaginator, Termination};
pub use feed::{FetchError, PageQuery, RawTrade, TradeFeed};
pub use poller::{IncrementalPoller, PollOutcome};
pub use schema::{DealSchema, FeedSchema, FillSchema, MalformedRecord, SchemaVersion};
pub use subgraph::{AdapterCheck, DiagnoseReport, SubgraphClient};
