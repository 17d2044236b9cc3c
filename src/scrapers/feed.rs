//! Upstream trade feed boundary
//!
//! Everything above this trait treats the feed as an at-least-once,
//! possibly-overlapping source of raw JSON trade objects.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;

/// One raw upstream trade object; shape depends on the feed schema version
pub type RawTrade = serde_json::Map<String, serde_json::Value>;

/// A single page request. Ordering is always timestamp descending.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    /// Exclusive lower bound (unix seconds)
    pub after: i64,
    /// Exclusive upper bound (unix seconds); `None` means open-ended
    pub before: Option<i64>,
    pub min_usd: Decimal,
    pub page_size: u32,
}

#[async_trait]
pub trait TradeFeed: Send + Sync {
    /// Human-readable feed name for logs
    fn name(&self) -> &str;

    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawTrade>, FetchError>;
}

/// Transient failure talking to the feed. The caller keeps whatever it
/// already accumulated and stops asking.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    Transport(String),
    Timeout(Duration),
    Status { code: u16, body: String },
    GraphQl(String),
    Decode(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Timeout(d) => write!(f, "request timed out after {:?}", d),
            Self::Status { code, body } => write!(f, "HTTP {}: {}", code, body),
            Self::GraphQl(e) => write!(f, "GraphQL error: {}", e),
            Self::Decode(e) => write!(f, "undecodable response: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}
