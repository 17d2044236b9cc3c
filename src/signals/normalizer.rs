//! Schema normalization
//!
//! Turns raw feed objects into canonical trades. One bad record never sinks
//! the batch: it is logged, counted and skipped.

use crate::models::NormalizedTrade;
use crate::scrapers::{FeedSchema, RawTrade, SchemaVersion};
use tracing::warn;

pub struct SchemaNormalizer {
    schema: Box<dyn FeedSchema>,
    skipped: usize,
}

impl SchemaNormalizer {
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            schema: version.adapter(),
            skipped: 0,
        }
    }

    pub fn version(&self) -> SchemaVersion {
        self.schema.version()
    }

    /// Records skipped since construction
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn normalize(&mut self, raw: &RawTrade) -> Option<NormalizedTrade> {
        match self.schema.normalize(raw) {
            Ok(trade) => Some(trade),
            Err(reason) => {
                self.skipped += 1;
                warn!(
                    schema = %self.schema.version(),
                    id = raw.get("id").and_then(|v| v.as_str()).unwrap_or("?"),
                    "Skipping malformed trade: {}",
                    reason
                );
                None
            }
        }
    }

    pub fn normalize_batch(&mut self, raws: &[RawTrade]) -> Vec<NormalizedTrade> {
        raws.iter().filter_map(|raw| self.normalize(raw)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawTrade {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_bad_record_does_not_abort_batch() {
        let mut normalizer = SchemaNormalizer::new(SchemaVersion::Fill);
        let batch = vec![
            raw(json!({ "id": "ok-1", "timestamp": 10, "outcomeIndex": 0, "side": "BUY", "size": "100", "price": "0.5" })),
            raw(json!({ "id": "bad", "timestamp": 11, "outcomeIndex": 0, "side": "BUY", "size": "100" })),
            raw(json!({ "id": "ok-2", "timestamp": 12, "outcomeIndex": 1, "side": "SELL", "size": "10", "price": "0.9" })),
        ];

        let trades = normalizer.normalize_batch(&batch);
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].id, "ok-1");
        assert_eq!(trades[1].id, "ok-2");
        assert_eq!(normalizer.skipped(), 1);

        normalizer.normalize_batch(&batch);
        assert_eq!(normalizer.skipped(), 2);
    }

    #[test]
    fn test_adapter_follows_configuration() {
        // A deal-shaped record fed through the fill adapter is rejected, not guessed at
        let deal = raw(json!({
            "id": "d1",
            "creationTimestamp": "1700000000",
            "outcomeIndex": "0",
            "type": "Buy",
            "outcomeTokensAmount": "100",
            "outcomeTokenPrice": "0.5"
        }));

        let mut fill = SchemaNormalizer::new(SchemaVersion::Fill);
        assert!(fill.normalize(&deal).is_none());

        let mut deal_normalizer = SchemaNormalizer::new(SchemaVersion::Deal);
        assert!(deal_normalizer.normalize(&deal).is_some());
    }

    #[test]
    fn test_hostile_numbers_do_not_sink_batch() {
        let deal = |id: &str, size: &str, price: &str, usd: &str| {
            raw(json!({
                "id": id,
                "creationTimestamp": "1700000000",
                "outcomeIndex": "0",
                "type": "Buy",
                "outcomeTokensAmount": size,
                "outcomeTokenPrice": price,
                "amountUSD": usd
            }))
        };
        let batch = vec![
            deal("dust", "1", "0.00000000000000000000000001", "5000"),
            deal("huge", "1e400", "0.5", "5000"),
            deal("ok", "4000", "0.5", "2000"),
        ];

        let mut normalizer = SchemaNormalizer::new(SchemaVersion::Deal);
        let ids: Vec<String> = normalizer
            .normalize_batch(&batch)
            .into_iter()
            .map(|t| t.id)
            .collect();

        assert_eq!(ids, vec!["dust", "ok"]);
        assert_eq!(normalizer.skipped(), 1);
    }
}
