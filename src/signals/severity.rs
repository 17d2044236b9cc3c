//! Severity classification
//!
//! Maps a trade's USD notional to a tier via the configured threshold table.
//! Lower bounds are inclusive: a trade exactly on a threshold gets the higher tier.

use crate::config::TierThreshold;
use crate::models::{NormalizedTrade, Tier, TradeRecord};
use rust_decimal::Decimal;
use tracing::debug;

pub struct SeverityClassifier {
    min_usd: Decimal,
    /// Sorted by threshold, largest first
    table: Vec<TierThreshold>,
}

/// Classified batch plus how many trades fell under the minimum
#[derive(Debug, Default)]
pub struct ClassifiedBatch {
    pub records: Vec<TradeRecord>,
    pub excluded: usize,
}

impl SeverityClassifier {
    /// `tiers` is expected to have passed config validation
    pub fn new(min_usd: Decimal, tiers: &[TierThreshold]) -> Self {
        let mut table = tiers.to_vec();
        table.sort_by(|a, b| b.min_usd.cmp(&a.min_usd));
        Self { min_usd, table }
    }

    pub fn min_usd(&self) -> Decimal {
        self.min_usd
    }

    /// `None` means below the minimum: the trade is not a whale at all
    pub fn tier_for(&self, usd_value: Decimal) -> Option<Tier> {
        if usd_value < self.min_usd {
            return None;
        }
        let tier = self
            .table
            .iter()
            .find(|t| usd_value >= t.min_usd)
            .map(|t| t.tier)
            .unwrap_or(Tier::Minnow);
        Some(tier)
    }

    pub fn classify(&self, trade: NormalizedTrade) -> Option<TradeRecord> {
        let tier = self.tier_for(trade.usd_value)?;
        Some(TradeRecord::classified(trade, tier))
    }

    pub fn classify_batch(&self, trades: Vec<NormalizedTrade>) -> ClassifiedBatch {
        let mut batch = ClassifiedBatch::default();
        for trade in trades {
            match self.classify(trade) {
                Some(record) => {
                    if record.tier >= Tier::Whale {
                        debug!(
                            "{} {} ${} {} on '{}'",
                            record.tier.icon(),
                            record.tier,
                            record.usd_value.round_dp(0),
                            record.side,
                            record.market
                        );
                    }
                    batch.records.push(record);
                }
                None => batch.excluded += 1,
            }
        }
        batch
    }
}
