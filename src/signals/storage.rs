//! Whale Log
//!
//! The in-memory store: at most one record per trade id. Maintenance is always
//! merge -> prune by age -> sort newest first -> cap by count.

use crate::models::TradeRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhaleLog {
    trades: HashMap<String, TradeRecord>,
}

/// Counters from one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub pruned: usize,
    pub capped: usize,
    pub final_size: usize,
}

impl WhaleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a persisted sequence. The sequence is newest first, so on a
    /// duplicate id the first occurrence is kept.
    pub fn from_records(records: Vec<TradeRecord>) -> Self {
        let mut trades = HashMap::with_capacity(records.len());
        for record in records {
            trades.entry(record.id.clone()).or_insert(record);
        }
        Self { trades }
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TradeRecord> {
        self.trades.get(id)
    }

    /// Upsert a batch. Every batch entry replaces the stored record with the
    /// same id wholesale; ids absent from the batch are untouched. Within one
    /// batch the last occurrence of an id wins.
    pub fn merge(&mut self, batch: Vec<TradeRecord>, stats: &mut MaintenanceStats) {
        for record in batch {
            match self.trades.entry(record.id.clone()) {
                Entry::Vacant(slot) => {
                    stats.inserted += 1;
                    slot.insert(record);
                }
                Entry::Occupied(mut slot) => {
                    if slot.get() == &record {
                        stats.unchanged += 1;
                    } else {
                        stats.updated += 1;
                        slot.insert(record);
                    }
                }
            }
        }
    }

    /// Drop records older than `retention_secs` relative to `now`
    pub fn prune(&mut self, now: i64, retention_secs: i64) -> usize {
        let before = self.trades.len();
        self.trades.retain(|_, t| t.age_secs(now) <= retention_secs);
        before - self.trades.len()
    }

    /// Newest first; ties broken by id so the output is deterministic
    pub fn into_sorted(self) -> Vec<TradeRecord> {
        let mut records: Vec<TradeRecord> = self.trades.into_values().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        records
    }

    /// Full maintenance pass over a loaded store and a classified batch
    pub fn maintain(
        existing: Vec<TradeRecord>,
        batch: Vec<TradeRecord>,
        now: i64,
        retention_secs: i64,
        max_size: usize,
    ) -> (Vec<TradeRecord>, MaintenanceStats) {
        let mut stats = MaintenanceStats::default();
        let mut log = Self::from_records(existing);

        log.merge(batch, &mut stats);
        stats.pruned = log.prune(now, retention_secs);

        let mut records = log.into_sorted();
        if records.len() > max_size {
            stats.capped = records.len() - max_size;
            records.truncate(max_size);
        }
        stats.final_size = records.len();

        (records, stats)
    }
}
