//! Ingestion runs
//!
//! A run is load -> (bootstrap) -> fetch -> normalize -> classify -> maintain
//! -> save. Fetch failures are reported, not raised; only a failed save is an
//! error.

use crate::config::WatchConfig;
use crate::models::{NormalizedTrade, TradeRecord};
use crate::scrapers::{BackfillPaginator, FetchError, IncrementalPoller, RawTrade, Termination, TradeFeed};
use crate::signals::{
    MaintenanceStats, SchemaNormalizer, SeverityClassifier, StoreError, TradeStore, WhaleLog,
};
use serde::Serialize;
use std::path::Path;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Backfill,
    Update,
}

/// Summary printed after every run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub run_id: String,
    pub store: String,
    pub pages: u32,
    pub fetched: usize,
    pub skipped_malformed: usize,
    pub excluded_below_min: usize,
    pub bootstrapped: usize,
    #[serde(flatten)]
    pub stats: MaintenanceStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    pub truncated: bool,
    pub fetch_error: Option<String>,
    pub load_warning: Option<String>,
    pub saved: bool,
}

impl RunReport {
    fn new(mode: RunMode, store: String) -> Self {
        Self {
            mode,
            run_id: uuid::Uuid::new_v4().to_string(),
            store,
            pages: 0,
            fetched: 0,
            skipped_malformed: 0,
            excluded_below_min: 0,
            bootstrapped: 0,
            stats: MaintenanceStats::default(),
            termination: None,
            truncated: false,
            fetch_error: None,
            load_warning: None,
            saved: false,
        }
    }
}

/// Everything one run needs. Nothing here is global; the caller supplies the
/// feed, the store and the clock.
pub struct Pipeline<'a> {
    config: &'a WatchConfig,
    feed: &'a dyn TradeFeed,
    store: &'a dyn TradeStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a WatchConfig, feed: &'a dyn TradeFeed, store: &'a dyn TradeStore) -> Self {
        Self {
            config,
            feed,
            store,
        }
    }

    /// One-shot historical ingestion over the configured backfill window
    pub async fn backfill(&self, now: i64) -> Result<RunReport, StoreError> {
        let mut report = RunReport::new(RunMode::Backfill, self.store.describe());
        let span = info_span!("run", mode = "backfill", run_id = %report.run_id);

        async {
            let mut normalizer = SchemaNormalizer::new(self.config.feed.schema);
            let paginator = BackfillPaginator::new(
                self.config.page_size,
                self.config.max_iterations,
                self.config.page_delay(),
                self.config.min_usd_threshold,
            );

            let window_start = now - self.config.backfill_window_secs();
            let outcome = paginator
                .run(self.feed, &mut normalizer, window_start, now)
                .await;

            report.pages = outcome.pages;
            report.fetched = outcome.fetched;
            report.termination = Some(outcome.termination);

            self.finish(
                &mut report,
                &mut normalizer,
                outcome.trades,
                outcome.fetch_error,
                now,
            )?;
            Ok::<_, StoreError>(report)
        }
        .instrument(span)
        .await
    }

    /// Incremental poll over the configured trailing window
    pub async fn update(&self, now: i64) -> Result<RunReport, StoreError> {
        let mut report = RunReport::new(RunMode::Update, self.store.describe());
        let span = info_span!("run", mode = "update", run_id = %report.run_id);

        async {
            let mut normalizer = SchemaNormalizer::new(self.config.feed.schema);
            let poller = IncrementalPoller::new(
                self.config.poll_window_secs(),
                self.config.poll_page_size,
                self.config.min_usd_threshold,
            );

            let outcome = poller.poll(self.feed, &mut normalizer, now).await;

            report.pages = u32::from(outcome.fetch_error.is_none());
            report.fetched = outcome.fetched;
            report.truncated = outcome.truncated;

            self.finish(
                &mut report,
                &mut normalizer,
                outcome.trades,
                outcome.fetch_error,
                now,
            )?;
            Ok::<_, StoreError>(report)
        }
        .instrument(span)
        .await
    }

    /// Shared tail of both runs: merge whatever was fetched into the loaded
    /// store and persist it if anything changed.
    fn finish(
        &self,
        report: &mut RunReport,
        normalizer: &mut SchemaNormalizer,
        fetched: Vec<NormalizedTrade>,
        fetch_error: Option<FetchError>,
        now: i64,
    ) -> Result<(), StoreError> {
        let loaded = self.store.load();
        report.load_warning = loaded.warning.as_ref().map(|w| w.to_string());
        let existing = loaded.records;

        report.skipped_malformed = normalizer.skipped();

        if let Some(e) = &fetch_error {
            report.fetch_error = Some(e.to_string());
            if fetched.is_empty() {
                warn!(
                    "❌ Fetch from {} failed with nothing accumulated, leaving store untouched: {}",
                    self.feed.name(),
                    e
                );
                report.stats.final_size = existing.len();
                return Ok(());
            }
        }

        let classifier =
            SeverityClassifier::new(self.config.min_usd_threshold, &self.config.tiers);

        // Seed first so fetched records win on a shared id
        let mut batch: Vec<TradeRecord> = Vec::new();
        if existing.is_empty() {
            if let Some(path) = &self.config.store.bootstrap_path {
                let seeded =
                    classifier.classify_batch(normalizer.normalize_batch(&load_bootstrap(path)));
                report.bootstrapped = seeded.records.len();
                report.excluded_below_min += seeded.excluded;
                report.skipped_malformed = normalizer.skipped();
                batch.extend(seeded.records);
            }
        }

        let classified = classifier.classify_batch(fetched);
        report.excluded_below_min += classified.excluded;
        batch.extend(classified.records);

        let (records, stats) = WhaleLog::maintain(
            existing.clone(),
            batch,
            now,
            self.config.retention_secs(),
            self.config.max_store_size,
        );
        report.stats = stats;

        if records == existing && report.load_warning.is_none() {
            info!("✓ Store unchanged ({} trades), skipping save", records.len());
            return Ok(());
        }

        self.store.save(&records)?;
        report.saved = true;

        info!(
            "✅ {} +{} new, {} updated, {} pruned, {} capped -> {} trades",
            self.feed.name(),
            stats.inserted,
            stats.updated,
            stats.pruned,
            stats.capped,
            stats.final_size
        );
        Ok(())
    }
}

/// Raw seed records in the configured feed schema. Unreadable seeds are
/// logged and ignored.
fn load_bootstrap(path: &Path) -> Vec<RawTrade> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("⚠️ Bootstrap file {} unreadable: {}", path.display(), e);
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<RawTrade>>(&contents) {
        Ok(raws) => {
            info!("🌱 Seeding empty store from {} ({} records)", path.display(), raws.len());
            raws
        }
        Err(e) => {
            warn!("⚠️ Bootstrap file {} is not a JSON array of objects: {}", path.display(), e);
            Vec::new()
        }
    }
}
