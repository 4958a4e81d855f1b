//! Listing aggregation pipeline
//!
//! Turns one page of the upstream catalog into enriched records:
//! listings (cached) → per-id detail enrichment in paced batches (cached) →
//! drop incomplete records → newest first. Each stage finishes before the
//! next starts. Only a listings failure fails the run; a failed detail
//! degrades its record instead of removing it.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{kinds, CacheManager};
use crate::data::{EnrichedRecord, ListingSummary};
use crate::upstream::{run_in_windows, ListingSource, UpstreamError};

/// Batch pacing for detail enrichment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Records enriched concurrently per batch
    pub batch_size: usize,
    /// Pause between enrichment batches
    pub batch_delay: Duration,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_millis(200),
        }
    }
}

/// Errors that fail a whole aggregation run
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The listings page could not be obtained, so there is nothing to enrich
    #[error("failed to fetch listings: {0}")]
    Listings(#[from] UpstreamError),
}

/// Where a record's detail came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailSource {
    CacheHit,
    Upstream,
    Failed,
}

/// Counters for one aggregation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    /// Summaries considered for enrichment
    pub fetched: usize,
    /// Details served from the cache
    pub cache_hits: usize,
    /// Details fetched from the upstream
    pub upstream_fetches: usize,
    /// Records that kept their detail
    pub enriched: usize,
    /// Records whose detail could not be obtained
    pub degraded: usize,
    /// Records removed for missing mandatory fields
    pub dropped: usize,
}

/// Records from one run together with its counters
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub records: Vec<EnrichedRecord>,
    pub report: AggregateReport,
}

/// Orchestrates cache and upstream into a sorted list of enriched records
#[derive(Clone)]
pub struct Aggregator {
    cache: CacheManager,
    source: Arc<dyn ListingSource>,
    options: AggregateOptions,
}

impl Aggregator {
    pub fn new(cache: CacheManager, source: Arc<dyn ListingSource>) -> Self {
        Self {
            cache,
            source,
            options: AggregateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Produces at most `max_records` complete records, newest first
    ///
    /// # Errors
    /// Returns `AggregateError::Listings` only when the listings page cannot
    /// be fetched after the client's retries.
    pub async fn aggregate(
        &self,
        max_records: usize,
    ) -> Result<Vec<EnrichedRecord>, AggregateError> {
        Ok(self.aggregate_with_report(max_records).await?.records)
    }

    /// Same as `aggregate`, also returning per-run counters
    pub async fn aggregate_with_report(
        &self,
        max_records: usize,
    ) -> Result<Aggregation, AggregateError> {
        if max_records == 0 {
            return Ok(Aggregation {
                records: Vec::new(),
                report: AggregateReport::default(),
            });
        }

        let mut summaries = self.fetch_listings(max_records).await?;
        summaries.truncate(max_records);

        let mut report = AggregateReport {
            fetched: summaries.len(),
            ..Default::default()
        };

        let enriched = run_in_windows(
            &summaries,
            self.options.batch_size,
            self.options.batch_delay,
            |summary| self.enrich(summary.clone()),
        )
        .await;

        let mut records = Vec::with_capacity(enriched.len());
        for (record, source) in enriched {
            match source {
                DetailSource::CacheHit => report.cache_hits += 1,
                DetailSource::Upstream => report.upstream_fetches += 1,
                DetailSource::Failed => {}
            }
            if record.degraded {
                report.degraded += 1;
            } else {
                report.enriched += 1;
            }
            records.push(record);
        }

        let (records, dropped) = filter_and_sort(records);
        report.dropped = dropped;

        info!(
            max_records,
            fetched = report.fetched,
            enriched = report.enriched,
            degraded = report.degraded,
            dropped = report.dropped,
            cache_hits = report.cache_hits,
            "aggregation finished"
        );

        Ok(Aggregation { records, report })
    }

    async fn fetch_listings(
        &self,
        max_records: usize,
    ) -> Result<Vec<ListingSummary>, UpstreamError> {
        let limit = u32::try_from(max_records).unwrap_or(u32::MAX);
        let key = format!("listings:{}", max_records);

        self.cache
            .get_or_set(&key, kinds::LISTINGS, || self.source.fetch_listings(1, limit))
            .await
            .inspect_err(|e| warn!(max_records, error = %e, "listings unavailable"))
    }

    async fn enrich(&self, summary: ListingSummary) -> (EnrichedRecord, DetailSource) {
        let Some(id) = summary.id.clone().filter(|id| !id.trim().is_empty()) else {
            debug!("listing has no id, skipping detail fetch");
            return (EnrichedRecord::degraded(summary), DetailSource::Failed);
        };

        let key = format!("detail:{}", id);
        let mut from_upstream = false;
        let result = self
            .cache
            .get_or_set(&key, kinds::DETAILS, || {
                from_upstream = true;
                self.source.fetch_detail(&id)
            })
            .await;

        match result {
            Ok(detail) => {
                let source = if from_upstream {
                    DetailSource::Upstream
                } else {
                    DetailSource::CacheHit
                };
                (EnrichedRecord::enriched(summary, detail), source)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "detail enrichment failed, degrading record");
                (EnrichedRecord::degraded(summary), DetailSource::Failed)
            }
        }
    }
}

/// Drops incomplete records and orders the rest newest first
///
/// The sort is stable, so records with equal timestamps keep their order.
/// Returns the kept records and the number dropped.
pub fn filter_and_sort(records: Vec<EnrichedRecord>) -> (Vec<EnrichedRecord>, usize) {
    let total = records.len();
    let mut kept: Vec<EnrichedRecord> = records
        .into_iter()
        .filter(|record| {
            let complete = record.is_complete();
            if !complete {
                debug!(id = ?record.id(), "dropping incomplete record");
            }
            complete
        })
        .collect();

    kept.sort_by_key(|record| std::cmp::Reverse(record.timestamp_millis().unwrap_or(i64::MIN)));

    let dropped = total - kept.len();
    (kept, dropped)
}
