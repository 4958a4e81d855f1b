//! Upstream listings API access
//!
//! `UpstreamClient` talks to the REST API with timeouts, classified retries
//! and windowed batch fetches. The aggregator depends on the `ListingSource`
//! trait rather than the client so the pipeline can run against any source.

mod batch;
mod client;
mod envelope;
mod error;

pub use batch::{run_in_windows, BatchOptions, BatchOutcome};
pub use client::{RetryPolicy, UpstreamClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::UpstreamError;

use async_trait::async_trait;

use crate::data::{ListingDetail, ListingSummary};

/// Where listing summaries and details come from
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// One page of summaries
    async fn fetch_listings(&self, page: u32, limit: u32)
        -> Result<Vec<ListingSummary>, UpstreamError>;

    /// The detail for one listing
    async fn fetch_detail(&self, id: &str) -> Result<ListingDetail, UpstreamError>;
}

#[async_trait]
impl ListingSource for UpstreamClient {
    async fn fetch_listings(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<ListingSummary>, UpstreamError> {
        UpstreamClient::fetch_listings(self, page, limit).await
    }

    async fn fetch_detail(&self, id: &str) -> Result<ListingDetail, UpstreamError> {
        UpstreamClient::fetch_detail(self, id).await
    }
}
