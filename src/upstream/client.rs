//! HTTP client for the listings API
//!
//! Every call is a single timeout-bounded GET wrapped in a classified retry
//! loop: transient failures back off exponentially, permanent ones fail fast.

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::batch::{run_in_windows, BatchOptions, BatchOutcome};
use super::envelope;
use super::error::UpstreamError;
use crate::data::{ListingDetail, ListingSummary};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry and timeout settings for upstream calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry
    pub base_delay: Duration,
    /// Bound on a single request, including reading the body
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base_delay * 2^attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Client for the paginated listings API
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
    batch: BatchOptions,
}

impl UpstreamClient {
    /// Create a client for `base_url` with default retry and batch settings
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a client with a custom HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http: client,
            base_url: base_url.into(),
            retry: RetryPolicy::default(),
            batch: BatchOptions::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch_options(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fetch one page of listing summaries
    ///
    /// # Arguments
    /// * `page` - 1-based page number
    /// * `limit` - Page size requested from the upstream
    pub async fn fetch_listings(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<ListingSummary>, UpstreamError> {
        let url = self.endpoint(&["listings"])?;
        let query = [("page", page.to_string()), ("limit", limit.to_string())];

        let listings: Vec<ListingSummary> = self
            .fetch_with_retry("fetch_listings", || self.get_json(url.clone(), &query))
            .await?;

        debug!(page, limit, count = listings.len(), "fetched listings page");
        Ok(listings)
    }

    /// Fetch the detail for a single listing
    pub async fn fetch_detail(&self, id: &str) -> Result<ListingDetail, UpstreamError> {
        let url = self.endpoint(&["listings", id])?;
        self.fetch_with_retry("fetch_detail", || self.get_json(url.clone(), &[]))
            .await
    }

    /// Runs `call` until it succeeds, fails permanently, or the retry budget is spent
    ///
    /// Retryable errors (timeouts, network errors, 5xx, 429) wait
    /// `base_delay * 2^attempt` before the next attempt. Other errors are
    /// returned immediately. Exhausting the budget returns
    /// `UpstreamError::RetriesExhausted` carrying the last error.
    pub async fn fetch_with_retry<T, F, Fut>(
        &self,
        operation: &str,
        mut call: F,
    ) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    debug!(operation, error = %e, "upstream call failed permanently");
                    return Err(e);
                }
                Err(e) if attempt >= self.retry.max_retries => {
                    warn!(
                        operation,
                        attempts = attempt + 1,
                        error = %e,
                        "upstream retries exhausted"
                    );
                    return Err(UpstreamError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.retry.backoff_delay(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying upstream call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Fetch details for many ids with the configured window size
    pub async fn batch_fetch_details(&self, ids: &[String]) -> BatchOutcome<ListingDetail> {
        self.batch_fetch_details_with_concurrency(ids, self.batch.concurrency)
            .await
    }

    /// Fetch details in sequential windows of `concurrency` ids
    ///
    /// Failures are collected per id; the batch itself never fails.
    pub async fn batch_fetch_details_with_concurrency(
        &self,
        ids: &[String],
        concurrency: usize,
    ) -> BatchOutcome<ListingDetail> {
        let results = run_in_windows(ids, concurrency, self.batch.window_delay, |id| {
            let id = id.clone();
            async move {
                let result = self.fetch_detail(&id).await;
                (id, result)
            }
        })
        .await;

        let mut outcome = BatchOutcome {
            successes: Vec::with_capacity(results.len()),
            failures: Vec::new(),
        };
        for (id, result) in results {
            match result {
                Ok(detail) => outcome.successes.push((id, detail)),
                Err(e) => {
                    warn!(id = %id, error = %e, "detail fetch failed");
                    outcome.failures.push((id, e));
                }
            }
        }

        debug!(
            requested = ids.len(),
            succeeded = outcome.successes.len(),
            failed = outcome.failures.len(),
            "batch detail fetch finished"
        );
        outcome
    }

    /// Fetch up to `max_pages` pages of `per_page` listings
    ///
    /// Stops at the first short page (the last page) or the first failing
    /// page, returning what was gathered so far.
    pub async fn fetch_multiple_pages(&self, max_pages: u32, per_page: u32) -> Vec<ListingSummary> {
        let mut all = Vec::new();

        for page in 1..=max_pages {
            match self.fetch_listings(page, per_page).await {
                Ok(listings) => {
                    let short_page = listings.len() < per_page as usize;
                    all.extend(listings);
                    if short_page {
                        break;
                    }
                }
                Err(e) => {
                    warn!(page, error = %e, "stopping multi-page fetch");
                    break;
                }
            }
        }

        all
    }

    /// Builds `{base_url}/{segments...}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            UpstreamError::Validation(format!("invalid base url {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                UpstreamError::Validation(format!("base url {} cannot have a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// One GET attempt bounded by the request timeout
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let timeout = self.retry.request_timeout;
        let request = self.http.get(url).query(query);

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(exchange)) => exchange,
            Ok(Err(e)) if e.is_timeout() => return Err(UpstreamError::Timeout(timeout)),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(UpstreamError::Timeout(timeout)),
        };

        if status.is_success() {
            envelope::decode(&body)
        } else {
            Err(envelope::status_error(status.as_u16(), &body))
        }
    }
}
