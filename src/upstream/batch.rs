//! Bounded fan-out in sequential windows
//!
//! Items are processed `window` at a time: every call in a window runs
//! concurrently, the whole window is awaited, then an optional pause separates
//! it from the next. This caps in-flight upstream calls at the window size.

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;

use super::error::UpstreamError;

/// Window size and pacing for batch fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum concurrent requests per window
    pub concurrency: usize,
    /// Pause between windows
    pub window_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            window_delay: Duration::from_millis(100),
        }
    }
}

/// Per-id results of a batch fetch
///
/// Partial failure never fails the batch; failed ids are listed with their errors.
#[derive(Debug, Default)]
pub struct BatchOutcome<T> {
    pub successes: Vec<(String, T)>,
    pub failures: Vec<(String, UpstreamError)>,
}

impl<T> BatchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|(id, _)| id.as_str()).collect()
    }
}

/// Runs `op` over `items` in sequential windows of at most `window` items
///
/// Results come back in input order. A `window` of zero is treated as one.
pub async fn run_in_windows<I, T, F, Fut>(
    items: &[I],
    window: usize,
    delay: Duration,
    mut op: F,
) -> Vec<T>
where
    F: FnMut(&I) -> Fut,
    Fut: Future<Output = T>,
{
    let window = window.max(1);
    let window_count = items.len().div_ceil(window);
    let mut results = Vec::with_capacity(items.len());

    for (index, chunk) in items.chunks(window).enumerate() {
        results.extend(join_all(chunk.iter().map(&mut op)).await);

        if index + 1 < window_count && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_windows_bound_concurrency_and_keep_order() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = (1..=10).collect();

        let results = run_in_windows(&items, 3, Duration::ZERO, |item| {
            let item = *item;
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                item * 2
            }
        })
        .await;

        assert_eq!(results, (1..=10).map(|i| i * 2).collect::<Vec<_>>());
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_windows() {
        let items = vec![1, 2, 3, 4, 5];
        let start = Instant::now();

        run_in_windows(&items, 2, Duration::from_millis(100), |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        })
        .await;

        // 3 windows of 10ms plus 2 pauses of 100ms
        assert_eq!(start.elapsed(), Duration::from_millis(230));
    }

    #[tokio::test]
    async fn test_empty_input_and_zero_window() {
        let empty: Vec<u8> = Vec::new();
        let out = run_in_windows(&empty, 0, Duration::from_millis(50), |i| {
            let i = *i;
            async move { i }
        })
        .await;
        assert!(out.is_empty());

        let out = run_in_windows(&[7u8, 8], 0, Duration::ZERO, |i| {
            let i = *i;
            async move { i }
        })
        .await;
        assert_eq!(out, vec![7, 8]);
    }

    #[test]
    fn test_outcome_reports_failures() {
        let outcome: BatchOutcome<u8> = BatchOutcome {
            successes: vec![("a".to_string(), 1)],
            failures: vec![(
                "b".to_string(),
                UpstreamError::Validation("bad".to_string()),
            )],
        };

        assert!(!outcome.is_complete());
        assert_eq!(outcome.failed_ids(), vec!["b"]);
    }
}
