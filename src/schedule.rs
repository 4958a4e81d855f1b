//! Periodic aggregation runs
//!
//! Runs the aggregator on a fixed interval in a background task and reports
//! each run's outcome over a tokio channel. Runs never overlap: a slow run
//! delays the next tick instead of starting a second run.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::aggregate::{Aggregation, Aggregator};

/// Messages sent from the background runner
#[derive(Debug, Clone)]
pub enum RunMessage {
    /// A run is starting
    Started,
    /// A run finished with these records
    Completed(Aggregation),
    /// A run failed wholesale; the previous output stays current
    Failed(String),
}

/// Configuration for periodic runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Time between run starts
    pub interval: Duration,
    /// Records requested per run
    pub max_records: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300), // 5 minutes
            max_records: 20,
        }
    }
}

/// Handle for the background runner
pub struct RunHandle {
    /// Channel for receiving run messages
    pub receiver: mpsc::Receiver<RunMessage>,
    /// Signals shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl RunHandle {
    /// Spawns the runner; the first run starts immediately
    ///
    /// # Arguments
    /// * `aggregator` - The pipeline to run
    /// * `config` - Interval and record count
    pub fn spawn(aggregator: Aggregator, config: ScheduleConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if msg_tx.send(RunMessage::Started).await.is_err() {
                            break;
                        }

                        let result = aggregator.aggregate_with_report(config.max_records).await;
                        let message = match result {
                            Ok(aggregation) => RunMessage::Completed(aggregation),
                            Err(e) => {
                                warn!(error = %e, "scheduled run failed, keeping previous output");
                                RunMessage::Failed(e.to_string())
                            }
                        };

                        if msg_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("scheduled runner shutting down");
                        break;
                    }
                }
            }
        });

        Self {
            receiver: msg_rx,
            shutdown_tx,
        }
    }

    /// Waits for the next message; `None` once the runner has stopped
    pub async fn recv(&mut self) -> Option<RunMessage> {
        self.receiver.recv().await
    }

    /// Shuts down the background runner
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Checks for a pending run message without blocking
pub fn try_recv(handle: &mut RunHandle) -> Option<RunMessage> {
    handle.receiver.try_recv().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheManager, MemoryStore};
    use crate::data::{ListingDetail, ListingSummary, Timestamp};
    use crate::upstream::{ListingSource, UpstreamError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        fail: bool,
        listing_calls: AtomicUsize,
    }

    #[async_trait]
    impl ListingSource for CountingSource {
        async fn fetch_listings(
            &self,
            _page: u32,
            _limit: u32,
        ) -> Result<Vec<ListingSummary>, UpstreamError> {
            self.listing_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(UpstreamError::Validation("broken".to_string()));
            }
            Ok(vec![ListingSummary {
                id: Some("a".to_string()),
                title: Some("Engineer".to_string()),
                employer_name: Some("Acme".to_string()),
                created_at: Some(Timestamp::Millis(1)),
                ..Default::default()
            }])
        }

        async fn fetch_detail(&self, _id: &str) -> Result<ListingDetail, UpstreamError> {
            Ok(ListingDetail::default())
        }
    }

    fn aggregator(source: Arc<CountingSource>) -> Aggregator {
        let cache = CacheManager::new(Arc::new(MemoryStore::new()), "test");
        Aggregator::new(cache, source)
    }

    #[test]
    fn test_schedule_config_default() {
        let config = ScheduleConfig::default();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.max_records, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_and_on_interval() {
        let source = Arc::new(CountingSource {
            fail: false,
            listing_calls: AtomicUsize::new(0),
        });
        let mut handle = RunHandle::spawn(
            aggregator(source.clone()),
            ScheduleConfig {
                interval: Duration::from_secs(60),
                max_records: 1,
            },
        );

        for _ in 0..2 {
            assert!(matches!(handle.recv().await, Some(RunMessage::Started)));
            match handle.recv().await {
                Some(RunMessage::Completed(aggregation)) => {
                    assert_eq!(aggregation.records.len(), 1);
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }

        // Second run is served from the cache
        assert_eq!(source.listing_calls.load(Ordering::SeqCst), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_is_reported() {
        let source = Arc::new(CountingSource {
            fail: true,
            listing_calls: AtomicUsize::new(0),
        });
        let mut handle = RunHandle::spawn(aggregator(source), ScheduleConfig::default());

        assert!(matches!(handle.recv().await, Some(RunMessage::Started)));
        match handle.recv().await {
            Some(RunMessage::Failed(message)) => assert!(message.contains("broken")),
            other => panic!("unexpected message: {:?}", other),
        }
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_try_recv_is_empty_before_first_run() {
        let source = Arc::new(CountingSource {
            fail: false,
            listing_calls: AtomicUsize::new(0),
        });
        let mut handle = RunHandle::spawn(aggregator(source), ScheduleConfig::default());

        // The runner task has not been polled yet on this single-threaded runtime
        assert!(try_recv(&mut handle).is_none());
        handle.shutdown().await;
    }
}
