/// Watch keys written with a ttl until they have all disappeared.
///
/// Seeding -> Polling -> AllExpired | Cancelled
///
use crate::client::CacheHandle;
use crate::error::CacheError;
use crate::model::Product;
use async_std::task;
use domain_keys::keys::RouteKey;
use log::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shared cancellation flag, checked once per poll boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorState {
    Seeding,
    Polling,
    AllExpired,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredKey {
    pub key: String,
    pub ttl: Duration,
}

/// emitted after every polling pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorProgress {
    pub elapsed: Duration,
    pub remaining: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorOutcome {
    pub state: MonitorState,
    pub elapsed: Duration,
    pub remaining: usize,
    pub expired: usize,
}

#[derive(Debug)]
pub struct ExpirationMonitor {
    state: MonitorState,
    tracked: Vec<MonitoredKey>,
    expired: usize,
}

impl ExpirationMonitor {
    /// Write one key per ttl (seconds).  The first failed write aborts the run.
    pub async fn seed(handle: &dyn CacheHandle, ttls: &[u64]) -> Result<ExpirationMonitor, CacheError> {
        let mut tracked = Vec::with_capacity(ttls.len());

        for ttl in ttls.iter() {
            let key = format!("exptest:{}s:{}", ttl, RouteKey::create());
            let product = Product::new(
                *ttl as i64,
                &format!("Expires in {}s", ttl),
                ttl.saturating_mul(10) as f64,
                "Expiration test",
            );

            let ttl = Duration::from_secs(*ttl);
            handle.add(&key, &product.to_json(), Some(ttl)).await?;
            info!("added '{}' with {:?} expiration", key, ttl);

            tracked.push(MonitoredKey { key, ttl });
        }

        Ok(ExpirationMonitor {
            state: MonitorState::Seeding,
            tracked,
            expired: 0,
        })
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn tracked(&self) -> &[MonitoredKey] {
        &self.tracked
    }

    /// Poll once per interval until every key is gone or the token is cancelled.
    pub async fn poll<P>(
        mut self,
        handle: &dyn CacheHandle,
        cancel: &CancelToken,
        mut on_progress: P,
    ) -> MonitorOutcome
    where
        P: FnMut(MonitorProgress),
    {
        self.state = MonitorState::Polling;
        let start = Instant::now();

        while !self.tracked.is_empty() {
            if cancel.is_cancelled() {
                self.state = MonitorState::Cancelled;
                break;
            }

            task::sleep(POLL_INTERVAL).await;
            if cancel.is_cancelled() {
                self.state = MonitorState::Cancelled;
                break;
            }

            self.pass(handle).await;
            on_progress(MonitorProgress {
                elapsed: start.elapsed(),
                remaining: self.tracked.len(),
                expired: self.expired,
            });
        }

        if self.tracked.is_empty() {
            self.state = MonitorState::AllExpired;
        }

        let outcome = MonitorOutcome {
            state: self.state,
            elapsed: start.elapsed(),
            remaining: self.tracked.len(),
            expired: self.expired,
        };
        info!("expiration monitor finished: {:?}", outcome);

        outcome
    }

    // one read per tracked key; absent keys stop being tracked
    async fn pass(&mut self, handle: &dyn CacheHandle) {
        let mut still_present = Vec::with_capacity(self.tracked.len());

        for entry in self.tracked.drain(..) {
            match handle.get(&entry.key).await {
                Ok(None) => {
                    debug!("'{}' expired ({:?} ttl)", entry.key, entry.ttl);
                    self.expired += 1;
                }
                Ok(Some(_)) => still_present.push(entry),
                Err(e) => {
                    warn!("poll of '{}' failed, still tracking: {}", entry.key, e);
                    still_present.push(entry);
                }
            }
        }

        self.tracked = still_present;
    }

    /// seed then poll
    pub async fn run<P>(
        handle: &dyn CacheHandle,
        ttls: &[u64],
        cancel: &CancelToken,
        on_progress: P,
    ) -> Result<MonitorOutcome, CacheError>
    where
        P: FnMut(MonitorProgress),
    {
        let monitor = ExpirationMonitor::seed(handle, ttls).await?;
        Ok(monitor.poll(handle, cancel, on_progress).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCache;

    #[test]
    fn seeding_writes_one_key_per_ttl() {
        task::block_on(async move {
            let cache = MockCache::new();
            let monitor = ExpirationMonitor::seed(&cache, &[3, 5, 10])
                .await
                .expect("seeding should work");

            assert_eq!(monitor.state(), MonitorState::Seeding);
            let tracked = monitor.tracked();
            assert_eq!(tracked.len(), 3);
            assert!(tracked[0].key.starts_with("exptest:3s:"));
            assert_eq!(tracked[2].ttl, Duration::from_secs(10));
            assert_eq!(cache.len(), 3);
        });
    }

    #[test]
    fn seeding_failure_aborts() {
        task::block_on(async move {
            let cache = MockCache::failing_every(2);
            let result = ExpirationMonitor::seed(&cache, &[1, 2, 3]).await;
            assert!(matches!(result, Err(CacheError::Fault(_))));
            assert_eq!(cache.calls().len(), 2);
        });
    }

    #[test]
    fn cancelled_before_first_pass() {
        task::block_on(async move {
            let cache = MockCache::new();
            let cancel = CancelToken::new();
            cancel.cancel();

            let mut passes = 0;
            let outcome = ExpirationMonitor::run(&cache, &[60], &cancel, |_| passes += 1)
                .await
                .expect("seeding should work");

            assert_eq!(outcome.state, MonitorState::Cancelled);
            assert_eq!(outcome.remaining, 1);
            assert_eq!(outcome.expired, 0);
            assert_eq!(passes, 0);
        });
    }

    #[test]
    fn keys_removed_by_others_count_as_expired() {
        task::block_on(async move {
            let cache = MockCache::new();
            let monitor = ExpirationMonitor::seed(&cache, &[30, 30])
                .await
                .expect("seeding should work");

            for entry in monitor.tracked().to_vec() {
                cache.remove(&entry.key).await.unwrap();
            }

            let mut progress = vec![];
            let outcome = monitor
                .poll(&cache, &CancelToken::new(), |p| progress.push(p))
                .await;

            assert_eq!(outcome.state, MonitorState::AllExpired);
            assert_eq!(outcome.remaining, 0);
            assert_eq!(outcome.expired, 2);
            assert_eq!(progress.len(), 1);
            assert!(progress[0].elapsed >= POLL_INTERVAL);
        });
    }

    #[test]
    fn empty_ttl_list() {
        task::block_on(async move {
            let cache = MockCache::new();
            let outcome = ExpirationMonitor::run(&cache, &[], &CancelToken::new(), |_| ())
                .await
                .unwrap();
            assert_eq!(outcome.state, MonitorState::AllExpired);
            assert!(outcome.elapsed < POLL_INTERVAL);
        });
    }
}
