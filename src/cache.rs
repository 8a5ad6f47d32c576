use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::Result;
use crate::types::ModuleSnapshot;

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Slot {
    snapshot: Option<Arc<ModuleSnapshot>>,
    refreshed_at: Option<Instant>,
}

impl Slot {
    fn is_fresh(&self, interval: Duration) -> bool {
        self.snapshot.is_some() && self.refreshed_at.is_some_and(|at| at.elapsed() < interval)
    }
}

/// Per-module snapshots, each behind its own refresh lock.
pub(crate) struct ModuleCache {
    interval: Duration,
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Slot>>>>,
}

impl ModuleCache {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, udid: &str) -> Arc<tokio::sync::Mutex<Slot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(udid.to_string()).or_default().clone()
    }

    /// Returns the cached snapshot for `udid`, running `fetch` first when
    /// the snapshot is missing or at least one interval old. Callers for
    /// the same module serialize on its lock, so only the first one
    /// fetches. Returns `(snapshot, refreshed)`.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        udid: &str,
        fetch: F,
    ) -> Result<(Arc<ModuleSnapshot>, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ModuleSnapshot>>,
    {
        let slot = self.slot(udid);
        let mut slot = slot.lock().await;

        if slot.is_fresh(self.interval)
            && let Some(snapshot) = &slot.snapshot
        {
            debug!(udid, "module cache hit");
            return Ok((snapshot.clone(), false));
        }

        debug!(udid, interval = ?self.interval, "refreshing module cache");
        let snapshot = Arc::new(fetch().await?);
        slot.snapshot = Some(snapshot.clone());
        slot.refreshed_at = Some(Instant::now());
        Ok((snapshot, true))
    }

    /// The last snapshot of `udid`, however old, without fetching.
    pub async fn cached(&self, udid: &str) -> Option<Arc<ModuleSnapshot>> {
        let slot = self.slot(udid);
        let slot = slot.lock().await;
        slot.snapshot.clone()
    }

    /// Forces the next read of `udid` to refetch. The previous snapshot
    /// stays in place until that refetch succeeds.
    pub async fn invalidate(&self, udid: &str) {
        let slot = self.slot(udid);
        slot.lock().await.refreshed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn empty_snapshot() -> ModuleSnapshot {
        ModuleSnapshot {
            zones: BTreeMap::new(),
            tiles: BTreeMap::new(),
            fetched_at: Utc::now(),
        }
    }

    async fn counted(cache: &ModuleCache, udid: &str, count: &AtomicUsize) -> Result<bool> {
        let (_, refreshed) = cache
            .get_or_refresh(udid, move || async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(empty_snapshot())
            })
            .await?;
        Ok(refreshed)
    }

    #[tokio::test]
    async fn fresh_snapshot_is_reused() {
        let cache = ModuleCache::new(DEFAULT_UPDATE_INTERVAL);
        let count = AtomicUsize::new(0);
        assert!(counted(&cache, "a", &count).await.unwrap());
        assert!(!counted(&cache, "a", &count).await.unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_interval_always_refetches() {
        let cache = ModuleCache::new(Duration::ZERO);
        let count = AtomicUsize::new(0);
        counted(&cache, "a", &count).await.unwrap();
        counted(&cache, "a", &count).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn modules_are_isolated() {
        let cache = ModuleCache::new(DEFAULT_UPDATE_INTERVAL);
        let count = AtomicUsize::new(0);
        counted(&cache, "a", &count).await.unwrap();
        counted(&cache, "b", &count).await.unwrap();
        counted(&cache, "a", &count).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_module_stale() {
        let cache = ModuleCache::new(DEFAULT_UPDATE_INTERVAL);
        let err = cache
            .get_or_refresh("a", || async {
                Err::<ModuleSnapshot, _>(Error::Protocol("boom".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        let count = AtomicUsize::new(0);
        assert!(counted(&cache, "a", &count).await.unwrap());
    }

    #[tokio::test]
    async fn cached_never_fetches() {
        let cache = ModuleCache::new(Duration::ZERO);
        assert!(cache.cached("a").await.is_none());

        let count = AtomicUsize::new(0);
        counted(&cache, "a", &count).await.unwrap();
        assert!(cache.cached("a").await.is_some());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = ModuleCache::new(DEFAULT_UPDATE_INTERVAL);
        let count = AtomicUsize::new(0);
        counted(&cache, "a", &count).await.unwrap();
        cache.invalidate("a").await;
        assert!(counted(&cache, "a", &count).await.unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
