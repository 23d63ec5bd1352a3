//! Bounded object pool for inert layout templates.
//!
//! Unlike player handles, templates are plain data: no TTL, no liveness
//! probing, no owner confinement. Each template id gets a FIFO pool with a
//! fixed capacity and oldest-displaced semantics, used purely to avoid
//! inflate cost on hot paths.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::config::defaults;

/// Hard ceiling on any single template pool.
pub const MAX_POOL_SIZE: usize = 10;

/// Identifier of a layout template (resource id in the embedding app).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateId(pub u32);

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template#{}", self.0)
    }
}

struct PoolInner<T> {
    pools: HashMap<TemplateId, VecDeque<T>>,
    capacities: HashMap<TemplateId, usize>,
}

/// Per-template bounded FIFO pools.
pub struct TemplatePool<T> {
    inner: Mutex<PoolInner<T>>,
}

impl<T> Default for TemplatePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TemplatePool<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                pools: HashMap::new(),
                capacities: HashMap::new(),
            }),
        }
    }

    /// Register the preload capacity for a template, clamped to
    /// [`MAX_POOL_SIZE`].
    pub fn register(&self, id: TemplateId, capacity: usize) {
        let mut inner = self.inner.lock();
        inner.capacities.insert(id, capacity.min(MAX_POOL_SIZE));
    }

    fn capacity_of(inner: &PoolInner<T>, id: TemplateId) -> usize {
        inner.capacities.get(&id).copied().unwrap_or(MAX_POOL_SIZE)
    }

    /// Fill the pool for `id` with up to `count` freshly built templates,
    /// never exceeding its capacity.
    pub fn preload_with(&self, id: TemplateId, count: usize, mut build: impl FnMut() -> T) {
        let mut inner = self.inner.lock();
        let capacity = Self::capacity_of(&inner, id);
        let pool = inner.pools.entry(id).or_default();
        let need = count.min(capacity.saturating_sub(pool.len()));
        for _ in 0..need {
            pool.push_back(build());
        }
        if need > 0 {
            trace!(%id, built = need, "templates preloaded");
        }
    }

    /// Pop the oldest pooled template, if any.
    pub fn acquire(&self, id: TemplateId) -> Option<T> {
        self.inner.lock().pools.get_mut(&id)?.pop_front()
    }

    /// Return a template to its pool. When the pool is at capacity the
    /// oldest occupant is displaced and dropped.
    pub fn release(&self, id: TemplateId, template: T) {
        let mut inner = self.inner.lock();
        let capacity = Self::capacity_of(&inner, id);
        let pool = inner.pools.entry(id).or_default();
        if pool.len() >= capacity {
            pool.pop_front();
            trace!(%id, "template pool full, displaced oldest");
        }
        pool.push_back(template);
    }

    /// Number of templates pooled for `id`.
    pub fn pool_size(&self, id: TemplateId) -> usize {
        self.inner
            .lock()
            .pools
            .get(&id)
            .map_or(0, VecDeque::len)
    }

    /// Drop every template pooled for `id`.
    pub fn clear(&self, id: TemplateId) {
        self.inner.lock().pools.remove(&id);
    }

    /// Drop all pooled templates; registrations are kept.
    pub fn clear_all(&self) {
        self.inner.lock().pools.clear();
    }

    /// Preload every registered template in small batches, yielding between
    /// batches so the caller's executor is never blocked for long.
    pub async fn preload_registered_in_batches(&self, mut build: impl FnMut(TemplateId) -> T) {
        self.preload_registered_with_pacing(
            defaults::TEMPLATE_BATCH_SIZE,
            defaults::TEMPLATE_BATCH_INTERVAL,
            &mut build,
        )
        .await;
    }

    /// Batched preload with explicit pacing.
    pub async fn preload_registered_with_pacing(
        &self,
        batch_size: usize,
        interval: Duration,
        build: &mut impl FnMut(TemplateId) -> T,
    ) {
        let plan: Vec<(TemplateId, usize)> = {
            let inner = self.inner.lock();
            inner
                .capacities
                .iter()
                .map(|(id, capacity)| (*id, *capacity))
                .collect()
        };
        let batch_size = batch_size.max(1);

        for (id, want) in plan {
            let mut remaining = want.saturating_sub(self.pool_size(id));
            while remaining > 0 {
                let n = remaining.min(batch_size);
                self.preload_with(id, n, || build(id));
                remaining -= n;
                tokio::time::sleep(interval).await;
            }
        }
    }
}

impl<T> fmt::Debug for TemplatePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let total: usize = inner.pools.values().map(VecDeque::len).sum();
        f.debug_struct("TemplatePool")
            .field("templates", &inner.pools.len())
            .field("pooled", &total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMENT_ITEM: TemplateId = TemplateId(1);
    const ROOM_ITEM: TemplateId = TemplateId(2);

    #[test]
    fn preload_fills_up_to_capacity() {
        let pool: TemplatePool<String> = TemplatePool::new();
        pool.register(COMMENT_ITEM, 5);
        pool.preload_with(COMMENT_ITEM, 8, || "comment".to_string());
        assert_eq!(pool.pool_size(COMMENT_ITEM), 5);
    }

    #[test]
    fn acquire_is_fifo_and_drains() {
        let pool: TemplatePool<u32> = TemplatePool::new();
        pool.register(ROOM_ITEM, 3);
        let mut n = 0;
        pool.preload_with(ROOM_ITEM, 3, || {
            n += 1;
            n
        });

        assert_eq!(pool.acquire(ROOM_ITEM), Some(1));
        assert_eq!(pool.acquire(ROOM_ITEM), Some(2));
        assert_eq!(pool.acquire(ROOM_ITEM), Some(3));
        assert_eq!(pool.acquire(ROOM_ITEM), None);
    }

    #[test]
    fn release_displaces_oldest_at_capacity() {
        let pool: TemplatePool<u32> = TemplatePool::new();
        pool.register(ROOM_ITEM, 2);
        pool.release(ROOM_ITEM, 1);
        pool.release(ROOM_ITEM, 2);
        pool.release(ROOM_ITEM, 3);

        assert_eq!(pool.pool_size(ROOM_ITEM), 2);
        assert_eq!(pool.acquire(ROOM_ITEM), Some(2));
        assert_eq!(pool.acquire(ROOM_ITEM), Some(3));
    }

    #[test]
    fn unregistered_template_uses_ceiling() {
        let pool: TemplatePool<u8> = TemplatePool::new();
        for i in 0..20 {
            pool.release(TemplateId(9), i);
        }
        assert_eq!(pool.pool_size(TemplateId(9)), MAX_POOL_SIZE);
    }

    #[test]
    fn clear_and_clear_all() {
        let pool: TemplatePool<u8> = TemplatePool::new();
        pool.register(COMMENT_ITEM, 2);
        pool.register(ROOM_ITEM, 2);
        pool.preload_with(COMMENT_ITEM, 2, || 0);
        pool.preload_with(ROOM_ITEM, 2, || 0);

        pool.clear(COMMENT_ITEM);
        assert_eq!(pool.pool_size(COMMENT_ITEM), 0);
        assert_eq!(pool.pool_size(ROOM_ITEM), 2);

        pool.clear_all();
        assert_eq!(pool.pool_size(ROOM_ITEM), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn batched_preload_fills_registered_pools() {
        let pool: TemplatePool<&'static str> = TemplatePool::new();
        pool.register(COMMENT_ITEM, 5);
        pool.register(ROOM_ITEM, 10);

        pool.preload_registered_in_batches(|_| "view").await;

        assert_eq!(pool.pool_size(COMMENT_ITEM), 5);
        assert_eq!(pool.pool_size(ROOM_ITEM), 10);
    }
}
