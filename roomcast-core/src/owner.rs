//! The owner scheduler: a single serialized execution context for every
//! operation that touches a player handle.
//!
//! The external player resource is not safe for concurrent access, so one
//! long-lived task owns the factory, the TTL cache, the reuse slot, and the
//! preload ledger. Everything else posts FIFO jobs onto its queue; queries
//! await a oneshot reply. Background work (metadata fetches, sweep timers)
//! holds only weak senders, so dropping the service handle is enough to end
//! the loop and tear everything down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use dashmap::DashMap;
use roomcast_model::{Host, RoomId, RoomSnapshot};
use tokio::sync::mpsc::{self, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::RoomcastConfig;
use crate::error::{Result, RoomcastError};
use crate::factory::PlayerFactory;
use crate::handle::{HandleId, PlayerHandle};
use crate::preload::PreloadTask;
use crate::reuse_pool::ReuseSlot;
use crate::service::{Acquired, Release};
use crate::ttl_cache::{KeyedTtlCache, TakeOutcome, TtlEntry};

pub(crate) type OwnerJob<F> = Box<dyn FnOnce(&mut OwnerState<F>) + Send>;

/// Strong sender onto the owner queue. Held by the service facade; dropping
/// the last strong sender ends the owner loop.
pub(crate) struct OwnerHandle<F: PlayerFactory> {
    tx: UnboundedSender<OwnerJob<F>>,
}

impl<F: PlayerFactory> Clone for OwnerHandle<F> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<F: PlayerFactory> OwnerHandle<F> {
    /// Fire-and-forget job. Returns false when the owner loop has ended.
    pub fn post(&self, job: impl FnOnce(&mut OwnerState<F>) + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }

    /// Post a job and await its result on a oneshot channel.
    pub async fn call<R, J>(&self, job: J) -> Result<R>
    where
        R: Send + 'static,
        J: FnOnce(&mut OwnerState<F>) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let posted = self.post(move |state| {
            let _ = reply_tx.send(job(state));
        });
        if !posted {
            return Err(RoomcastError::SchedulerGone);
        }
        reply_rx.await.map_err(|_| RoomcastError::SchedulerGone)
    }

    pub fn downgrade(&self) -> WeakOwnerHandle<F> {
        WeakOwnerHandle {
            tx: self.tx.downgrade(),
        }
    }
}

impl<F: PlayerFactory> std::fmt::Debug for OwnerHandle<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerHandle").finish_non_exhaustive()
    }
}

/// Weak sender used by sweep timers and preload drivers so background work
/// never keeps the owner loop alive on its own.
pub(crate) struct WeakOwnerHandle<F: PlayerFactory> {
    tx: WeakUnboundedSender<OwnerJob<F>>,
}

impl<F: PlayerFactory> Clone for WeakOwnerHandle<F> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<F: PlayerFactory> WeakOwnerHandle<F> {
    pub fn upgrade(&self) -> Option<OwnerHandle<F>> {
        self.tx.upgrade().map(|tx| OwnerHandle { tx })
    }
}

/// Everything the owner task is allowed to mutate.
pub(crate) struct OwnerState<F: PlayerFactory> {
    pub factory: F,
    pub cache: KeyedTtlCache<F::Handle>,
    pub reuse: ReuseSlot<F::Handle>,
    /// Warmed handles awaiting a consumer claim, keyed by room.
    pub warm: HashMap<RoomId, PlayerHandle<F::Handle>>,
    /// Non-terminal preload tasks (dedup map). Terminal tasks are removed.
    pub tasks: HashMap<RoomId, PreloadTask>,
    /// Entity metadata warmed for the working set; shared read-only with the
    /// service facade (plain data, not handles).
    pub room_info: Arc<DashMap<RoomId, Host>>,
    pub config: Arc<RoomcastConfig>,
    pub weak: WeakOwnerHandle<F>,
    pub shutting_down: bool,
}

/// Spawn the owner loop.
pub(crate) fn spawn<F: PlayerFactory>(
    factory: F,
    config: Arc<RoomcastConfig>,
    room_info: Arc<DashMap<RoomId, Host>>,
) -> (OwnerHandle<F>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OwnerJob<F>>();
    let handle = OwnerHandle { tx };
    let weak = handle.downgrade();

    let join = tokio::spawn(async move {
        let mut state = OwnerState {
            factory,
            cache: KeyedTtlCache::new(),
            reuse: ReuseSlot::new(),
            warm: HashMap::new(),
            tasks: HashMap::new(),
            room_info,
            config,
            weak,
            shutting_down: false,
        };
        while let Some(job) = rx.recv().await {
            job(&mut state);
        }
        // All strong senders gone: the service was shut down or dropped.
        state.teardown();
    });

    (handle, join)
}

impl<F: PlayerFactory> OwnerState<F> {
    /// Destroy a handle through the factory. Single funnel for every discard
    /// path, so each handle is destroyed exactly once.
    pub fn destroy_handle(&mut self, handle: PlayerHandle<F::Handle>) {
        trace!(id = %handle.id(), "destroying player handle");
        self.factory.destroy(handle.into_inner());
    }

    /// `KeyedTTLCache.put`: park and cache a released handle with its
    /// snapshot, displacing (and destroying) any previous entry for the room
    /// and scheduling a sweep at `now + ttl`.
    pub fn cache_put(
        &mut self,
        room: RoomId,
        mut handle: PlayerHandle<F::Handle>,
        snapshot: RoomSnapshot,
        ttl: Option<Duration>,
    ) {
        let ttl = ttl
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or_else(|| self.config.default_ttl());

        if !self.factory.probe(handle.inner()) {
            debug!(%room, id = %handle.id(), "released player is dead; discarding");
            self.destroy_handle(handle);
            if let Some(prev) = self.cache.remove(&room) {
                self.destroy_handle(prev.handle);
            }
            return;
        }

        self.factory.park(handle.inner_mut());
        let id = handle.id();
        let displaced = self.cache.insert(
            room.clone(),
            TtlEntry {
                handle,
                snapshot,
                expire_at: Instant::now() + ttl,
            },
        );
        if let Some(prev) = displaced {
            if prev.handle.id() != id {
                debug!(%room, displaced = %prev.handle.id(), "cache entry displaced");
                self.destroy_handle(prev.handle);
            }
        }
        debug!(
            %room,
            %id,
            ttl_ms = ttl.as_millis() as u64,
            cached = self.cache.len(),
            "player cached with TTL"
        );
        self.schedule_sweep(room, id, ttl);
    }

    /// Arm a sweep timer that posts the idempotent evict job back onto the
    /// owner queue once the TTL elapses.
    fn schedule_sweep(&self, room: RoomId, id: HandleId, ttl: Duration) {
        let weak = self.weak.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(owner) = weak.upgrade() {
                owner.post(move |state| state.sweep_expired(&room, id));
            }
        });
    }

    /// Sweep-timer callback: evict only if the entry still holds the same
    /// handle and has actually expired. Late or superseded sweeps are no-ops.
    pub fn sweep_expired(&mut self, room: &RoomId, id: HandleId) {
        if self.shutting_down {
            return;
        }
        if let Some(entry) = self.cache.take_expired(room, id, Instant::now()) {
            debug!(%room, %id, "ttl sweep evicted cached player");
            self.destroy_handle(entry.handle);
        }
    }

    /// `KeyedTTLCache.get`: pull-time lookup with purge-on-read, liveness
    /// re-probe, and read-once removal.
    pub fn cache_take(
        &mut self,
        room: &RoomId,
    ) -> Option<(PlayerHandle<F::Handle>, RoomSnapshot)> {
        match self.cache.take(room, Instant::now()) {
            TakeOutcome::Miss => None,
            TakeOutcome::Expired(entry) => {
                debug!(%room, id = %entry.handle.id(), "cached player expired on read");
                self.destroy_handle(entry.handle);
                None
            }
            TakeOutcome::Hit(entry) => {
                if self.factory.probe(entry.handle.inner()) {
                    debug!(%room, id = %entry.handle.id(), "ttl cache hit");
                    Some((entry.handle, entry.snapshot))
                } else {
                    debug!(%room, id = %entry.handle.id(), "cached player failed liveness probe");
                    self.destroy_handle(entry.handle);
                    None
                }
            }
        }
    }

    /// Claim a warm handle for a consumer: TTL cache first, then the
    /// pipeline's warm set, then the reuse slot.
    fn claim(&mut self, room: &RoomId) -> Option<Acquired<F::Handle>> {
        if let Some((mut handle, snapshot)) = self.cache_take(room) {
            self.factory.restore(handle.inner_mut());
            return Some(Acquired {
                handle,
                snapshot: Some(snapshot),
            });
        }

        if let Some(mut handle) = self.warm.remove(room) {
            if self.factory.probe(handle.inner()) {
                debug!(%room, id = %handle.id(), "claimed warm player");
                self.factory.restore(handle.inner_mut());
                return Some(Acquired {
                    handle,
                    snapshot: None,
                });
            }
            debug!(%room, id = %handle.id(), "warm player died before claim");
            self.destroy_handle(handle);
        }

        self.reuse
            .take(&mut self.factory)
            .map(|handle| Acquired {
                handle,
                snapshot: None,
            })
    }

    /// Consumer acquire: claim a warm handle or fall back to synchronous
    /// creation so the consumer's flow degrades gracefully instead of
    /// failing.
    pub fn acquire_or_create(&mut self, room: &RoomId) -> Result<Acquired<F::Handle>> {
        if self.shutting_down {
            return Err(RoomcastError::SchedulerGone);
        }
        if let Some(acquired) = self.claim(room) {
            return Ok(acquired);
        }
        let inner = self.factory.create(room)?;
        let handle = PlayerHandle::new(inner);
        debug!(%room, id = %handle.id(), "no warm player available; created synchronously");
        Ok(Acquired {
            handle,
            snapshot: None,
        })
    }

    /// Consumer release: route the handle to the TTL cache, the reuse slot,
    /// or destruction.
    pub fn release(&mut self, handle: PlayerHandle<F::Handle>, release: Release) {
        if self.shutting_down {
            self.destroy_handle(handle);
            return;
        }
        match release {
            Release::Cache {
                room,
                snapshot,
                ttl,
            } => self.cache_put(room, handle, snapshot, ttl),
            Release::Reuse => self.reuse.offer(&mut self.factory, handle),
            Release::Discard => self.destroy_handle(handle),
        }
    }

    /// Diagnostics: whether the room's metadata is warmed and, for rooms in
    /// the preferred subset, a handle is buffered or cached.
    pub fn is_working_set_warm(&self, room: &RoomId) -> bool {
        if !self.room_info.contains_key(room) {
            return false;
        }
        if self.config.preferred_rooms.contains(room) {
            self.warm.contains_key(room) || self.cache.contains_live(room, Instant::now())
        } else {
            true
        }
    }

    /// Destroy every handle the subsystem still owns and cancel in-flight
    /// preloads. Idempotent; runs on explicit shutdown and again when the
    /// owner loop drains.
    pub fn teardown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;

        let cached = self.cache.drain();
        let warmed: Vec<_> = self.warm.drain().map(|(_, handle)| handle).collect();
        let total = cached.len() + warmed.len() + usize::from(self.reuse.is_occupied());
        for entry in cached {
            self.destroy_handle(entry.handle);
        }
        for handle in warmed {
            self.destroy_handle(handle);
        }
        self.reuse.clear(&mut self.factory);

        for (room, task) in self.tasks.drain() {
            trace!(%room, "cancelling in-flight preload during teardown");
            task.cancel();
        }
        self.room_info.clear();

        if total > 0 {
            debug!(destroyed = total, "owner teardown destroyed remaining players");
        }
    }
}

impl<F: PlayerFactory> Drop for OwnerState<F> {
    fn drop(&mut self) {
        if !self.shutting_down {
            warn!("owner state dropped without teardown");
            self.teardown();
        }
    }
}
