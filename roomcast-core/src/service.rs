//! Public facade over the owner scheduler and preload pipeline.
//!
//! A `PreloadService` is an explicitly constructed, long-lived service owned
//! by the process-level composition root; pass references to it rather than
//! reaching for ambient statics.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use roomcast_model::{Host, RoomId, RoomSnapshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::RoomcastConfig;
use crate::directory::RoomDirectory;
use crate::error::Result;
use crate::factory::PlayerFactory;
use crate::handle::PlayerHandle;
use crate::owner::{self, OwnerHandle};
use crate::preload::{self, Pipeline};

/// A handle (and any release-time snapshot) handed to a consumer.
///
/// From this point the consumer is solely responsible for the handle until
/// it calls [`PreloadService::release`]. The snapshot, when present, may be
/// partial; [`RoomSnapshot::merge_missing_from`] fills the gaps with freshly
/// fetched data.
pub struct Acquired<H> {
    pub handle: PlayerHandle<H>,
    pub snapshot: Option<RoomSnapshot>,
}

impl<H> fmt::Debug for Acquired<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquired")
            .field("handle", &self.handle)
            .field("has_snapshot", &self.snapshot.is_some())
            .finish()
    }
}

/// Where a released handle should go.
#[derive(Debug)]
pub enum Release {
    /// Cache under `room` with the screen-state snapshot; reclaimable until
    /// the TTL elapses. A `None` (or zero) TTL uses the configured default.
    Cache {
        room: RoomId,
        snapshot: RoomSnapshot,
        ttl: Option<Duration>,
    },
    /// Keyless return to the capacity-1 reuse slot.
    Reuse,
    /// Destroy outright.
    Discard,
}

/// Preloads, pools, and recycles live-room player handles.
pub struct PreloadService<F: PlayerFactory, D: RoomDirectory> {
    owner: OwnerHandle<F>,
    owner_join: JoinHandle<()>,
    pipeline: Arc<Pipeline<D>>,
}

impl<F: PlayerFactory, D: RoomDirectory> PreloadService<F, D> {
    /// Spawn the owner scheduler and assemble the pipeline.
    pub fn new(factory: F, directory: D, config: RoomcastConfig) -> Self {
        let config = Arc::new(config);
        let room_info = Arc::new(DashMap::new());
        let (owner, owner_join) =
            owner::spawn(factory, Arc::clone(&config), Arc::clone(&room_info));
        let pipeline = Arc::new(Pipeline::new(directory, room_info, config));
        Self {
            owner,
            owner_join,
            pipeline,
        }
    }

    /// Fire-and-forget preload of one room; idempotent while a task for the
    /// room is in flight or a handle is already warm.
    pub fn request_preload(&self, room: RoomId) {
        let owner = self.owner.downgrade();
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(preload::run_preload(owner, pipeline, room));
    }

    /// Warm metadata for the working set (bounded by the configured size);
    /// rooms in the preferred subset also get a pre-created handle.
    pub fn start_preload(&self, working_set: impl IntoIterator<Item = RoomId>) {
        let cap = self.pipeline.config.working_set_size;
        for (index, room) in working_set.into_iter().enumerate() {
            if index >= cap {
                debug!(cap, "working set truncated to configured size");
                break;
            }
            self.request_preload(room);
        }
    }

    /// Hand a player for `room` to the calling consumer: TTL cache first
    /// (with its stored snapshot), then the warm set, then the reuse slot,
    /// falling back to synchronous creation on a complete miss.
    pub async fn acquire(&self, room: &RoomId) -> Result<Acquired<F::Handle>> {
        let key = room.clone();
        self.owner
            .call(move |state| state.acquire_or_create(&key))
            .await?
    }

    /// Give a handle back to the subsystem.
    pub async fn release(&self, handle: PlayerHandle<F::Handle>, release: Release) -> Result<()> {
        self.owner
            .call(move |state| state.release(handle, release))
            .await
    }

    /// Diagnostics: metadata warmed for `room` and, for preferred rooms, a
    /// handle buffered or cached.
    pub async fn is_working_set_warm(&self, room: &RoomId) -> bool {
        let key = room.clone();
        self.owner
            .call(move |state| state.is_working_set_warm(&key))
            .await
            .unwrap_or(false)
    }

    /// Diagnostics: preload tasks not yet in a terminal state.
    pub async fn pending_preload_count(&self) -> usize {
        self.owner
            .call(|state| state.pending_preload_count())
            .await
            .unwrap_or(0)
    }

    /// Warmed metadata for a room, readable without touching the owner
    /// queue (entity data only, never a handle).
    pub fn room_info(&self, room: &RoomId) -> Option<Host> {
        self.pipeline
            .room_info
            .get(room)
            .map(|entry| entry.value().clone())
    }

    /// Number of rooms with warmed metadata.
    pub fn warmed_room_count(&self) -> usize {
        self.pipeline.room_info.len()
    }

    /// Destroy every handle the subsystem owns and stop the owner loop.
    /// In-flight preloads are cancelled cooperatively.
    pub async fn shutdown(self) {
        let Self {
            owner,
            owner_join,
            pipeline,
        } = self;
        let _ = owner.post(|state| state.teardown());
        drop(owner);
        drop(pipeline);
        let _ = owner_join.await;
    }
}

impl<F: PlayerFactory, D: RoomDirectory> fmt::Debug for PreloadService<F, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreloadService")
            .field("warmed_rooms", &self.pipeline.room_info.len())
            .finish_non_exhaustive()
    }
}
