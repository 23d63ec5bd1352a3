//! Background preload pipeline.
//!
//! For each requested room the pipeline runs at most one task at a time:
//! admission (dedup against in-flight tasks, the TTL cache, and the warm
//! set) happens on the owner queue, the metadata fetch runs on the bounded
//! background pool, and the warm phase (handle creation) is marshalled back
//! onto the owner queue. Cancellation is cooperative: a "still wanted" flag
//! is checked at each phase boundary, never by interrupting in-flight I/O.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;

use dashmap::{DashMap, DashSet};
use roomcast_model::{Host, RoomId};
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use crate::config::RoomcastConfig;
use crate::directory::RoomDirectory;
use crate::error::RoomcastError;
use crate::factory::PlayerFactory;
use crate::handle::PlayerHandle;
use crate::owner::{OwnerState, WeakOwnerHandle};

/// Lifecycle of a preload task.
///
/// Transitions are monotonic: `Pending → Fetching → Warming → Done`, with
/// `Aborted` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadStatus {
    Pending,
    Fetching,
    Warming,
    Done,
    Aborted,
}

impl PreloadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

/// A non-terminal preload task tracked in the owner's dedup map.
pub(crate) struct PreloadTask {
    pub status: PreloadStatus,
    wanted: Arc<AtomicBool>,
}

impl PreloadTask {
    fn new() -> (Self, Arc<AtomicBool>) {
        let wanted = Arc::new(AtomicBool::new(true));
        (
            Self {
                status: PreloadStatus::Pending,
                wanted: wanted.clone(),
            },
            wanted,
        )
    }

    pub fn is_wanted(&self) -> bool {
        self.wanted.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.wanted.store(false, Ordering::SeqCst);
    }
}

/// Shared, thread-safe half of the pipeline: the directory client, the
/// metadata warm cache, and the bounded fetch pool.
pub(crate) struct Pipeline<D> {
    pub directory: D,
    pub room_info: Arc<DashMap<RoomId, Host>>,
    /// Stream URLs already warmed, so each manifest is prefetched once.
    manifests: DashSet<String>,
    pub fetch_slots: Arc<Semaphore>,
    pub config: Arc<RoomcastConfig>,
}

impl<D> Pipeline<D> {
    pub fn new(
        directory: D,
        room_info: Arc<DashMap<RoomId, Host>>,
        config: Arc<RoomcastConfig>,
    ) -> Self {
        let fetch_slots = Arc::new(Semaphore::new(config.fetch_parallelism()));
        Self {
            directory,
            room_info,
            manifests: DashSet::new(),
            fetch_slots,
            config,
        }
    }
}

impl<F: PlayerFactory> OwnerState<F> {
    /// Admission: start a task unless one is already in flight for the room
    /// or a handle is already cached/warm. Returns the task's cooperative
    /// cancellation flag when admitted.
    pub fn admit_preload(&mut self, room: &RoomId) -> Option<Arc<AtomicBool>> {
        if self.shutting_down {
            return None;
        }
        if let Some(task) = self.tasks.get(room) {
            trace!(%room, status = ?task.status, "preload suppressed: task already in flight");
            return None;
        }
        if self.cache.contains_live(room, Instant::now()) {
            trace!(%room, "preload suppressed: room already cached");
            return None;
        }
        if self.warm.contains_key(room) {
            trace!(%room, "preload suppressed: room already warm");
            return None;
        }
        let (task, wanted) = PreloadTask::new();
        self.tasks.insert(room.clone(), task);
        debug!(%room, "preload task admitted");
        Some(wanted)
    }

    /// Pending → Fetching, unless the task was cancelled in the meantime.
    pub fn mark_fetching(&mut self, room: &RoomId) -> bool {
        if self.shutting_down {
            return false;
        }
        let Some(task) = self.tasks.get_mut(room) else {
            return false;
        };
        if task.is_wanted() {
            task.status = PreloadStatus::Fetching;
            true
        } else {
            self.abort_task(room, "cancelled before fetch");
            false
        }
    }

    /// Warm phase: create and park a handle for the room. Runs on the owner
    /// queue because handle construction touches the external resource.
    pub fn warm_preloaded(&mut self, room: RoomId) {
        if self.shutting_down {
            self.abort_task(&room, "shutting down");
            return;
        }
        let Some(task) = self.tasks.get_mut(&room) else {
            return;
        };
        if !task.is_wanted() {
            self.abort_task(&room, "cancelled before warm");
            return;
        }
        task.status = PreloadStatus::Warming;

        // A consumer may have cached a handle while the fetch ran.
        if self.cache.contains_live(&room, Instant::now()) || self.warm.contains_key(&room) {
            self.finish_task(&room, PreloadStatus::Done);
            return;
        }

        match self.factory.create(&room) {
            Ok(inner) => {
                let mut handle = PlayerHandle::new(inner);
                self.factory.park(handle.inner_mut());
                debug!(%room, id = %handle.id(), "player warmed and buffered");
                self.warm.insert(room.clone(), handle);
                self.finish_task(&room, PreloadStatus::Done);
            }
            Err(err) => {
                warn!(%room, error = %err, "player warm-up failed");
                self.abort_task(&room, "creation failed");
            }
        }
    }

    /// Remove a task that reached a terminal state, freeing the key for a
    /// future preload.
    pub fn finish_task(&mut self, room: &RoomId, status: PreloadStatus) {
        debug_assert!(status.is_terminal());
        if self.tasks.remove(room).is_some() {
            trace!(%room, ?status, "preload task finished");
        }
    }

    /// Abort from any non-terminal state.
    pub fn abort_task(&mut self, room: &RoomId, reason: &str) {
        if let Some(task) = self.tasks.remove(room) {
            task.cancel();
            debug!(%room, reason, "preload task aborted");
        }
    }

    pub fn pending_preload_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Drive one preload task through its phases. Spawned per request; exits
/// quietly when deduplicated or when the owner loop has ended.
pub(crate) async fn run_preload<F, D>(
    owner: WeakOwnerHandle<F>,
    pipeline: Arc<Pipeline<D>>,
    room: RoomId,
) where
    F: PlayerFactory,
    D: RoomDirectory,
{
    let wanted = {
        let Some(strong) = owner.upgrade() else { return };
        let key = room.clone();
        match strong.call(move |state| state.admit_preload(&key)).await {
            Ok(Some(wanted)) => wanted,
            _ => return,
        }
    };

    // Fetch phase, bounded by the background pool width.
    let Ok(_permit) = Arc::clone(&pipeline.fetch_slots).acquire_owned().await else {
        return;
    };
    {
        let Some(strong) = owner.upgrade() else { return };
        let key = room.clone();
        match strong.call(move |state| state.mark_fetching(&key)).await {
            Ok(true) => {}
            _ => return,
        }
    }

    let fetched = match tokio::time::timeout(
        pipeline.config.fetch_timeout(),
        pipeline.directory.fetch_host(&room),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(RoomcastError::FetchFailed {
            room: room.clone(),
            reason: "fetch timed out".to_string(),
        }),
    };

    match fetched {
        Ok(host) => {
            trace!(%room, host = %host.name, "room metadata fetched");
            pipeline.room_info.insert(room.clone(), host);
            spawn_manifest_prefetch(&pipeline, &room);

            let Some(strong) = owner.upgrade() else { return };
            let preferred = pipeline.config.preferred_rooms.contains(&room);
            if preferred && wanted.load(Ordering::SeqCst) {
                strong.post(move |state| state.warm_preloaded(room));
            } else {
                strong.post(move |state| state.finish_task(&room, PreloadStatus::Done));
            }
        }
        Err(err) => {
            warn!(%room, error = %err, "room metadata fetch failed");
            if let Some(strong) = owner.upgrade() {
                strong.post(move |state| state.abort_task(&room, "fetch failed"));
            }
        }
    }
}

/// Fire-and-forget manifest warm-up; failures are swallowed.
fn spawn_manifest_prefetch<D: RoomDirectory>(pipeline: &Arc<Pipeline<D>>, room: &RoomId) {
    if !pipeline.config.prefetch_manifests {
        return;
    }
    let Some(url) = pipeline.directory.stream_url(room) else {
        return;
    };
    if !pipeline.manifests.insert(url.clone()) {
        return;
    }
    let pipeline = Arc::clone(pipeline);
    tokio::spawn(async move {
        if let Err(err) = pipeline.directory.prefetch_manifest(&url).await {
            trace!(url, error = %err, "manifest prefetch failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!PreloadStatus::Pending.is_terminal());
        assert!(!PreloadStatus::Fetching.is_terminal());
        assert!(!PreloadStatus::Warming.is_terminal());
        assert!(PreloadStatus::Done.is_terminal());
        assert!(PreloadStatus::Aborted.is_terminal());
    }

    #[test]
    fn cancel_flips_wanted() {
        let (task, wanted) = PreloadTask::new();
        assert!(task.is_wanted());
        task.cancel();
        assert!(!task.is_wanted());
        assert!(!wanted.load(Ordering::SeqCst));
    }
}
