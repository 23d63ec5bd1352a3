//! Runtime configuration for the preload subsystem.
//!
//! Defaults mirror production tuning; override via [`RoomcastConfig`]
//! (deserializable, so it can be loaded from a settings file).

use std::time::Duration;

use roomcast_model::RoomId;
use serde::Deserialize;

/// Default tuning values.
pub mod defaults {
    use std::time::Duration;

    /// TTL applied when a release specifies none (or zero).
    pub const TTL: Duration = Duration::from_secs(30);

    /// Number of rooms whose metadata is warmed on startup.
    pub const WORKING_SET_SIZE: usize = 10;

    /// Rooms that get a pre-warmed player handle, not just metadata.
    pub const PREFERRED_ROOMS: &[&str] = &["1"];

    /// Deadline for a single room-metadata fetch.
    pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Templates inflated per batch during background template preloading.
    pub const TEMPLATE_BATCH_SIZE: usize = 2;

    /// Pause between template preload batches.
    pub const TEMPLATE_BATCH_INTERVAL: Duration = Duration::from_millis(50);
}

/// Tunable knobs for the preload subsystem.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomcastConfig {
    /// TTL substituted when a release passes no (or a zero) TTL, in
    /// milliseconds.
    pub default_ttl_ms: u64,

    /// Upper bound on the number of rooms admitted by `start_preload`.
    pub working_set_size: usize,

    /// Rooms for which the pipeline pre-creates a player handle in addition
    /// to fetching metadata.
    pub preferred_rooms: Vec<RoomId>,

    /// Concurrent metadata fetches; `None` uses available hardware
    /// parallelism.
    pub fetch_parallelism: Option<usize>,

    /// Deadline for a single metadata fetch, in milliseconds.
    pub fetch_timeout_ms: u64,

    /// Whether to fire best-effort stream-manifest prefetches.
    pub prefetch_manifests: bool,
}

impl Default for RoomcastConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: defaults::TTL.as_millis() as u64,
            working_set_size: defaults::WORKING_SET_SIZE,
            preferred_rooms: defaults::PREFERRED_ROOMS
                .iter()
                .map(|id| RoomId::from(*id))
                .collect(),
            fetch_parallelism: None,
            fetch_timeout_ms: defaults::FETCH_TIMEOUT.as_millis() as u64,
            prefetch_manifests: true,
        }
    }
}

impl RoomcastConfig {
    /// TTL applied when a release specifies none.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Effective fetch-pool width, never zero.
    pub fn fetch_parallelism(&self) -> usize {
        self.fetch_parallelism
            .unwrap_or_else(num_cpus::get)
            .max(1)
    }

    /// Deadline applied to each metadata fetch.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
