use roomcast_model::RoomId;
use thiserror::Error;

/// Errors surfaced by the preload subsystem.
///
/// Liveness failures and preload cancellation are intentionally absent:
/// a dead handle is recovered silently (discard + best-effort destroy),
/// and a cancelled preload task just stops at its next phase boundary.
/// Neither outcome is reported to callers, who never observed the work.
#[derive(Error, Debug)]
pub enum RoomcastError {
    #[error("player creation failed: {0}")]
    CreationFailed(String),

    #[error("fetch failed for room {room}: {reason}")]
    FetchFailed { room: RoomId, reason: String },

    #[error("owner scheduler is no longer running")]
    SchedulerGone,
}

pub type Result<T> = std::result::Result<T, RoomcastError>;
