//! Entity-fetch seam for room metadata.

use async_trait::async_trait;
use roomcast_model::{Host, RoomId};

use crate::error::Result;

/// Fetches room/host metadata and resolves stream locations.
///
/// Implementations may be called concurrently for distinct rooms; the
/// pipeline guarantees at most one in-flight fetch per room.
#[async_trait]
pub trait RoomDirectory: Send + Sync + 'static {
    /// Fetch the host descriptor for a room.
    async fn fetch_host(&self, room: &RoomId) -> Result<Host>;

    /// Resolve the stream manifest URL for a room, when known ahead of time.
    fn stream_url(&self, _room: &RoomId) -> Option<String> {
        None
    }

    /// Best-effort warm-up of the stream manifest/CDN path.
    ///
    /// Purely a cache-warming side effect; the pipeline fires it and forgets
    /// it, swallowing failures.
    async fn prefetch_manifest(&self, _stream_url: &str) -> Result<()> {
        Ok(())
    }
}
