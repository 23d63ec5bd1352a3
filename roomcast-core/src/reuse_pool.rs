//! Capacity-1 slot for opportunistic reuse of keyless player handles.

use tracing::{debug, trace};

use crate::factory::PlayerFactory;
use crate::handle::PlayerHandle;

/// Holds at most one keyless handle. Overwriting a non-empty slot destroys
/// the displaced occupant; it is never leaked.
pub(crate) struct ReuseSlot<H> {
    slot: Option<PlayerHandle<H>>,
}

impl<H> ReuseSlot<H> {
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Store a handle for later reuse.
    ///
    /// A handle that fails its liveness probe is destroyed instead of
    /// stored, leaving any existing occupant in place.
    pub fn offer<F>(&mut self, factory: &mut F, mut handle: PlayerHandle<H>)
    where
        F: PlayerFactory<Handle = H>,
    {
        if !factory.probe(handle.inner()) {
            debug!(id = %handle.id(), "offered player is dead, destroying");
            factory.destroy(handle.into_inner());
            return;
        }

        if let Some(prev) = self.slot.take() {
            if prev.id() != handle.id() {
                debug!(displaced = %prev.id(), "reuse slot occupied, destroying occupant");
                factory.destroy(prev.into_inner());
            }
        }

        factory.park(handle.inner_mut());
        trace!(id = %handle.id(), "player parked in reuse slot");
        self.slot = Some(handle);
    }

    /// Empty the slot and hand the occupant out, reset to a neutral state.
    /// A dead occupant is destroyed and `None` returned.
    pub fn take<F>(&mut self, factory: &mut F) -> Option<PlayerHandle<H>>
    where
        F: PlayerFactory<Handle = H>,
    {
        let mut handle = self.slot.take()?;
        if !factory.probe(handle.inner()) {
            debug!(id = %handle.id(), "pooled player died while parked, destroying");
            factory.destroy(handle.into_inner());
            return None;
        }
        factory.restore(handle.inner_mut());
        factory.reset(handle.inner_mut());
        trace!(id = %handle.id(), "player reassigned from reuse slot");
        Some(handle)
    }

    /// Destroy the occupant, if any.
    pub fn clear<F>(&mut self, factory: &mut F)
    where
        F: PlayerFactory<Handle = H>,
    {
        if let Some(handle) = self.slot.take() {
            factory.destroy(handle.into_inner());
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.slot.is_some()
    }
}
