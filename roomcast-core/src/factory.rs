//! Owner-confined factory seam for the external player resource.

use roomcast_model::RoomId;

use crate::error::Result;

/// Creates, destroys, and inspects player handles.
///
/// Every method is invoked exclusively from the owner scheduler, because the
/// external resource is not safe for concurrent access. Implementations must
/// treat all operations as fast and non-blocking; anything that can wait on
/// I/O belongs in the background fetch phase, not here.
pub trait PlayerFactory: Send + 'static {
    /// The opaque external resource (e.g. an embedded browser running a
    /// stream player).
    type Handle: Send + 'static;

    /// Create a fresh handle primed for `room`.
    fn create(&mut self, room: &RoomId) -> Result<Self::Handle>;

    /// Tear the resource down. Called exactly once per handle.
    fn destroy(&mut self, handle: Self::Handle);

    /// Cheap liveness check.
    ///
    /// Must return `false` (never panic) once the resource has been destroyed
    /// or detached from a usable context by forces outside this subsystem.
    /// Probe results are never cached by callers; every hand-off re-probes.
    fn probe(&self, handle: &Self::Handle) -> bool;

    /// Move the resource into its hidden/offscreen holder: muted, invisible,
    /// but still running so playback can resume instantly.
    fn park(&mut self, handle: &mut Self::Handle);

    /// Bring a parked resource back onscreen: unhide, resume, refocus.
    fn restore(&mut self, handle: &mut Self::Handle);

    /// Return the resource to a neutral state for keyless reuse: stop any
    /// in-flight load and clear navigation history.
    fn reset(&mut self, handle: &mut Self::Handle);
}
