//! Identity wrapper for externally-owned player handles.

use std::fmt;

use uuid::Uuid;

/// Stable identity assigned to a player handle at creation.
///
/// The external resource carries no identity of its own, so the subsystem
/// tags each handle when it is created. Identity comparisons (sweep-timer
/// checks, displacement checks) go through this id rather than the opaque
/// resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(Uuid);

impl HandleId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandleId").field(&self.0).finish()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An externally-owned player resource tagged with a [`HandleId`].
///
/// Exactly one of {a consumer, the reuse slot, a TTL cache entry, the warm
/// set} owns a given `PlayerHandle` at any instant; moving the value is the
/// only way it changes hands.
pub struct PlayerHandle<H> {
    id: HandleId,
    inner: H,
}

impl<H> PlayerHandle<H> {
    pub(crate) fn new(inner: H) -> Self {
        Self {
            id: HandleId::new(),
            inner,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Borrow the underlying resource.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Mutably borrow the underlying resource.
    pub fn inner_mut(&mut self) -> &mut H {
        &mut self.inner
    }

    /// Unwrap the underlying resource, losing the subsystem identity.
    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H> fmt::Debug for PlayerHandle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerHandle").field("id", &self.id).finish()
    }
}
