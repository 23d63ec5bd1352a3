//! Shared data models for the Roomcast live-room preload subsystem.
//!
//! These types describe the entity data that travels alongside pooled player
//! handles: the room/host descriptor fetched from the directory service, the
//! comment feed, and the snapshot of screen state captured when a consumer
//! releases a handle back to the cache.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable identifier for a live room.
///
/// Room ids are short opaque strings assigned by the directory service
/// (e.g. `"1"` through `"10"` for the default board).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RoomId").field(&self.0).finish()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Host/room descriptor returned by the directory service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Host {
    /// Display name of the host.
    pub name: String,
    /// Title of the live room.
    pub room_name: String,
    /// Avatar image URL.
    pub avatar: String,
    /// Follower count at fetch time.
    #[cfg_attr(feature = "serde", serde(default))]
    pub follower_num: u64,
}

/// A single comment in a room's comment feed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Comment {
    /// Display name of the commenter.
    pub name: String,
    /// Avatar image URL of the commenter.
    pub avatar: String,
    /// Comment body.
    pub comment: String,
}

/// Sentinel for "scroll position was never captured".
pub const SCROLL_UNSET: i32 = -1;

/// Point-in-time capture of a room screen's state, taken when a consumer
/// releases its player handle.
///
/// Snapshots may be partial: a consumer that releases before its fetches
/// complete stores `None`/empty fields, and the next consumer is expected to
/// fill the gaps with fresh data. A snapshot is consumed at most once, when
/// the cached handle is reclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoomSnapshot {
    /// Host descriptor, if it had loaded by release time.
    pub host: Option<Host>,
    /// Comment feed as rendered at release time.
    pub comments: Vec<Comment>,
    /// Viewer count as last pushed by the room's event stream.
    pub online_count: Option<u32>,
    /// Scroll offset of the comment list, [`SCROLL_UNSET`] when never scrolled.
    pub comment_scroll_position: i32,
}

impl Default for RoomSnapshot {
    fn default() -> Self {
        Self {
            host: None,
            comments: Vec::new(),
            online_count: None,
            comment_scroll_position: SCROLL_UNSET,
        }
    }
}

impl RoomSnapshot {
    /// A snapshot with every field unset.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when no field carries data worth restoring.
    pub fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.comments.is_empty()
            && self.online_count.is_none()
            && self.comment_scroll_position == SCROLL_UNSET
    }

    /// Fill fields that are unset here from `fresh`, keeping cached values
    /// where they exist.
    ///
    /// This mirrors the reclaim path where a partial snapshot is merged with
    /// freshly fetched data rather than dropped.
    pub fn merge_missing_from(&mut self, fresh: RoomSnapshot) {
        if self.host.is_none() {
            self.host = fresh.host;
        }
        if self.comments.is_empty() {
            self.comments = fresh.comments;
        }
        if self.online_count.is_none() {
            self.online_count = fresh.online_count;
        }
        if self.comment_scroll_position == SCROLL_UNSET {
            self.comment_scroll_position = fresh.comment_scroll_position;
        }
    }
}
