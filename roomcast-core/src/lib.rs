//! Roomcast core: preload, pool, and recycle expensive live-room player
//! handles.
//!
//! The subsystem coordinates four pieces around a single owner scheduler:
//!
//! - a keyed TTL cache that preserves a released player handle together with
//!   a snapshot of the screen state it was driving ([`Release::Cache`]),
//! - a capacity-1 reuse slot for keyless handles ([`Release::Reuse`]),
//! - a background preload pipeline that warms room metadata for a working
//!   set and pre-creates handles for a preferred subset
//!   ([`PreloadService::request_preload`]),
//! - a liveness protocol that re-probes every handle immediately before any
//!   hand-off, because the external resource can be invalidated at any time
//!   by its host environment ([`PlayerFactory::probe`]).
//!
//! All handle mutation is confined to the owner scheduler's serialized
//! queue; background work marshals its results there instead of touching
//! handles where they were computed.
//!
//! The [`template_pool`] module is a separate, much simpler bounded pool for
//! inert layout templates, with no TTL and no liveness concerns.

pub mod config;
pub mod directory;
pub mod error;
pub mod factory;
pub mod handle;
mod owner;
mod preload;
mod reuse_pool;
pub mod service;
pub mod template_pool;
mod ttl_cache;

pub use config::RoomcastConfig;
pub use directory::RoomDirectory;
pub use error::{Result, RoomcastError};
pub use factory::PlayerFactory;
pub use handle::{HandleId, PlayerHandle};
pub use preload::PreloadStatus;
pub use service::{Acquired, PreloadService, Release};
pub use template_pool::{TemplateId, TemplatePool};

pub use roomcast_model as model;
