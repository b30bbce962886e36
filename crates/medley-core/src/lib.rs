//! medley-core: shared types, IDs, errors, configuration and the media model.
//!
//! This crate is the foundational dependency for all other medley crates,
//! providing type-safe identifiers, a unified error type, the generic
//! [`MediaItem`] wrapper with its typed payloads, the ordered [`ItemList`]
//! used by playlists and collections, and application configuration.

pub mod clients;
pub mod config;
pub mod error;
pub mod ids;
pub mod keys;
pub mod lists;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use clients::ClientSettings;
pub use error::{Error, Result};
pub use ids::*;
pub use keys::{ItemKey, KeyParts};
pub use lists::*;
pub use media::*;
