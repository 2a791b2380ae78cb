//! capes: cape resolution and caching
//!
//! Resolves a player's cape for a provider type, serving stored records while
//! they are fresh and otherwise re-fetching, deduplicating by content hash and
//! generating derived images (crops, animation frames) into a content store.

pub mod cli;
pub mod clock;
pub mod config;
pub mod content;
pub mod error;
pub mod hash;
pub mod identity;
pub mod imaging;
pub mod info;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod record;
pub mod resolver;
pub mod types;

pub use error::{ResolveError, StorageError};
pub use info::{CapeHistory, CapeInfo};
pub use resolver::{CapeResolver, ResolverSettings};
