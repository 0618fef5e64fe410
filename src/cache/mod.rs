//! Memoization for stages that call remote services.
//!
//! # Data Flow
//! ```text
//! stage inputs (token, config, session)
//!     → cache_key() (SHA-256 over the parts)
//!     → TtlCache::get → hit: deserialize stored JSON
//!                     → miss: remote call → TtlCache::set_with_ttl
//! ```
//!
//! # Design Decisions
//! - Values are stored serialized, so a hit is always a deep copy
//! - Entries expire by TTL only; nothing deletes them explicitly
//! - Each stage owns a named instance; keys of different stages never meet

pub mod ttl;

pub use ttl::{cache_key, CacheSettings, TtlCache};
