//! Atelier response cache.
//!
//! A TTL cache shared by every fetch coordinator of a session. It is built
//! once at startup and handed out by `Arc`; nothing in the crate reaches a
//! global instance.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 256
//! designs_ttl_ms = 120000
//! sweep_interval_ms = 60000
//! ```

mod config;
mod store;
mod sweeper;

pub use config::CacheConfig;
pub use store::{CacheEntry, ResponseCache, TtlCache};
pub use sweeper::spawn_sweeper;
