//! Key-value cache and presence set ports, their in-memory and Redis
//! adapters, and the best-effort cache invalidator.

pub mod cache;
pub mod invalidator;
pub mod keys;
pub mod memory;
pub mod presence;
pub mod redis;

pub use cache::{Cache, CacheError, KeyValueCache};
pub use invalidator::Invalidator;
pub use presence::PresenceSet;
