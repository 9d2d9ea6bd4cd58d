//! Response cache - time-boxed storage for GET responses.
//!
//! # Key Concepts
//! - Entries expire `ttl` after they were stored; expiry is checked on every read
//! - A failed refresh may fall back to the last stored value, expired or not
//! - Time comes from an injected [`Clock`] so expiry is testable
//! - An optional sweeper task purges expired entries in the background

mod clock;
mod key;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::cache_key;
pub use store::{CacheConfig, CacheEntry, CacheOptions, ResponseCache};
