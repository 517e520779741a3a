// Gateway module for cache - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod backend;
mod codec;
mod fingerprint;
mod resolver;
mod store;
mod types;

// Public re-exports - the ONLY way to access cache functionality
pub use backend::{FileBackend, KeyValueStore, MemoryBackend};
pub use codec::Encoding;
pub use fingerprint::{Fingerprint, FullProjection, Projection};
pub use resolver::{CacheStats, FingerprintCache, Generator};
pub use store::{CacheStore, EphemeralStore, PersistentStore};
pub use types::{CacheEntry, GenerationError, PendingPolicy, Resolution, StoreError};
