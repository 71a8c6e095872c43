//! Multi-process safe on-disk stores
//!
//! - [`CacheStore`]: get-or-produce memoization, one file per entry, swept by
//!   age.
//! - [`KeyValueStore`]: a whole map in a single file with per-key expiry.
//!
//! Both only touch shared files through the lock-scoped helpers in [`lock`].

mod error;
mod kv;
pub mod lock;
mod store;

pub use error::{StoreError, StoreResult};
pub use kv::KeyValueStore;
pub use lock::{with_dir_lock, with_file_lock, AccessMode, FileLock};
pub use store::{cache_key, CacheStore, Params, ProduceError, Producer};
