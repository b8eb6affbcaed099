//! Durable key-value storage for watcher state.
//!
//! ## Layout
//!
//! ```text
//! {dir}/
//! ├── last_news.json    # PersistedLedger: delivered URLs + last check
//! └── names.json        # NameIndex: per-role subject names
//! ```
//!
//! `Store` is the raw byte interface. `StateStore` layers the tolerant
//! JSON load/save of the two state documents on top of it.

pub mod local;
pub mod memory;
mod state;

use async_trait::async_trait;

use crate::error::Result;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use state::StateStore;

/// Byte storage addressed by relative keys.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a key. `Ok(None)` when it was never written.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace a key's contents in full.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;
}
