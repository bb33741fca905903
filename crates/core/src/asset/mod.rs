//! Asset records, the registry contract and its SQLite backend.

mod registry;
mod sqlite_registry;
mod types;

pub use registry::{AssetRegistry, RegistryError};
pub use sqlite_registry::SqliteAssetRegistry;
pub use types::*;
