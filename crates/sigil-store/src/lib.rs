//! SQLite persistence for sigil-core sigils and braids.

pub mod error;
mod json_bridge;
pub mod schema;
pub mod store;
pub mod workspace;

pub use error::{Result, StoreError};
pub use store::{Store, StoreStats};
pub use workspace::{Workspace, default_base_dir};
