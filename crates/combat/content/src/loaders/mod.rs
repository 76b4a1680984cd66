//! Content loaders for reading combat data from files.
//!
//! Each loader converts a RON or TOML file into an oracle implementation
//! that `combat-core` consumes.

pub mod factory;
pub mod spells;
pub mod tables;

pub use factory::ContentFactory;
pub use spells::SpellCatalog;
pub use tables::TablesData;

use std::path::Path;

/// Common result type for loaders.
pub type LoadResult<T> = anyhow::Result<T>;

/// Helper function to read file contents.
pub(crate) fn read_file(path: &Path) -> LoadResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read file {}: {}", path.display(), e))
}
