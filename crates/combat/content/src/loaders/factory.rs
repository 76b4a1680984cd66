//! Content factory for building oracles from data files.

use std::path::PathBuf;

use crate::loaders::{LoadResult, SpellCatalog, TablesData};

/// Content factory that loads all combat content from a data directory.
///
/// # Directory Structure
///
/// ```text
/// data_dir/
/// ├── spells.ron
/// └── tables.toml
/// ```
pub struct ContentFactory {
    data_dir: PathBuf,
}

impl ContentFactory {
    /// Creates a new content factory pointing to a data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Load the spell catalog from `spells.ron`.
    pub fn load_spells(&self) -> LoadResult<SpellCatalog> {
        let path = self.data_dir.join("spells.ron");
        SpellCatalog::load(&path)
    }

    /// Load combat rule tables from `tables.toml`.
    pub fn load_tables(&self) -> LoadResult<TablesData> {
        let path = self.data_dir.join("tables.toml");
        TablesData::load(&path)
    }
}
