//! Data-driven combat content and loaders.
//!
//! This crate houses the static combat data and provides loaders for
//! RON/TOML data files:
//! - Spell catalog (data-driven via RON)
//! - Combat rule tables: proc events, rank tuning, crit exceptions
//!   (data-driven via TOML)
//!
//! Content is consumed through the oracle traits of `combat-core` and never
//! appears in combat state. The loaders deserialize directly into core
//! types with serde.

#[cfg(feature = "loaders")]
pub mod loaders;

#[cfg(feature = "loaders")]
pub use loaders::{ContentFactory, SpellCatalog, TablesData};
