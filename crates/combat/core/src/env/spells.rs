//! Spell data oracle.

use crate::env::OracleError;
use crate::spell::{SpellId, SpellInfo};

/// Read-only access to the authoritative spell tables.
///
/// The core resolves every spell reference through this trait; it never
/// owns descriptor data itself. Loaders in `combat-content` provide the
/// production implementation.
pub trait SpellOracle: Send + Sync {
    /// Look up a spell descriptor by id.
    fn spell(&self, id: SpellId) -> Option<&SpellInfo>;

    /// Like [`SpellOracle::spell`] but an unknown id is an error.
    fn require(&self, id: SpellId) -> Result<&SpellInfo, OracleError> {
        self.spell(id).ok_or(OracleError::SpellNotFound(id))
    }
}
