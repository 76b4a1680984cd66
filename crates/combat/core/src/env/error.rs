//! Oracle access errors.

use crate::error::{CombatError, ErrorSeverity};
use crate::spell::SpellId;

/// Errors that occur when accessing oracle data.
///
/// Missing oracles are fatal since combat resolution cannot proceed without
/// spell data or randomness; unknown ids are validation errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OracleError {
    /// SpellOracle is not available in the environment.
    #[error("SpellOracle not available")]
    SpellsNotAvailable,

    /// TablesOracle is not available in the environment.
    #[error("TablesOracle not available")]
    TablesNotAvailable,

    /// ProcPolicy is not available in the environment.
    #[error("ProcPolicy not available")]
    PolicyNotAvailable,

    /// RngOracle is not available in the environment.
    #[error("RngOracle not available")]
    RngNotAvailable,

    /// Spell descriptor was not found by id.
    #[error("spell {0} not found")]
    SpellNotFound(SpellId),
}

impl CombatError for OracleError {
    fn severity(&self) -> ErrorSeverity {
        use OracleError::*;
        match self {
            SpellsNotAvailable | TablesNotAvailable | PolicyNotAvailable | RngNotAvailable => {
                ErrorSeverity::Fatal
            }
            SpellNotFound(_) => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        use OracleError::*;
        match self {
            SpellsNotAvailable => "ORACLE_SPELLS_NOT_AVAILABLE",
            TablesNotAvailable => "ORACLE_TABLES_NOT_AVAILABLE",
            PolicyNotAvailable => "ORACLE_POLICY_NOT_AVAILABLE",
            RngNotAvailable => "ORACLE_RNG_NOT_AVAILABLE",
            SpellNotFound(_) => "ORACLE_SPELL_NOT_FOUND",
        }
    }
}
