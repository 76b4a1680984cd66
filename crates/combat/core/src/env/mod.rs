//! Traits describing read-only combat data.
//!
//! Oracles expose static spell descriptors, rule tables, host policy, and
//! deterministic randomness. The [`Env`] aggregate bundles them so the
//! resolution pipelines can access everything they need without hard
//! coupling to concrete implementations.
mod error;
mod policy;
mod rng;
mod spells;
mod tables;

pub use error::OracleError;
pub use policy::{DefaultProcPolicy, ProcPolicy};
pub use rng::{PcgRng, RngOracle, compute_seed};
pub use spells::SpellOracle;
pub use tables::{ProcEventEntry, TablesOracle};

/// Aggregates the read-only oracles required by the resolution pipelines.
#[derive(Clone, Copy, Debug)]
pub struct Env<'a, S, T, P, R>
where
    S: SpellOracle + ?Sized,
    T: TablesOracle + ?Sized,
    P: ProcPolicy + ?Sized,
    R: RngOracle + ?Sized,
{
    spells: Option<&'a S>,
    tables: Option<&'a T>,
    policy: Option<&'a P>,
    rng: Option<&'a R>,
}

/// Trait-object form used throughout the pipelines.
pub type CombatEnv<'a> = Env<
    'a,
    dyn SpellOracle + 'a,
    dyn TablesOracle + 'a,
    dyn ProcPolicy + 'a,
    dyn RngOracle + 'a,
>;

impl<'a, S, T, P, R> Env<'a, S, T, P, R>
where
    S: SpellOracle + ?Sized,
    T: TablesOracle + ?Sized,
    P: ProcPolicy + ?Sized,
    R: RngOracle + ?Sized,
{
    pub fn new(
        spells: Option<&'a S>,
        tables: Option<&'a T>,
        policy: Option<&'a P>,
        rng: Option<&'a R>,
    ) -> Self {
        Self {
            spells,
            tables,
            policy,
            rng,
        }
    }

    pub fn with_all(spells: &'a S, tables: &'a T, policy: &'a P, rng: &'a R) -> Self {
        Self::new(Some(spells), Some(tables), Some(policy), Some(rng))
    }

    pub fn empty() -> Self {
        Self {
            spells: None,
            tables: None,
            policy: None,
            rng: None,
        }
    }

    /// Returns the SpellOracle, or an error if not available.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::SpellsNotAvailable` if no spell oracle was provided.
    pub fn spells(&self) -> Result<&'a S, OracleError> {
        self.spells.ok_or(OracleError::SpellsNotAvailable)
    }

    /// Returns the TablesOracle, or an error if not available.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::TablesNotAvailable` if no tables oracle was provided.
    pub fn tables(&self) -> Result<&'a T, OracleError> {
        self.tables.ok_or(OracleError::TablesNotAvailable)
    }

    /// Returns the ProcPolicy, or an error if not available.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::PolicyNotAvailable` if no policy was provided.
    pub fn policy(&self) -> Result<&'a P, OracleError> {
        self.policy.ok_or(OracleError::PolicyNotAvailable)
    }

    /// Returns the RngOracle, or an error if not available.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::RngNotAvailable` if no rng oracle was provided.
    pub fn rng(&self) -> Result<&'a R, OracleError> {
        self.rng.ok_or(OracleError::RngNotAvailable)
    }
}

impl<'a, S, T, P, R> Env<'a, S, T, P, R>
where
    S: SpellOracle + 'a,
    T: TablesOracle + 'a,
    P: ProcPolicy + 'a,
    R: RngOracle + 'a,
{
    /// Converts this environment into the trait-object based [`CombatEnv`].
    pub fn as_combat_env(&self) -> CombatEnv<'a> {
        let spells: Option<&'a dyn SpellOracle> = self.spells.map(|spells| spells as _);
        let tables: Option<&'a dyn TablesOracle> = self.tables.map(|tables| tables as _);
        let policy: Option<&'a dyn ProcPolicy> = self.policy.map(|policy| policy as _);
        let rng: Option<&'a dyn RngOracle> = self.rng.map(|rng| rng as _);
        Env::new(spells, tables, policy, rng)
    }
}
