//! Deterministic combat resolution for the game server.
//!
//! `combat-core` implements the authoritative spell pipeline: hit and miss
//! tables, done/taken bonus scaling, aura lifecycle with stacking and
//! diminishing returns, the proc engine, and the cast session controller.
//! All state lives in [`state::CombatArena`]; spell data, rule tables,
//! policy hooks, and randomness are injected through the oracle traits in
//! [`env`], so the same inputs always produce the same outcome.
pub mod aura;
pub mod bonus;
pub mod cast;
pub mod dr;
pub mod env;
pub mod error;
pub mod events;
pub mod hit;
pub mod proc;
pub mod spell;
pub mod state;

pub use aura::{
    Aura, AuraApplication, AuraEffect, AuraError, AuraId, AuraKind, EffectRef, RemoveMode,
    lifecycle::AuraSnapshot,
};
pub use cast::{CastError, CastSession, CastSlot, CastSlots, CastState};
pub use dr::{DiminishGroup, DiminishingTracker};
pub use env::{
    CombatEnv, DefaultProcPolicy, Env, OracleError, PcgRng, ProcEventEntry, ProcPolicy, RngOracle,
    SpellOracle, TablesOracle, compute_seed,
};
pub use error::{CombatError, ErrorSeverity};
pub use events::CombatEvent;
pub use hit::{FacingContext, SpellMissInfo};
pub use proc::{ProcContext, ProcExtra, ProcFlags};
pub use spell::{
    AttackType, DamageClass, DamageKind, DispelType, EffectKind, ExclusiveGroup,
    MAX_SPELL_EFFECTS, Mechanic, MechanicMask, ModScope, PowerType, SchoolMask, SpellAttributes,
    SpellEffectInfo, SpellFamily, SpellId, SpellInfo, SpellModKind, SpellModOp, SpellModifier,
};
pub use state::{
    AuraStateType, CombatArena, CreatureFlags, CreatureRank, CreatureTypeMask, EffectSnapshot,
    Immunity, ImmunityTable, ReactiveType, StateError, Unit, UnitBuilder, UnitClass, UnitId,
    UnitKind, UnitState,
};
