//! Host policy hooks for the proc engine.
//!
//! A few proc decisions depend on data the combat core does not model:
//! scripted conditions, equipped-item checks, and raid-jump target
//! selection. The host injects them through this trait; every method has a
//! permissive default so tests can run against [`DefaultProcPolicy`].

use crate::spell::SpellId;
use crate::state::UnitId;

pub trait ProcPolicy: Send + Sync {
    /// Scripted condition attached to a proc aura. Returning false vetoes
    /// the proc before the chance roll.
    fn condition_satisfied(&self, owner: UnitId, target: Option<UnitId>, spell: SpellId) -> bool {
        let _ = (owner, target, spell);
        true
    }

    /// Equipment requirement for player-owned proc auras (weapon class,
    /// item class masks).
    fn equipment_satisfied(&self, owner: UnitId, spell: SpellId) -> bool {
        let _ = (owner, spell);
        true
    }

    /// Next target a raid-relay charge jumps to; `None` ends the relay.
    fn next_jump_target(&self, owner: UnitId, spell: SpellId) -> Option<UnitId> {
        let _ = (owner, spell);
        None
    }
}

/// Policy with every hook at its permissive default.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProcPolicy;

impl ProcPolicy for DefaultProcPolicy {}
