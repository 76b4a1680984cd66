//! Combat event log.
//!
//! Every observable outcome of resolution is recorded on the arena's event
//! buffer. The host drains it after each action to drive packets, combat
//! log, and script hooks; tests assert on it directly.

use crate::aura::{AuraId, RemoveMode};
use crate::hit::SpellMissInfo;
use crate::spell::SpellId;
use crate::state::UnitId;

#[derive(Clone, Debug, PartialEq)]
pub enum CombatEvent {
    /// A hostile spell failed to land.
    SpellMissed {
        caster: UnitId,
        target: UnitId,
        spell: SpellId,
        miss: SpellMissInfo,
    },
    SpellDamage {
        caster: UnitId,
        target: UnitId,
        spell: SpellId,
        amount: u32,
        crit: bool,
        periodic: bool,
    },
    SpellHeal {
        caster: UnitId,
        target: UnitId,
        spell: SpellId,
        amount: u32,
        crit: bool,
        periodic: bool,
    },
    AuraApplied {
        target: UnitId,
        aura: AuraId,
        spell: SpellId,
        stacks: u8,
    },
    AuraRemoved {
        target: UnitId,
        aura: AuraId,
        spell: SpellId,
        mode: RemoveMode,
    },
    /// A proc aura fired its handler.
    ProcTriggered {
        owner: UnitId,
        aura: AuraId,
        spell: SpellId,
        trigger: Option<SpellId>,
    },
    CastStarted {
        caster: UnitId,
        spell: SpellId,
    },
    CastInterrupted {
        caster: UnitId,
        spell: SpellId,
    },
    CastFinished {
        caster: UnitId,
        spell: SpellId,
    },
    /// Channel progress update; `remaining_ms == 0` closes the channel.
    ChannelUpdate {
        caster: UnitId,
        spell: SpellId,
        remaining_ms: u32,
    },
    UnitDied {
        unit: UnitId,
    },
}
