//! Rule-table oracle.
//!
//! Balance data that is neither per-spell descriptor data nor runtime
//! state: proc-event overrides, creature rank tuning, and the small
//! hardcoded exception lists the resolution rules consult.

use crate::proc::{ProcExtra, ProcFlags};
use crate::spell::{SchoolMask, SpellFamily, SpellId};
use crate::state::CreatureRank;

/// Override entry from the proc-event table.
///
/// When present for a spell, it replaces or narrows how that spell's auras
/// qualify for procs; absent fields fall back to the spell descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcEventEntry {
    /// Replaces the spell's own proc flags when non-empty.
    pub proc_flags: ProcFlags,
    /// Required school of the triggering spell (empty = any).
    pub school_mask: SchoolMask,
    /// Required family of the triggering spell.
    pub spell_family: SpellFamily,
    /// Family flags the triggering spell must intersect (0 = any).
    pub family_flags: u64,
    /// Required extra outcome bits (crit, dodge, ...); empty = normal hits.
    pub proc_ex: ProcExtra,
    /// Replaces the spell's proc chance when positive.
    pub custom_chance: f32,
    /// Procs-per-minute rate; scales with weapon speed when positive.
    pub ppm_rate: f32,
    /// Proc cooldown in whole seconds.
    pub cooldown_s: u32,
}

/// Read-only access to combat rule tables.
pub trait TablesOracle: Send + Sync {
    /// Proc-event override for a spell, if the table has one.
    fn proc_event(&self, spell: SpellId) -> Option<ProcEventEntry>;

    /// Damage multiplier for spells cast by a creature of this rank.
    fn creature_rank_spell_damage_mod(&self, rank: CreatureRank) -> f32 {
        let _ = rank;
        1.0
    }

    /// Spells with no damage class that still roll magic crit.
    fn crits_like_magic(&self, spell: SpellId) -> bool {
        let _ = spell;
        false
    }

    /// Creature-cast spells exempt from the "creatures cannot spell-crit"
    /// rule.
    fn creature_can_crit(&self, spell: SpellId) -> bool {
        let _ = spell;
        false
    }

    /// Duration cap applied by diminishing returns when the target is a
    /// player (or player-diminished creature).
    fn dr_limit_duration_ms(&self, spell: SpellId) -> Option<u32> {
        let _ = spell;
        None
    }
}
