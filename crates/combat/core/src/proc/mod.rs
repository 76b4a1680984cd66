//! Proc event classification and the trigger context.
//!
//! Every resolved hit, heal, tick, or kill is described by a pair of bit
//! sets: [`ProcFlags`] says what happened and from whose side, [`ProcExtra`]
//! says how it turned out. Aura descriptors and proc-event table entries
//! carry the same bits, so qualification is mask intersection.

mod engine;

pub use engine::proc_damage_and_spell;

use crate::spell::SpellInfo;
use crate::state::UnitId;

bitflags::bitflags! {
    /// What kind of event is procing, from the perspective of the unit
    /// whose auras are being checked. `DONE_*` bits fire on the attacker,
    /// `TAKEN_*` bits on the defender.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct ProcFlags: u32 {
        /// This unit was killed.
        const KILLED = 1 << 0;
        /// This unit scored a killing blow.
        const KILL = 1 << 1;

        const DONE_MELEE_AUTO_ATTACK = 1 << 2;
        const TAKEN_MELEE_AUTO_ATTACK = 1 << 3;
        const DONE_SPELL_MELEE_DMG_CLASS = 1 << 4;
        const TAKEN_SPELL_MELEE_DMG_CLASS = 1 << 5;

        const DONE_RANGED_AUTO_ATTACK = 1 << 6;
        const TAKEN_RANGED_AUTO_ATTACK = 1 << 7;
        const DONE_SPELL_RANGED_DMG_CLASS = 1 << 8;
        const TAKEN_SPELL_RANGED_DMG_CLASS = 1 << 9;

        const DONE_SPELL_NONE_DMG_CLASS_POS = 1 << 10;
        const TAKEN_SPELL_NONE_DMG_CLASS_POS = 1 << 11;
        const DONE_SPELL_NONE_DMG_CLASS_NEG = 1 << 12;
        const TAKEN_SPELL_NONE_DMG_CLASS_NEG = 1 << 13;

        const DONE_SPELL_MAGIC_DMG_CLASS_POS = 1 << 14;
        const TAKEN_SPELL_MAGIC_DMG_CLASS_POS = 1 << 15;
        const DONE_SPELL_MAGIC_DMG_CLASS_NEG = 1 << 16;
        const TAKEN_SPELL_MAGIC_DMG_CLASS_NEG = 1 << 17;

        const DONE_PERIODIC = 1 << 18;
        const TAKEN_PERIODIC = 1 << 19;

        /// Any damage landed on this unit, regardless of source class.
        const TAKEN_ANY_DAMAGE = 1 << 20;
    }
}

impl ProcFlags {
    /// Every defender-side bit.
    pub const TAKEN: ProcFlags = ProcFlags::KILLED
        .union(ProcFlags::TAKEN_MELEE_AUTO_ATTACK)
        .union(ProcFlags::TAKEN_SPELL_MELEE_DMG_CLASS)
        .union(ProcFlags::TAKEN_RANGED_AUTO_ATTACK)
        .union(ProcFlags::TAKEN_SPELL_RANGED_DMG_CLASS)
        .union(ProcFlags::TAKEN_SPELL_NONE_DMG_CLASS_POS)
        .union(ProcFlags::TAKEN_SPELL_NONE_DMG_CLASS_NEG)
        .union(ProcFlags::TAKEN_SPELL_MAGIC_DMG_CLASS_POS)
        .union(ProcFlags::TAKEN_SPELL_MAGIC_DMG_CLASS_NEG)
        .union(ProcFlags::TAKEN_PERIODIC)
        .union(ProcFlags::TAKEN_ANY_DAMAGE);

    /// True if the event is seen from the defender's side.
    pub fn is_taken(self) -> bool {
        self.intersects(ProcFlags::TAKEN)
    }
}

bitflags::bitflags! {
    /// Outcome qualifiers of the procing event.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ProcExtra: u32 {
        const NORMAL_HIT = 1 << 0;
        const CRITICAL_HIT = 1 << 1;
        const MISS = 1 << 2;
        const RESIST = 1 << 3;
        const DODGE = 1 << 4;
        const PARRY = 1 << 5;
        const BLOCK = 1 << 6;
        const EVADE = 1 << 7;
        const IMMUNE = 1 << 8;
        const DEFLECT = 1 << 9;
        const ABSORB = 1 << 10;
        const REFLECT = 1 << 11;
        const INTERRUPT = 1 << 12;
        /// The procing cast was itself triggered by another proc.
        const INTERNAL_TRIGGERED = 1 << 13;
    }
}

impl ProcExtra {
    /// Outcomes that count as the spell landing.
    pub const ACTIVE_HIT: ProcExtra =
        ProcExtra::NORMAL_HIT.union(ProcExtra::CRITICAL_HIT);
}

/// One proc-worthy event, described from the side of `actor`.
///
/// The engine walks `actor`'s auras and fires every one whose proc mask
/// matches. Both sides of an exchange get their own context.
#[derive(Clone, Copy, Debug)]
pub struct ProcContext<'a> {
    /// Unit whose auras are checked.
    pub actor: UnitId,
    /// The other party of the exchange, when there is one.
    pub victim: Option<UnitId>,
    pub proc_flags: ProcFlags,
    pub proc_extra: ProcExtra,
    /// Damage or healing amount carried by the event.
    pub damage: u32,
    /// Spell that produced the event; `None` for plain auto attacks.
    pub spell: Option<&'a SpellInfo>,
    /// True when the event came from a triggered cast.
    pub triggered: bool,
}
