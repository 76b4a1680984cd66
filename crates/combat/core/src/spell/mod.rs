//! Static spell data model.
//!
//! Everything in this module is immutable descriptor data owned by the
//! spell oracle (see [`crate::env::SpellOracle`]). The core never mutates
//! a [`SpellInfo`]; runtime state lives on units and auras.
mod attributes;
mod info;
mod modifiers;

pub use attributes::SpellAttributes;
pub use info::{EffectKind, SpellEffectInfo, SpellInfo, MAX_SPELL_EFFECTS};
pub use modifiers::{ModScope, SpellModKind, SpellModOp, SpellModifier};

/// Stable spell identifier, assigned by the authoritative data tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SpellId(pub u32);

impl SpellId {
    /// The one auto-repeat spell that never interrupts other cast slots.
    pub const AUTO_SHOT: SpellId = SpellId(75);
}

impl core::fmt::Display for SpellId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "spell:{}", self.0)
    }
}

/// Identifier of an exclusive-stacking group ("highest magnitude wins").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExclusiveGroup(pub u16);

bitflags::bitflags! {
    /// Damage school bitmask. A spell may belong to several schools at once.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct SchoolMask: u8 {
        const PHYSICAL = 1 << 0;
        const HOLY     = 1 << 1;
        const FIRE     = 1 << 2;
        const NATURE   = 1 << 3;
        const FROST    = 1 << 4;
        const SHADOW   = 1 << 5;
        const ARCANE   = 1 << 6;
    }
}

impl SchoolMask {
    /// All magical schools (everything but physical).
    pub const MAGIC: SchoolMask = SchoolMask::from_bits_truncate(!SchoolMask::PHYSICAL.bits() & 0x7f);
}

impl Default for SchoolMask {
    fn default() -> Self {
        SchoolMask::PHYSICAL
    }
}

/// How a spell resolves against the avoidance tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DamageClass {
    /// No combat roll at all (utility spells, summons).
    #[default]
    None,
    /// Magic hit table: miss / resist / deflect.
    Magic,
    /// Melee hit table: miss / resist / dodge / parry / block.
    Melee,
    /// Ranged hit table: miss / resist / deflect only.
    Ranged,
}

/// Whether a damage or heal instance comes from a direct hit or a periodic
/// tick. Periodic instances skip the percent-done pipeline because their
/// percentage was baked in at application time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DamageKind {
    Direct,
    Periodic,
}

/// Which weapon drives an attack; selects attack power and weapon speed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttackType {
    #[default]
    Base,
    Off,
    Ranged,
}

/// Dispel category of a spell (what kind of cleanse removes it).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter,
    strum::FromRepr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DispelType {
    #[default]
    None,
    Magic,
    Curse,
    Disease,
    Poison,
    Stealth,
    Enrage,
}

/// Crowd-control / combat mechanic carried by a spell or effect.
///
/// The discriminant doubles as the bit index in a [`MechanicMask`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter,
    strum::FromRepr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Mechanic {
    #[default]
    None = 0,
    Charm = 1,
    Disorient = 2,
    Disarm = 3,
    Fear = 4,
    Root = 5,
    Silence = 6,
    Sleep = 7,
    Snare = 8,
    Stun = 9,
    Freeze = 10,
    Knockout = 11,
    Bleed = 12,
    Polymorph = 13,
    Banish = 14,
    Horror = 15,
    Daze = 16,
    Sap = 17,
    Interrupt = 18,
}

impl Mechanic {
    /// Bitmask with only this mechanic set. `None` maps to the empty mask.
    pub fn mask(self) -> MechanicMask {
        match self {
            Mechanic::None => MechanicMask::empty(),
            other => MechanicMask::from_bits_truncate(1 << other as u8),
        }
    }
}

bitflags::bitflags! {
    /// Set of [`Mechanic`]s, one bit per mechanic discriminant.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct MechanicMask: u32 {
        const CHARM     = 1 << 1;
        const DISORIENT = 1 << 2;
        const DISARM    = 1 << 3;
        const FEAR      = 1 << 4;
        const ROOT      = 1 << 5;
        const SILENCE   = 1 << 6;
        const SLEEP     = 1 << 7;
        const SNARE     = 1 << 8;
        const STUN      = 1 << 9;
        const FREEZE    = 1 << 10;
        const KNOCKOUT  = 1 << 11;
        const BLEED     = 1 << 12;
        const POLYMORPH = 1 << 13;
        const BANISH    = 1 << 14;
        const HORROR    = 1 << 15;
        const DAZE      = 1 << 16;
        const SAP       = 1 << 17;
        const INTERRUPT = 1 << 18;
    }
}

/// Spell family, used by talent-style modifiers and the special-case rule
/// table in the bonus pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpellFamily {
    #[default]
    Generic,
    Mage,
    Warrior,
    Warlock,
    Priest,
    Druid,
    Rogue,
    Hunter,
    Paladin,
    Shaman,
    DeathKnight,
    Potion,
}

/// Resource a caster spends. Only `Mana` grants Intellect-derived spell power.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerType {
    #[default]
    Mana,
    Rage,
    Energy,
    Focus,
    RunicPower,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanic_mask_matches_discriminant_bit() {
        assert_eq!(Mechanic::Stun.mask(), MechanicMask::STUN);
        assert_eq!(Mechanic::Fear.mask(), MechanicMask::FEAR);
        assert!(Mechanic::None.mask().is_empty());
    }

    #[test]
    fn magic_school_mask_excludes_physical() {
        assert!(!SchoolMask::MAGIC.contains(SchoolMask::PHYSICAL));
        assert!(SchoolMask::MAGIC.contains(SchoolMask::FIRE | SchoolMask::ARCANE));
    }
}
