//! Spell modifiers (talent-style adjustments owned by a caster).
//!
//! A modifier changes one numeric property of the spells it matches. The
//! pipelines ask [`crate::state::Unit::apply_spell_mod`] at the exact points
//! the legacy rules do, so modifier order relative to aura bonuses is fixed.

use super::{SpellFamily, SpellInfo};

/// Which numeric property of a spell a modifier adjusts.
///
/// The discriminant is the misc value used by modifier-granting auras.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::FromRepr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SpellModOp {
    /// Direct damage / heal amount.
    Damage,
    /// Periodic tick amount.
    Dot,
    /// Bonus coefficient (SP/AP scaling).
    BonusMultiplier,
    /// Crit chance in percent.
    CriticalChance,
    /// Extra crit damage bonus in percent.
    CritDamageBonus,
    /// Proc chance in percent.
    ChanceOfSuccess,
    /// Chance for the target to avoid the spell (negative = harder to miss).
    ResistMissChance,
    /// Cast time in milliseconds.
    CastingTime,
}

/// Flat addend or percentage adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpellModKind {
    Flat,
    Pct,
}

/// Which spells a modifier applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModScope {
    /// Exactly one spell id.
    Spell(super::SpellId),
    /// Every spell of a family whose `family_flags` intersect the mask.
    Family(SpellFamily, u64),
    /// Every spell the owner casts.
    All,
}

impl ModScope {
    pub fn matches(&self, spell: &SpellInfo) -> bool {
        match *self {
            ModScope::Spell(id) => spell.id == id,
            ModScope::Family(family, flags) => {
                spell.family == family && spell.family_flags & flags != 0
            }
            ModScope::All => true,
        }
    }
}

/// One modifier instance carried by a unit.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpellModifier {
    pub op: SpellModOp,
    pub kind: SpellModKind,
    pub scope: ModScope,
    pub value: f32,
}

impl SpellModifier {
    pub fn flat(op: SpellModOp, scope: ModScope, value: f32) -> Self {
        Self {
            op,
            kind: SpellModKind::Flat,
            scope,
            value,
        }
    }

    pub fn pct(op: SpellModOp, scope: ModScope, value: f32) -> Self {
        Self {
            op,
            kind: SpellModKind::Pct,
            scope,
            value,
        }
    }

    /// Fold this modifier into `value` if it matches `spell` and `op`.
    ///
    /// Flat mods add; percent mods scale by `1 + value/100`. Both run in
    /// owner insertion order, flat before percent per the caller.
    pub fn fold(&self, op: SpellModOp, spell: &SpellInfo, value: f32) -> f32 {
        if self.op != op || !self.scope.matches(spell) {
            return value;
        }
        match self.kind {
            SpellModKind::Flat => value + self.value,
            SpellModKind::Pct => value * (1.0 + self.value / 100.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spell::SpellId;

    #[test]
    fn family_scope_requires_flag_intersection() {
        let spell = SpellInfo::builder(SpellId(10))
            .family(SpellFamily::Mage, 0b0110)
            .build();
        assert!(ModScope::Family(SpellFamily::Mage, 0b0100).matches(&spell));
        assert!(!ModScope::Family(SpellFamily::Mage, 0b1000).matches(&spell));
        assert!(!ModScope::Family(SpellFamily::Warlock, 0b0100).matches(&spell));
    }

    #[test]
    fn fold_ignores_other_ops() {
        let spell = SpellInfo::builder(SpellId(11)).build();
        let m = SpellModifier::pct(SpellModOp::Damage, ModScope::All, 50.0);
        assert_eq!(m.fold(SpellModOp::Damage, &spell, 100.0), 150.0);
        assert_eq!(m.fold(SpellModOp::Dot, &spell, 100.0), 100.0);
    }
}
