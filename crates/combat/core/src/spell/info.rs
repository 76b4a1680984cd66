//! Spell and spell-effect descriptors.

use arrayvec::ArrayVec;

use crate::aura::AuraKind;
use crate::dr::DiminishGroup;

use super::{
    AttackType, DamageClass, DispelType, ExclusiveGroup, Mechanic, MechanicMask, PowerType,
    SchoolMask, SpellAttributes, SpellFamily, SpellId,
};
use crate::proc::ProcFlags;

/// A spell carries at most five effect slots.
pub const MAX_SPELL_EFFECTS: usize = 5;

/// What an individual effect slot does when the spell lands.
///
/// This is a closed set: effect kinds are domain data, not an extension
/// point, so dispatch is a plain `match` everywhere.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EffectKind {
    /// Empty slot.
    #[default]
    None,
    /// Direct school damage.
    SchoolDamage,
    /// Direct heal.
    Heal,
    /// Damage the target, heal the caster. Excluded from all bonuses.
    HealthLeech,
    /// Apply a standing aura of the given kind.
    ApplyAura(AuraKind),
    /// Cast another spell on the target.
    TriggerSpell,
    /// Restore caster resource.
    Energize,
}

/// One effect slot of a spell descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SpellEffectInfo {
    pub kind: EffectKind,
    /// Authored base magnitude before any caster scaling.
    pub base_points: i32,
    /// Extra random range on top of `base_points` (0 = fixed value).
    pub die_sides: i32,
    /// Spell-power coefficient for the flat bonus pipeline.
    pub bonus_coefficient: f32,
    /// Attack-power coefficient; when nonzero it replaces the SP path.
    pub bonus_coefficient_from_ap: f32,
    /// Linked spell cast by trigger effects and proc-trigger auras.
    pub trigger_spell: Option<SpellId>,
    /// Mechanic carried by this effect alone (spell-wide mechanic is on
    /// [`SpellInfo`]).
    pub mechanic: Mechanic,
    /// Kind-specific selector: school mask for damage/heal modifiers,
    /// mechanic for immunities, aura-state id for versus bonuses.
    pub misc_value: i32,
    /// Secondary selector (e.g. which stat a stat-percent conversion reads).
    pub misc_value_b: i32,
    /// Tick period for periodic auras, in milliseconds.
    pub period_ms: u32,
}

impl SpellEffectInfo {
    pub fn aura(kind: AuraKind, base_points: i32) -> Self {
        Self {
            kind: EffectKind::ApplyAura(kind),
            base_points,
            ..Self::default()
        }
    }

    pub fn school_damage(base_points: i32) -> Self {
        Self {
            kind: EffectKind::SchoolDamage,
            base_points,
            ..Self::default()
        }
    }

    pub fn heal(base_points: i32) -> Self {
        Self {
            kind: EffectKind::Heal,
            base_points,
            ..Self::default()
        }
    }

    pub fn with_coefficient(mut self, coefficient: f32) -> Self {
        self.bonus_coefficient = coefficient;
        self
    }

    pub fn with_ap_coefficient(mut self, coefficient: f32) -> Self {
        self.bonus_coefficient_from_ap = coefficient;
        self
    }

    pub fn with_trigger(mut self, spell: SpellId) -> Self {
        self.trigger_spell = Some(spell);
        self
    }

    pub fn with_mechanic(mut self, mechanic: Mechanic) -> Self {
        self.mechanic = mechanic;
        self
    }

    pub fn with_misc(mut self, misc_value: i32) -> Self {
        self.misc_value = misc_value;
        self
    }

    pub fn with_period(mut self, period_ms: u32) -> Self {
        self.period_ms = period_ms;
        self
    }

    /// True if the slot is populated at all.
    pub fn is_effect(&self) -> bool {
        self.kind != EffectKind::None
    }

    /// The aura kind applied by this slot, if it is an aura effect.
    pub fn aura_kind(&self) -> Option<AuraKind> {
        match self.kind {
            EffectKind::ApplyAura(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Immutable descriptor of one spell, read from the data tables.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SpellInfo {
    pub id: SpellId,
    pub name: String,
    pub school_mask: SchoolMask,
    pub damage_class: DamageClass,
    pub dispel: DispelType,
    pub mechanic: Mechanic,
    pub family: SpellFamily,
    /// Family-internal classification bits, matched by spell modifiers and
    /// the special-case rule table.
    pub family_flags: u64,
    pub attributes: SpellAttributes,
    /// Level the spell was authored for; drives the level penalty.
    pub spell_level: u32,
    pub max_level: u32,
    pub power_type: PowerType,
    /// Events this spell's auras may proc from (empty = never).
    pub proc_flags: ProcFlags,
    /// Flat proc chance in percent.
    pub proc_chance: f32,
    /// Charges granted to auras of this spell (0 = not charge-based).
    pub proc_charges: u8,
    /// Spell-defined proc cooldown in milliseconds.
    pub proc_cooldown_ms: u32,
    /// Custom proc-per-minute base rate (overrides every other chance source).
    pub proc_base_ppm: f32,
    /// Maximum stack count (0 and 1 both mean "does not stack").
    pub max_stacks: u8,
    /// Aura duration in ms; -1 means permanent.
    pub duration_ms: i32,
    pub cast_time_ms: u32,
    /// Projectile speed in yards/second (0 = instant delivery).
    pub speed: f32,
    pub dr_group: DiminishGroup,
    pub exclusive_group: Option<ExclusiveGroup>,
    /// Beneficial spell: always lands on friendly targets.
    pub positive: bool,
    pub effects: ArrayVec<SpellEffectInfo, MAX_SPELL_EFFECTS>,
}

impl SpellInfo {
    pub fn builder(id: SpellId) -> SpellInfoBuilder {
        SpellInfoBuilder {
            info: SpellInfo {
                id,
                ..SpellInfo::default()
            },
        }
    }

    pub fn has_attribute(&self, attr: SpellAttributes) -> bool {
        self.attributes.contains(attr)
    }

    pub fn is_positive(&self) -> bool {
        self.positive
    }

    pub fn is_passive(&self) -> bool {
        self.has_attribute(SpellAttributes::PASSIVE)
    }

    pub fn is_channeled(&self) -> bool {
        self.has_attribute(SpellAttributes::CHANNELED)
    }

    pub fn is_auto_repeat(&self) -> bool {
        self.has_attribute(SpellAttributes::AUTO_REPEAT)
    }

    pub fn effect(&self, index: usize) -> Option<&SpellEffectInfo> {
        self.effects.get(index).filter(|eff| eff.is_effect())
    }

    /// Mask with every populated effect slot set.
    pub fn full_effect_mask(&self) -> u8 {
        let mut mask = 0;
        for (i, eff) in self.effects.iter().enumerate() {
            if eff.is_effect() {
                mask |= 1 << i;
            }
        }
        mask
    }

    /// Union of the spell-wide mechanic and every effect mechanic.
    pub fn all_effects_mechanic_mask(&self) -> MechanicMask {
        let mut mask = self.mechanic.mask();
        for eff in &self.effects {
            mask |= eff.mechanic.mask();
        }
        mask
    }

    /// True if any effect slot applies the given aura kind.
    pub fn has_aura_kind(&self, kind: AuraKind) -> bool {
        self.effects.iter().any(|eff| eff.aura_kind() == Some(kind))
    }

    /// Weapon slot backing this spell's power scaling.
    pub fn attack_type(&self) -> AttackType {
        match self.damage_class {
            DamageClass::Ranged => AttackType::Ranged,
            _ => AttackType::Base,
        }
    }

    /// True if this spell's auras consume charges rather than stacks.
    pub fn uses_charges(&self) -> bool {
        self.proc_charges > 0
    }
}

/// Builder used by the content loaders and tests.
#[derive(Clone, Debug)]
pub struct SpellInfoBuilder {
    info: SpellInfo,
}

impl SpellInfoBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    pub fn school(mut self, mask: SchoolMask) -> Self {
        self.info.school_mask = mask;
        self
    }

    pub fn damage_class(mut self, class: DamageClass) -> Self {
        self.info.damage_class = class;
        self
    }

    pub fn dispel(mut self, dispel: DispelType) -> Self {
        self.info.dispel = dispel;
        self
    }

    pub fn mechanic(mut self, mechanic: Mechanic) -> Self {
        self.info.mechanic = mechanic;
        self
    }

    pub fn family(mut self, family: SpellFamily, flags: u64) -> Self {
        self.info.family = family;
        self.info.family_flags = flags;
        self
    }

    pub fn attributes(mut self, attrs: SpellAttributes) -> Self {
        self.info.attributes |= attrs;
        self
    }

    pub fn spell_level(mut self, level: u32, max_level: u32) -> Self {
        self.info.spell_level = level;
        self.info.max_level = max_level;
        self
    }

    pub fn power_type(mut self, power: PowerType) -> Self {
        self.info.power_type = power;
        self
    }

    pub fn proc(mut self, flags: ProcFlags, chance: f32, charges: u8) -> Self {
        self.info.proc_flags = flags;
        self.info.proc_chance = chance;
        self.info.proc_charges = charges;
        self
    }

    pub fn proc_cooldown_ms(mut self, cooldown: u32) -> Self {
        self.info.proc_cooldown_ms = cooldown;
        self
    }

    pub fn proc_base_ppm(mut self, ppm: f32) -> Self {
        self.info.proc_base_ppm = ppm;
        self
    }

    pub fn max_stacks(mut self, stacks: u8) -> Self {
        self.info.max_stacks = stacks;
        self
    }

    pub fn duration_ms(mut self, duration: i32) -> Self {
        self.info.duration_ms = duration;
        self
    }

    pub fn cast_time_ms(mut self, cast_time: u32) -> Self {
        self.info.cast_time_ms = cast_time;
        self
    }

    pub fn speed(mut self, speed: f32) -> Self {
        self.info.speed = speed;
        self
    }

    pub fn dr_group(mut self, group: DiminishGroup) -> Self {
        self.info.dr_group = group;
        self
    }

    pub fn exclusive_group(mut self, group: ExclusiveGroup) -> Self {
        self.info.exclusive_group = Some(group);
        self
    }

    pub fn positive(mut self, positive: bool) -> Self {
        self.info.positive = positive;
        self
    }

    pub fn effect(mut self, effect: SpellEffectInfo) -> Self {
        // Data past the fixed slot count is an authoring error.
        let overflow = self.info.effects.try_push(effect).is_err();
        debug_assert!(
            !overflow,
            "spell defines more than {MAX_SPELL_EFFECTS} effects"
        );
        self
    }

    pub fn build(self) -> SpellInfo {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_effect_mask_skips_empty_slots() {
        let spell = SpellInfo::builder(SpellId(1))
            .effect(SpellEffectInfo::school_damage(10))
            .effect(SpellEffectInfo::default())
            .effect(SpellEffectInfo::aura(AuraKind::PeriodicDamage, 5))
            .build();
        assert_eq!(spell.full_effect_mask(), 0b101);
    }

    #[test]
    fn mechanic_mask_unions_spell_and_effects() {
        let spell = SpellInfo::builder(SpellId(2))
            .mechanic(Mechanic::Stun)
            .effect(SpellEffectInfo::school_damage(1).with_mechanic(Mechanic::Snare))
            .build();
        let mask = spell.all_effects_mechanic_mask();
        assert!(mask.contains(MechanicMask::STUN | MechanicMask::SNARE));
        assert!(!mask.contains(MechanicMask::FEAR));
    }

    #[test]
    #[should_panic(expected = "more than")]
    fn builder_rejects_a_sixth_effect() {
        let mut builder = SpellInfo::builder(SpellId(3));
        for _ in 0..=MAX_SPELL_EFFECTS {
            builder = builder.effect(SpellEffectInfo::school_damage(1));
        }
        let _ = builder.build();
    }
}
