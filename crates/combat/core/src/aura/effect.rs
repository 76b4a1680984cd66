//! Aura effect kinds and per-slot runtime state.

use crate::spell::{SpellEffectInfo, SpellId};

/// What a single aura effect slot does while applied.
///
/// Closed set, dispatched by `match` in the bonus pipeline, the proc
/// engine, and the lifecycle side-effect handlers.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AuraKind {
    #[default]
    None,

    // ====================================================================
    // Periodic
    // ====================================================================
    PeriodicDamage,
    PeriodicHeal,
    PeriodicLeech,

    // ====================================================================
    // Done-side damage and healing bonuses
    // ====================================================================
    /// Flat bonus damage done; misc = school mask.
    ModDamageDone,
    /// Percent bonus damage done; misc = school mask.
    ModDamagePercentDone,
    /// Flat bonus healing done; misc = 0 or school mask.
    ModHealingDone,
    /// Percent bonus healing done.
    ModHealingDonePercent,
    /// Spell power from a fraction of a stat; misc_b = stat index.
    ModSpellDamageOfStatPercent,
    /// Spell power from a fraction of attack power.
    ModSpellDamageOfAttackPower,
    /// Percent damage done versus creature types; misc = creature type mask.
    ModDamageDoneVersus,
    /// Percent damage done versus targets in an aura state; misc = state.
    ModDamageDoneVersusAuraState,
    /// Percent damage done with a given mechanic; misc = mechanic.
    ModDamageDoneForMechanic,
    /// Per-caster percent damage bonus applied on the victim.
    ModSpellDamageFromCaster,
    /// Attackers gain this much extra attack power against the bearer.
    MeleeAttackPowerAttackerBonus,
    /// Ignore a share of the target's school resistance; misc = school mask.
    ModIgnoreTargetResist,

    // ====================================================================
    // Taken-side damage and healing modifiers
    // ====================================================================
    /// Flat damage taken; misc = school mask.
    ModDamageTaken,
    /// Percent damage taken; misc = school mask. Stacks multiplicatively.
    ModDamagePercentTaken,
    /// Percent damage taken from a mechanic; misc = mechanic.
    ModMechanicDamageTakenPercent,
    /// Percent healing received.
    ModHealingPct,
    /// Per-caster percent healing received.
    ModHealingReceived,

    // ====================================================================
    // Hit and crit
    // ====================================================================
    /// Melee/ranged hit chance on the attacker.
    ModHitChance,
    /// Spell hit chance on the caster.
    ModSpellHitChance,
    /// Attackers' spell hit chance against the bearer; misc = school mask.
    ModAttackerSpellHitChance,
    /// Attackers' spell and weapon crit against the bearer; misc = school mask.
    ModAttackerSpellAndWeaponCritChance,
    /// Crit chance granted to one specific caster against the bearer.
    ModCritChanceForCaster,
    /// Extra crit damage percent; misc = school mask.
    ModCritDamageBonus,
    /// Extra crit healing multiplier.
    ModCriticalHealingAmount,

    // ====================================================================
    // Avoidance and deflection
    // ====================================================================
    /// Chance to reflect any spell.
    ReflectSpells,
    /// Chance to reflect spells of a school; misc = school mask.
    ReflectSpellsSchool,
    /// Chance to deflect incoming spells.
    DeflectSpells,
    /// Allows deflecting attacks from behind.
    IgnoreHitDirection,
    /// Attacker ignores one combat result; misc = outcome discriminant.
    IgnoreCombatResult,

    // ====================================================================
    // Crowd control
    // ====================================================================
    ModStun,
    ModFear,
    ModConfuse,
    ModRoot,
    Transform,

    // ====================================================================
    // Immunity
    // ====================================================================
    /// misc = school mask.
    SchoolImmunity,
    /// misc = school mask.
    DamageImmunity,
    /// misc = dispel type discriminant.
    DispelImmunity,
    /// misc = mechanic discriminant.
    MechanicImmunity,
    /// Percent chance to resist a mechanic; misc = mechanic.
    MechanicResistance,
    /// Immunity to harmful magic aura application; misc = school mask.
    ModImmuneAuraApplySchool,

    // ====================================================================
    // Proc handlers
    // ====================================================================
    /// Cast the slot's trigger spell on proc.
    ProcTriggerSpell,
    /// Like `ProcTriggerSpell`, passing the effect amount as base points.
    ProcTriggerSpellWithValue,
    /// Deal the effect amount as direct damage on proc.
    ProcTriggerDamage,
    /// Script hook carrier; also procs.
    Dummy,
    /// Mana shield; charge-based absorb that procs.
    ManaShield,
    /// School damage absorb; misc = school mask.
    SchoolAbsorb,
    /// Charge relay that jumps to a raid member on proc.
    RaidProcFromCharge,
    /// Charge relay passing the effect amount along.
    RaidProcFromChargeWithValue,
    /// Cast-speed modifier that loses a charge per (non-instant) cast.
    ModCastingSpeedNotStack,
    /// Power cost modifier; misc = school mask.
    ModPowerCostSchool,

    // ====================================================================
    // Spell modifiers
    // ====================================================================
    /// Grants a flat spell modifier; misc = modifier op, misc_b = family
    /// flag mask (0 = all spells).
    AddFlatModifier,
    /// Grants a percent spell modifier; same misc encoding.
    AddPctModifier,
}

impl AuraKind {
    /// CC kinds whose remaining strength is damage-limited: taking damage
    /// bleeds the effect amount and breaks the aura when it runs out.
    pub fn is_damage_limited_cc(self) -> bool {
        matches!(
            self,
            AuraKind::ModStun
                | AuraKind::ModFear
                | AuraKind::ModConfuse
                | AuraKind::ModRoot
                | AuraKind::Transform
        )
    }
}

/// Runtime state of one applied effect slot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AuraEffect {
    pub kind: AuraKind,
    /// Per-stack amount from the spell descriptor.
    pub base_amount: i32,
    /// Current amount, scaled by stack count. Damage-limited CC bleeds it.
    pub amount: i32,
    pub misc_value: i32,
    pub misc_value_b: i32,
    pub period_ms: u32,
    /// Arena time of the next periodic tick (0 = not periodic).
    pub next_tick_ms: u64,
    /// Ticks already delivered.
    pub tick_number: u32,
    pub trigger_spell: Option<SpellId>,
}

impl AuraEffect {
    pub(crate) fn from_effect_info(info: &SpellEffectInfo, now_ms: u64) -> Option<Self> {
        let kind = info.aura_kind()?;
        Some(AuraEffect {
            kind,
            base_amount: info.base_points,
            amount: info.base_points,
            misc_value: info.misc_value,
            misc_value_b: info.misc_value_b,
            period_ms: info.period_ms,
            next_tick_ms: if info.period_ms > 0 {
                now_ms + info.period_ms as u64
            } else {
                0
            },
            tick_number: 0,
            trigger_spell: info.trigger_spell,
        })
    }

    pub fn is_periodic(&self) -> bool {
        self.period_ms > 0
    }

    /// Ticks a full-duration aura delivers in total.
    pub fn total_ticks(&self, max_duration_ms: i32) -> u32 {
        if self.period_ms == 0 || max_duration_ms <= 0 {
            return 0;
        }
        max_duration_ms as u32 / self.period_ms
    }

    /// Damage still owed by the remaining ticks, rounded down per tick.
    ///
    /// Used when a dot is handed over or split so the new instance cannot
    /// deliver more than what the old one had left.
    pub fn remaining_periodic_amount(&self, max_duration_ms: i32) -> i32 {
        let total = self.total_ticks(max_duration_ms);
        if total == 0 {
            return self.amount;
        }
        let remaining = total.saturating_sub(self.tick_number);
        self.amount * remaining as i32 / total as i32
    }

    /// Rescale the live amount after a stack change. Resets any CC damage
    /// bleed.
    pub(crate) fn recalculate_amount(&mut self, stacks: u8) {
        self.amount = self.base_amount * stacks.max(1) as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_periodic_amount_scales_with_delivered_ticks() {
        let effect = AuraEffect {
            kind: AuraKind::PeriodicDamage,
            base_amount: 100,
            amount: 100,
            period_ms: 3000,
            tick_number: 2,
            ..AuraEffect::default()
        };
        // 12s / 3s = 4 ticks total, 2 delivered.
        assert_eq!(effect.remaining_periodic_amount(12_000), 50);
        // All delivered.
        let spent = AuraEffect {
            tick_number: 4,
            ..effect
        };
        assert_eq!(spent.remaining_periodic_amount(12_000), 0);
    }

    #[test]
    fn recalculate_amount_multiplies_by_stacks() {
        let mut effect = AuraEffect {
            kind: AuraKind::ModDamageDone,
            base_amount: 30,
            amount: 30,
            ..AuraEffect::default()
        };
        effect.recalculate_amount(3);
        assert_eq!(effect.amount, 90);
        effect.recalculate_amount(0);
        assert_eq!(effect.amount, 30);
    }
}
