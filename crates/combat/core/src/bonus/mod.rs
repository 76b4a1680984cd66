//! Damage and healing bonus pipelines.
//!
//! Done-side bonuses are computed on the caster and are additive; taken-side
//! percent modifiers on the victim stack multiplicatively. Every pipeline
//! floors its result at zero.

mod rules;

pub use rules::{
    MAGE_SHARD_VS_FROZEN, PALADIN_EXORCISM, SHAMAN_LAVA_BURST, WARLOCK_SHADOW_BITE,
    WARLOCK_SOUL_DRAIN,
};

use crate::aura::AuraKind;
use crate::env::{CombatEnv, OracleError};
use crate::spell::{
    DamageClass, DamageKind, EffectKind, PowerType, SchoolMask, SpellAttributes, SpellEffectInfo,
    SpellFamily, SpellInfo, SpellModOp,
};
use crate::state::{CombatArena, UnitId};

fn add_pct(value: f32, pct: f32) -> f32 {
    value * (100.0 + pct) / 100.0
}

fn school_bits(mask: SchoolMask) -> u32 {
    mask.bits() as u32
}

/// Down-ranking penalty for low-level spells cast by high-level casters.
pub fn calculate_level_penalty(caster_level: u32, spell: &SpellInfo) -> f32 {
    if spell.spell_level == 0 || spell.max_level == 0 || spell.spell_level >= spell.max_level {
        return 1.0;
    }
    let penalty = if spell.spell_level < 20 {
        (20 - spell.spell_level) as f32 * 3.75
    } else {
        0.0
    };
    let factor = ((spell.spell_level + 6) as f32 / caster_level.max(1) as f32).min(1.0);
    add_pct(factor, -penalty).max(0.0)
}

// ============================================================================
// Damage, done side
// ============================================================================

/// Flat spell power of the caster against this school mask.
pub fn spell_base_damage_bonus_done(
    arena: &CombatArena,
    caster: UnitId,
    school_mask: SchoolMask,
) -> i32 {
    let mut done =
        arena.total_aura_modifier_by_misc_mask(caster, AuraKind::ModDamageDone, school_bits(school_mask));
    let Some(unit) = arena.unit(caster) else {
        return done;
    };
    if unit.is_player() {
        done += unit.spell_power as i32;
        if unit.power_type == PowerType::Mana {
            done += unit.intellect as i32;
        }
        for effect in arena.effects_of_kind(caster, AuraKind::ModSpellDamageOfStatPercent) {
            done += unit.intellect as i32 * effect.amount / 100;
        }
        for effect in arena.effects_of_kind(caster, AuraKind::ModSpellDamageOfAttackPower) {
            done += unit.attack_power as i32 * effect.amount / 100;
        }
    }
    done
}

/// Percent-done multiplier for a damage spell.
pub fn spell_damage_pct_done(
    arena: &CombatArena,
    env: &CombatEnv<'_>,
    caster: UnitId,
    victim: Option<UnitId>,
    spell: &SpellInfo,
) -> Result<f32, OracleError> {
    if spell.has_attribute(SpellAttributes::NO_DONE_PCT_MODS) {
        return Ok(1.0);
    }
    let Some(unit) = arena.unit(caster) else {
        return Ok(1.0);
    };
    if unit.is_totem() {
        return Ok(1.0);
    }

    let mut done_pct = 1.0f32;

    if let Some(rank) = unit.creature_rank() {
        if !unit.is_pet() {
            done_pct *= env.tables()?.creature_rank_spell_damage_mod(rank);
        }
    }

    let mask = school_bits(spell.school_mask);
    if unit.is_player() {
        // Players take the single best school bonus instead of stacking.
        let best =
            arena.max_positive_aura_modifier_by_misc_mask(caster, AuraKind::ModDamagePercentDone, mask);
        if best != 0 {
            done_pct *= 1.0 + best as f32 / 100.0;
        } else {
            done_pct *=
                arena.total_aura_multiplier_by_misc_mask(caster, AuraKind::ModDamagePercentDone, mask);
        }
    } else {
        done_pct *=
            arena.total_aura_multiplier_by_misc_mask(caster, AuraKind::ModDamagePercentDone, mask);
    }

    if let Some(victim_id) = victim {
        let creature_mask = arena
            .unit(victim_id)
            .map(|v| v.creature_type_mask().bits())
            .unwrap_or(0);
        let versus = arena.total_aura_modifier_by_misc_mask(
            caster,
            AuraKind::ModDamageDoneVersus,
            creature_mask,
        );
        if versus != 0 {
            done_pct = add_pct(done_pct, versus as f32);
        }
        for effect in arena.effects_of_kind(caster, AuraKind::ModDamageDoneVersusAuraState) {
            let state_holds = arena.unit(victim_id).is_some_and(|v| {
                aura_state_from_misc(effect.misc).is_some_and(|state| v.has_aura_state(state))
            });
            if state_holds {
                done_pct = add_pct(done_pct, effect.amount as f32);
            }
        }
    }
    if spell.mechanic != crate::spell::Mechanic::None {
        let mech = arena.total_aura_modifier_by_misc_value(
            caster,
            AuraKind::ModDamageDoneForMechanic,
            spell.mechanic as u8 as i32,
        );
        if mech != 0 {
            done_pct = add_pct(done_pct, mech as f32);
        }
    }

    done_pct *= rules::family_damage_pct_done(arena, caster, victim, spell);
    Ok(done_pct)
}

/// Done-side damage pipeline: flat spell power scaling, then percent mods,
/// then per-spell modifiers.
///
/// `stack` is the aura stack count for dot snapshots; direct casts pass 1.
pub fn spell_damage_bonus_done(
    arena: &CombatArena,
    env: &CombatEnv<'_>,
    caster: UnitId,
    victim: Option<UnitId>,
    spell: &SpellInfo,
    effect: &SpellEffectInfo,
    pdamage: u32,
    kind: DamageKind,
    stack: u32,
) -> Result<u32, OracleError> {
    if spell.has_attribute(SpellAttributes::NO_DONE_BONUS) {
        return Ok(pdamage);
    }
    let Some(unit) = arena.unit(caster) else {
        return Ok(pdamage);
    };
    // Totems deal their owner's damage.
    if unit.is_totem() {
        if let Some(owner) = unit.owner {
            return spell_damage_bonus_done(
                arena, env, owner, victim, spell, effect, pdamage, kind, stack,
            );
        }
    }
    // Leech effects scale with nothing.
    if effect.kind == EffectKind::HealthLeech {
        let pct = if kind == DamageKind::Periodic {
            1.0
        } else {
            spell_damage_pct_done(arena, env, caster, victim, spell)?
        };
        return Ok((pdamage as f32 * pct).max(0.0) as u32);
    }

    let mut done_total = 0.0f32;
    let base = spell_base_damage_bonus_done(arena, caster, spell.school_mask);

    if effect.bonus_coefficient_from_ap > 0.0 {
        let ap_coeff = unit.apply_spell_mod(
            SpellModOp::BonusMultiplier,
            spell,
            effect.bonus_coefficient_from_ap * 100.0,
        ) / 100.0;
        let mut attack_power = unit.attack_power_for(spell.attack_type()) as f32;
        if let Some(victim_id) = victim {
            attack_power +=
                arena.total_aura_modifier(victim_id, AuraKind::MeleeAttackPowerAttackerBonus) as f32;
        }
        done_total += stack as f32 * ap_coeff * attack_power;
    } else if base != 0 {
        let coeff = unit.apply_spell_mod(
            SpellModOp::BonusMultiplier,
            spell,
            effect.bonus_coefficient * 100.0,
        ) / 100.0;
        done_total +=
            base as f32 * coeff * calculate_level_penalty(unit.level, spell) * stack as f32;
    }

    let pct = if kind == DamageKind::Periodic {
        // The dot snapshotted its percent bonus at application time.
        1.0
    } else {
        spell_damage_pct_done(arena, env, caster, victim, spell)?
    };
    let mut total = (pdamage as f32 + done_total) * pct;

    let op = if kind == DamageKind::Periodic {
        SpellModOp::Dot
    } else {
        SpellModOp::Damage
    };
    total = unit.apply_spell_mod(op, spell, total);
    Ok(total.max(0.0) as u32)
}

// ============================================================================
// Damage, taken side
// ============================================================================

/// Taken-side damage pipeline on the victim. Percent modifiers stack
/// multiplicatively; the caster's ignore-resistance lifts resistance-based
/// reductions back toward full damage but never beyond it.
pub fn spell_damage_bonus_taken(
    arena: &CombatArena,
    caster: Option<UnitId>,
    victim: UnitId,
    spell: &SpellInfo,
    pdamage: u32,
    kind: DamageKind,
) -> u32 {
    let _ = kind;
    let mask = school_bits(spell.school_mask);

    let mut taken_mod = 1.0f32;
    if spell.mechanic != crate::spell::Mechanic::None {
        let mech = arena.total_aura_modifier_by_misc_value(
            victim,
            AuraKind::ModMechanicDamageTakenPercent,
            spell.mechanic as u8 as i32,
        );
        if mech != 0 {
            taken_mod = add_pct(taken_mod, mech as f32);
        }
    }

    let mut taken_total = 0.0f32;
    if !spell.has_attribute(SpellAttributes::FIXED_DAMAGE) {
        taken_mod *=
            arena.total_aura_multiplier_by_misc_mask(victim, AuraKind::ModDamagePercentTaken, mask);

        if let Some(caster_id) = caster {
            let from_caster = arena.total_aura_modifier_by_caster(
                victim,
                AuraKind::ModSpellDamageFromCaster,
                caster_id,
            );
            if from_caster != 0 {
                taken_mod = add_pct(taken_mod, from_caster as f32);
            }

            // Ignore-target-resist restores resistance losses, capped at
            // what the hit would have been unreduced.
            let ignore_resist = arena.total_aura_modifier_by_misc_mask(
                caster_id,
                AuraKind::ModIgnoreTargetResist,
                mask,
            );
            if ignore_resist != 0 && taken_mod < 1.0 {
                let lifted = taken_mod + ignore_resist as f32 / 100.0;
                taken_mod = lifted.min(1.0).max(taken_mod);
            }
        }

        taken_total +=
            arena.total_aura_modifier_by_misc_mask(victim, AuraKind::ModDamageTaken, mask) as f32;
    }

    ((pdamage as f32 + taken_total) * taken_mod).max(0.0) as u32
}

// ============================================================================
// Healing
// ============================================================================

/// Flat bonus healing of the caster.
pub fn spell_base_healing_bonus_done(
    arena: &CombatArena,
    caster: UnitId,
    school_mask: SchoolMask,
) -> i32 {
    let mut done = arena.total_aura_modifier_by_misc_value(caster, AuraKind::ModHealingDone, 0)
        + arena.total_aura_modifier_by_misc_mask(
            caster,
            AuraKind::ModHealingDone,
            school_bits(school_mask),
        );
    if let Some(unit) = arena.unit(caster) {
        if unit.is_player() {
            done += unit.spell_power as i32;
        }
    }
    done
}

/// Done-side healing pipeline.
pub fn spell_heal_bonus_done(
    arena: &CombatArena,
    caster: UnitId,
    victim: Option<UnitId>,
    spell: &SpellInfo,
    effect: &SpellEffectInfo,
    healamount: u32,
    kind: DamageKind,
    stack: u32,
) -> u32 {
    let Some(unit) = arena.unit(caster) else {
        return healamount;
    };
    if unit.is_totem() {
        if let Some(owner) = unit.owner {
            return spell_heal_bonus_done(arena, owner, victim, spell, effect, healamount, kind, stack);
        }
    }
    // Potions heal their printed value.
    if spell.family == SpellFamily::Potion {
        return healamount;
    }
    // Leech-style healing already went through the damage pipeline.
    if effect.kind == EffectKind::HealthLeech {
        return healamount;
    }
    // Utility spells with no coefficient heal their printed value.
    if spell.damage_class == DamageClass::None
        && effect.bonus_coefficient <= 0.0
        && effect.bonus_coefficient_from_ap <= 0.0
    {
        return healamount;
    }

    let mut done_total = 0.0f32;
    let base = spell_base_healing_bonus_done(arena, caster, spell.school_mask);

    if effect.bonus_coefficient_from_ap > 0.0 {
        let ap_coeff = unit.apply_spell_mod(
            SpellModOp::BonusMultiplier,
            spell,
            effect.bonus_coefficient_from_ap * 100.0,
        ) / 100.0;
        done_total += stack as f32 * ap_coeff * unit.attack_power_for(spell.attack_type()) as f32;
    } else if base != 0 {
        let coeff = unit.apply_spell_mod(
            SpellModOp::BonusMultiplier,
            spell,
            effect.bonus_coefficient * 100.0,
        ) / 100.0;
        done_total += base as f32 * coeff * calculate_level_penalty(unit.level, spell) * stack as f32;
    }

    let mut done_pct = 1.0f32;
    for effect in arena.effects_of_kind(caster, AuraKind::ModHealingDonePercent) {
        done_pct = add_pct(done_pct, effect.amount as f32);
    }

    let mut total = (healamount as f32 + done_total) * done_pct;
    let op = if kind == DamageKind::Periodic {
        SpellModOp::Dot
    } else {
        SpellModOp::Damage
    };
    total = unit.apply_spell_mod(op, spell, total);
    total.max(0.0) as u32
}

/// Taken-side healing pipeline on the target.
pub fn spell_heal_bonus_taken(
    arena: &CombatArena,
    caster: Option<UnitId>,
    victim: UnitId,
    spell: &SpellInfo,
    healamount: u32,
    kind: DamageKind,
) -> u32 {
    let _ = (spell, kind);
    let mut taken_mod = 1.0f32;

    // Worst healing debuff and best healing buff both apply.
    let worst = arena.max_negative_aura_modifier(victim, AuraKind::ModHealingPct);
    let best = arena.max_positive_aura_modifier(victim, AuraKind::ModHealingPct);
    if worst < 0 {
        taken_mod = add_pct(taken_mod, worst as f32);
    }
    if best > 0 {
        taken_mod = add_pct(taken_mod, best as f32);
    }

    if let Some(caster_id) = caster {
        let received = arena.total_aura_modifier_by_caster(
            victim,
            AuraKind::ModHealingReceived,
            caster_id,
        );
        if received != 0 {
            taken_mod = add_pct(taken_mod, received as f32);
        }
    }

    (healamount as f32 * taken_mod).max(0.0) as u32
}

// ============================================================================
// Critical strikes
// ============================================================================

/// Crit chance of `spell` against an optional victim, in percent.
pub fn spell_crit_chance(
    arena: &CombatArena,
    env: &CombatEnv<'_>,
    caster: UnitId,
    victim: Option<UnitId>,
    spell: &SpellInfo,
) -> Result<f32, OracleError> {
    if spell.has_attribute(SpellAttributes::CANT_CRIT) {
        return Ok(0.0);
    }
    let Some(unit) = arena.unit(caster) else {
        return Ok(0.0);
    };

    // Creatures cannot crit with spells; player totems channel their
    // owner's crit, and the tables may except individual spells.
    if unit.is_creature() && !env.tables()?.creature_can_crit(spell.id) {
        if unit.is_totem() {
            if let Some(owner) = unit.owner {
                if arena.unit(owner).is_some_and(|o| o.is_player()) {
                    return spell_crit_chance(arena, env, owner, victim, spell);
                }
            }
        }
        if !unit.is_pet() {
            return Ok(0.0);
        }
    }

    if let Some(chance) = rules::family_crit_override(arena, caster, victim, spell) {
        return Ok(chance);
    }

    let magic_table = match spell.damage_class {
        DamageClass::Magic => true,
        DamageClass::None => {
            if env.tables()?.crits_like_magic(spell.id) {
                true
            } else {
                return Ok(0.0);
            }
        }
        DamageClass::Melee | DamageClass::Ranged => false,
    };

    let mut chance = if magic_table {
        if spell.school_mask == SchoolMask::PHYSICAL {
            return Ok(0.0);
        }
        unit.spell_crit_pct
    } else {
        unit.melee_crit_pct
    };

    if let Some(victim_id) = victim {
        if !spell.is_positive() {
            chance += arena.total_aura_modifier_by_misc_mask(
                victim_id,
                AuraKind::ModAttackerSpellAndWeaponCritChance,
                school_bits(spell.school_mask),
            ) as f32;
        }
        chance +=
            arena.total_aura_modifier_by_caster(victim_id, AuraKind::ModCritChanceForCaster, caster)
                as f32;
    }

    chance = unit.apply_spell_mod(SpellModOp::CriticalChance, spell, chance);
    Ok(chance.max(0.0))
}

/// Damage after a critical strike: weapon crits double, spell crits gain
/// half again, both scaled by crit-bonus auras and per-spell modifiers.
pub fn spell_critical_damage_bonus(
    arena: &CombatArena,
    caster: UnitId,
    spell: &SpellInfo,
    damage: u32,
) -> u32 {
    let base_share = match spell.damage_class {
        DamageClass::Melee | DamageClass::Ranged => 1.0,
        _ => 0.5,
    };
    let mut bonus = damage as f32 * base_share;

    let crit_mod = (arena.total_aura_multiplier_by_misc_mask(
        caster,
        AuraKind::ModCritDamageBonus,
        school_bits(spell.school_mask),
    ) - 1.0)
        * 100.0;
    if crit_mod != 0.0 {
        bonus = add_pct(bonus, crit_mod);
    }
    if let Some(unit) = arena.unit(caster) {
        bonus = unit.apply_spell_mod(SpellModOp::CritDamageBonus, spell, bonus);
    }
    damage + bonus.max(0.0) as u32
}

/// Healing after a critical heal: doubled, then scaled by the caster's
/// critical-healing auras.
pub fn spell_critical_healing_bonus(arena: &CombatArena, caster: UnitId, healing: u32) -> u32 {
    let mut amount = healing as f32 * 2.0;
    let multiplier = arena
        .effects_of_kind(caster, AuraKind::ModCriticalHealingAmount)
        .iter()
        .fold(1.0f32, |acc, e| acc * (100.0 + e.amount as f32) / 100.0);
    amount *= multiplier;
    amount.max(0.0) as u32
}

fn aura_state_from_misc(misc: i32) -> Option<crate::state::AuraStateType> {
    match misc {
        0 => Some(crate::state::AuraStateType::Defense),
        1 => Some(crate::state::AuraStateType::HunterParry),
        2 => Some(crate::state::AuraStateType::Frozen),
        3 => Some(crate::state::AuraStateType::Enraged),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{DefaultProcPolicy, Env, PcgRng, ProcEventEntry, SpellOracle, TablesOracle};
    use crate::spell::SpellId;
    use crate::state::{Unit, UnitBuilder, UnitClass};

    struct NoSpells;
    impl SpellOracle for NoSpells {
        fn spell(&self, _: SpellId) -> Option<&SpellInfo> {
            None
        }
    }
    struct NoTables;
    impl TablesOracle for NoTables {
        fn proc_event(&self, _: SpellId) -> Option<ProcEventEntry> {
            None
        }
    }

    fn caster() -> UnitBuilder {
        Unit::builder(UnitId(1)).player(UnitClass::Mage).level(60)
    }

    #[test]
    fn level_penalty_is_one_at_full_rank() {
        let spell = SpellInfo::builder(SpellId(1)).spell_level(60, 60).build();
        assert_eq!(calculate_level_penalty(60, &spell), 1.0);
    }

    #[test]
    fn level_penalty_shrinks_low_level_spells() {
        let spell = SpellInfo::builder(SpellId(1)).spell_level(10, 60).build();
        let penalty = calculate_level_penalty(60, &spell);
        // (10+6)/60 factor, minus (20-10)*3.75 percent.
        let expected = (16.0 / 60.0) * (100.0 - 37.5) / 100.0;
        assert!((penalty - expected).abs() < 1e-6);
    }

    #[test]
    fn done_pipeline_scales_with_spell_power_coefficient() {
        let mut arena = CombatArena::new(1);
        arena.insert_unit(caster().spell_power(100).power(PowerType::Rage, 0, 0).build());

        let spells = NoSpells;
        let tables = NoTables;
        let policy = DefaultProcPolicy;
        let rng = PcgRng;
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let spell = SpellInfo::builder(SpellId(2))
            .school(SchoolMask::FIRE)
            .damage_class(DamageClass::Magic)
            .spell_level(60, 60)
            .build();
        let effect = SpellEffectInfo::school_damage(100).with_coefficient(1.0);

        let total = spell_damage_bonus_done(
            &arena,
            &env,
            UnitId(1),
            None,
            &spell,
            &effect,
            100,
            DamageKind::Direct,
            1,
        )
        .unwrap();
        // base 100 + 100 spell power at coefficient 1.0.
        assert_eq!(total, 200);
    }

    #[test]
    fn taken_pipeline_never_goes_negative() {
        let mut arena = CombatArena::new(1);
        arena.insert_unit(Unit::builder(UnitId(2)).build());
        let spell = SpellInfo::builder(SpellId(3))
            .school(SchoolMask::SHADOW)
            .build();
        assert_eq!(
            spell_damage_bonus_taken(&arena, None, UnitId(2), &spell, 0, DamageKind::Direct),
            0
        );
    }

    #[test]
    fn heal_taken_combines_worst_debuff_and_best_buff() {
        let mut arena = CombatArena::new(1);
        arena.insert_unit(caster().build());
        arena.insert_unit(Unit::builder(UnitId(2)).player(UnitClass::Priest).build());

        let spells = NoSpells;
        let tables = NoTables;
        let policy = DefaultProcPolicy;
        let rng = PcgRng;
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        for (id, amount, positive) in [(40, -50, false), (41, -20, false), (42, 50, true)] {
            let aura_spell = SpellInfo::builder(SpellId(id))
                .positive(positive)
                .duration_ms(10_000)
                .effect(SpellEffectInfo::aura(AuraKind::ModHealingPct, amount))
                .build();
            crate::aura::lifecycle::try_apply_aura_info(
                &mut arena,
                &env,
                Some(UnitId(1)),
                UnitId(2),
                &aura_spell,
            )
            .expect("healing modifier applies");
        }

        let spell = SpellInfo::builder(SpellId(44))
            .school(SchoolMask::HOLY)
            .positive(true)
            .build();
        // Only the worst debuff (-50) and the best buff (+50) count; the
        // -20 in between is shadowed.
        assert_eq!(
            spell_heal_bonus_taken(&arena, Some(UnitId(1)), UnitId(2), &spell, 200, DamageKind::Direct),
            150
        );
    }

    #[test]
    fn crit_bonus_is_half_for_spells_and_full_for_weapons() {
        let mut arena = CombatArena::new(1);
        arena.insert_unit(caster().build());

        let magic = SpellInfo::builder(SpellId(4))
            .school(SchoolMask::FROST)
            .damage_class(DamageClass::Magic)
            .build();
        assert_eq!(spell_critical_damage_bonus(&arena, UnitId(1), &magic, 100), 150);

        let melee = SpellInfo::builder(SpellId(5))
            .school(SchoolMask::PHYSICAL)
            .damage_class(DamageClass::Melee)
            .build();
        assert_eq!(spell_critical_damage_bonus(&arena, UnitId(1), &melee, 100), 200);
    }

    #[test]
    fn critical_heal_doubles() {
        let mut arena = CombatArena::new(1);
        arena.insert_unit(caster().build());
        assert_eq!(spell_critical_healing_bonus(&arena, UnitId(1), 120), 240);
    }

    #[test]
    fn creatures_cannot_spell_crit() {
        let mut arena = CombatArena::new(1);
        arena.insert_unit(
            Unit::builder(UnitId(1))
                .creature(
                    crate::state::CreatureRank::Normal,
                    crate::state::CreatureTypeMask::HUMANOID,
                )
                .crit_pct(30.0, 0.0)
                .build(),
        );
        let spells = NoSpells;
        let tables = NoTables;
        let policy = DefaultProcPolicy;
        let rng = PcgRng;
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();
        let spell = SpellInfo::builder(SpellId(6))
            .school(SchoolMask::FIRE)
            .damage_class(DamageClass::Magic)
            .build();
        assert_eq!(
            spell_crit_chance(&arena, &env, UnitId(1), None, &spell).unwrap(),
            0.0
        );
    }
}
