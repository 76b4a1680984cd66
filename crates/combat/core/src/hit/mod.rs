//! Spell hit resolution.
//!
//! Immunity filtering plus the two avoidance tables. Both tables burn a
//! single deterministic roll in basis points (0..10000) and walk a
//! cumulative threshold, so outcome probabilities always sum exactly.

use tracing::trace;

use crate::aura::AuraKind;
use crate::env::{CombatEnv, OracleError};
use crate::proc::{ProcContext, ProcExtra, ProcFlags};
use crate::spell::{
    DamageClass, Mechanic, SchoolMask, SpellAttributes, SpellInfo, SpellModOp,
};
use crate::state::{CombatArena, EffectTag, UnitId, UnitState};

/// Why a spell failed to land (or `None`: it landed).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::FromRepr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SpellMissInfo {
    #[default]
    None = 0,
    Miss = 1,
    Resist = 2,
    Dodge = 3,
    Parry = 4,
    Block = 5,
    Evade = 6,
    Immune = 7,
    Deflect = 8,
    Reflect = 9,
}

/// Spatial facts the core cannot derive; the host computes them from
/// positions and orientations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FacingContext {
    pub attacker_behind_victim: bool,
    /// Victim is oriented toward the caster (deflects require it).
    pub victim_facing_caster: bool,
}

impl Default for FacingContext {
    fn default() -> Self {
        FacingContext {
            attacker_behind_victim: false,
            victim_facing_caster: true,
        }
    }
}

// Roll contexts inside one resolved action.
const CTX_HIT_ROLL: u32 = 0;
const CTX_REFLECT: u32 = 1;

// ============================================================================
// Immunity
// ============================================================================

/// Full-spell immunity check.
pub fn is_immuned_to_spell(
    arena: &CombatArena,
    _caster: Option<UnitId>,
    target: UnitId,
    spell: &SpellInfo,
) -> bool {
    let Some(unit) = arena.unit(target) else {
        return false;
    };
    let table = unit.immunity();

    if table.immune_to_spell_id(spell.id) {
        return true;
    }
    if spell.has_attribute(SpellAttributes::UNAFFECTED_BY_INVULNERABILITY) {
        return false;
    }
    if table.immune_to_dispel(spell.dispel) {
        return true;
    }
    if spell.mechanic != Mechanic::None && table.mechanic_mask().contains(spell.mechanic.mask()) {
        return true;
    }

    // Immune to every populated effect slot means immune to the spell.
    let mut any_effect = false;
    let mut all_immune = true;
    for slot in 0..spell.effects.len() {
        if spell.effect(slot).is_none() {
            continue;
        }
        any_effect = true;
        if !is_immuned_to_spell_effect(arena, _caster, target, spell, slot) {
            all_immune = false;
            break;
        }
    }
    if any_effect && all_immune {
        return true;
    }

    // School immunity never blocks beneficial spells.
    if !spell.is_positive()
        && !spell.school_mask.is_empty()
        && table.school_mask().contains(spell.school_mask)
    {
        return true;
    }
    false
}

/// Per-slot immunity check, used to narrow the applied effect mask.
pub fn is_immuned_to_spell_effect(
    arena: &CombatArena,
    _caster: Option<UnitId>,
    target: UnitId,
    spell: &SpellInfo,
    slot: usize,
) -> bool {
    let Some(unit) = arena.unit(target) else {
        return false;
    };
    let Some(effect) = spell.effect(slot) else {
        return false;
    };
    let table = unit.immunity();

    if let Some(tag) = EffectTag::of(effect.kind) {
        if table.immune_to_effect(tag) {
            return true;
        }
    }
    if effect.mechanic != Mechanic::None
        && table.mechanic_mask().contains(effect.mechanic.mask())
    {
        return true;
    }
    if let Some(kind) = effect.aura_kind() {
        if !spell.has_attribute(SpellAttributes::IGNORE_HIT_RESULT)
            && table.immune_to_aura_kind(kind)
        {
            return true;
        }
        // Blanket immunity to harmful magic aura application by school.
        if !spell.is_positive() {
            let immune_mask = arena.total_aura_modifier_by_misc_mask(
                target,
                AuraKind::ModImmuneAuraApplySchool,
                spell.school_mask.bits() as u32,
            );
            if immune_mask != 0 {
                return true;
            }
        }
    }
    false
}

/// Is the unit immune to damage of these schools?
pub fn is_immuned_to_damage(arena: &CombatArena, target: UnitId, school_mask: SchoolMask) -> bool {
    if school_mask.is_empty() {
        return false;
    }
    arena
        .unit(target)
        .is_some_and(|unit| unit.immunity().damage_mask().contains(school_mask))
}

// ============================================================================
// Hit tables
// ============================================================================

/// Resolve whether `spell` lands on `victim`.
///
/// `can_reflect` is decided by the caller (hostile magic projectiles);
/// reflection consumes its own roll and fires the victim's reflect procs.
pub fn spell_hit_result(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    caster: UnitId,
    victim: UnitId,
    spell: &SpellInfo,
    facing: FacingContext,
    can_reflect: bool,
) -> Result<SpellMissInfo, OracleError> {
    if is_immuned_to_spell(arena, Some(caster), victim, spell) {
        return Ok(SpellMissInfo::Immune);
    }
    // Beneficial spells always land.
    if spell.is_positive() && caster != victim {
        return Ok(SpellMissInfo::None);
    }
    if is_immuned_to_damage(arena, victim, spell.school_mask) {
        return Ok(SpellMissInfo::Immune);
    }
    if caster == victim {
        return Ok(SpellMissInfo::None);
    }
    if arena
        .unit(victim)
        .is_some_and(|u| u.is_creature() && u.is_evading())
    {
        return Ok(SpellMissInfo::Evade);
    }

    if can_reflect {
        let reflect_chance = arena.total_aura_modifier(victim, AuraKind::ReflectSpells)
            + arena.total_aura_modifier_by_misc_mask(
                victim,
                AuraKind::ReflectSpellsSchool,
                spell.school_mask.bits() as u32,
            );
        if reflect_chance > 0 {
            let seed = arena.next_seed(caster, CTX_REFLECT);
            if env.rng()?.roll_chance(seed, reflect_chance as f32) {
                // The victim "dealt" the reflect; fire its taken procs.
                crate::proc::proc_damage_and_spell(
                    arena,
                    env,
                    ProcContext {
                        actor: victim,
                        victim: Some(caster),
                        proc_flags: ProcFlags::TAKEN_SPELL_MAGIC_DMG_CLASS_NEG,
                        proc_extra: ProcExtra::REFLECT,
                        damage: 1,
                        spell: Some(spell),
                        triggered: false,
                    },
                )?;
                return Ok(SpellMissInfo::Reflect);
            }
        }
    }

    match spell.damage_class {
        DamageClass::Melee | DamageClass::Ranged => {
            melee_spell_hit_result(arena, env, caster, victim, spell, facing)
        }
        DamageClass::None => Ok(SpellMissInfo::None),
        DamageClass::Magic => magic_spell_hit_result(arena, env, caster, victim, spell, facing),
    }
}

/// Miss chance for weapon-based spells, in percent.
///
/// Base 5%, worse against higher-level victims, improved by the caster's
/// hit auras and per-spell miss modifiers.
fn melee_spell_miss_chance(
    arena: &CombatArena,
    caster: UnitId,
    victim: UnitId,
    spell: &SpellInfo,
) -> f32 {
    let (caster_level, victim_level) = match (arena.unit(caster), arena.unit(victim)) {
        (Some(c), Some(v)) => (c.level as i32, v.level as i32),
        _ => return 0.0,
    };
    let leveldiff = victim_level - caster_level;
    let mut miss = 5.0 + if leveldiff > 0 { leveldiff as f32 } else { 0.0 };
    miss -= arena.total_aura_modifier(caster, AuraKind::ModHitChance) as f32;
    if let Some(caster_unit) = arena.unit(caster) {
        miss = caster_unit.apply_spell_mod(SpellModOp::ResistMissChance, spell, miss);
    }
    miss.clamp(0.0, 100.0)
}

/// Victim chance to resist by mechanic, in percent.
fn mechanic_resist_chance(arena: &CombatArena, victim: UnitId, spell: &SpellInfo) -> f32 {
    let mut resist = 0;
    let mut consider = |mechanic: Mechanic| {
        if mechanic != Mechanic::None {
            let amount = arena.total_aura_modifier_by_misc_value(
                victim,
                AuraKind::MechanicResistance,
                mechanic as u8 as i32,
            );
            resist = resist.max(amount);
        }
    };
    consider(spell.mechanic);
    for effect in &spell.effects {
        consider(effect.mechanic);
    }
    resist.max(0) as f32
}

fn outcome_ignored(arena: &CombatArena, caster: UnitId, outcome: SpellMissInfo) -> bool {
    arena
        .effects_of_kind(caster, AuraKind::IgnoreCombatResult)
        .iter()
        .any(|e| e.misc == outcome as u8 as i32)
}

/// Melee and ranged spell table: miss, mechanic resist, then the victim's
/// active defenses in dodge / parry / block order.
fn melee_spell_hit_result(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    caster: UnitId,
    victim: UnitId,
    spell: &SpellInfo,
    facing: FacingContext,
) -> Result<SpellMissInfo, OracleError> {
    if spell.has_attribute(SpellAttributes::IGNORE_HIT_RESULT) {
        return Ok(SpellMissInfo::None);
    }

    let seed = arena.next_seed(caster, CTX_HIT_ROLL);
    let roll = env.rng()?.roll(seed, 10_000) as i32;
    let mut tmp = 0i32;

    let miss_chance = (melee_spell_miss_chance(arena, caster, victim, spell) * 100.0) as i32;
    tmp += miss_chance;
    if roll < tmp {
        return Ok(SpellMissInfo::Miss);
    }

    let resist_chance = (mechanic_resist_chance(arena, victim, spell) * 100.0) as i32;
    tmp += resist_chance;
    if roll < tmp {
        return Ok(SpellMissInfo::Resist);
    }

    if spell.has_attribute(SpellAttributes::IMPOSSIBLE_DODGE_PARRY_BLOCK) {
        return Ok(SpellMissInfo::None);
    }

    let mut can_dodge = true;
    let mut can_parry = true;
    let mut can_block = spell.has_attribute(SpellAttributes::BLOCKABLE);

    let victim_busy = arena.unit(victim).is_some_and(|u| {
        u.has_unit_state(UnitState::CASTING) || u.is_controlled()
    });
    if victim_busy {
        can_dodge = false;
        can_parry = false;
        can_block = false;
    }

    if spell.damage_class == DamageClass::Ranged {
        // Ranged attacks cannot be dodged or parried, only deflected.
        can_dodge = false;
        can_parry = false;
        let front_ok = facing.victim_facing_caster
            || arena.has_aura_kind(victim, AuraKind::IgnoreHitDirection);
        if front_ok {
            let deflect =
                (arena.total_aura_modifier(victim, AuraKind::DeflectSpells) * 100).max(0);
            tmp += deflect;
            if roll < tmp {
                return Ok(SpellMissInfo::Deflect);
            }
        }
        return Ok(SpellMissInfo::None);
    }

    if facing.attacker_behind_victim {
        // No parry or block from behind; players also cannot dodge there.
        if arena.unit(victim).is_some_and(|u| u.is_player()) {
            can_dodge = false;
        }
        can_parry = false;
        can_block = false;
    }
    if arena.has_aura_kind(caster, AuraKind::IgnoreHitDirection)
        && spell.has_attribute(SpellAttributes::REQ_CASTER_BEHIND_TARGET)
    {
        can_parry = false;
    }

    if outcome_ignored(arena, caster, SpellMissInfo::Dodge) {
        can_dodge = false;
    }
    if outcome_ignored(arena, caster, SpellMissInfo::Parry) {
        can_parry = false;
    }
    if outcome_ignored(arena, caster, SpellMissInfo::Block) {
        can_block = false;
    }

    if can_dodge {
        let dodge = arena
            .unit(victim)
            .map(|u| (u.dodge_pct * 100.0) as i32)
            .unwrap_or(0)
            .max(0);
        tmp += dodge;
        if roll < tmp {
            return Ok(SpellMissInfo::Dodge);
        }
    }
    if can_parry {
        let parry = arena
            .unit(victim)
            .map(|u| (u.parry_pct * 100.0) as i32)
            .unwrap_or(0)
            .max(0);
        tmp += parry;
        if roll < tmp {
            return Ok(SpellMissInfo::Parry);
        }
    }
    if can_block {
        let block = arena
            .unit(victim)
            .map(|u| (u.block_pct * 100.0) as i32)
            .unwrap_or(0)
            .max(0);
        tmp += block;
        if roll < tmp {
            return Ok(SpellMissInfo::Block);
        }
    }
    Ok(SpellMissInfo::None)
}

/// Basis-point hit chance of a magic spell against this victim.
///
/// Level-difference ladder from the legacy tables. The final chance is
/// added in twice; the legacy resolution shipped that way for years and
/// live balance numbers assume it, so it is kept verbatim.
fn magic_hit_chance(
    arena: &CombatArena,
    caster: UnitId,
    victim: UnitId,
    spell: &SpellInfo,
) -> i32 {
    let (caster_unit, victim_unit) = match (arena.unit(caster), arena.unit(victim)) {
        (Some(c), Some(v)) => (c, v),
        _ => return 10_000,
    };
    let lchance: i32 = if victim_unit.is_player() { 7 } else { 11 };
    let mut leveldiff = victim_unit.level as i32 - caster_unit.level as i32;

    let mut mod_hit_chance: i32;
    if leveldiff >= 0 {
        if !victim_unit.is_player() {
            mod_hit_chance = 94 - 3 * leveldiff.min(3);
            leveldiff -= 3;
        } else {
            mod_hit_chance = 96 - leveldiff.min(2);
            leveldiff -= 2;
        }
        if leveldiff > 0 {
            mod_hit_chance -= lchance * leveldiff.min(7);
        }
    } else {
        mod_hit_chance = 97 - leveldiff;
    }

    mod_hit_chance =
        caster_unit.apply_spell_mod(SpellModOp::ResistMissChance, spell, mod_hit_chance as f32)
            as i32;
    if !spell.has_attribute(SpellAttributes::IGNORE_HIT_RESULT) {
        mod_hit_chance += arena.total_aura_modifier_by_misc_mask(
            victim,
            AuraKind::ModAttackerSpellHitChance,
            spell.school_mask.bits() as u32,
        );
    }

    let mut hit_chance = mod_hit_chance * 100;
    hit_chance += mod_hit_chance * 100;
    hit_chance += arena.total_aura_modifier(caster, AuraKind::ModSpellHitChance) * 100;
    hit_chance.clamp(100, 10_000)
}

/// Magic spell table: miss, mechanic resist, deflect.
fn magic_spell_hit_result(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    caster: UnitId,
    victim: UnitId,
    spell: &SpellInfo,
    facing: FacingContext,
) -> Result<SpellMissInfo, OracleError> {
    let victim_dead_creature = arena
        .unit(victim)
        .is_some_and(|u| !u.is_alive() && !u.is_player());
    if victim_dead_creature {
        return Ok(SpellMissInfo::None);
    }

    let hit_chance = magic_hit_chance(arena, caster, victim, spell);
    let mut tmp = 10_000 - hit_chance;

    let seed = arena.next_seed(caster, CTX_HIT_ROLL);
    let roll = env.rng()?.roll(seed, 10_000) as i32;
    trace!(%caster, %victim, spell = %spell.id, hit_chance, roll, "magic hit roll");

    if roll < tmp {
        return Ok(SpellMissInfo::Miss);
    }
    if spell.has_attribute(SpellAttributes::IGNORE_HIT_RESULT) {
        return Ok(SpellMissInfo::None);
    }

    tmp += (mechanic_resist_chance(arena, victim, spell) * 100.0) as i32;
    if roll < tmp {
        return Ok(SpellMissInfo::Resist);
    }

    let victim_controlled = arena.unit(victim).is_some_and(|u| u.is_controlled());
    let front_ok = facing.victim_facing_caster
        || arena.has_aura_kind(victim, AuraKind::IgnoreHitDirection);
    if !victim_controlled && front_ok {
        let deflect = (arena.total_aura_modifier(victim, AuraKind::DeflectSpells) * 100).max(0);
        tmp += deflect;
        if roll < tmp {
            return Ok(SpellMissInfo::Deflect);
        }
    }
    Ok(SpellMissInfo::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{DefaultProcPolicy, Env, PcgRng, SpellOracle, TablesOracle};
    use crate::spell::{SpellEffectInfo, SpellId};
    use crate::state::{Unit, UnitClass};

    struct NoSpells;
    impl SpellOracle for NoSpells {
        fn spell(&self, _: SpellId) -> Option<&SpellInfo> {
            None
        }
    }
    struct NoTables;
    impl TablesOracle for NoTables {
        fn proc_event(&self, _: SpellId) -> Option<crate::env::ProcEventEntry> {
            None
        }
    }

    fn test_env() -> (NoSpells, NoTables, DefaultProcPolicy, PcgRng) {
        (NoSpells, NoTables, DefaultProcPolicy, PcgRng)
    }

    fn arena_with_pair() -> CombatArena {
        let mut arena = CombatArena::new(7);
        arena.insert_unit(Unit::builder(UnitId(1)).player(UnitClass::Mage).build());
        arena.insert_unit(Unit::builder(UnitId(2)).player(UnitClass::Warrior).build());
        arena
    }

    #[test]
    fn magic_hit_chance_doubles_like_legacy() {
        let arena = arena_with_pair();
        let spell = SpellInfo::builder(SpellId(100))
            .school(SchoolMask::FIRE)
            .damage_class(DamageClass::Magic)
            .effect(SpellEffectInfo::school_damage(10))
            .build();
        // Equal-level player victim: modHitChance = 96, doubled to 19200,
        // clamped to the 10000 cap.
        assert_eq!(magic_hit_chance(&arena, UnitId(1), UnitId(2), &spell), 10_000);
    }

    #[test]
    fn magic_hit_chance_ladder_against_higher_level_creature() {
        let mut arena = CombatArena::new(7);
        arena.insert_unit(Unit::builder(UnitId(1)).player(UnitClass::Mage).level(60).build());
        arena.insert_unit(
            Unit::builder(UnitId(2))
                .creature(
                    crate::state::CreatureRank::Normal,
                    crate::state::CreatureTypeMask::HUMANOID,
                )
                .level(68)
                .build(),
        );
        let spell = SpellInfo::builder(SpellId(100))
            .school(SchoolMask::FIRE)
            .damage_class(DamageClass::Magic)
            .build();
        // leveldiff 8: 94 - 9 = 85, then -3 leaves 5, 85 - 11*5 = 30.
        // Doubled: 6000 basis points.
        assert_eq!(magic_hit_chance(&arena, UnitId(1), UnitId(2), &spell), 6_000);
    }

    #[test]
    fn caster_spell_hit_auras_raise_the_magic_chance() {
        let mut arena = CombatArena::new(7);
        arena.insert_unit(Unit::builder(UnitId(1)).player(UnitClass::Mage).level(60).build());
        arena.insert_unit(
            Unit::builder(UnitId(2))
                .creature(
                    crate::state::CreatureRank::Normal,
                    crate::state::CreatureTypeMask::HUMANOID,
                )
                .level(68)
                .build(),
        );
        let (spells, tables, policy, rng) = test_env();
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let hit_buff = SpellInfo::builder(SpellId(300))
            .positive(true)
            .duration_ms(60_000)
            .effect(SpellEffectInfo::aura(crate::aura::AuraKind::ModSpellHitChance, 10))
            .build();
        crate::aura::lifecycle::try_apply_aura_info(
            &mut arena,
            &env,
            Some(UnitId(1)),
            UnitId(1),
            &hit_buff,
        )
        .expect("hit buff applies");

        let spell = SpellInfo::builder(SpellId(100))
            .school(SchoolMask::FIRE)
            .damage_class(DamageClass::Magic)
            .build();
        // The doubled 6000 base plus 10 percent from the caster's auras.
        assert_eq!(magic_hit_chance(&arena, UnitId(1), UnitId(2), &spell), 7_000);
    }

    #[test]
    fn positive_spells_always_land() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = test_env();
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();
        let spell = SpellInfo::builder(SpellId(101))
            .school(SchoolMask::HOLY)
            .damage_class(DamageClass::Magic)
            .positive(true)
            .build();
        let result = spell_hit_result(
            &mut arena,
            &env,
            UnitId(1),
            UnitId(2),
            &spell,
            FacingContext::default(),
            false,
        )
        .unwrap();
        assert_eq!(result, SpellMissInfo::None);
    }

    #[test]
    fn self_cast_never_misses() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = test_env();
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();
        let spell = SpellInfo::builder(SpellId(102))
            .school(SchoolMask::SHADOW)
            .damage_class(DamageClass::Magic)
            .build();
        let result = spell_hit_result(
            &mut arena,
            &env,
            UnitId(1),
            UnitId(1),
            &spell,
            FacingContext::default(),
            false,
        )
        .unwrap();
        assert_eq!(result, SpellMissInfo::None);
    }

    #[test]
    fn evading_creature_reports_evade() {
        let mut arena = CombatArena::new(7);
        arena.insert_unit(Unit::builder(UnitId(1)).player(UnitClass::Mage).build());
        let mut creature = Unit::builder(UnitId(2))
            .creature(
                crate::state::CreatureRank::Normal,
                crate::state::CreatureTypeMask::HUMANOID,
            )
            .build();
        creature.state |= UnitState::EVADE;
        arena.insert_unit(creature);

        let (spells, tables, policy, rng) = test_env();
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();
        let spell = SpellInfo::builder(SpellId(103))
            .school(SchoolMask::FIRE)
            .damage_class(DamageClass::Magic)
            .build();
        let result = spell_hit_result(
            &mut arena,
            &env,
            UnitId(1),
            UnitId(2),
            &spell,
            FacingContext::default(),
            false,
        )
        .unwrap();
        assert_eq!(result, SpellMissInfo::Evade);
    }

    /// Rng stub returning a fixed basis-point roll.
    struct FixedRoll(u32);
    impl crate::env::RngOracle for FixedRoll {
        fn next_u32(&self, _seed: u64) -> u32 {
            self.0
        }
    }

    #[test]
    fn melee_table_walks_cumulative_thresholds() {
        let spell = SpellInfo::builder(SpellId(110))
            .school(SchoolMask::PHYSICAL)
            .damage_class(DamageClass::Melee)
            .effect(SpellEffectInfo::school_damage(25))
            .build();
        let (spells, tables, policy, _) = test_env();

        // Equal levels: miss band is 0..500 basis points.
        let mut arena = arena_with_pair();
        arena.unit_mut(UnitId(2)).unwrap().dodge_pct = 5.0;
        let rng = FixedRoll(499);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();
        let result = spell_hit_result(
            &mut arena,
            &env,
            UnitId(1),
            UnitId(2),
            &spell,
            FacingContext::default(),
            false,
        )
        .unwrap();
        assert_eq!(result, SpellMissInfo::Miss);

        // 500..1000 is the dodge band.
        let rng = FixedRoll(500);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();
        let result = spell_hit_result(
            &mut arena,
            &env,
            UnitId(1),
            UnitId(2),
            &spell,
            FacingContext::default(),
            false,
        )
        .unwrap();
        assert_eq!(result, SpellMissInfo::Dodge);

        // Past every band the attack lands.
        let rng = FixedRoll(1000);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();
        let result = spell_hit_result(
            &mut arena,
            &env,
            UnitId(1),
            UnitId(2),
            &spell,
            FacingContext::default(),
            false,
        )
        .unwrap();
        assert_eq!(result, SpellMissInfo::None);
    }

    #[test]
    fn controlled_victim_loses_active_defenses() {
        let spell = SpellInfo::builder(SpellId(111))
            .school(SchoolMask::PHYSICAL)
            .damage_class(DamageClass::Melee)
            .build();
        let (spells, tables, policy, _) = test_env();

        let mut arena = arena_with_pair();
        {
            let victim = arena.unit_mut(UnitId(2)).unwrap();
            victim.dodge_pct = 100.0;
            victim.state |= UnitState::STUNNED;
        }
        // A roll inside what would be the dodge band still lands.
        let rng = FixedRoll(600);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();
        let result = spell_hit_result(
            &mut arena,
            &env,
            UnitId(1),
            UnitId(2),
            &spell,
            FacingContext::default(),
            false,
        )
        .unwrap();
        assert_eq!(result, SpellMissInfo::None);
    }

    #[test]
    fn school_immunity_blocks_hostile_spells_only() {
        let mut arena = arena_with_pair();
        arena
            .unit_mut(UnitId(2))
            .unwrap()
            .immunity_mut()
            .apply(SpellId(9), crate::state::Immunity::School(SchoolMask::FIRE), true);

        let hostile = SpellInfo::builder(SpellId(104))
            .school(SchoolMask::FIRE)
            .damage_class(DamageClass::Magic)
            .effect(SpellEffectInfo::school_damage(10))
            .build();
        assert!(is_immuned_to_spell(&arena, Some(UnitId(1)), UnitId(2), &hostile));

        let friendly = SpellInfo::builder(SpellId(105))
            .school(SchoolMask::FIRE)
            .positive(true)
            .effect(SpellEffectInfo::heal(10))
            .build();
        assert!(!is_immuned_to_spell(&arena, Some(UnitId(1)), UnitId(2), &friendly));
    }
}
