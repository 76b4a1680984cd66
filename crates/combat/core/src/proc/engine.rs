//! The proc engine.
//!
//! Runs in two phases over the actor's auras: first collect every aura that
//! qualifies for the event and wins its chance roll, then dispatch the
//! handlers. Collection snapshots ids up front, so handlers that add or
//! remove auras cannot invalidate the walk.

use tracing::{debug, trace};

use crate::aura::lifecycle;
use crate::aura::{AuraId, AuraKind, RemoveMode};
use crate::env::{CombatEnv, OracleError};
use crate::events::CombatEvent;
use crate::spell::{DamageKind, EffectKind, SpellAttributes, SpellId, SpellInfo, SpellModOp};
use crate::state::{CombatArena, ReactiveType, UnitClass, UnitId};

use super::{ProcContext, ProcExtra, ProcFlags};

/// Seed context for proc chance rolls.
const CTX_PROC: u32 = 2;

/// Minimum projectile distance assumed for delayed charge drops, in yards.
const MIN_REFLECT_DISTANCE: f32 = 5.0;

struct PendingProc {
    aura: AuraId,
    spell: SpellInfo,
    cooldown_ms: u32,
}

/// Fire every aura on `ctx.actor` that procs from this event.
///
/// Also maintains the event's physical fallout that is not tied to any
/// aura: reactive ability windows and damage bleed on breakable crowd
/// control.
pub fn proc_damage_and_spell(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    ctx: ProcContext<'_>,
) -> Result<(), OracleError> {
    update_reactives(arena, &ctx);
    if ctx.damage > 0 {
        if let Some(defender) = defender_of(&ctx) {
            bleed_damage_limited_cc(arena, defender, ctx.damage);
        }
    }

    if !arena.unit(ctx.actor).is_some_and(|u| u.can_proc()) {
        return Ok(());
    }

    let pending = collect_procs(arena, env, &ctx)?;
    for proc in pending {
        dispatch_proc(arena, env, &ctx, proc)?;
    }
    Ok(())
}

fn defender_of(ctx: &ProcContext<'_>) -> Option<UnitId> {
    if ctx.proc_flags.is_taken() {
        Some(ctx.actor)
    } else {
        ctx.victim
    }
}

fn attacker_of(ctx: &ProcContext<'_>) -> Option<UnitId> {
    if ctx.proc_flags.is_taken() {
        ctx.victim
    } else {
        Some(ctx.actor)
    }
}

// ============================================================================
// Collection
// ============================================================================

fn collect_procs(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    ctx: &ProcContext<'_>,
) -> Result<Vec<PendingProc>, OracleError> {
    let now_ms = arena.now_ms();
    let candidates: Vec<AuraId> = arena
        .unit(ctx.actor)
        .map(|unit| {
            unit.applications()
                .iter()
                .filter(|app| !app.is_removed())
                .map(|app| app.aura)
                .collect()
        })
        .unwrap_or_default();

    let mut pending = Vec::new();
    for aura_id in candidates {
        let (aura_spell, uses_charges, charges, cooldown_until, aura_caster) = {
            let Some(aura) = arena.aura(aura_id) else {
                continue;
            };
            if aura.is_removed() {
                continue;
            }
            (
                aura.spell,
                aura.uses_charges,
                aura.charges,
                aura.proc_cooldown_until_ms,
                aura.caster,
            )
        };
        if cooldown_until > now_ms {
            continue;
        }
        if uses_charges && charges == 0 {
            continue;
        }
        // An aura never procs from its own spell landing.
        if ctx.spell.is_some_and(|s| s.id == aura_spell) {
            continue;
        }
        let Some(info) = env.spells()?.spell(aura_spell) else {
            continue;
        };
        if !info
            .effects
            .iter()
            .filter_map(|e| e.aura_kind())
            .any(is_proc_handler)
        {
            continue;
        }

        let entry = env.tables()?.proc_event(aura_spell);

        let effective_flags = match entry {
            Some(e) if !e.proc_flags.is_empty() => e.proc_flags,
            _ => info.proc_flags,
        };
        if effective_flags.is_empty() || !effective_flags.intersects(ctx.proc_flags) {
            continue;
        }

        if let Some(entry) = &entry {
            if let Some(trigger) = ctx.spell {
                if !entry.school_mask.is_empty()
                    && !entry.school_mask.intersects(trigger.school_mask)
                {
                    continue;
                }
                if entry.spell_family != crate::spell::SpellFamily::Generic
                    && entry.spell_family != trigger.family
                {
                    continue;
                }
                if entry.family_flags != 0 && trigger.family_flags & entry.family_flags == 0 {
                    continue;
                }
            }
        }

        let required_extra = entry.map(|e| e.proc_ex).unwrap_or_default();
        if required_extra.is_empty() {
            // Without an override only landed hits proc.
            if !ctx.proc_extra.is_empty() && !ctx.proc_extra.intersects(ProcExtra::ACTIVE_HIT) {
                continue;
            }
        } else if !ctx.proc_extra.intersects(required_extra) {
            continue;
        }

        let from_triggered =
            ctx.triggered || ctx.proc_extra.contains(ProcExtra::INTERNAL_TRIGGERED);
        if from_triggered && !info.has_attribute(SpellAttributes::CAN_PROC_WITH_TRIGGERED) {
            continue;
        }

        let policy = env.policy()?;
        if !policy.condition_satisfied(ctx.actor, ctx.victim, aura_spell)
            || !policy.equipment_satisfied(ctx.actor, aura_spell)
        {
            continue;
        }
        // A per-caster debuff only procs when its own caster is involved.
        if info.has_aura_kind(AuraKind::ModSpellDamageFromCaster)
            && aura_caster.is_some()
            && aura_caster != attacker_of(ctx)
        {
            continue;
        }

        let chance = proc_chance(arena, ctx, info, entry.as_ref());
        arena.bump_nonce();
        let seed = arena.next_seed(ctx.actor, CTX_PROC);
        if !env.rng()?.roll_chance(seed, chance) {
            trace!(spell = %aura_spell, chance, "proc roll failed");
            continue;
        }

        let cooldown_ms = entry
            .map(|e| e.cooldown_s * 1000)
            .filter(|cd| *cd > 0)
            .unwrap_or(info.proc_cooldown_ms);
        pending.push(PendingProc {
            aura: aura_id,
            spell: info.clone(),
            cooldown_ms,
        });
    }
    Ok(pending)
}

/// Chance for one aura to proc from this event, in percent.
///
/// Proc-per-minute rates win over flat chances; the spell's own PPM wins
/// over the table's. A descriptor with no chance at all procs always.
fn proc_chance(
    arena: &CombatArena,
    ctx: &ProcContext<'_>,
    info: &SpellInfo,
    entry: Option<&crate::env::ProcEventEntry>,
) -> f32 {
    let Some(unit) = arena.unit(ctx.actor) else {
        return 0.0;
    };
    let ppm = if info.proc_base_ppm > 0.0 {
        info.proc_base_ppm
    } else {
        entry.map(|e| e.ppm_rate).unwrap_or(0.0)
    };
    let mut chance = if ppm > 0.0 {
        let attack = ctx
            .spell
            .map(|s| s.attack_type())
            .unwrap_or(crate::spell::AttackType::Base);
        unit.weapon_speed_for(attack) as f32 * ppm / 600.0
    } else {
        let custom = entry.map(|e| e.custom_chance).unwrap_or(0.0);
        if custom > 0.0 {
            custom
        } else if info.proc_chance > 0.0 {
            info.proc_chance
        } else {
            100.0
        }
    };
    chance = unit.apply_spell_mod(SpellModOp::ChanceOfSuccess, info, chance);
    chance
}

fn is_proc_handler(kind: AuraKind) -> bool {
    matches!(
        kind,
        AuraKind::ProcTriggerSpell
            | AuraKind::ProcTriggerSpellWithValue
            | AuraKind::ProcTriggerDamage
            | AuraKind::Dummy
            | AuraKind::ManaShield
            | AuraKind::SchoolAbsorb
            | AuraKind::RaidProcFromCharge
            | AuraKind::RaidProcFromChargeWithValue
            | AuraKind::ModCastingSpeedNotStack
            | AuraKind::ReflectSpells
            | AuraKind::ReflectSpellsSchool
            | AuraKind::ModPowerCostSchool
            | AuraKind::MechanicImmunity
            | AuraKind::MechanicResistance
            | AuraKind::ModSpellDamageFromCaster
    )
}

// ============================================================================
// Dispatch
// ============================================================================

fn dispatch_proc(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    ctx: &ProcContext<'_>,
    proc: PendingProc,
) -> Result<(), OracleError> {
    let (uses_charges, charges, removed) = match arena.aura(proc.aura) {
        Some(aura) => (aura.uses_charges, aura.charges, aura.is_removed()),
        None => return Ok(()),
    };
    if removed || (uses_charges && charges == 0) {
        return Ok(());
    }

    let disable_procs = proc.spell.has_attribute(SpellAttributes::DISABLE_PROC);
    if disable_procs {
        if let Some(unit) = arena.unit_mut(ctx.actor) {
            unit.cant_proc_depth += 1;
        }
    }

    let mut take_charge = false;
    let mut triggered_spell = None;
    for slot in 0..crate::spell::MAX_SPELL_EFFECTS as u8 {
        let Some(effect) = arena.aura(proc.aura).and_then(|a| a.effect(slot)).copied() else {
            continue;
        };
        match effect.kind {
            AuraKind::ProcTriggerSpell | AuraKind::ProcTriggerSpellWithValue => {
                let Some(trigger_id) = effect.trigger_spell else {
                    continue;
                };
                let Some(trigger) = env.spells()?.spell(trigger_id) else {
                    continue;
                };
                let trigger = trigger.clone();
                let value = (effect.kind == AuraKind::ProcTriggerSpellWithValue)
                    .then_some(effect.amount);
                cast_triggered_spell(arena, env, ctx, &trigger, value)?;
                triggered_spell = Some(trigger_id);
                take_charge = true;
            }
            AuraKind::ProcTriggerDamage => {
                if let Some(victim) = ctx.victim {
                    let scaled = crate::bonus::spell_damage_bonus_taken(
                        arena,
                        Some(ctx.actor),
                        victim,
                        &proc.spell,
                        effect.amount.max(0) as u32,
                        DamageKind::Direct,
                    );
                    let dealt = arena.apply_damage(victim, scaled);
                    arena.push_event(CombatEvent::SpellDamage {
                        caster: ctx.actor,
                        target: victim,
                        spell: proc.spell.id,
                        amount: dealt,
                        crit: false,
                        periodic: false,
                    });
                    lifecycle::handle_possible_death(arena, victim);
                    take_charge = true;
                }
            }
            AuraKind::RaidProcFromCharge | AuraKind::RaidProcFromChargeWithValue => {
                if let Some(next) = env.policy()?.next_jump_target(ctx.actor, proc.spell.id) {
                    let caster = arena.aura(proc.aura).and_then(|a| a.caster);
                    let _ = lifecycle::try_apply_aura(arena, env, caster, next, proc.spell.id);
                }
                take_charge = true;
            }
            AuraKind::ModCastingSpeedNotStack => {
                // Only real casts consume the haste charge.
                if ctx.spell.is_some_and(|s| s.cast_time_ms > 0) {
                    take_charge = true;
                }
            }
            AuraKind::ReflectSpells => take_charge = true,
            AuraKind::ReflectSpellsSchool | AuraKind::ModPowerCostSchool => {
                let matches = ctx.spell.is_some_and(|s| {
                    s.school_mask.bits() as i32 & effect.misc_value != 0
                });
                if matches {
                    take_charge = true;
                }
            }
            AuraKind::MechanicImmunity | AuraKind::MechanicResistance => {
                let matches = ctx.spell.is_some_and(|s| {
                    !(s.all_effects_mechanic_mask()
                        & crate::spell::MechanicMask::from_bits_truncate(
                            1u32 << effect.misc_value.clamp(0, 31),
                        ))
                        .is_empty()
                });
                if matches {
                    take_charge = true;
                }
            }
            AuraKind::Dummy
            | AuraKind::ManaShield
            | AuraKind::SchoolAbsorb
            | AuraKind::ModSpellDamageFromCaster => {
                take_charge = true;
            }
            _ => {}
        }
    }

    if take_charge {
        if proc.cooldown_ms > 0 {
            let until = arena.now_ms() + proc.cooldown_ms as u64;
            if let Some(aura) = arena.aura_mut(proc.aura) {
                aura.proc_cooldown_until_ms = until;
            }
        }
        debug!(spell = %proc.spell.id, aura = %proc.aura, "aura procced");
        arena.push_event(CombatEvent::ProcTriggered {
            owner: ctx.actor,
            aura: proc.aura,
            spell: proc.spell.id,
            trigger: triggered_spell,
        });
        if uses_charges {
            // Reflected projectiles take travel time to come back; the
            // charge stays up until the reflect lands.
            let travel_ms = ctx
                .spell
                .filter(|_| ctx.proc_extra.contains(ProcExtra::REFLECT))
                .filter(|s| s.speed > 0.0)
                .map(|s| (MIN_REFLECT_DISTANCE / s.speed * 1000.0) as u64);
            match travel_ms {
                Some(delay) => lifecycle::drop_charge_delayed(arena, proc.aura, delay),
                None => {
                    lifecycle::drop_charge(arena, proc.aura);
                }
            }
        }
    }

    if disable_procs {
        if let Some(unit) = arena.unit_mut(ctx.actor) {
            unit.cant_proc_depth = unit.cant_proc_depth.saturating_sub(1);
        }
    }
    Ok(())
}

/// Resolve a proc-triggered spell inline: no hit roll, no cast session.
fn cast_triggered_spell(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    ctx: &ProcContext<'_>,
    trigger: &SpellInfo,
    override_amount: Option<i32>,
) -> Result<(), OracleError> {
    let target = if trigger.is_positive() {
        ctx.actor
    } else {
        ctx.victim.unwrap_or(ctx.actor)
    };

    let mut applied_aura = false;
    for effect in &trigger.effects {
        match effect.kind {
            EffectKind::SchoolDamage => {
                let base = override_amount.unwrap_or(effect.base_points).max(0) as u32;
                let done = crate::bonus::spell_damage_bonus_done(
                    arena,
                    env,
                    ctx.actor,
                    Some(target),
                    trigger,
                    effect,
                    base,
                    DamageKind::Direct,
                    1,
                )?;
                let scaled = crate::bonus::spell_damage_bonus_taken(
                    arena,
                    Some(ctx.actor),
                    target,
                    trigger,
                    done,
                    DamageKind::Direct,
                );
                let dealt = arena.apply_damage(target, scaled);
                arena.push_event(CombatEvent::SpellDamage {
                    caster: ctx.actor,
                    target,
                    spell: trigger.id,
                    amount: dealt,
                    crit: false,
                    periodic: false,
                });
                lifecycle::handle_possible_death(arena, target);
            }
            EffectKind::Heal => {
                let base = override_amount.unwrap_or(effect.base_points).max(0) as u32;
                let done = crate::bonus::spell_heal_bonus_done(
                    arena,
                    ctx.actor,
                    Some(target),
                    trigger,
                    effect,
                    base,
                    DamageKind::Direct,
                    1,
                );
                let scaled = crate::bonus::spell_heal_bonus_taken(
                    arena,
                    Some(ctx.actor),
                    target,
                    trigger,
                    done,
                    DamageKind::Direct,
                );
                let healed = arena.apply_heal(target, scaled);
                arena.push_event(CombatEvent::SpellHeal {
                    caster: ctx.actor,
                    target,
                    spell: trigger.id,
                    amount: healed,
                    crit: false,
                    periodic: false,
                });
            }
            EffectKind::Energize => {
                if let Some(unit) = arena.unit_mut(ctx.actor) {
                    let amount = override_amount.unwrap_or(effect.base_points).max(0) as u32;
                    unit.power = (unit.power + amount).min(unit.max_power);
                }
            }
            EffectKind::ApplyAura(_) => applied_aura = true,
            _ => {}
        }
    }
    if applied_aura {
        // Recoverable failures (immune, weaker, dead) just drop the proc.
        if let Err(err) = lifecycle::try_apply_aura(arena, env, Some(ctx.actor), target, trigger.id)
        {
            match err {
                crate::aura::AuraError::Oracle(oracle) => return Err(oracle),
                other => trace!(spell = %trigger.id, %target, %other, "triggered aura not applied"),
            }
        }
    }
    Ok(())
}

// ============================================================================
// Reactives and crowd-control bleed
// ============================================================================

/// Open reactive ability windows from avoided attacks.
fn update_reactives(arena: &mut CombatArena, ctx: &ProcContext<'_>) {
    let now_ms = arena.now_ms();
    let defender = defender_of(ctx);
    let attacker = attacker_of(ctx);

    if ctx.proc_extra.contains(ProcExtra::DODGE) {
        if let Some(unit) = defender.and_then(|id| arena.unit_mut(id)) {
            // Rogues have no dodge-reactive ability.
            if unit.class != UnitClass::Rogue {
                unit.start_reactive(ReactiveType::Defense, now_ms);
            }
        }
        if let Some(unit) = attacker.and_then(|id| arena.unit_mut(id)) {
            if unit.class == UnitClass::Warrior {
                unit.start_reactive(ReactiveType::Overpower, now_ms);
                unit.add_combo_points(1);
            }
        }
    }
    if ctx.proc_extra.contains(ProcExtra::PARRY) {
        if let Some(unit) = defender.and_then(|id| arena.unit_mut(id)) {
            if unit.class == UnitClass::Hunter {
                unit.start_reactive(ReactiveType::HunterParry, now_ms);
            } else {
                unit.start_reactive(ReactiveType::Defense, now_ms);
            }
        }
    }
    if ctx.proc_extra.contains(ProcExtra::BLOCK) {
        if let Some(unit) = defender.and_then(|id| arena.unit_mut(id)) {
            unit.start_reactive(ReactiveType::Defense, now_ms);
        }
    }
}

/// Damage chips away at breakable crowd control; the aura breaks when the
/// effect amount runs out. Auras still at full duration are spared so the
/// application that carried the damage cannot break itself.
fn bleed_damage_limited_cc(arena: &mut CombatArena, target: UnitId, damage: u32) {
    let candidates: Vec<(AuraId, u8)> = arena
        .unit(target)
        .map(|unit| {
            unit.applications()
                .iter()
                .filter(|app| !app.is_removed())
                .flat_map(|app| {
                    let aura_id = app.aura;
                    (0..crate::spell::MAX_SPELL_EFFECTS as u8).filter_map(move |slot| {
                        (app.effect_mask & (1 << slot) != 0).then_some((aura_id, slot))
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let mut broken = Vec::new();
    for (aura_id, slot) in candidates {
        let Some(aura) = arena.aura_mut(aura_id) else {
            continue;
        };
        if aura.is_removed() || aura.at_full_duration() {
            continue;
        }
        let Some(effect) = aura.effect_mut(slot) else {
            continue;
        };
        if !effect.kind.is_damage_limited_cc() {
            continue;
        }
        effect.amount -= damage as i32;
        if effect.amount <= 0 {
            broken.push(aura_id);
        }
    }
    for aura_id in broken {
        lifecycle::remove_aura_from_target(arena, target, aura_id, RemoveMode::Default);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::aura::lifecycle::try_apply_aura;
    use crate::env::{
        DefaultProcPolicy, Env, PcgRng, ProcEventEntry, SpellOracle, TablesOracle,
    };
    use crate::spell::{SchoolMask, SpellEffectInfo};
    use crate::state::{Unit, UnitClass};

    struct MapSpells(BTreeMap<SpellId, SpellInfo>);

    impl MapSpells {
        fn new(spells: impl IntoIterator<Item = SpellInfo>) -> Self {
            MapSpells(spells.into_iter().map(|s| (s.id, s)).collect())
        }
    }

    impl SpellOracle for MapSpells {
        fn spell(&self, id: SpellId) -> Option<&SpellInfo> {
            self.0.get(&id)
        }
    }

    struct NoTables;
    impl TablesOracle for NoTables {
        fn proc_event(&self, _: SpellId) -> Option<ProcEventEntry> {
            None
        }
    }

    fn trigger_spell() -> SpellInfo {
        SpellInfo::builder(SpellId(20))
            .school(SchoolMask::HOLY)
            .positive(true)
            .duration_ms(10_000)
            .effect(SpellEffectInfo::aura(AuraKind::ModDamageDone, 30).with_misc(0x7f))
            .build()
    }

    fn proc_aura_spell() -> SpellInfo {
        SpellInfo::builder(SpellId(10))
            .school(SchoolMask::HOLY)
            .positive(true)
            .duration_ms(-1)
            .proc(ProcFlags::DONE_SPELL_MAGIC_DMG_CLASS_NEG, 100.0, 2)
            .effect(
                SpellEffectInfo::aura(AuraKind::ProcTriggerSpell, 0).with_trigger(SpellId(20)),
            )
            .build()
    }

    fn attack_spell() -> SpellInfo {
        SpellInfo::builder(SpellId(30))
            .school(SchoolMask::SHADOW)
            .damage_class(crate::spell::DamageClass::Magic)
            .build()
    }

    #[test]
    fn proc_trigger_spell_fires_and_consumes_charge() {
        let spells = MapSpells::new([proc_aura_spell(), trigger_spell()]);
        let tables = NoTables;
        let policy = DefaultProcPolicy;
        let rng = PcgRng;
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let mut arena = CombatArena::new(7);
        arena.insert_unit(Unit::builder(UnitId(1)).player(UnitClass::Paladin).build());
        arena.insert_unit(Unit::builder(UnitId(2)).build());
        let aura_id = try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(1), SpellId(10))
            .expect("proc aura applies");
        arena.drain_events();

        let attack = attack_spell();
        proc_damage_and_spell(
            &mut arena,
            &env,
            ProcContext {
                actor: UnitId(1),
                victim: Some(UnitId(2)),
                proc_flags: ProcFlags::DONE_SPELL_MAGIC_DMG_CLASS_NEG,
                proc_extra: ProcExtra::NORMAL_HIT,
                damage: 100,
                spell: Some(&attack),
                triggered: false,
            },
        )
        .expect("proc runs");

        assert_eq!(arena.aura(aura_id).expect("aura alive").charges, 1);
        assert!(arena.has_aura_of_spell(UnitId(1), SpellId(20)));
        let events = arena.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            CombatEvent::ProcTriggered { owner, trigger: Some(t), .. }
                if *owner == UnitId(1) && *t == SpellId(20)
        )));
    }

    #[test]
    fn last_charge_removes_the_proc_aura() {
        let mut one_charge = proc_aura_spell();
        one_charge.proc_charges = 1;
        let spells = MapSpells::new([one_charge, trigger_spell()]);
        let tables = NoTables;
        let policy = DefaultProcPolicy;
        let rng = PcgRng;
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let mut arena = CombatArena::new(7);
        arena.insert_unit(Unit::builder(UnitId(1)).build());
        arena.insert_unit(Unit::builder(UnitId(2)).build());
        try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(1), SpellId(10))
            .expect("proc aura applies");

        let attack = attack_spell();
        proc_damage_and_spell(
            &mut arena,
            &env,
            ProcContext {
                actor: UnitId(1),
                victim: Some(UnitId(2)),
                proc_flags: ProcFlags::DONE_SPELL_MAGIC_DMG_CLASS_NEG,
                proc_extra: ProcExtra::NORMAL_HIT,
                damage: 100,
                spell: Some(&attack),
                triggered: false,
            },
        )
        .expect("proc runs");

        assert!(!arena.has_aura_of_spell(UnitId(1), SpellId(10)));
    }

    #[test]
    fn proc_cooldown_blocks_the_second_event() {
        let mut with_cd = proc_aura_spell();
        with_cd.proc_cooldown_ms = 30_000;
        with_cd.proc_charges = 5;
        let spells = MapSpells::new([with_cd, trigger_spell()]);
        let tables = NoTables;
        let policy = DefaultProcPolicy;
        let rng = PcgRng;
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let mut arena = CombatArena::new(7);
        arena.insert_unit(Unit::builder(UnitId(1)).build());
        arena.insert_unit(Unit::builder(UnitId(2)).build());
        let aura_id = try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(1), SpellId(10))
            .expect("proc aura applies");

        let attack = attack_spell();
        let ctx = ProcContext {
            actor: UnitId(1),
            victim: Some(UnitId(2)),
            proc_flags: ProcFlags::DONE_SPELL_MAGIC_DMG_CLASS_NEG,
            proc_extra: ProcExtra::NORMAL_HIT,
            damage: 100,
            spell: Some(&attack),
            triggered: false,
        };
        proc_damage_and_spell(&mut arena, &env, ctx).expect("first proc");
        assert_eq!(arena.aura(aura_id).expect("aura alive").charges, 4);
        proc_damage_and_spell(&mut arena, &env, ctx).expect("second proc");
        assert_eq!(arena.aura(aura_id).expect("aura alive").charges, 4);
    }

    #[test]
    fn triggered_casts_need_the_attribute_to_proc() {
        let spells = MapSpells::new([proc_aura_spell(), trigger_spell()]);
        let tables = NoTables;
        let policy = DefaultProcPolicy;
        let rng = PcgRng;
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let mut arena = CombatArena::new(7);
        arena.insert_unit(Unit::builder(UnitId(1)).build());
        arena.insert_unit(Unit::builder(UnitId(2)).build());
        let aura_id = try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(1), SpellId(10))
            .expect("proc aura applies");

        let attack = attack_spell();
        proc_damage_and_spell(
            &mut arena,
            &env,
            ProcContext {
                actor: UnitId(1),
                victim: Some(UnitId(2)),
                proc_flags: ProcFlags::DONE_SPELL_MAGIC_DMG_CLASS_NEG,
                proc_extra: ProcExtra::NORMAL_HIT,
                damage: 100,
                spell: Some(&attack),
                triggered: true,
            },
        )
        .expect("proc runs");

        assert_eq!(arena.aura(aura_id).expect("aura alive").charges, 2);
        assert!(!arena.has_aura_of_spell(UnitId(1), SpellId(20)));
    }

    #[test]
    fn dodge_opens_reactive_windows_for_both_sides() {
        let spells = MapSpells::new([]);
        let tables = NoTables;
        let policy = DefaultProcPolicy;
        let rng = PcgRng;
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let mut arena = CombatArena::new(7);
        arena.insert_unit(Unit::builder(UnitId(1)).player(UnitClass::Warrior).build());
        arena.insert_unit(Unit::builder(UnitId(2)).player(UnitClass::Paladin).build());

        proc_damage_and_spell(
            &mut arena,
            &env,
            ProcContext {
                actor: UnitId(1),
                victim: Some(UnitId(2)),
                proc_flags: ProcFlags::DONE_MELEE_AUTO_ATTACK,
                proc_extra: ProcExtra::DODGE,
                damage: 0,
                spell: None,
                triggered: false,
            },
        )
        .expect("proc runs");

        let now = arena.now_ms();
        let attacker = arena.unit(UnitId(1)).expect("attacker");
        assert!(attacker.has_reactive(ReactiveType::Overpower, now));
        assert_eq!(attacker.combo_points, 1);
        let defender = arena.unit(UnitId(2)).expect("defender");
        assert!(defender.has_reactive(ReactiveType::Defense, now));
    }

    #[test]
    fn damage_breaks_aged_crowd_control() {
        let fear = SpellInfo::builder(SpellId(40))
            .school(SchoolMask::SHADOW)
            .duration_ms(8000)
            .effect(SpellEffectInfo::aura(AuraKind::ModFear, 120))
            .build();
        let spells = MapSpells::new([fear]);
        let tables = NoTables;
        let policy = DefaultProcPolicy;
        let rng = PcgRng;
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let mut arena = CombatArena::new(7);
        arena.insert_unit(Unit::builder(UnitId(1)).build());
        arena.insert_unit(Unit::builder(UnitId(2)).build());
        try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), SpellId(40))
            .expect("fear applies");
        crate::aura::lifecycle::update(&mut arena, &env, 1000).expect("tick");
        assert!(arena.has_aura_of_spell(UnitId(2), SpellId(40)));

        proc_damage_and_spell(
            &mut arena,
            &env,
            ProcContext {
                actor: UnitId(2),
                victim: Some(UnitId(1)),
                proc_flags: ProcFlags::TAKEN_ANY_DAMAGE,
                proc_extra: ProcExtra::NORMAL_HIT,
                damage: 150,
                spell: None,
                triggered: false,
            },
        )
        .expect("proc runs");

        assert!(!arena.has_aura_of_spell(UnitId(2), SpellId(40)));
    }
}
