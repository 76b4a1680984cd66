//! Aura application, stacking, and removal.
//!
//! All mutation funnels through [`remove_aura_from_target`]; every other
//! removal entry point resolves to it. Removal is re-entrancy safe: a
//! handler that removes the aura currently being removed only unwinds the
//! effect slots that are still applied.

use tracing::{debug, trace};

use crate::dr;
use crate::env::CombatEnv;
use crate::events::CombatEvent;
use crate::hit;
use crate::spell::{
    DispelType, Mechanic, MechanicMask, ModScope, SchoolMask, SpellAttributes, SpellId, SpellInfo,
    SpellModKind, SpellModOp, SpellModifier,
};
use crate::state::{AuraStateType, CombatArena, Immunity, UnitId, UnitState};

use super::{Aura, AuraApplication, AuraError, AuraId, AuraKind, EffectRef, RemoveMode};

/// Persisted form of one applied aura, for the character loader.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AuraSnapshot {
    pub spell: SpellId,
    pub caster: Option<UnitId>,
    pub target: UnitId,
    pub stacks: u8,
    pub charges: u8,
    pub duration_ms: i32,
    pub max_duration_ms: i32,
}

// ============================================================================
// Application
// ============================================================================

/// Apply (or stack) an aura of `spell_id` on `target`.
///
/// Runs the full gauntlet: immunity filtering per effect slot, diminishing
/// returns on the duration, stack/refresh against an existing instance,
/// exclusive-group arbitration, and single-target relocation.
pub fn try_apply_aura(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    caster: Option<UnitId>,
    target: UnitId,
    spell_id: SpellId,
) -> Result<AuraId, AuraError> {
    let spell = env.spells()?.require(spell_id)?;
    try_apply_aura_info(arena, env, caster, target, spell)
}

pub(crate) fn try_apply_aura_info(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    caster: Option<UnitId>,
    target: UnitId,
    spell: &SpellInfo,
) -> Result<AuraId, AuraError> {
    let target_unit = arena.require_unit(target)?;
    if !target_unit.is_alive() && !spell.has_attribute(SpellAttributes::CAN_TARGET_DEAD) {
        return Err(AuraError::TargetDead(target));
    }

    if hit::is_immuned_to_spell(arena, caster, target, spell) {
        return Err(AuraError::TargetImmune(target, spell.id));
    }

    // Immune slots stay off the application; a fully immune mask rejects.
    let mut effect_mask: u8 = 0;
    let mut has_aura_effect = false;
    for (slot, effect) in spell.effects.iter().enumerate() {
        if effect.aura_kind().is_none() {
            continue;
        }
        has_aura_effect = true;
        if !hit::is_immuned_to_spell_effect(arena, caster, target, spell, slot) {
            effect_mask |= 1 << slot;
        }
    }
    if !has_aura_effect {
        return Err(AuraError::NoAuraEffects(spell.id));
    }
    if effect_mask == 0 {
        return Err(AuraError::TargetImmune(target, spell.id));
    }

    let duration_ms = dr::diminish_duration(arena, env, caster, target, spell, spell.duration_ms)?;
    if duration_ms == 0 && spell.duration_ms != 0 {
        debug!(spell = %spell.id, %target, "aura fully diminished");
        return Err(AuraError::TargetImmune(target, spell.id));
    }

    // Stack or refresh an existing instance from the same caster.
    if !spell.has_attribute(SpellAttributes::MULTI_SLOT_AURA) {
        if let Some(existing) = find_existing_aura(arena, target, spell.id, caster) {
            let stacks = {
                let aura = arena
                    .aura_mut(existing)
                    .ok_or(AuraError::State(crate::state::StateError::AuraNotFound(existing)))?;
                if aura.stack_amount < aura.max_stacks {
                    aura.stack_amount += 1;
                }
                aura.max_duration_ms = duration_ms;
                aura.refresh();
                aura.stack_amount
            };
            trace!(spell = %spell.id, %target, stacks, "aura refreshed");
            arena.push_event(CombatEvent::AuraApplied {
                target,
                aura: existing,
                spell: spell.id,
                stacks,
            });
            return Ok(existing);
        }
    }

    // Exclusive group: the strongest instance wins the slot.
    if let Some(group) = spell.exclusive_group {
        let new_magnitude = spell
            .effects
            .iter()
            .filter(|e| e.aura_kind().is_some())
            .map(|e| e.base_points.abs())
            .max()
            .unwrap_or(0);
        let mut weaker = Vec::new();
        for app in arena.require_unit(target)?.applications() {
            if app.is_removed() {
                continue;
            }
            let Some(aura) = arena.aura(app.aura) else {
                continue;
            };
            if aura.is_removed() || aura.exclusive_group != Some(group) {
                continue;
            }
            if aura.magnitude() >= new_magnitude {
                return Err(AuraError::WeakerThanExisting);
            }
            weaker.push(aura.id);
        }
        for id in weaker {
            remove_aura_from_target(arena, target, id, RemoveMode::Default);
        }
    }

    // Single-target auras follow the caster to the new target.
    if spell.has_attribute(SpellAttributes::SINGLE_TARGET_AURA) {
        if let Some(caster_id) = caster {
            let owned: Vec<AuraId> = arena
                .unit(caster_id)
                .map(|u| u.owned_auras.clone())
                .unwrap_or_default();
            for id in owned {
                let matches = arena
                    .aura(id)
                    .is_some_and(|a| a.spell == spell.id && !a.is_removed());
                if matches {
                    remove_aura(arena, id, RemoveMode::Default);
                }
            }
        }
    }

    let aura_id = arena.allocate_aura_id();
    let aura = Aura::from_spell(aura_id, spell, caster, duration_ms, arena.now_ms());
    arena.insert_aura(aura);
    if let Some(caster_id) = caster {
        if let Some(caster_unit) = arena.unit_mut(caster_id) {
            caster_unit.owned_auras.push(aura_id);
        }
    }
    apply_aura_to_target(arena, aura_id, target, effect_mask, true);
    Ok(aura_id)
}

fn find_existing_aura(
    arena: &CombatArena,
    target: UnitId,
    spell: SpellId,
    caster: Option<UnitId>,
) -> Option<AuraId> {
    let unit = arena.unit(target)?;
    unit.applications().iter().find_map(|app| {
        if app.is_removed() {
            return None;
        }
        let aura = arena.aura(app.aura)?;
        (!aura.is_removed() && aura.spell == spell && aura.caster == caster).then_some(aura.id)
    })
}

/// Register an aura on a target: application record, per-kind index,
/// side effects, aura states, diminishing bookkeeping.
fn apply_aura_to_target(
    arena: &mut CombatArena,
    aura_id: AuraId,
    target: UnitId,
    effect_mask: u8,
    emit: bool,
) {
    let Some(aura) = arena.aura_mut(aura_id) else {
        return;
    };
    let spell = aura.spell;
    let stacks = aura.stack_amount;
    let mechanic_mask = aura.mechanic_mask;
    let dispel = aura.dispel;
    let dr_group = aura.dr_group;
    aura.applied_to.push(target);

    if let Some(unit) = arena.unit_mut(target) {
        unit.applications
            .push(AuraApplication::new(aura_id, target, effect_mask));
    }

    for slot in 0..super::MAX_SPELL_EFFECTS as u8 {
        if effect_mask & (1 << slot) != 0 {
            register_effect(arena, target, aura_id, slot);
            effect_side_effects(arena, target, aura_id, slot, true);
        }
    }

    if let Some(unit) = arena.unit_mut(target) {
        if mechanic_mask.contains(MechanicMask::FREEZE) {
            unit.modify_aura_state(AuraStateType::Frozen, true);
        }
        if dispel == DispelType::Enrage {
            unit.modify_aura_state(AuraStateType::Enraged, true);
        }
    }

    dr::track_aura(arena, target, dr_group, true);

    if emit {
        arena.push_event(CombatEvent::AuraApplied {
            target,
            aura: aura_id,
            spell,
            stacks,
        });
    }
}

/// Rebuild a persisted aura without resolution side effects: no immunity
/// gauntlet, no diminishing, no events. Index registration and control
/// flags still run so the restored state is queryable.
pub fn restore_aura(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    snapshot: AuraSnapshot,
) -> Result<AuraId, AuraError> {
    let spell = env.spells()?.require(snapshot.spell)?;
    arena.require_unit(snapshot.target)?;

    let aura_id = arena.allocate_aura_id();
    let mut aura = Aura::from_spell(
        aura_id,
        spell,
        snapshot.caster,
        snapshot.max_duration_ms,
        arena.now_ms(),
    );
    aura.stack_amount = snapshot.stacks.clamp(1, aura.max_stacks);
    aura.charges = snapshot.charges;
    aura.refresh();
    aura.duration_ms = snapshot.duration_ms;
    let effect_mask = aura.effect_mask();
    arena.insert_aura(aura);
    if let Some(caster_id) = snapshot.caster {
        if let Some(caster_unit) = arena.unit_mut(caster_id) {
            caster_unit.owned_auras.push(aura_id);
        }
    }
    apply_aura_to_target(arena, aura_id, snapshot.target, effect_mask, false);
    Ok(aura_id)
}

// ============================================================================
// Removal
// ============================================================================

/// Remove one aura from one target.
///
/// Re-entrant: if the application is already being removed, only the effect
/// slots still applied are unwound and the bookkeeping is not repeated.
pub fn remove_aura_from_target(
    arena: &mut CombatArena,
    target: UnitId,
    aura_id: AuraId,
    mode: RemoveMode,
) {
    let already_removing = {
        let Some(unit) = arena.unit_mut(target) else {
            return;
        };
        let Some(app) = unit.applications.iter_mut().find(|a| a.aura == aura_id) else {
            return;
        };
        if app.is_removed() {
            true
        } else {
            app.remove_mode = Some(mode);
            false
        }
    };

    // Unwind slots one at a time, re-reading the mask each step so nested
    // removals of the same application are not unwound twice.
    for slot in 0..super::MAX_SPELL_EFFECTS as u8 {
        let still_applied = {
            let Some(unit) = arena.unit_mut(target) else {
                return;
            };
            let Some(app) = unit.applications.iter_mut().find(|a| a.aura == aura_id) else {
                return;
            };
            let bit = 1 << slot;
            if app.effect_mask & bit != 0 {
                app.effect_mask &= !bit;
                true
            } else {
                false
            }
        };
        if still_applied {
            unregister_effect(arena, target, aura_id, slot);
            effect_side_effects(arena, target, aura_id, slot, false);
        }
    }

    if already_removing {
        return;
    }

    let (spell, mechanic_mask, dispel, dr_group, caster) = {
        let Some(aura) = arena.aura_mut(aura_id) else {
            return;
        };
        aura.applied_to.retain(|t| *t != target);
        let done = aura.applied_to.is_empty();
        if done {
            aura.removed = true;
        }
        (
            aura.spell,
            aura.mechanic_mask,
            aura.dispel,
            aura.dr_group,
            if done { aura.caster } else { None },
        )
    };

    if let Some(unit) = arena.unit_mut(target) {
        unit.applications.retain(|a| a.aura != aura_id);
        if mechanic_mask.contains(MechanicMask::FREEZE) {
            unit.modify_aura_state(AuraStateType::Frozen, false);
        }
        if dispel == DispelType::Enrage {
            unit.modify_aura_state(AuraStateType::Enraged, false);
        }
    }

    dr::track_aura(arena, target, dr_group, false);

    if let Some(caster_id) = caster {
        if let Some(caster_unit) = arena.unit_mut(caster_id) {
            caster_unit.owned_auras.retain(|id| *id != aura_id);
        }
    }

    debug!(%aura_id, %target, ?mode, "aura removed");
    arena.push_event(CombatEvent::AuraRemoved {
        target,
        aura: aura_id,
        spell,
        mode,
    });
}

/// Remove an aura from every target it is applied to.
pub fn remove_aura(arena: &mut CombatArena, aura_id: AuraId, mode: RemoveMode) {
    let targets = match arena.aura(aura_id) {
        Some(aura) if !aura.is_removed() => aura.applied_to.clone(),
        _ => return,
    };
    for target in targets {
        remove_aura_from_target(arena, target, aura_id, mode);
    }
}

/// Remove every application of `spell` on `target`, optionally only those
/// from one caster.
pub fn remove_auras_of_spell(
    arena: &mut CombatArena,
    target: UnitId,
    spell: SpellId,
    caster: Option<UnitId>,
    mode: RemoveMode,
) {
    loop {
        let next = arena.unit(target).and_then(|unit| {
            unit.applications().iter().find_map(|app| {
                if app.is_removed() {
                    return None;
                }
                let aura = arena.aura(app.aura)?;
                let caster_ok = caster.is_none() || aura.caster == caster;
                (!aura.is_removed() && aura.spell == spell && caster_ok).then_some(aura.id)
            })
        });
        match next {
            Some(id) => remove_aura_from_target(arena, target, id, mode),
            None => break,
        }
    }
}

/// Remove every aura on `target` carrying an effect of `kind`.
///
/// Scans from the start after each removal, so handlers that cascade into
/// further removals cannot skip entries.
pub fn remove_auras_by_kind(
    arena: &mut CombatArena,
    target: UnitId,
    kind: AuraKind,
    mode: RemoveMode,
) {
    loop {
        let next = arena
            .effects_of_kind(target, kind)
            .first()
            .map(|snapshot| snapshot.aura);
        match next {
            Some(id) => remove_aura_from_target(arena, target, id, mode),
            None => break,
        }
    }
}

/// Remove every aura on `target` matching the predicate.
///
/// Scans from the start after each removal so cascading handlers cannot
/// skip entries.
pub fn remove_auras_by(
    arena: &mut CombatArena,
    target: UnitId,
    mode: RemoveMode,
    pred: impl Fn(&Aura) -> bool,
) {
    loop {
        let next = arena.unit(target).and_then(|unit| {
            unit.applications().iter().find_map(|app| {
                if app.is_removed() {
                    return None;
                }
                let aura = arena.aura(app.aura)?;
                (!aura.is_removed() && pred(aura)).then_some(aura.id)
            })
        });
        match next {
            Some(id) => remove_aura_from_target(arena, target, id, mode),
            None => break,
        }
    }
}

/// Remove every aura on `target` whose mechanics intersect `mask`.
pub fn remove_auras_with_mechanic(
    arena: &mut CombatArena,
    target: UnitId,
    mask: MechanicMask,
    mode: RemoveMode,
) {
    remove_auras_by(arena, target, mode, |aura| {
        aura.mechanic_mask.intersects(mask)
    });
}

/// A creature leaving combat to reset sheds everything hostile; its own
/// passives and buffs stay.
pub fn remove_auras_on_evade(arena: &mut CombatArena, target: UnitId) {
    remove_auras_by(arena, target, RemoveMode::Default, |aura| {
        !aura.positive && !aura.is_passive()
    });
}

/// Drain every aura off the target.
pub fn remove_all_auras(arena: &mut CombatArena, target: UnitId) {
    loop {
        let next = arena.unit(target).and_then(|unit| {
            unit.applications()
                .iter()
                .find(|app| !app.is_removed())
                .map(|app| app.aura)
        });
        match next {
            Some(id) => remove_aura_from_target(arena, target, id, RemoveMode::Default),
            None => break,
        }
    }
}

/// Death strips everything that is not flagged to persist.
pub fn remove_auras_on_death(arena: &mut CombatArena, target: UnitId) {
    loop {
        let next = arena.unit(target).and_then(|unit| {
            unit.applications().iter().find_map(|app| {
                if app.is_removed() {
                    return None;
                }
                let aura = arena.aura(app.aura)?;
                (!aura.is_removed() && !aura.is_death_persistent()).then_some(aura.id)
            })
        });
        match next {
            Some(id) => remove_aura_from_target(arena, target, id, RemoveMode::Death),
            None => break,
        }
    }
}

/// Strip up to `max_count` auras of the given dispel type.
///
/// Returns how many were removed.
pub fn dispel_auras(
    arena: &mut CombatArena,
    target: UnitId,
    dispel: DispelType,
    max_count: u8,
) -> u8 {
    let mut removed = 0;
    while removed < max_count {
        let next = arena.unit(target).and_then(|unit| {
            unit.applications().iter().find_map(|app| {
                if app.is_removed() {
                    return None;
                }
                let aura = arena.aura(app.aura)?;
                (!aura.is_removed() && aura.dispel == dispel).then_some(aura.id)
            })
        });
        match next {
            Some(id) => {
                remove_aura_from_target(arena, target, id, RemoveMode::Dispel);
                removed += 1;
            }
            None => break,
        }
    }
    removed
}

// ============================================================================
// Charges and stacks
// ============================================================================

/// Consume one charge. Returns true if the aura was removed because the
/// last charge was spent.
pub fn drop_charge(arena: &mut CombatArena, aura_id: AuraId) -> bool {
    let spent = {
        let Some(aura) = arena.aura_mut(aura_id) else {
            return false;
        };
        if !aura.uses_charges || aura.is_removed() {
            return false;
        }
        aura.charges = aura.charges.saturating_sub(1);
        aura.charges == 0
    };
    if spent {
        remove_aura(arena, aura_id, RemoveMode::Default);
    }
    spent
}

/// Schedule a charge drop `delay_ms` from now (projectile travel time).
pub fn drop_charge_delayed(arena: &mut CombatArena, aura_id: AuraId, delay_ms: u64) {
    let now_ms = arena.now_ms();
    if let Some(aura) = arena.aura_mut(aura_id) {
        if aura.uses_charges && !aura.is_removed() {
            aura.pending_charge_drop_at_ms = Some(now_ms + delay_ms);
        }
    }
}

/// Set the stack count directly; zero removes the aura. Duration is left
/// untouched.
pub fn set_stack_amount(arena: &mut CombatArena, aura_id: AuraId, stacks: u8) {
    if stacks == 0 {
        remove_aura(arena, aura_id, RemoveMode::Default);
        return;
    }
    if let Some(aura) = arena.aura_mut(aura_id) {
        aura.stack_amount = stacks.min(aura.max_stacks);
        let count = aura.stack_amount;
        for effect in aura.effects.iter_mut().flatten() {
            effect.recalculate_amount(count);
        }
    }
}

// ============================================================================
// Tick
// ============================================================================

/// Advance the arena clock: cast sessions, periodic ticks, duration expiry,
/// delayed charge drops, reactive windows.
pub fn update(arena: &mut CombatArena, env: &CombatEnv<'_>, dt_ms: u64) -> Result<(), AuraError> {
    let now_ms = arena.now_ms() + dt_ms;
    arena.set_now_ms(now_ms);

    crate::cast::update(arena, dt_ms);

    // Periodic ticks due this step.
    let due: Vec<(AuraId, u8)> = arena
        .auras()
        .filter(|aura| !aura.is_removed())
        .flat_map(|aura| {
            let id = aura.id;
            (0..super::MAX_SPELL_EFFECTS as u8).filter_map(move |slot| {
                let effect = aura.effect(slot)?;
                (effect.is_periodic() && effect.next_tick_ms <= now_ms).then_some((id, slot))
            })
        })
        .collect();
    for (aura_id, slot) in due {
        tick_periodic(arena, env, aura_id, slot)?;
    }

    // Duration expiry.
    let mut expired = Vec::new();
    for aura in arena.auras_mut() {
        if aura.is_removed() || aura.is_permanent() {
            continue;
        }
        aura.duration_ms -= dt_ms as i32;
        if aura.duration_ms <= 0 {
            aura.duration_ms = 0;
            expired.push(aura.id);
        }
    }
    for aura_id in expired {
        remove_aura(arena, aura_id, RemoveMode::Expire);
    }

    // Delayed charge drops that have landed.
    let landed: Vec<AuraId> = arena
        .auras()
        .filter(|aura| {
            !aura.is_removed()
                && aura
                    .pending_charge_drop_at_ms
                    .is_some_and(|at| at <= now_ms)
        })
        .map(|aura| aura.id)
        .collect();
    for aura_id in landed {
        if let Some(aura) = arena.aura_mut(aura_id) {
            aura.pending_charge_drop_at_ms = None;
        }
        drop_charge(arena, aura_id);
    }

    // Reactive windows that have closed.
    for unit_id in arena.unit_ids() {
        if let Some(unit) = arena.unit_mut(unit_id) {
            unit.reactives.retain(|_, expiry| *expiry > now_ms);
        }
    }

    arena.purge_removed_auras();
    Ok(())
}

fn tick_periodic(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    aura_id: AuraId,
    slot: u8,
) -> Result<(), AuraError> {
    let (kind, amount, caster, spell_id, targets) = {
        let Some(aura) = arena.aura_mut(aura_id) else {
            return Ok(());
        };
        let targets = aura.applied_to.clone();
        let caster = aura.caster;
        let spell_id = aura.spell;
        let Some(effect) = aura.effect_mut(slot) else {
            return Ok(());
        };
        effect.next_tick_ms += effect.period_ms as u64;
        effect.tick_number += 1;
        (effect.kind, effect.amount.max(0) as u32, caster, spell_id, targets)
    };

    let spell = env.spells()?.require(spell_id)?.clone();
    for target in targets {
        match kind {
            AuraKind::PeriodicDamage => {
                let scaled = crate::bonus::spell_damage_bonus_taken(
                    arena,
                    caster,
                    target,
                    &spell,
                    amount,
                    crate::spell::DamageKind::Periodic,
                );
                let dealt = arena.apply_damage(target, scaled);
                if let Some(caster_id) = caster {
                    arena.push_event(CombatEvent::SpellDamage {
                        caster: caster_id,
                        target,
                        spell: spell_id,
                        amount: dealt,
                        crit: false,
                        periodic: true,
                    });
                }
                handle_possible_death(arena, target);
            }
            AuraKind::PeriodicHeal => {
                let scaled = crate::bonus::spell_heal_bonus_taken(
                    arena,
                    caster,
                    target,
                    &spell,
                    amount,
                    crate::spell::DamageKind::Periodic,
                );
                let healed = arena.apply_heal(target, scaled);
                if let Some(caster_id) = caster {
                    arena.push_event(CombatEvent::SpellHeal {
                        caster: caster_id,
                        target,
                        spell: spell_id,
                        amount: healed,
                        crit: false,
                        periodic: true,
                    });
                }
            }
            AuraKind::PeriodicLeech => {
                let dealt = arena.apply_damage(target, amount);
                if let Some(caster_id) = caster {
                    arena.apply_heal(caster_id, dealt);
                    arena.push_event(CombatEvent::SpellDamage {
                        caster: caster_id,
                        target,
                        spell: spell_id,
                        amount: dealt,
                        crit: false,
                        periodic: true,
                    });
                }
                handle_possible_death(arena, target);
            }
            _ => {}
        }
    }
    Ok(())
}

pub(crate) fn handle_possible_death(arena: &mut CombatArena, target: UnitId) {
    let died = arena.unit(target).is_some_and(|u| !u.is_alive());
    if died {
        remove_auras_on_death(arena, target);
        arena.push_event(CombatEvent::UnitDied { unit: target });
    }
}

// ============================================================================
// Effect registration and side effects
// ============================================================================

fn register_effect(arena: &mut CombatArena, target: UnitId, aura_id: AuraId, slot: u8) {
    let Some(kind) = arena
        .aura(aura_id)
        .and_then(|aura| aura.effect(slot))
        .map(|effect| effect.kind)
    else {
        return;
    };
    if let Some(unit) = arena.unit_mut(target) {
        unit.mod_auras
            .entry(kind)
            .or_default()
            .push(EffectRef { aura: aura_id, slot });
    }
}

fn unregister_effect(arena: &mut CombatArena, target: UnitId, aura_id: AuraId, slot: u8) {
    let Some(kind) = arena
        .aura(aura_id)
        .and_then(|aura| aura.effect(slot))
        .map(|effect| effect.kind)
    else {
        return;
    };
    if let Some(unit) = arena.unit_mut(target) {
        if let Some(refs) = unit.mod_auras.get_mut(&kind) {
            refs.retain(|r| !(r.aura == aura_id && r.slot == slot));
            if refs.is_empty() {
                unit.mod_auras.remove(&kind);
            }
        }
    }
}

/// State mutations tied to an effect slot being applied or unapplied.
fn effect_side_effects(
    arena: &mut CombatArena,
    target: UnitId,
    aura_id: AuraId,
    slot: u8,
    apply: bool,
) {
    let Some(aura) = arena.aura(aura_id) else {
        return;
    };
    let Some(effect) = aura.effect(slot) else {
        return;
    };
    let kind = effect.kind;
    let amount = effect.amount;
    let misc = effect.misc_value;
    let misc_b = effect.misc_value_b;
    let spell = aura.spell;
    let family = aura.family;
    let family_flags = aura.family_flags;

    match kind {
        AuraKind::ModStun | AuraKind::ModFear | AuraKind::ModConfuse => {
            let state = match kind {
                AuraKind::ModStun => UnitState::STUNNED,
                AuraKind::ModFear => UnitState::FLEEING,
                _ => UnitState::CONFUSED,
            };
            if apply {
                if let Some(unit) = arena.unit_mut(target) {
                    unit.state |= state;
                }
                crate::cast::interrupt_non_melee_spells(arena, target, true, false);
            } else if !arena.has_aura_kind(target, kind) {
                if let Some(unit) = arena.unit_mut(target) {
                    unit.state &= !state;
                }
            }
        }
        AuraKind::ModRoot => {
            if apply {
                if let Some(unit) = arena.unit_mut(target) {
                    unit.state |= UnitState::ROOTED;
                }
            } else if !arena.has_aura_kind(target, AuraKind::ModRoot) {
                if let Some(unit) = arena.unit_mut(target) {
                    unit.state &= !UnitState::ROOTED;
                }
            }
        }
        AuraKind::SchoolImmunity => {
            apply_immunity(arena, target, spell, Immunity::School(school_from_misc(misc)), apply);
        }
        AuraKind::DamageImmunity => {
            apply_immunity(arena, target, spell, Immunity::Damage(school_from_misc(misc)), apply);
        }
        AuraKind::DispelImmunity => {
            if let Some(dispel) = DispelType::from_repr(misc as u8) {
                apply_immunity(arena, target, spell, Immunity::Dispel(dispel), apply);
            }
        }
        AuraKind::MechanicImmunity => {
            if let Some(mechanic) = Mechanic::from_repr(misc as u8) {
                apply_immunity(arena, target, spell, Immunity::Mechanic(mechanic), apply);
            }
        }
        AuraKind::AddFlatModifier | AuraKind::AddPctModifier => {
            let Some(op) = SpellModOp::from_repr(misc as u8) else {
                return;
            };
            let scope = if misc_b != 0 {
                ModScope::Family(family, misc_b as u64)
            } else if family_flags != 0 {
                ModScope::Family(family, family_flags)
            } else {
                ModScope::All
            };
            let modifier = SpellModifier {
                op,
                kind: if kind == AuraKind::AddFlatModifier {
                    SpellModKind::Flat
                } else {
                    SpellModKind::Pct
                },
                scope,
                value: amount as f32,
            };
            if let Some(unit) = arena.unit_mut(target) {
                if apply {
                    unit.add_spell_mod(modifier);
                } else {
                    unit.remove_spell_mod(&modifier);
                }
            }
        }
        // Everything else is query-only through the per-kind index.
        _ => {}
    }
}

fn apply_immunity(
    arena: &mut CombatArena,
    target: UnitId,
    source: SpellId,
    immunity: Immunity,
    apply: bool,
) {
    if let Some(unit) = arena.unit_mut(target) {
        unit.immunity_mut().apply(source, immunity, apply);
    }
}

fn school_from_misc(misc: i32) -> SchoolMask {
    SchoolMask::from_bits_truncate(misc as u8)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::aura::AuraKind;
    use crate::dr::DiminishGroup;
    use crate::env::{DefaultProcPolicy, Env, PcgRng, SpellOracle, TablesOracle};
    use crate::spell::{ExclusiveGroup, SpellEffectInfo};
    use crate::state::{Immunity, Unit, UnitClass};

    struct MapSpells(BTreeMap<SpellId, SpellInfo>);

    impl SpellOracle for MapSpells {
        fn spell(&self, id: SpellId) -> Option<&SpellInfo> {
            self.0.get(&id)
        }
    }

    struct NoTables;
    impl TablesOracle for NoTables {
        fn proc_event(&self, _: SpellId) -> Option<crate::env::ProcEventEntry> {
            None
        }
    }

    const BUFF: SpellId = SpellId(800);
    const FEAR: SpellId = SpellId(801);
    const WARD_WEAK: SpellId = SpellId(802);
    const WARD_STRONG: SpellId = SpellId(803);
    const SOULSTONE: SpellId = SpellId(804);
    const DOT: SpellId = SpellId(805);
    const STUN: SpellId = SpellId(806);

    fn catalog() -> MapSpells {
        let mut spells = BTreeMap::new();
        spells.insert(
            BUFF,
            SpellInfo::builder(BUFF)
                .positive(true)
                .max_stacks(3)
                .duration_ms(10_000)
                .effect(SpellEffectInfo::aura(AuraKind::ModDamageDone, 30))
                .build(),
        );
        spells.insert(
            FEAR,
            SpellInfo::builder(FEAR)
                .mechanic(crate::spell::Mechanic::Fear)
                .dr_group(DiminishGroup::Fear)
                .duration_ms(8000)
                .effect(SpellEffectInfo::aura(AuraKind::ModFear, 600))
                .build(),
        );
        spells.insert(
            WARD_WEAK,
            SpellInfo::builder(WARD_WEAK)
                .positive(true)
                .duration_ms(30_000)
                .exclusive_group(ExclusiveGroup(1))
                .effect(SpellEffectInfo::aura(AuraKind::ModDamageDone, 20))
                .build(),
        );
        spells.insert(
            WARD_STRONG,
            SpellInfo::builder(WARD_STRONG)
                .positive(true)
                .duration_ms(30_000)
                .exclusive_group(ExclusiveGroup(1))
                .effect(SpellEffectInfo::aura(AuraKind::ModDamageDone, 45))
                .build(),
        );
        spells.insert(
            SOULSTONE,
            SpellInfo::builder(SOULSTONE)
                .positive(true)
                .attributes(SpellAttributes::DEATH_PERSISTENT)
                .duration_ms(-1)
                .effect(SpellEffectInfo::aura(AuraKind::Dummy, 0))
                .build(),
        );
        spells.insert(
            DOT,
            SpellInfo::builder(DOT)
                .duration_ms(3000)
                .effect(
                    SpellEffectInfo::aura(AuraKind::PeriodicDamage, 50).with_period(1000),
                )
                .build(),
        );
        spells.insert(
            STUN,
            SpellInfo::builder(STUN)
                .mechanic(crate::spell::Mechanic::Stun)
                .duration_ms(4000)
                .effect(SpellEffectInfo::aura(AuraKind::ModStun, 300))
                .build(),
        );
        MapSpells(spells)
    }

    fn arena_with_pair() -> CombatArena {
        let mut arena = CombatArena::new(5);
        arena.insert_unit(Unit::builder(UnitId(1)).player(UnitClass::Warlock).build());
        arena.insert_unit(Unit::builder(UnitId(2)).player(UnitClass::Warrior).build());
        arena
    }

    #[test]
    fn stacking_caps_and_scales_amounts() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let first = try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), BUFF)
            .expect("applies");
        for _ in 0..3 {
            let again = try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), BUFF)
                .expect("stacks");
            assert_eq!(again, first);
        }
        let aura = arena.aura(first).expect("aura alive");
        assert_eq!(aura.stack_amount, 3);
        assert_eq!(aura.effect(0).expect("slot 0").amount, 90);
        assert_eq!(arena.total_aura_modifier(UnitId(2), AuraKind::ModDamageDone), 90);
    }

    #[test]
    fn exclusive_group_keeps_the_strongest() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let weak = try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), WARD_WEAK)
            .expect("weak applies");
        try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), WARD_STRONG)
            .expect("strong replaces");
        assert!(!arena.has_aura_of_spell(UnitId(2), WARD_WEAK));
        assert!(arena.aura(weak).is_none_or(|a| a.is_removed()));

        // A weaker instance bounces off the stronger holder.
        assert_eq!(
            try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), WARD_WEAK),
            Err(AuraError::WeakerThanExisting)
        );
        assert_eq!(arena.total_aura_modifier(UnitId(2), AuraKind::ModDamageDone), 45);
    }

    #[test]
    fn repeated_fear_diminishes_to_immunity() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();
        // Move off the zero instant so the diminish window has a real
        // reference time.
        update(&mut arena, &env, 1000).expect("tick");

        let mut durations = Vec::new();
        for _ in 0..3 {
            let id = try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), FEAR)
                .expect("fear lands");
            durations.push(arena.aura(id).expect("aura alive").duration_ms);
            remove_auras_of_spell(&mut arena, UnitId(2), FEAR, None, RemoveMode::Default);
        }
        assert_eq!(durations, vec![8000, 4000, 2000]);

        assert_eq!(
            try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), FEAR),
            Err(AuraError::TargetImmune(UnitId(2), FEAR))
        );
    }

    #[test]
    fn restore_rebuilds_an_aura_without_side_effects() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();
        update(&mut arena, &env, 1000).expect("tick");
        arena.drain_events();

        let id = restore_aura(
            &mut arena,
            &env,
            AuraSnapshot {
                spell: FEAR,
                caster: Some(UnitId(1)),
                target: UnitId(2),
                stacks: 1,
                charges: 0,
                duration_ms: 3000,
                max_duration_ms: 8000,
            },
        )
        .expect("restores");

        // No events, but the indices and control flags are live again.
        assert!(arena.drain_events().is_empty());
        let aura = arena.aura(id).expect("aura alive");
        assert_eq!(aura.duration_ms, 3000);
        assert_eq!(aura.max_duration_ms, 8000);
        assert!(arena.has_aura_of_spell(UnitId(2), FEAR));
        assert!(arena
            .unit(UnitId(2))
            .is_some_and(|u| u.has_unit_state(UnitState::FLEEING)));

        // A fresh application still lands at level zero: restoring did not
        // advance the diminish counter.
        let again = try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), FEAR)
            .expect("fear lands undiminished");
        assert_eq!(arena.aura(again).expect("aura alive").duration_ms, 8000);
    }

    #[test]
    fn mechanic_immunity_rejects_the_aura() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        arena
            .unit_mut(UnitId(2))
            .expect("target exists")
            .immunity_mut()
            .apply(SpellId(1), Immunity::Mechanic(crate::spell::Mechanic::Fear), true);

        assert_eq!(
            try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), FEAR),
            Err(AuraError::TargetImmune(UnitId(2), FEAR))
        );
    }

    #[test]
    fn death_spares_persistent_auras() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), BUFF).expect("buff");
        try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), SOULSTONE)
            .expect("soulstone");

        remove_auras_on_death(&mut arena, UnitId(2));
        assert!(!arena.has_aura_of_spell(UnitId(2), BUFF));
        assert!(arena.has_aura_of_spell(UnitId(2), SOULSTONE));
    }

    #[test]
    fn evade_sheds_only_hostile_auras() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), FEAR).expect("fear");
        try_apply_aura(&mut arena, &env, Some(UnitId(2)), UnitId(2), BUFF).expect("buff");

        remove_auras_on_evade(&mut arena, UnitId(2));
        assert!(!arena.has_aura_of_spell(UnitId(2), FEAR));
        assert!(arena.has_aura_of_spell(UnitId(2), BUFF));
    }

    #[test]
    fn mechanic_mask_removal_breaks_the_stun() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), STUN).expect("stun");
        assert!(arena
            .unit(UnitId(2))
            .is_some_and(|u| u.has_unit_state(UnitState::STUNNED)));

        remove_auras_with_mechanic(
            &mut arena,
            UnitId(2),
            MechanicMask::STUN,
            RemoveMode::Dispel,
        );
        assert!(!arena.has_aura_of_spell(UnitId(2), STUN));
        assert!(!arena
            .unit(UnitId(2))
            .is_some_and(|u| u.has_unit_state(UnitState::STUNNED)));
    }

    #[test]
    fn periodic_damage_ticks_on_update() {
        let mut arena = arena_with_pair();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        try_apply_aura(&mut arena, &env, Some(UnitId(1)), UnitId(2), DOT).expect("dot");
        let before = arena.unit(UnitId(2)).expect("target").health;
        arena.drain_events();

        update(&mut arena, &env, 1000).expect("tick");
        let after = arena.unit(UnitId(2)).expect("target").health;
        assert_eq!(before - after, 50);
        assert!(arena.drain_events().iter().any(|e| matches!(
            e,
            CombatEvent::SpellDamage {
                spell: DOT,
                amount: 50,
                periodic: true,
                ..
            }
        )));
    }
}
