//! Cast session controller.
//!
//! Each unit owns three concurrent cast slots: a generic cast, a channel,
//! and an auto-repeat shot. Starting a spell in one slot interrupts the
//! others per a fixed matrix; crowd control and damage interrupt through
//! the same funnel. The controller tracks timing and emits events; the
//! host resolves the spell itself when `CastFinished` fires.

use tracing::{debug, trace};

use crate::env::{CombatEnv, OracleError};
use crate::error::{CombatError, ErrorSeverity};
use crate::events::CombatEvent;
use crate::spell::{SpellAttributes, SpellId, SpellModOp};
use crate::state::{CombatArena, StateError, UnitId, UnitState};

/// Cast slot identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CastSlot {
    Generic,
    Channeled,
    AutoRepeat,
}

const SLOT_COUNT: usize = 3;

/// Lifecycle of one session inside its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CastState {
    /// Cast or channel time still running.
    Preparing,
    /// Cast complete, projectile in flight.
    Delayed,
    /// Resolved; about to leave the slot.
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CastSession {
    pub spell: SpellId,
    pub target: Option<UnitId>,
    pub state: CastState,
    /// Total cast (or channel) time after modifiers.
    pub cast_time_ms: u32,
    pub remaining_ms: u32,
    pub channeled: bool,
    pub interruptible: bool,
}

/// The three cast slots of one unit.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CastSlots {
    slots: [Option<CastSession>; SLOT_COUNT],
    /// The first shot of a fresh auto-repeat session has a wind-up delay.
    pub auto_repeat_first_cast: bool,
}

impl CastSlots {
    pub fn get(&self, slot: CastSlot) -> Option<&CastSession> {
        self.slots[slot_index(slot)].as_ref()
    }

    fn get_mut(&mut self, slot: CastSlot) -> Option<&mut CastSession> {
        self.slots[slot_index(slot)].as_mut()
    }

    fn set(&mut self, slot: CastSlot, session: Option<CastSession>) {
        self.slots[slot_index(slot)] = session;
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }
}

fn slot_index(slot: CastSlot) -> usize {
    match slot {
        CastSlot::Generic => 0,
        CastSlot::Channeled => 1,
        CastSlot::AutoRepeat => 2,
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CastError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("caster {0} is dead")]
    CasterDead(UnitId),

    #[error("caster {0} is controlled and cannot cast")]
    CasterControlled(UnitId),
}

impl CombatError for CastError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            CastError::Oracle(e) => e.severity(),
            CastError::State(e) => e.severity(),
            CastError::CasterDead(_) | CastError::CasterControlled(_) => ErrorSeverity::Recoverable,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            CastError::Oracle(e) => e.error_code(),
            CastError::State(e) => e.error_code(),
            CastError::CasterDead(_) => "CAST_CASTER_DEAD",
            CastError::CasterControlled(_) => "CAST_CASTER_CONTROLLED",
        }
    }
}

// ============================================================================
// Starting a cast
// ============================================================================

/// Begin casting `spell_id`, claiming the appropriate slot and interrupting
/// whatever the matrix says has to yield.
///
/// Returns the slot the session occupies; instant spells finish in place
/// and still report the slot they passed through.
pub fn start_cast(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    caster: UnitId,
    spell_id: SpellId,
    target: Option<UnitId>,
) -> Result<CastSlot, CastError> {
    let spell = env.spells()?.require(spell_id)?;
    let caster_unit = arena.require_unit(caster)?;
    if !caster_unit.is_alive() {
        return Err(CastError::CasterDead(caster));
    }
    if caster_unit.is_controlled() {
        return Err(CastError::CasterControlled(caster));
    }

    let cast_time_ms = caster_unit
        .apply_spell_mod(SpellModOp::CastingTime, spell, spell.cast_time_ms as f32)
        .max(0.0) as u32;

    let slot = if spell.is_auto_repeat() {
        CastSlot::AutoRepeat
    } else if spell.is_channeled() {
        CastSlot::Channeled
    } else {
        CastSlot::Generic
    };

    // Interrupt matrix.
    match slot {
        CastSlot::Generic => {
            interrupt_spell(arena, caster, CastSlot::Generic, false, true);
            interrupt_spell(arena, caster, CastSlot::Channeled, false, true);
            let auto_shot = arena
                .unit(caster)
                .and_then(|u| u.casts().get(CastSlot::AutoRepeat))
                .is_some_and(|s| s.spell == SpellId::AUTO_SHOT);
            if !auto_shot && !spell.has_attribute(SpellAttributes::NOT_RESET_AUTO_ACTIONS) {
                interrupt_spell(arena, caster, CastSlot::AutoRepeat, true, true);
            }
        }
        CastSlot::Channeled => {
            interrupt_spell(arena, caster, CastSlot::Generic, false, true);
            interrupt_spell(arena, caster, CastSlot::Channeled, true, true);
            let auto_shot = arena
                .unit(caster)
                .and_then(|u| u.casts().get(CastSlot::AutoRepeat))
                .is_some_and(|s| s.spell == SpellId::AUTO_SHOT);
            if !auto_shot {
                interrupt_spell(arena, caster, CastSlot::AutoRepeat, true, true);
            }
        }
        CastSlot::AutoRepeat => {
            if spell_id != SpellId::AUTO_SHOT {
                interrupt_spell(arena, caster, CastSlot::Generic, false, true);
                interrupt_spell(arena, caster, CastSlot::Channeled, false, true);
            }
            if let Some(unit) = arena.unit_mut(caster) {
                unit.casts_mut().auto_repeat_first_cast = true;
            }
        }
    }

    let channeled = spell.is_channeled();
    // Channels run for their aura duration once the (usually zero) cast
    // time has elapsed.
    let total_ms = if channeled {
        cast_time_ms + spell.duration_ms.max(0) as u32
    } else {
        cast_time_ms
    };

    let session = CastSession {
        spell: spell_id,
        target,
        state: CastState::Preparing,
        cast_time_ms: total_ms,
        remaining_ms: total_ms,
        channeled,
        interruptible: !spell.has_attribute(SpellAttributes::UNINTERRUPTIBLE),
    };

    arena.push_event(CombatEvent::CastStarted {
        caster,
        spell: spell_id,
    });
    trace!(%caster, spell = %spell_id, ?slot, cast_time_ms, "cast started");

    if total_ms == 0 && slot != CastSlot::AutoRepeat {
        // Instant: never occupies the slot.
        arena.push_event(CombatEvent::CastFinished {
            caster,
            spell: spell_id,
        });
        return Ok(slot);
    }

    if let Some(unit) = arena.unit_mut(caster) {
        unit.casts_mut().set(slot, Some(session));
        if slot == CastSlot::Generic && total_ms > 0 {
            unit.state |= UnitState::CASTING;
        }
    }
    Ok(slot)
}

// ============================================================================
// Interrupts
// ============================================================================

/// Interrupt the session in one slot.
///
/// `with_delayed` also stops spells already in flight; `with_instant` also
/// stops zero-cast-time sessions (auto-repeat wind-ups).
pub fn interrupt_spell(
    arena: &mut CombatArena,
    unit_id: UnitId,
    slot: CastSlot,
    with_delayed: bool,
    with_instant: bool,
) {
    let Some(session) = arena
        .unit(unit_id)
        .and_then(|u| u.casts().get(slot))
        .copied()
    else {
        return;
    };
    if !with_delayed && session.state == CastState::Delayed {
        return;
    }
    if !with_instant && session.cast_time_ms == 0 {
        return;
    }
    if !session.interruptible {
        return;
    }

    if let Some(unit) = arena.unit_mut(unit_id) {
        unit.casts_mut().set(slot, None);
        if slot == CastSlot::Generic {
            unit.state &= !UnitState::CASTING;
        }
    }

    if session.state != CastState::Finished {
        if session.channeled {
            arena.push_event(CombatEvent::ChannelUpdate {
                caster: unit_id,
                spell: session.spell,
                remaining_ms: 0,
            });
        }
        arena.push_event(CombatEvent::CastInterrupted {
            caster: unit_id,
            spell: session.spell,
        });
        debug!(%unit_id, spell = %session.spell, ?slot, "cast interrupted");
    }
}

/// Interrupt every non-melee cast slot.
pub fn interrupt_non_melee_spells(
    arena: &mut CombatArena,
    unit_id: UnitId,
    with_delayed: bool,
    with_instant: bool,
) {
    interrupt_spell(arena, unit_id, CastSlot::Generic, with_delayed, with_instant);
    interrupt_spell(arena, unit_id, CastSlot::Channeled, true, true);
    interrupt_spell(arena, unit_id, CastSlot::AutoRepeat, true, true);
}

/// Stop all casting except, optionally, one spell id.
pub fn cast_stop(arena: &mut CombatArena, unit_id: UnitId, except: Option<SpellId>) {
    for slot in [CastSlot::Generic, CastSlot::Channeled, CastSlot::AutoRepeat] {
        let keep = arena
            .unit(unit_id)
            .and_then(|u| u.casts().get(slot))
            .is_some_and(|s| except == Some(s.spell));
        if !keep {
            interrupt_spell(arena, unit_id, slot, true, true);
        }
    }
}

/// Is the unit busy with a non-melee spell?
pub fn is_non_melee_spell_cast(
    arena: &CombatArena,
    unit_id: UnitId,
    with_delayed: bool,
    skip_channeled: bool,
    skip_autorepeat: bool,
    skip_instant: bool,
) -> bool {
    let Some(unit) = arena.unit(unit_id) else {
        return false;
    };
    if let Some(session) = unit.casts().get(CastSlot::Generic) {
        let delayed_ok = with_delayed || session.state != CastState::Delayed;
        let instant_ok = !skip_instant || session.cast_time_ms > 0;
        if session.state != CastState::Finished && delayed_ok && instant_ok {
            return true;
        }
    }
    if !skip_channeled {
        if let Some(session) = unit.casts().get(CastSlot::Channeled) {
            if session.state != CastState::Finished {
                return true;
            }
        }
    }
    if !skip_autorepeat && unit.casts().get(CastSlot::AutoRepeat).is_some() {
        return true;
    }
    false
}

/// Mark a session finished and free its slot.
pub fn finish_spell(arena: &mut CombatArena, unit_id: UnitId, slot: CastSlot) {
    let Some(session) = arena
        .unit(unit_id)
        .and_then(|u| u.casts().get(slot))
        .copied()
    else {
        return;
    };
    if let Some(unit) = arena.unit_mut(unit_id) {
        unit.casts_mut().set(slot, None);
        if slot == CastSlot::Generic {
            unit.state &= !UnitState::CASTING;
        }
    }
    if session.channeled {
        arena.push_event(CombatEvent::ChannelUpdate {
            caster: unit_id,
            spell: session.spell,
            remaining_ms: 0,
        });
    }
    arena.push_event(CombatEvent::CastFinished {
        caster: unit_id,
        spell: session.spell,
    });
}

// ============================================================================
// Tick
// ============================================================================

/// Advance every unit's cast sessions by `dt_ms`.
///
/// Finished sessions emit `CastFinished`; the host resolves the spell from
/// the event stream.
pub fn update(arena: &mut CombatArena, dt_ms: u64) {
    for unit_id in arena.unit_ids() {
        for slot in [CastSlot::Generic, CastSlot::Channeled, CastSlot::AutoRepeat] {
            let finished = {
                let Some(unit) = arena.unit_mut(unit_id) else {
                    continue;
                };
                let Some(session) = unit.casts_mut().get_mut(slot) else {
                    continue;
                };
                if session.state != CastState::Preparing {
                    continue;
                }
                session.remaining_ms = session.remaining_ms.saturating_sub(dt_ms as u32);
                session.remaining_ms == 0
            };
            if finished {
                finish_spell(arena, unit_id, slot);
            } else {
                // Channel progress notification.
                let channel = arena
                    .unit(unit_id)
                    .and_then(|u| u.casts().get(slot))
                    .filter(|s| s.channeled)
                    .map(|s| (s.spell, s.remaining_ms));
                if let Some((spell, remaining_ms)) = channel {
                    arena.push_event(CombatEvent::ChannelUpdate {
                        caster: unit_id,
                        spell,
                        remaining_ms,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::env::{DefaultProcPolicy, Env, PcgRng, SpellOracle, TablesOracle};
    use crate::spell::{SpellEffectInfo, SpellInfo};
    use crate::state::{Unit, UnitClass};

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

    const FIREBOLT: SpellId = SpellId(900);
    const SMITE: SpellId = SpellId(901);
    const DRAIN: SpellId = SpellId(902);
    const BARRAGE: SpellId = SpellId(903);
    const IRON_WILL: SpellId = SpellId(904);

    fn catalog() -> MapSpells {
        let mut spells = BTreeMap::new();
        spells.insert(
            FIREBOLT,
            SpellInfo::builder(FIREBOLT)
                .cast_time_ms(2500)
                .effect(SpellEffectInfo::school_damage(100))
                .build(),
        );
        spells.insert(
            SMITE,
            SpellInfo::builder(SMITE)
                .effect(SpellEffectInfo::school_damage(50))
                .build(),
        );
        spells.insert(
            DRAIN,
            SpellInfo::builder(DRAIN)
                .attributes(SpellAttributes::CHANNELED)
                .duration_ms(9000)
                .effect(SpellEffectInfo::school_damage(30))
                .build(),
        );
        spells.insert(
            BARRAGE,
            SpellInfo::builder(BARRAGE)
                .attributes(SpellAttributes::AUTO_REPEAT)
                .effect(SpellEffectInfo::school_damage(40))
                .build(),
        );
        spells.insert(
            SpellId::AUTO_SHOT,
            SpellInfo::builder(SpellId::AUTO_SHOT)
                .attributes(SpellAttributes::AUTO_REPEAT)
                .effect(SpellEffectInfo::school_damage(20))
                .build(),
        );
        spells.insert(
            IRON_WILL,
            SpellInfo::builder(IRON_WILL)
                .attributes(SpellAttributes::UNINTERRUPTIBLE)
                .cast_time_ms(2000)
                .effect(SpellEffectInfo::school_damage(60))
                .build(),
        );
        MapSpells(spells)
    }

    fn arena_with_caster() -> CombatArena {
        let mut arena = CombatArena::new(11);
        arena.insert_unit(Unit::builder(UnitId(1)).player(UnitClass::Mage).build());
        arena.insert_unit(Unit::builder(UnitId(2)).player(UnitClass::Warrior).build());
        arena
    }

    #[test]
    fn instant_cast_finishes_without_occupying_a_slot() {
        let mut arena = arena_with_caster();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let slot = start_cast(&mut arena, &env, UnitId(1), SMITE, Some(UnitId(2)))
            .expect("cast starts");
        assert_eq!(slot, CastSlot::Generic);

        let unit = arena.unit(UnitId(1)).expect("caster exists");
        assert!(unit.casts().is_empty());
        assert!(!unit.has_unit_state(UnitState::CASTING));

        let events = arena.drain_events();
        assert!(events.contains(&CombatEvent::CastStarted {
            caster: UnitId(1),
            spell: SMITE,
        }));
        assert!(events.contains(&CombatEvent::CastFinished {
            caster: UnitId(1),
            spell: SMITE,
        }));
    }

    #[test]
    fn timed_cast_occupies_the_generic_slot_until_update_finishes_it() {
        let mut arena = arena_with_caster();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        start_cast(&mut arena, &env, UnitId(1), FIREBOLT, Some(UnitId(2))).expect("cast starts");
        {
            let unit = arena.unit(UnitId(1)).expect("caster exists");
            let session = unit.casts().get(CastSlot::Generic).expect("slot occupied");
            assert_eq!(session.remaining_ms, 2500);
            assert!(unit.has_unit_state(UnitState::CASTING));
        }
        arena.drain_events();

        update(&mut arena, 1000);
        assert!(arena.drain_events().is_empty());

        update(&mut arena, 1500);
        let unit = arena.unit(UnitId(1)).expect("caster exists");
        assert!(unit.casts().is_empty());
        assert!(!unit.has_unit_state(UnitState::CASTING));
        assert!(arena.drain_events().contains(&CombatEvent::CastFinished {
            caster: UnitId(1),
            spell: FIREBOLT,
        }));
    }

    #[test]
    fn channel_runs_for_its_duration_and_reports_progress() {
        let mut arena = arena_with_caster();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        let slot = start_cast(&mut arena, &env, UnitId(1), DRAIN, Some(UnitId(2)))
            .expect("channel starts");
        assert_eq!(slot, CastSlot::Channeled);
        let session = arena
            .unit(UnitId(1))
            .and_then(|u| u.casts().get(CastSlot::Channeled))
            .copied()
            .expect("channel occupies its slot");
        assert_eq!(session.cast_time_ms, 9000);
        arena.drain_events();

        update(&mut arena, 3000);
        assert!(arena.drain_events().contains(&CombatEvent::ChannelUpdate {
            caster: UnitId(1),
            spell: DRAIN,
            remaining_ms: 6000,
        }));

        update(&mut arena, 6000);
        let events = arena.drain_events();
        assert!(events.contains(&CombatEvent::ChannelUpdate {
            caster: UnitId(1),
            spell: DRAIN,
            remaining_ms: 0,
        }));
        assert!(events.contains(&CombatEvent::CastFinished {
            caster: UnitId(1),
            spell: DRAIN,
        }));
    }

    #[test]
    fn new_generic_cast_interrupts_the_running_channel() {
        let mut arena = arena_with_caster();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        start_cast(&mut arena, &env, UnitId(1), DRAIN, Some(UnitId(2))).expect("channel starts");
        arena.drain_events();

        start_cast(&mut arena, &env, UnitId(1), FIREBOLT, Some(UnitId(2))).expect("cast starts");
        let events = arena.drain_events();
        assert!(events.contains(&CombatEvent::CastInterrupted {
            caster: UnitId(1),
            spell: DRAIN,
        }));
        assert!(
            arena
                .unit(UnitId(1))
                .is_some_and(|u| u.casts().get(CastSlot::Channeled).is_none())
        );
    }

    #[test]
    fn auto_shot_survives_a_generic_cast_but_other_repeats_do_not() {
        let mut arena = arena_with_caster();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        start_cast(&mut arena, &env, UnitId(1), SpellId::AUTO_SHOT, Some(UnitId(2)))
            .expect("auto shot starts");
        assert!(
            arena
                .unit(UnitId(1))
                .is_some_and(|u| u.casts().auto_repeat_first_cast)
        );
        start_cast(&mut arena, &env, UnitId(1), FIREBOLT, Some(UnitId(2))).expect("cast starts");
        assert!(
            arena
                .unit(UnitId(1))
                .is_some_and(|u| u.casts().get(CastSlot::AutoRepeat).is_some())
        );

        // A non-default repeat yields to the next generic cast.
        start_cast(&mut arena, &env, UnitId(1), BARRAGE, Some(UnitId(2)))
            .expect("barrage starts");
        start_cast(&mut arena, &env, UnitId(1), FIREBOLT, Some(UnitId(2))).expect("cast starts");
        assert!(
            arena
                .unit(UnitId(1))
                .is_some_and(|u| u.casts().get(CastSlot::AutoRepeat).is_none())
        );
    }

    #[test]
    fn uninterruptible_casts_ignore_the_interrupt_funnel() {
        let mut arena = arena_with_caster();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        start_cast(&mut arena, &env, UnitId(1), IRON_WILL, Some(UnitId(2))).expect("cast starts");
        arena.drain_events();

        interrupt_non_melee_spells(&mut arena, UnitId(1), true, true);
        assert!(arena.drain_events().is_empty());
        assert!(
            arena
                .unit(UnitId(1))
                .is_some_and(|u| u.casts().get(CastSlot::Generic).is_some())
        );
    }

    #[test]
    fn dead_or_controlled_casters_are_rejected() {
        let mut arena = arena_with_caster();
        let (spells, tables, policy, rng) = (catalog(), NoTables, DefaultProcPolicy, PcgRng);
        let env = Env::with_all(&spells, &tables, &policy, &rng).as_combat_env();

        if let Some(unit) = arena.unit_mut(UnitId(1)) {
            unit.state |= UnitState::STUNNED;
        }
        assert_eq!(
            start_cast(&mut arena, &env, UnitId(1), SMITE, Some(UnitId(2))),
            Err(CastError::CasterControlled(UnitId(1)))
        );

        arena.insert_unit(
            Unit::builder(UnitId(3))
                .player(UnitClass::Priest)
                .health(0, 1000)
                .build(),
        );
        assert_eq!(
            start_cast(&mut arena, &env, UnitId(3), SMITE, Some(UnitId(2))),
            Err(CastError::CasterDead(UnitId(3)))
        );
    }
}
