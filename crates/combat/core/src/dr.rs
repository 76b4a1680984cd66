//! Diminishing returns on crowd control.
//!
//! Repeated control effects of the same group land with shorter and
//! shorter durations until the target is outright immune. The counter
//! decays once the target has been free of the group for the full window.

use std::collections::BTreeMap;

use crate::env::{CombatEnv, OracleError};
use crate::spell::SpellInfo;
use crate::state::{CombatArena, CreatureFlags, UnitId};

/// A fresh application resets the counter only after this long with no
/// aura of the group present.
pub const DIMINISHING_WINDOW_MS: u64 = 18_000;

/// Diminishing group a spell belongs to.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display,
    strum::EnumIter,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiminishGroup {
    #[default]
    None,
    Stun,
    Fear,
    Charm,
    Root,
    Sleep,
    Disorient,
    Horror,
    Silence,
    Banish,
    Taunt,
    AoeKnockback,
}

/// Who a group diminishes against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiminishScope {
    /// Only player targets (and creatures flagged to diminish like them).
    Player,
    /// Every target.
    All,
}

impl DiminishGroup {
    pub fn scope(self) -> DiminishScope {
        match self {
            DiminishGroup::Stun | DiminishGroup::Taunt | DiminishGroup::AoeKnockback => {
                DiminishScope::All
            }
            _ => DiminishScope::Player,
        }
    }

    /// Duration multiplier at a given diminish level.
    pub fn multiplier(self, level: u8) -> f32 {
        match self {
            DiminishGroup::None => 1.0,
            DiminishGroup::Taunt => match level {
                0 => 1.0,
                1 => 0.65,
                2 => 0.4225,
                3 => 0.274625,
                _ => 0.0,
            },
            DiminishGroup::AoeKnockback => match level {
                0 => 1.0,
                _ => 0.5,
            },
            _ => match level {
                0 => 1.0,
                1 => 0.5,
                2 => 0.25,
                _ => 0.0,
            },
        }
    }

    /// Highest level the counter climbs to.
    pub fn max_level(self) -> u8 {
        match self {
            DiminishGroup::None => 0,
            DiminishGroup::Taunt => 4,
            DiminishGroup::AoeKnockback => 1,
            _ => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct DiminishEntry {
    /// Live auras of this group currently on the unit.
    stack: u32,
    /// Diminish level reached.
    hit_count: u8,
    /// When the last aura of the group left the unit.
    hit_time_ms: u64,
}

/// Per-unit diminishing state.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiminishingTracker {
    entries: BTreeMap<DiminishGroup, DiminishEntry>,
}

impl DiminishingTracker {
    /// Current diminish level, decaying lazily: with no live aura and the
    /// window elapsed the counter resets to zero.
    pub fn level(&mut self, group: DiminishGroup, now_ms: u64) -> u8 {
        let Some(entry) = self.entries.get_mut(&group) else {
            return 0;
        };
        if entry.hit_count == 0 || entry.hit_time_ms == 0 {
            return 0;
        }
        if entry.stack == 0 && now_ms.saturating_sub(entry.hit_time_ms) > DIMINISHING_WINDOW_MS {
            *entry = DiminishEntry::default();
            return 0;
        }
        entry.hit_count
    }

    /// Record one landed application, capped at the group maximum.
    pub fn increment(&mut self, group: DiminishGroup, now_ms: u64) {
        let max = group.max_level();
        let entry = self.entries.entry(group).or_default();
        if entry.hit_count < max {
            entry.hit_count += 1;
        }
        if entry.hit_time_ms == 0 {
            entry.hit_time_ms = now_ms;
        }
    }

    /// Track aura presence; the decay window opens when the last aura of
    /// the group is removed.
    pub fn apply_aura(&mut self, group: DiminishGroup, apply: bool, now_ms: u64) {
        let entry = self.entries.entry(group).or_default();
        if apply {
            entry.stack += 1;
        } else {
            entry.stack = entry.stack.saturating_sub(1);
            if entry.stack == 0 {
                entry.hit_time_ms = now_ms;
            }
        }
    }
}

/// True when the unit diminishes like a player: actual players and
/// creatures flagged to share player diminishing.
fn diminishes_like_player(arena: &CombatArena, unit: UnitId) -> bool {
    arena.unit(unit).is_some_and(|u| {
        u.is_player() || u.creature_flags().contains(CreatureFlags::ALL_DIMINISH)
    })
}

fn caster_is_player(arena: &CombatArena, caster: Option<UnitId>) -> bool {
    let Some(caster) = caster else {
        return false;
    };
    arena.unit(caster).is_some_and(|u| {
        u.is_player()
            || u.owner
                .and_then(|owner| arena.unit(owner))
                .is_some_and(|owner| owner.is_player())
    })
}

/// Scale a control duration by the target's diminishing state and record
/// the application.
///
/// Returns the granted duration; 0 means fully diminished (the aura must
/// not be applied). Durations of -1 (permanent) pass through untouched.
pub(crate) fn diminish_duration(
    arena: &mut CombatArena,
    env: &CombatEnv<'_>,
    caster: Option<UnitId>,
    target: UnitId,
    spell: &SpellInfo,
    base_duration_ms: i32,
) -> Result<i32, OracleError> {
    let group = spell.dr_group;
    if group == DiminishGroup::None || base_duration_ms < 0 {
        return Ok(base_duration_ms);
    }

    let player_like = diminishes_like_player(arena, target);
    if group.scope() == DiminishScope::Player && !player_like {
        return Ok(base_duration_ms);
    }
    if group == DiminishGroup::Taunt {
        let taunt_diminishes = arena.unit(target).is_some_and(|u| {
            u.is_player() || u.creature_flags().contains(CreatureFlags::TAUNT_DIMINISH)
        });
        if !taunt_diminishes {
            return Ok(base_duration_ms);
        }
    }

    // Hostile player sources cap the duration before diminishing.
    let mut duration = base_duration_ms;
    if player_like && caster_is_player(arena, caster) {
        if let Some(limit) = env.tables()?.dr_limit_duration_ms(spell.id) {
            duration = duration.min(limit as i32);
        }
    }

    let now_ms = arena.now_ms();
    let Some(unit) = arena.unit_mut(target) else {
        return Ok(base_duration_ms);
    };
    let level = unit.diminishing.level(group, now_ms);
    unit.diminishing.increment(group, now_ms);

    Ok((duration as f32 * group.multiplier(level)) as i32)
}

/// Notify the tracker that a diminished aura was applied or removed.
pub(crate) fn track_aura(arena: &mut CombatArena, target: UnitId, group: DiminishGroup, apply: bool) {
    if group == DiminishGroup::None {
        return;
    }
    let now_ms = arena.now_ms();
    if let Some(unit) = arena.unit_mut(target) {
        unit.diminishing.apply_aura(group, apply, now_ms);
    }
}
