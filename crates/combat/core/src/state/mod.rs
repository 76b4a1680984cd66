//! Combat runtime state.
//!
//! [`CombatArena`] owns every unit and every live aura. All mutation goes
//! through free functions (or arena methods) that take the arena plus ids;
//! nothing holds long-lived references into it, which keeps the recursive
//! removal and proc cascades borrow-safe.
mod immunity;
mod unit;

pub use immunity::{EffectTag, Immunity, ImmunityTable};
pub use unit::{
    AuraStateType, CreatureFlags, CreatureRank, CreatureTypeMask, ReactiveType, Unit, UnitBuilder,
    UnitClass, UnitKind, UnitState, REACTIVE_TIMER_MS,
};

use std::collections::BTreeMap;

use crate::aura::{Aura, AuraId, AuraKind};
use crate::env::compute_seed;
use crate::error::{CombatError, ErrorSeverity};
use crate::events::CombatEvent;
use crate::spell::SpellId;

/// Stable unit identifier assigned by the host when a combatant enters the
/// arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitId(pub u32);

impl core::fmt::Display for UnitId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unit:{}", self.0)
    }
}

/// Lookup errors for arena state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StateError {
    #[error("unit {0} not found")]
    UnitNotFound(UnitId),

    #[error("aura {0} not found")]
    AuraNotFound(AuraId),
}

impl CombatError for StateError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            StateError::UnitNotFound(_) => "STATE_UNIT_NOT_FOUND",
            StateError::AuraNotFound(_) => "STATE_AURA_NOT_FOUND",
        }
    }
}

/// Borrow-free snapshot of one live aura effect, used wherever a query has
/// to outlive the arena borrow (proc collection, bonus sums).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectSnapshot {
    pub aura: AuraId,
    pub slot: u8,
    pub amount: i32,
    pub misc: i32,
    pub misc_b: i32,
    pub caster: Option<UnitId>,
    pub spell: SpellId,
}

/// Owner of all combat runtime state.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CombatArena {
    combat_seed: u64,
    nonce: u64,
    now_ms: u64,
    units: BTreeMap<UnitId, Unit>,
    auras: BTreeMap<AuraId, Aura>,
    next_aura_id: u32,
    /// Pending observable outcomes; drained by the host after each action.
    #[cfg_attr(feature = "serde", serde(skip))]
    events: Vec<CombatEvent>,
}

impl CombatArena {
    pub fn new(combat_seed: u64) -> Self {
        CombatArena {
            combat_seed,
            ..CombatArena::default()
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub(crate) fn set_now_ms(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    /// Deterministic seed for the next roll by `actor`.
    ///
    /// `context` distinguishes independent rolls inside one resolved action;
    /// call [`CombatArena::bump_nonce`] once per action, not per roll.
    pub fn next_seed(&self, actor: UnitId, context: u32) -> u64 {
        compute_seed(self.combat_seed, self.nonce, actor.0, context)
    }

    pub fn bump_nonce(&mut self) {
        self.nonce = self.nonce.wrapping_add(1);
    }

    pub(crate) fn push_event(&mut self, event: CombatEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[CombatEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<CombatEvent> {
        core::mem::take(&mut self.events)
    }

    // ========================================================================
    // Units
    // ========================================================================

    pub fn insert_unit(&mut self, unit: Unit) {
        self.units.insert(unit.id, unit);
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    pub fn require_unit(&self, id: UnitId) -> Result<&Unit, StateError> {
        self.unit(id).ok_or(StateError::UnitNotFound(id))
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.units.keys().copied().collect()
    }

    /// Apply damage to a unit's health pool. Returns the amount actually
    /// removed. Death flips `alive`; aura cleanup on death is the
    /// lifecycle's job.
    pub fn apply_damage(&mut self, target: UnitId, amount: u32) -> u32 {
        let Some(unit) = self.units.get_mut(&target) else {
            return 0;
        };
        let dealt = amount.min(unit.health);
        unit.health -= dealt;
        if unit.health == 0 {
            unit.alive = false;
        }
        dealt
    }

    /// Heal a unit, capped at max health. Returns the effective amount.
    pub fn apply_heal(&mut self, target: UnitId, amount: u32) -> u32 {
        let Some(unit) = self.units.get_mut(&target) else {
            return 0;
        };
        if !unit.alive {
            return 0;
        }
        let healed = amount.min(unit.max_health - unit.health);
        unit.health += healed;
        healed
    }

    // ========================================================================
    // Auras
    // ========================================================================

    pub(crate) fn allocate_aura_id(&mut self) -> AuraId {
        self.next_aura_id += 1;
        AuraId(self.next_aura_id)
    }

    pub(crate) fn insert_aura(&mut self, aura: Aura) {
        self.auras.insert(aura.id, aura);
    }

    pub fn aura(&self, id: AuraId) -> Option<&Aura> {
        self.auras.get(&id)
    }

    pub fn aura_mut(&mut self, id: AuraId) -> Option<&mut Aura> {
        self.auras.get_mut(&id)
    }

    pub fn auras(&self) -> impl Iterator<Item = &Aura> {
        self.auras.values()
    }

    pub(crate) fn auras_mut(&mut self) -> impl Iterator<Item = &mut Aura> {
        self.auras.values_mut()
    }

    /// Drop auras that have been removed from every target. Removal only
    /// flags an aura; physical deletion is deferred to this drain so that
    /// id-based references stay valid inside removal cascades.
    pub(crate) fn purge_removed_auras(&mut self) {
        self.auras
            .retain(|_, aura| !(aura.is_removed() && aura.applied_to.is_empty()));
    }

    // ========================================================================
    // Aura queries
    // ========================================================================

    /// Snapshots of every live effect of `kind` on `unit`, in application
    /// order.
    pub fn effects_of_kind(&self, unit: UnitId, kind: AuraKind) -> Vec<EffectSnapshot> {
        let Some(unit) = self.units.get(&unit) else {
            return Vec::new();
        };
        let Some(refs) = unit.mod_auras.get(&kind) else {
            return Vec::new();
        };
        let mut snapshots = Vec::with_capacity(refs.len());
        for effect_ref in refs {
            let Some(aura) = self.auras.get(&effect_ref.aura) else {
                continue;
            };
            if aura.is_removed() {
                continue;
            }
            let Some(effect) = aura.effect(effect_ref.slot) else {
                continue;
            };
            snapshots.push(EffectSnapshot {
                aura: aura.id,
                slot: effect_ref.slot,
                amount: effect.amount,
                misc: effect.misc_value,
                misc_b: effect.misc_value_b,
                caster: aura.caster,
                spell: aura.spell,
            });
        }
        snapshots
    }

    pub fn has_aura_kind(&self, unit: UnitId, kind: AuraKind) -> bool {
        !self.effects_of_kind(unit, kind).is_empty()
    }

    pub fn has_aura_of_spell(&self, unit: UnitId, spell: SpellId) -> bool {
        self.unit(unit).is_some_and(|u| {
            u.applications.iter().any(|app| {
                !app.is_removed()
                    && self
                        .aura(app.aura)
                        .is_some_and(|aura| aura.spell == spell && !aura.is_removed())
            })
        })
    }

    pub fn has_aura_of_spell_by_caster(
        &self,
        unit: UnitId,
        spell: SpellId,
        caster: UnitId,
    ) -> bool {
        self.unit(unit).is_some_and(|u| {
            u.applications.iter().any(|app| {
                !app.is_removed()
                    && self.aura(app.aura).is_some_and(|aura| {
                        aura.spell == spell && aura.caster == Some(caster) && !aura.is_removed()
                    })
            })
        })
    }

    /// Sum of effect amounts for `kind`.
    pub fn total_aura_modifier(&self, unit: UnitId, kind: AuraKind) -> i32 {
        self.effects_of_kind(unit, kind)
            .iter()
            .map(|e| e.amount)
            .sum()
    }

    /// Sum of effect amounts whose misc value intersects `mask`.
    pub fn total_aura_modifier_by_misc_mask(&self, unit: UnitId, kind: AuraKind, mask: u32) -> i32 {
        self.effects_of_kind(unit, kind)
            .iter()
            .filter(|e| e.misc as u32 & mask != 0)
            .map(|e| e.amount)
            .sum()
    }

    /// Sum of effect amounts with an exact misc value.
    pub fn total_aura_modifier_by_misc_value(
        &self,
        unit: UnitId,
        kind: AuraKind,
        misc: i32,
    ) -> i32 {
        self.effects_of_kind(unit, kind)
            .iter()
            .filter(|e| e.misc == misc)
            .map(|e| e.amount)
            .sum()
    }

    /// Sum of effect amounts cast by one specific unit.
    pub fn total_aura_modifier_by_caster(
        &self,
        unit: UnitId,
        kind: AuraKind,
        caster: UnitId,
    ) -> i32 {
        self.effects_of_kind(unit, kind)
            .iter()
            .filter(|e| e.caster == Some(caster))
            .map(|e| e.amount)
            .sum()
    }

    /// Product of `1 + amount/100` over effects whose misc value intersects
    /// `mask`. Multiplicative stacking for taken-percent modifiers.
    pub fn total_aura_multiplier_by_misc_mask(
        &self,
        unit: UnitId,
        kind: AuraKind,
        mask: u32,
    ) -> f32 {
        self.effects_of_kind(unit, kind)
            .iter()
            .filter(|e| e.misc as u32 & mask != 0)
            .fold(1.0, |acc, e| acc * (100.0 + e.amount as f32) / 100.0)
    }

    /// Largest positive amount among effects intersecting `mask` (0 if none).
    pub fn max_positive_aura_modifier_by_misc_mask(
        &self,
        unit: UnitId,
        kind: AuraKind,
        mask: u32,
    ) -> i32 {
        self.effects_of_kind(unit, kind)
            .iter()
            .filter(|e| e.misc as u32 & mask != 0)
            .map(|e| e.amount)
            .fold(0, i32::max)
    }

    /// Largest positive amount among effects of `kind` (0 if none).
    pub fn max_positive_aura_modifier(&self, unit: UnitId, kind: AuraKind) -> i32 {
        self.effects_of_kind(unit, kind)
            .iter()
            .map(|e| e.amount)
            .fold(0, i32::max)
    }

    /// Most negative amount among effects of `kind` (0 if none).
    pub fn max_negative_aura_modifier(&self, unit: UnitId, kind: AuraKind) -> i32 {
        self.effects_of_kind(unit, kind)
            .iter()
            .map(|e| e.amount)
            .fold(0, i32::min)
    }
}
