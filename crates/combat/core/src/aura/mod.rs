//! Aura runtime model and lifecycle.
//!
//! An [`Aura`] is owned by the arena and linked to each target through an
//! [`AuraApplication`] stored on that unit. Mutation goes through the
//! functions in [`lifecycle`]; nothing outside this module flips the
//! removal flags directly.
mod application;
mod effect;
pub mod lifecycle;

pub use application::{AuraApplication, RemoveMode};
pub use effect::{AuraEffect, AuraKind};

use crate::env::OracleError;
use crate::error::{CombatError, ErrorSeverity};
use crate::spell::{
    DamageClass, DispelType, MechanicMask, SchoolMask, SpellAttributes, SpellFamily, SpellId,
    SpellInfo, MAX_SPELL_EFFECTS,
};
use crate::state::{StateError, UnitId};

/// Arena-assigned aura instance identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AuraId(pub u32);

impl core::fmt::Display for AuraId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "aura:{}", self.0)
    }
}

/// Reference to one effect slot of one aura, stored in the per-kind index
/// on each unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectRef {
    pub aura: AuraId,
    pub slot: u8,
}

/// Errors from aura application and removal.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum AuraError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("target {0} is immune to {1}")]
    TargetImmune(UnitId, SpellId),

    #[error("target {0} is dead")]
    TargetDead(UnitId),

    #[error("a stronger exclusive aura is already present")]
    WeakerThanExisting,

    #[error("spell {0} applies no auras")]
    NoAuraEffects(SpellId),
}

impl CombatError for AuraError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            AuraError::Oracle(e) => e.severity(),
            AuraError::State(e) => e.severity(),
            AuraError::TargetImmune(..) | AuraError::TargetDead(_) | AuraError::WeakerThanExisting => {
                ErrorSeverity::Recoverable
            }
            AuraError::NoAuraEffects(_) => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AuraError::Oracle(e) => e.error_code(),
            AuraError::State(e) => e.error_code(),
            AuraError::TargetImmune(..) => "AURA_TARGET_IMMUNE",
            AuraError::TargetDead(_) => "AURA_TARGET_DEAD",
            AuraError::WeakerThanExisting => "AURA_WEAKER_THAN_EXISTING",
            AuraError::NoAuraEffects(_) => "AURA_NO_AURA_EFFECTS",
        }
    }
}

/// One live aura instance.
///
/// Descriptor fields are denormalized from the spell so queries never need
/// the oracle. Removal only sets the flag; the arena physically drops the
/// aura once no application references it.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aura {
    pub id: AuraId,
    pub spell: SpellId,
    pub caster: Option<UnitId>,

    pub school_mask: SchoolMask,
    pub dispel: DispelType,
    pub mechanic_mask: MechanicMask,
    pub attributes: SpellAttributes,
    pub family: SpellFamily,
    pub family_flags: u64,
    pub damage_class: DamageClass,
    pub positive: bool,
    pub exclusive_group: Option<crate::spell::ExclusiveGroup>,
    pub dr_group: crate::dr::DiminishGroup,
    pub max_stacks: u8,

    pub stack_amount: u8,
    /// Remaining charges; 0 with `uses_charges` means spent.
    pub charges: u8,
    pub uses_charges: bool,
    /// Remaining duration in ms; -1 = permanent.
    pub duration_ms: i32,
    /// Duration granted at (re)application, after diminishing returns.
    pub max_duration_ms: i32,

    pub(crate) effects: [Option<AuraEffect>; MAX_SPELL_EFFECTS],
    pub(crate) applied_to: Vec<UnitId>,
    pub(crate) removed: bool,

    /// Arena time until which this aura cannot proc again.
    pub(crate) proc_cooldown_until_ms: u64,
    /// Scheduled delayed charge drop (travel-time reflects).
    pub(crate) pending_charge_drop_at_ms: Option<u64>,
}

impl Aura {
    /// Build an aura instance from a spell descriptor.
    ///
    /// `duration_ms` is the post-diminishing duration to grant; pass the
    /// descriptor duration when no diminishing applies.
    pub(crate) fn from_spell(
        id: AuraId,
        spell: &SpellInfo,
        caster: Option<UnitId>,
        duration_ms: i32,
        now_ms: u64,
    ) -> Self {
        let mut effects: [Option<AuraEffect>; MAX_SPELL_EFFECTS] = Default::default();
        for (slot, info) in spell.effects.iter().enumerate() {
            effects[slot] = AuraEffect::from_effect_info(info, now_ms);
        }
        Aura {
            id,
            spell: spell.id,
            caster,
            school_mask: spell.school_mask,
            dispel: spell.dispel,
            mechanic_mask: spell.all_effects_mechanic_mask(),
            attributes: spell.attributes,
            family: spell.family,
            family_flags: spell.family_flags,
            damage_class: spell.damage_class,
            positive: spell.positive,
            exclusive_group: spell.exclusive_group,
            dr_group: spell.dr_group,
            max_stacks: spell.max_stacks.max(1),
            stack_amount: 1,
            charges: spell.proc_charges,
            uses_charges: spell.uses_charges(),
            duration_ms,
            max_duration_ms: duration_ms,
            effects,
            applied_to: Vec::new(),
            removed: false,
            proc_cooldown_until_ms: 0,
            pending_charge_drop_at_ms: None,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn is_permanent(&self) -> bool {
        self.max_duration_ms < 0
    }

    pub fn is_expired(&self) -> bool {
        !self.is_permanent() && self.duration_ms <= 0
    }

    /// True while the aura still carries its full granted duration, i.e.
    /// no time has elapsed since (re)application.
    pub fn at_full_duration(&self) -> bool {
        self.duration_ms == self.max_duration_ms
    }

    pub fn is_passive(&self) -> bool {
        self.attributes.contains(SpellAttributes::PASSIVE)
    }

    pub fn is_death_persistent(&self) -> bool {
        self.attributes.contains(SpellAttributes::DEATH_PERSISTENT)
    }

    pub fn effect(&self, slot: u8) -> Option<&AuraEffect> {
        self.effects
            .get(slot as usize)
            .and_then(|effect| effect.as_ref())
    }

    pub(crate) fn effect_mut(&mut self, slot: u8) -> Option<&mut AuraEffect> {
        self.effects
            .get_mut(slot as usize)
            .and_then(|effect| effect.as_mut())
    }

    /// Mask of populated effect slots.
    pub fn effect_mask(&self) -> u8 {
        let mut mask = 0;
        for (slot, effect) in self.effects.iter().enumerate() {
            if effect.is_some() {
                mask |= 1 << slot;
            }
        }
        mask
    }

    pub fn has_effect_kind(&self, kind: AuraKind) -> bool {
        self.effects
            .iter()
            .flatten()
            .any(|effect| effect.kind == kind)
    }

    pub fn applied_to(&self) -> &[UnitId] {
        &self.applied_to
    }

    /// Largest absolute base amount across effects; the exclusivity rule
    /// compares auras by this.
    pub fn magnitude(&self) -> i32 {
        self.effects
            .iter()
            .flatten()
            .map(|effect| effect.base_amount.abs())
            .max()
            .unwrap_or(0)
    }

    /// Reset duration and stacks' amounts after a refresh or stack change.
    pub(crate) fn refresh(&mut self) {
        self.duration_ms = self.max_duration_ms;
        let stacks = self.stack_amount;
        for effect in self.effects.iter_mut().flatten() {
            effect.recalculate_amount(stacks);
        }
    }
}
