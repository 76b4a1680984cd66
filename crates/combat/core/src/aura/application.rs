//! Link between an aura and one unit it is applied to.

use super::AuraId;
use crate::state::UnitId;

/// Why an aura left its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RemoveMode {
    /// Explicit removal (consumed charge, replaced by a stronger aura, ...).
    Default,
    /// Broken by an interrupt condition (damage, movement).
    Interrupt,
    /// Cancelled by the bearer.
    Cancel,
    /// Stripped by a hostile dispel.
    Dispel,
    /// Natural duration expiry.
    Expire,
    /// Bearer died.
    Death,
}

/// Per-target application record, stored on the target unit.
///
/// `remove_mode` doubles as the re-entrancy latch: once set, the removal
/// funnel only unwinds effect slots that are still applied and never runs
/// the bookkeeping twice.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AuraApplication {
    pub aura: AuraId,
    pub target: UnitId,
    /// Slots currently applied on this target (immune slots stay clear).
    pub effect_mask: u8,
    pub remove_mode: Option<RemoveMode>,
}

impl AuraApplication {
    pub fn new(aura: AuraId, target: UnitId, effect_mask: u8) -> Self {
        AuraApplication {
            aura,
            target,
            effect_mask,
            remove_mode: None,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.remove_mode.is_some()
    }

    pub fn has_effect(&self, slot: u8) -> bool {
        self.effect_mask & (1 << slot) != 0
    }
}
