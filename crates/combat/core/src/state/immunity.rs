//! Per-unit immunity table.
//!
//! Immunities are granted and revoked by aura effects. Each entry remembers
//! the spell that granted it so revocation only removes its own grants,
//! while a fresh grant of the same value replaces any previous holder.

use crate::spell::{DispelType, EffectKind, Mechanic, MechanicMask, SchoolMask, SpellId};

use crate::aura::AuraKind;

/// Payload-free classification of an effect kind, used by effect immunity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EffectTag {
    SchoolDamage,
    Heal,
    HealthLeech,
    ApplyAura,
    TriggerSpell,
    Energize,
}

impl EffectTag {
    pub fn of(kind: EffectKind) -> Option<EffectTag> {
        match kind {
            EffectKind::None => None,
            EffectKind::SchoolDamage => Some(EffectTag::SchoolDamage),
            EffectKind::Heal => Some(EffectTag::Heal),
            EffectKind::HealthLeech => Some(EffectTag::HealthLeech),
            EffectKind::ApplyAura(_) => Some(EffectTag::ApplyAura),
            EffectKind::TriggerSpell => Some(EffectTag::TriggerSpell),
            EffectKind::Energize => Some(EffectTag::Energize),
        }
    }
}

/// One immunity grant.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Immunity {
    /// Immune to one exact spell id.
    Spell(SpellId),
    /// Immune to spells of these schools.
    School(SchoolMask),
    /// Immune to damage of these schools.
    Damage(SchoolMask),
    /// Immune to auras of this dispel type.
    Dispel(DispelType),
    /// Immune to effects carrying this mechanic.
    Mechanic(Mechanic),
    /// Immune to effects of this shape.
    Effect(EffectTag),
    /// Immune to auras of this kind.
    AuraKind(AuraKind),
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImmunityTable {
    entries: Vec<(SpellId, Immunity)>,
}

impl ImmunityTable {
    /// Grant or revoke an immunity on behalf of `source`.
    ///
    /// Granting first drops any entry with the same value so re-applies do
    /// not accumulate duplicates.
    pub fn apply(&mut self, source: SpellId, value: Immunity, apply: bool) {
        if apply {
            self.entries.retain(|(_, v)| *v != value);
            self.entries.push((source, value));
        } else {
            self.entries
                .retain(|(s, v)| !(*s == source && *v == value));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Union of all school-immunity masks.
    pub fn school_mask(&self) -> SchoolMask {
        self.entries.iter().fold(SchoolMask::empty(), |acc, (_, v)| {
            if let Immunity::School(mask) = v {
                acc | *mask
            } else {
                acc
            }
        })
    }

    /// Union of all damage-immunity masks.
    pub fn damage_mask(&self) -> SchoolMask {
        self.entries.iter().fold(SchoolMask::empty(), |acc, (_, v)| {
            if let Immunity::Damage(mask) = v {
                acc | *mask
            } else {
                acc
            }
        })
    }

    /// Union of all mechanic immunities as a mask.
    pub fn mechanic_mask(&self) -> MechanicMask {
        self.entries
            .iter()
            .fold(MechanicMask::empty(), |acc, (_, v)| {
                if let Immunity::Mechanic(mechanic) = v {
                    acc | mechanic.mask()
                } else {
                    acc
                }
            })
    }

    pub fn immune_to_spell_id(&self, id: SpellId) -> bool {
        self.entries
            .iter()
            .any(|(_, v)| matches!(v, Immunity::Spell(s) if *s == id))
    }

    pub fn immune_to_dispel(&self, dispel: DispelType) -> bool {
        dispel != DispelType::None
            && self
                .entries
                .iter()
                .any(|(_, v)| matches!(v, Immunity::Dispel(d) if *d == dispel))
    }

    pub fn immune_to_effect(&self, tag: EffectTag) -> bool {
        self.entries
            .iter()
            .any(|(_, v)| matches!(v, Immunity::Effect(t) if *t == tag))
    }

    pub fn immune_to_aura_kind(&self, kind: AuraKind) -> bool {
        self.entries
            .iter()
            .any(|(_, v)| matches!(v, Immunity::AuraKind(k) if *k == kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reapply_replaces_previous_grantor() {
        let mut table = ImmunityTable::default();
        table.apply(SpellId(1), Immunity::Mechanic(Mechanic::Fear), true);
        table.apply(SpellId(2), Immunity::Mechanic(Mechanic::Fear), true);

        // Revoking the first grant must not clear the second one's value.
        table.apply(SpellId(1), Immunity::Mechanic(Mechanic::Fear), false);
        assert!(table.mechanic_mask().contains(MechanicMask::FEAR));

        table.apply(SpellId(2), Immunity::Mechanic(Mechanic::Fear), false);
        assert!(table.mechanic_mask().is_empty());
    }

    #[test]
    fn school_and_damage_masks_union() {
        let mut table = ImmunityTable::default();
        table.apply(SpellId(3), Immunity::School(SchoolMask::FIRE), true);
        table.apply(SpellId(4), Immunity::School(SchoolMask::FROST), true);
        table.apply(SpellId(5), Immunity::Damage(SchoolMask::SHADOW), true);

        assert_eq!(table.school_mask(), SchoolMask::FIRE | SchoolMask::FROST);
        assert_eq!(table.damage_mask(), SchoolMask::SHADOW);
    }
}
