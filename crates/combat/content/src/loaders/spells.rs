//! Spell catalog loader.

use std::collections::BTreeMap;
use std::path::Path;

use combat_core::{SpellId, SpellInfo, SpellOracle};
use serde::{Deserialize, Serialize};

use crate::loaders::{LoadResult, read_file};

/// Spell catalog structure for RON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellCatalogFile {
    pub spells: Vec<SpellInfo>,
}

/// Spell descriptors loaded from RON, indexed by id.
///
/// Implements [`SpellOracle`], so it plugs straight into a combat
/// environment.
#[derive(Debug, Clone, Default)]
pub struct SpellCatalog {
    spells: BTreeMap<SpellId, SpellInfo>,
}

impl SpellCatalog {
    /// Load the spell catalog from a RON file.
    pub fn load(path: &Path) -> LoadResult<Self> {
        let content = read_file(path)?;
        Self::from_str(&content)
    }

    /// Parse a spell catalog from RON text.
    pub fn from_str(content: &str) -> LoadResult<Self> {
        let file: SpellCatalogFile = ron::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse spell catalog RON: {}", e))?;
        let mut spells = BTreeMap::new();
        for spell in file.spells {
            if spells.insert(spell.id, spell).is_some() {
                anyhow::bail!("Duplicate spell id in catalog");
            }
        }
        Ok(SpellCatalog { spells })
    }

    /// Load the catalog embedded in this crate's data directory.
    pub fn load_embedded() -> LoadResult<Self> {
        Self::from_str(include_str!("../../data/spells.ron"))
    }

    pub fn insert(&mut self, spell: SpellInfo) {
        self.spells.insert(spell.id, spell);
    }

    pub fn get(&self, id: SpellId) -> Option<&SpellInfo> {
        self.spells.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = SpellId> + '_ {
        self.spells.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.spells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }
}

impl SpellOracle for SpellCatalog {
    fn spell(&self, id: SpellId) -> Option<&SpellInfo> {
        self.spells.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use combat_core::{AuraKind, DamageClass, EffectKind, SchoolMask};

    #[test]
    fn embedded_catalog_loads() {
        let catalog = SpellCatalog::load_embedded().expect("Failed to load spell catalog");
        assert!(catalog.len() >= 5, "Should have at least 5 spells");

        let firebolt = catalog.get(SpellId(25001)).expect("firebolt present");
        assert_eq!(firebolt.school_mask, SchoolMask::FIRE);
        assert_eq!(firebolt.damage_class, DamageClass::Magic);
        assert_eq!(firebolt.effects[0].kind, EffectKind::SchoolDamage);
        assert!(firebolt.effects[0].bonus_coefficient > 0.0);

        let immolation = catalog.get(SpellId(25002)).expect("immolation present");
        assert!(immolation.has_aura_kind(AuraKind::PeriodicDamage));
        assert!(immolation.effects[0].period_ms > 0);

        let terror = catalog.get(SpellId(25003)).expect("terror present");
        assert_eq!(terror.mechanic, combat_core::Mechanic::Fear);
        assert_eq!(terror.dr_group, combat_core::DiminishGroup::Fear);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let ron = r#"(spells: [(id: 1, name: "a"), (id: 1, name: "b")])"#;
        assert!(SpellCatalog::from_str(ron).is_err());
    }

    #[test]
    fn minimal_spell_uses_defaults() {
        let ron = r#"(spells: [(id: 9, name: "noop")])"#;
        let catalog = SpellCatalog::from_str(ron).expect("parses");
        let spell = catalog.get(SpellId(9)).expect("present");
        assert_eq!(spell.damage_class, DamageClass::None);
        assert!(spell.effects.is_empty());
    }
}
