//! Combat rule tables loader.
//!
//! The tables collect balance data that lives outside the spell
//! descriptors: proc-event overrides, creature rank damage tuning, crit
//! exception lists, and diminishing-return duration caps.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use combat_core::{
    CreatureRank, ProcEventEntry, ProcExtra, ProcFlags, SchoolMask, SpellFamily, SpellId,
    TablesOracle,
};
use serde::Deserialize;

use crate::loaders::{LoadResult, read_file};

/// One proc-event override row in `tables.toml`.
#[derive(Debug, Clone, Deserialize)]
struct ProcEventRow {
    spell: u32,
    #[serde(default)]
    proc_flags: ProcFlags,
    // An absent school mask means "any school", not the physical default.
    #[serde(default = "SchoolMask::empty")]
    school_mask: SchoolMask,
    #[serde(default)]
    spell_family: SpellFamily,
    #[serde(default)]
    family_flags: u64,
    #[serde(default)]
    proc_ex: ProcExtra,
    #[serde(default)]
    custom_chance: f32,
    #[serde(default)]
    ppm_rate: f32,
    #[serde(default)]
    cooldown_s: u32,
}

/// Spell damage multiplier per creature rank.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RankDamageRow {
    normal: f32,
    elite: f32,
    rare_elite: f32,
    boss: f32,
    rare: f32,
}

impl Default for RankDamageRow {
    fn default() -> Self {
        RankDamageRow {
            normal: 1.0,
            elite: 1.0,
            rare_elite: 1.0,
            boss: 1.0,
            rare: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DrLimitRow {
    spell: u32,
    limit_ms: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TablesFile {
    proc_event: Vec<ProcEventRow>,
    rank_damage: RankDamageRow,
    magic_crit: Vec<u32>,
    creature_crit: Vec<u32>,
    dr_limit: Vec<DrLimitRow>,
}

/// Rule tables loaded from TOML. Implements [`TablesOracle`].
#[derive(Debug, Clone, Default)]
pub struct TablesData {
    proc_events: BTreeMap<SpellId, ProcEventEntry>,
    rank_damage: RankDamageRow,
    magic_crit: BTreeSet<SpellId>,
    creature_crit: BTreeSet<SpellId>,
    dr_limits: BTreeMap<SpellId, u32>,
}

impl TablesData {
    /// Load rule tables from a TOML file.
    pub fn load(path: &Path) -> LoadResult<Self> {
        let content = read_file(path)?;
        Self::from_str(&content)
    }

    /// Parse rule tables from TOML text.
    pub fn from_str(content: &str) -> LoadResult<Self> {
        let file: TablesFile = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse tables TOML: {}", e))?;

        let mut proc_events = BTreeMap::new();
        for row in file.proc_event {
            let entry = ProcEventEntry {
                proc_flags: row.proc_flags,
                school_mask: row.school_mask,
                spell_family: row.spell_family,
                family_flags: row.family_flags,
                proc_ex: row.proc_ex,
                custom_chance: row.custom_chance,
                ppm_rate: row.ppm_rate,
                cooldown_s: row.cooldown_s,
            };
            if proc_events.insert(SpellId(row.spell), entry).is_some() {
                anyhow::bail!("Duplicate proc event for spell {}", row.spell);
            }
        }

        Ok(TablesData {
            proc_events,
            rank_damage: file.rank_damage,
            magic_crit: file.magic_crit.into_iter().map(SpellId).collect(),
            creature_crit: file.creature_crit.into_iter().map(SpellId).collect(),
            dr_limits: file
                .dr_limit
                .into_iter()
                .map(|row| (SpellId(row.spell), row.limit_ms))
                .collect(),
        })
    }

    /// Load the tables embedded in this crate's data directory.
    pub fn load_embedded() -> LoadResult<Self> {
        Self::from_str(include_str!("../../data/tables.toml"))
    }
}

impl TablesOracle for TablesData {
    fn proc_event(&self, spell: SpellId) -> Option<ProcEventEntry> {
        self.proc_events.get(&spell).copied()
    }

    fn creature_rank_spell_damage_mod(&self, rank: CreatureRank) -> f32 {
        match rank {
            CreatureRank::Normal => self.rank_damage.normal,
            CreatureRank::Elite => self.rank_damage.elite,
            CreatureRank::RareElite => self.rank_damage.rare_elite,
            CreatureRank::Boss => self.rank_damage.boss,
            CreatureRank::Rare => self.rank_damage.rare,
        }
    }

    fn crits_like_magic(&self, spell: SpellId) -> bool {
        self.magic_crit.contains(&spell)
    }

    fn creature_can_crit(&self, spell: SpellId) -> bool {
        self.creature_crit.contains(&spell)
    }

    fn dr_limit_duration_ms(&self, spell: SpellId) -> Option<u32> {
        self.dr_limits.get(&spell).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_tables_load() {
        let tables = TablesData::load_embedded().expect("Failed to load tables");
        assert!(
            tables.creature_rank_spell_damage_mod(CreatureRank::Boss) > 1.0,
            "Boss rank should hit harder"
        );
        assert_eq!(tables.creature_rank_spell_damage_mod(CreatureRank::Normal), 1.0);
    }

    #[test]
    fn proc_event_rows_round_trip() {
        let toml = r#"
            [[proc_event]]
            spell = 100
            proc_flags = "TAKEN_SPELL_MAGIC_DMG_CLASS_NEG"
            proc_ex = "CRITICAL_HIT"
            custom_chance = 15.0
            cooldown_s = 30
        "#;
        let tables = TablesData::from_str(toml).expect("parses");
        let entry = tables.proc_event(SpellId(100)).expect("entry present");
        assert!(entry.proc_flags.contains(ProcFlags::TAKEN_SPELL_MAGIC_DMG_CLASS_NEG));
        assert!(entry.proc_ex.contains(ProcExtra::CRITICAL_HIT));
        assert_eq!(entry.custom_chance, 15.0);
        assert_eq!(entry.cooldown_s, 30);
        assert_eq!(tables.proc_event(SpellId(101)), None);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let tables = TablesData::from_str("").expect("parses");
        assert_eq!(tables.creature_rank_spell_damage_mod(CreatureRank::Elite), 1.0);
        assert!(!tables.crits_like_magic(SpellId(1)));
        assert_eq!(tables.dr_limit_duration_ms(SpellId(1)), None);
    }
}
