//! Unit runtime state.

use std::collections::BTreeMap;

use crate::aura::{AuraApplication, AuraId, AuraKind, EffectRef};
use crate::cast::CastSlots;
use crate::dr::DiminishingTracker;
use crate::spell::{AttackType, PowerType, SpellInfo, SpellModKind, SpellModOp, SpellModifier};

use super::immunity::ImmunityTable;
use super::UnitId;

/// Reactive ability windows opened by defensive events (dodge, parry).
/// Each entry expires [`REACTIVE_TIMER_MS`] after the triggering event.
pub const REACTIVE_TIMER_MS: u64 = 4000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReactiveType {
    Defense,
    HunterParry,
    Overpower,
}

/// Aura-granted states other spells key off ("only usable while...").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AuraStateType {
    /// Recently dodged or blocked an attack.
    Defense,
    /// Hunter-only parry window.
    HunterParry,
    /// Under a freeze-mechanic aura.
    Frozen,
    /// Under an enrage-dispel aura.
    Enraged,
}

bitflags::bitflags! {
    /// Transient control states. CC auras set these while applied.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct UnitState: u16 {
        const CASTING = 1 << 0;
        const STUNNED = 1 << 1;
        const FLEEING = 1 << 2;
        const CONFUSED = 1 << 3;
        const ROOTED = 1 << 4;
        /// Creature is resetting and untouchable.
        const EVADE = 1 << 5;
    }
}

impl UnitState {
    /// States that strip the victim's active defenses.
    pub const CONTROLLED: UnitState = UnitState::STUNNED
        .union(UnitState::FLEEING)
        .union(UnitState::CONFUSED);
}

/// Creature classification bit, one per creature type.
bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct CreatureTypeMask: u32 {
        const BEAST      = 1 << 0;
        const DRAGONKIN  = 1 << 1;
        const DEMON      = 1 << 2;
        const ELEMENTAL  = 1 << 3;
        const GIANT      = 1 << 4;
        const UNDEAD     = 1 << 5;
        const HUMANOID   = 1 << 6;
        const CRITTER    = 1 << 7;
        const MECHANICAL = 1 << 8;
    }
}

bitflags::bitflags! {
    /// Static creature template switches the resolution rules read.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct CreatureFlags: u16 {
        /// Diminishing returns apply as if this creature were a player.
        const ALL_DIMINISH = 1 << 0;
        /// Taunt effects diminish against this creature.
        const TAUNT_DIMINISH = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CreatureRank {
    #[default]
    Normal,
    Elite,
    RareElite,
    Boss,
    Rare,
}

/// Player character or scripted creature.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnitKind {
    Player,
    Creature {
        rank: CreatureRank,
        type_mask: CreatureTypeMask,
        flags: CreatureFlags,
        pet: bool,
        totem: bool,
    },
}

impl Default for UnitKind {
    fn default() -> Self {
        UnitKind::Player
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnitClass {
    #[default]
    None,
    Warrior,
    Paladin,
    Hunter,
    Rogue,
    Priest,
    DeathKnight,
    Shaman,
    Mage,
    Warlock,
    Druid,
}

/// Full runtime state of one combatant.
///
/// Derived combat numbers (crit, avoidance, power) are snapshot fields the
/// host recomputes from gear and talents; the resolution pipelines layer
/// aura modifiers on top of them.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub kind: UnitKind,
    pub class: UnitClass,
    pub level: u32,
    pub alive: bool,
    pub health: u32,
    pub max_health: u32,
    pub power: u32,
    pub max_power: u32,
    pub power_type: PowerType,
    /// Summoner for pets and totems.
    pub owner: Option<UnitId>,

    pub intellect: u32,
    /// Base bonus healing/damage from gear (players only).
    pub spell_power: u32,
    pub attack_power: u32,
    pub ranged_attack_power: u32,
    /// Weapon speed per attack type, for proc-per-minute rates.
    pub weapon_speed_ms: [u32; 3],
    pub spell_crit_pct: f32,
    pub melee_crit_pct: f32,
    pub dodge_pct: f32,
    pub parry_pct: f32,
    pub block_pct: f32,

    pub state: UnitState,
    pub combo_points: u8,

    pub(crate) aura_states: BTreeMap<AuraStateType, u32>,
    pub(crate) applications: Vec<AuraApplication>,
    pub(crate) owned_auras: Vec<AuraId>,
    pub(crate) mod_auras: BTreeMap<AuraKind, Vec<EffectRef>>,
    pub(crate) immunity: ImmunityTable,
    pub(crate) spell_mods: Vec<SpellModifier>,
    pub(crate) diminishing: DiminishingTracker,
    pub(crate) reactives: BTreeMap<ReactiveType, u64>,
    pub(crate) casts: CastSlots,
    /// Nonzero while proc dispatch has disabled further procs on this unit.
    pub(crate) cant_proc_depth: u32,
}

impl Unit {
    pub fn builder(id: UnitId) -> UnitBuilder {
        UnitBuilder::new(id)
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, UnitKind::Player)
    }

    pub fn is_creature(&self) -> bool {
        !self.is_player()
    }

    pub fn is_pet(&self) -> bool {
        matches!(self.kind, UnitKind::Creature { pet: true, .. })
    }

    pub fn is_totem(&self) -> bool {
        matches!(self.kind, UnitKind::Creature { totem: true, .. })
    }

    pub fn creature_rank(&self) -> Option<CreatureRank> {
        match self.kind {
            UnitKind::Creature { rank, .. } => Some(rank),
            UnitKind::Player => None,
        }
    }

    pub fn creature_type_mask(&self) -> CreatureTypeMask {
        match self.kind {
            UnitKind::Creature { type_mask, .. } => type_mask,
            UnitKind::Player => CreatureTypeMask::HUMANOID,
        }
    }

    pub fn creature_flags(&self) -> CreatureFlags {
        match self.kind {
            UnitKind::Creature { flags, .. } => flags,
            UnitKind::Player => CreatureFlags::empty(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn has_unit_state(&self, state: UnitState) -> bool {
        self.state.intersects(state)
    }

    /// Stunned, fleeing, or confused: all active defenses are off.
    pub fn is_controlled(&self) -> bool {
        self.has_unit_state(UnitState::CONTROLLED)
    }

    pub fn is_evading(&self) -> bool {
        self.has_unit_state(UnitState::EVADE)
    }

    pub fn has_aura_state(&self, state: AuraStateType) -> bool {
        self.aura_states.get(&state).is_some_and(|count| *count > 0)
    }

    pub fn attack_power_for(&self, attack: AttackType) -> u32 {
        match attack {
            AttackType::Base | AttackType::Off => self.attack_power,
            AttackType::Ranged => self.ranged_attack_power,
        }
    }

    pub fn weapon_speed_for(&self, attack: AttackType) -> u32 {
        self.weapon_speed_ms[attack as usize]
    }

    pub fn immunity(&self) -> &ImmunityTable {
        &self.immunity
    }

    pub fn immunity_mut(&mut self) -> &mut ImmunityTable {
        &mut self.immunity
    }

    pub fn spell_mods(&self) -> &[SpellModifier] {
        &self.spell_mods
    }

    pub fn add_spell_mod(&mut self, modifier: SpellModifier) {
        self.spell_mods.push(modifier);
    }

    pub fn remove_spell_mod(&mut self, modifier: &SpellModifier) {
        if let Some(pos) = self.spell_mods.iter().position(|m| m == modifier) {
            self.spell_mods.remove(pos);
        }
    }

    /// Fold this unit's matching spell modifiers into `value`.
    ///
    /// Flat modifiers apply before percent ones, each group in insertion
    /// order.
    pub fn apply_spell_mod(&self, op: SpellModOp, spell: &SpellInfo, value: f32) -> f32 {
        let mut value = value;
        for kind in [SpellModKind::Flat, SpellModKind::Pct] {
            for modifier in self.spell_mods.iter().filter(|m| m.kind == kind) {
                value = modifier.fold(op, spell, value);
            }
        }
        value
    }

    /// True while the reactive window is open at `now_ms`.
    pub fn has_reactive(&self, reactive: ReactiveType, now_ms: u64) -> bool {
        self.reactives
            .get(&reactive)
            .is_some_and(|expiry| *expiry > now_ms)
    }

    pub(crate) fn start_reactive(&mut self, reactive: ReactiveType, now_ms: u64) {
        self.reactives.insert(reactive, now_ms + REACTIVE_TIMER_MS);
    }

    pub fn add_combo_points(&mut self, count: u8) {
        self.combo_points = self.combo_points.saturating_add(count).min(5);
    }

    pub fn casts(&self) -> &CastSlots {
        &self.casts
    }

    pub(crate) fn casts_mut(&mut self) -> &mut CastSlots {
        &mut self.casts
    }

    pub fn can_proc(&self) -> bool {
        self.cant_proc_depth == 0
    }

    /// Grant or release one count of an aura state.
    ///
    /// Returns true if the flag's presence changed.
    pub(crate) fn modify_aura_state(&mut self, state: AuraStateType, apply: bool) -> bool {
        let count = self.aura_states.entry(state).or_insert(0);
        if apply {
            *count += 1;
            *count == 1
        } else {
            *count = count.saturating_sub(1);
            let cleared = *count == 0;
            if cleared {
                self.aura_states.remove(&state);
            }
            cleared
        }
    }

    pub fn applications(&self) -> &[AuraApplication] {
        &self.applications
    }
}

/// Builder used by the host's character loader and by tests.
#[derive(Clone, Debug)]
pub struct UnitBuilder {
    unit: Unit,
}

impl UnitBuilder {
    pub fn new(id: UnitId) -> Self {
        UnitBuilder {
            unit: Unit {
                id,
                name: String::new(),
                kind: UnitKind::Player,
                class: UnitClass::None,
                level: 60,
                alive: true,
                health: 1000,
                max_health: 1000,
                power: 1000,
                max_power: 1000,
                power_type: PowerType::Mana,
                owner: None,
                intellect: 0,
                spell_power: 0,
                attack_power: 0,
                ranged_attack_power: 0,
                weapon_speed_ms: [2000, 2000, 3000],
                spell_crit_pct: 0.0,
                melee_crit_pct: 0.0,
                dodge_pct: 0.0,
                parry_pct: 0.0,
                block_pct: 0.0,
                state: UnitState::empty(),
                combo_points: 0,
                aura_states: BTreeMap::new(),
                applications: Vec::new(),
                owned_auras: Vec::new(),
                mod_auras: BTreeMap::new(),
                immunity: ImmunityTable::default(),
                spell_mods: Vec::new(),
                diminishing: DiminishingTracker::default(),
                reactives: BTreeMap::new(),
                casts: CastSlots::default(),
                cant_proc_depth: 0,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.unit.name = name.into();
        self
    }

    pub fn player(mut self, class: UnitClass) -> Self {
        self.unit.kind = UnitKind::Player;
        self.unit.class = class;
        self
    }

    pub fn creature(mut self, rank: CreatureRank, type_mask: CreatureTypeMask) -> Self {
        self.unit.kind = UnitKind::Creature {
            rank,
            type_mask,
            flags: CreatureFlags::empty(),
            pet: false,
            totem: false,
        };
        self
    }

    pub fn creature_flags(mut self, flags: CreatureFlags) -> Self {
        if let UnitKind::Creature {
            flags: ref mut slot,
            ..
        } = self.unit.kind
        {
            *slot = flags;
        }
        self
    }

    pub fn pet(mut self, owner: UnitId) -> Self {
        if let UnitKind::Creature { ref mut pet, .. } = self.unit.kind {
            *pet = true;
        }
        self.unit.owner = Some(owner);
        self
    }

    pub fn totem(mut self, owner: UnitId) -> Self {
        if let UnitKind::Creature { ref mut totem, .. } = self.unit.kind {
            *totem = true;
        }
        self.unit.owner = Some(owner);
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.unit.level = level;
        self
    }

    pub fn health(mut self, health: u32, max_health: u32) -> Self {
        self.unit.health = health;
        self.unit.max_health = max_health;
        self
    }

    pub fn power(mut self, power_type: PowerType, power: u32, max_power: u32) -> Self {
        self.unit.power_type = power_type;
        self.unit.power = power;
        self.unit.max_power = max_power;
        self
    }

    pub fn intellect(mut self, intellect: u32) -> Self {
        self.unit.intellect = intellect;
        self
    }

    pub fn spell_power(mut self, spell_power: u32) -> Self {
        self.unit.spell_power = spell_power;
        self
    }

    pub fn attack_power(mut self, melee: u32, ranged: u32) -> Self {
        self.unit.attack_power = melee;
        self.unit.ranged_attack_power = ranged;
        self
    }

    pub fn weapon_speed_ms(mut self, base: u32, off: u32, ranged: u32) -> Self {
        self.unit.weapon_speed_ms = [base, off, ranged];
        self
    }

    pub fn crit_pct(mut self, spell: f32, melee: f32) -> Self {
        self.unit.spell_crit_pct = spell;
        self.unit.melee_crit_pct = melee;
        self
    }

    pub fn avoidance_pct(mut self, dodge: f32, parry: f32, block: f32) -> Self {
        self.unit.dodge_pct = dodge;
        self.unit.parry_pct = parry;
        self.unit.block_pct = block;
        self
    }

    pub fn build(self) -> Unit {
        self.unit
    }
}
