//! Family special-case rules.
//!
//! A handful of abilities bend the generic pipelines: bonus damage against
//! frozen targets, execute-style multipliers at low health, guaranteed
//! crits against certain creature types. Each rule keys on the spell
//! family plus a family-flag bit, so content data opts spells in by
//! setting the matching bit.

use crate::aura::AuraKind;
use crate::spell::{SpellFamily, SpellInfo};
use crate::state::{AuraStateType, CombatArena, CreatureTypeMask, UnitId};

// Family flag bits consumed by the builtin rules.

/// Frost shard: triple damage against frozen targets.
pub const MAGE_SHARD_VS_FROZEN: u64 = 1 << 0;
/// Soul drain: double damage below a quarter health.
pub const WARLOCK_SOUL_DRAIN: u64 = 1 << 1;
/// Shadow bite: bonus per own shadow dot on the target.
pub const WARLOCK_SHADOW_BITE: u64 = 1 << 2;
/// Exorcism: always crits demons and undead.
pub const PALADIN_EXORCISM: u64 = 1 << 3;
/// Lava burst: always crits targets carrying the caster's flame dot.
pub const SHAMAN_LAVA_BURST: u64 = 1 << 4;

const SOUL_DRAIN_HEALTH_PCT: u32 = 25;
const SHADOW_BITE_PCT_PER_DOT: f32 = 30.0;

fn has_rule(spell: &SpellInfo, family: SpellFamily, flag: u64) -> bool {
    spell.family == family && spell.family_flags & flag != 0
}

/// Percent-done multiplier contributed by family rules.
pub(crate) fn family_damage_pct_done(
    arena: &CombatArena,
    caster: UnitId,
    victim: Option<UnitId>,
    spell: &SpellInfo,
) -> f32 {
    let mut multiplier = 1.0;
    let Some(victim) = victim else {
        return multiplier;
    };

    if has_rule(spell, SpellFamily::Mage, MAGE_SHARD_VS_FROZEN)
        && arena
            .unit(victim)
            .is_some_and(|u| u.has_aura_state(AuraStateType::Frozen))
    {
        multiplier *= 3.0;
    }

    if has_rule(spell, SpellFamily::Warlock, WARLOCK_SOUL_DRAIN)
        && arena
            .unit(victim)
            .is_some_and(|u| u.max_health > 0 && u.health * 100 / u.max_health < SOUL_DRAIN_HEALTH_PCT)
    {
        multiplier *= 2.0;
    }

    if has_rule(spell, SpellFamily::Warlock, WARLOCK_SHADOW_BITE) {
        let own_dots = arena
            .effects_of_kind(victim, AuraKind::PeriodicDamage)
            .iter()
            .filter(|e| e.caster == Some(caster))
            .count();
        multiplier *= 1.0 + SHADOW_BITE_PCT_PER_DOT / 100.0 * own_dots as f32;
    }

    multiplier
}

/// Guaranteed-crit overrides from family rules; `Some(chance)` replaces the
/// computed crit chance.
pub(crate) fn family_crit_override(
    arena: &CombatArena,
    caster: UnitId,
    victim: Option<UnitId>,
    spell: &SpellInfo,
) -> Option<f32> {
    let victim = victim?;

    if has_rule(spell, SpellFamily::Paladin, PALADIN_EXORCISM) {
        let vulnerable = arena.unit(victim).is_some_and(|u| {
            u.creature_type_mask()
                .intersects(CreatureTypeMask::DEMON | CreatureTypeMask::UNDEAD)
        });
        if vulnerable {
            return Some(100.0);
        }
    }

    if has_rule(spell, SpellFamily::Shaman, SHAMAN_LAVA_BURST) {
        let has_own_flame_dot = arena
            .effects_of_kind(victim, AuraKind::PeriodicDamage)
            .iter()
            .any(|e| e.caster == Some(caster) && e.spell != spell.id);
        if has_own_flame_dot {
            return Some(100.0);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spell::SpellId;
    use crate::state::{Unit, UnitClass, UnitId};

    #[test]
    fn soul_drain_doubles_below_quarter_health() {
        let mut arena = CombatArena::new(1);
        arena.insert_unit(Unit::builder(UnitId(1)).player(UnitClass::Warlock).build());
        arena.insert_unit(Unit::builder(UnitId(2)).health(24, 100).build());

        let spell = SpellInfo::builder(SpellId(1))
            .family(SpellFamily::Warlock, WARLOCK_SOUL_DRAIN)
            .build();
        assert_eq!(
            family_damage_pct_done(&arena, UnitId(1), Some(UnitId(2)), &spell),
            2.0
        );

        arena.unit_mut(UnitId(2)).unwrap().health = 26;
        assert_eq!(
            family_damage_pct_done(&arena, UnitId(1), Some(UnitId(2)), &spell),
            1.0
        );
    }
}
