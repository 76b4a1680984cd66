//! Spell attribute flags.
//!
//! The authoritative tables mark spells with behavioral switches that the
//! resolution pipelines consult at fixed points. The original data splits
//! these across several attribute words; here they are folded into one
//! namespace since the core only reads the ones below.

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct SpellAttributes: u32 {
        /// Always-on aura granted by class/creature data, never cast directly.
        const PASSIVE = 1 << 0;
        /// This spell can never critically strike.
        const CANT_CRIT = 1 << 1;
        /// Skip all "done"-side flat and percent bonuses.
        const NO_DONE_BONUS = 1 << 2;
        /// Skip "done"-side percent bonuses only.
        const NO_DONE_PCT_MODS = 1 << 3;
        /// Taken-side benefits only from mechanic damage mods.
        const FIXED_DAMAGE = 1 << 4;
        /// Skip every avoidance roll after the immunity/positivity checks.
        const IGNORE_HIT_RESULT = 1 << 5;
        /// Forbid the dodge/parry/block rolls outright.
        const IMPOSSIBLE_DODGE_PARRY_BLOCK = 1 << 6;
        /// Melee spell that can be blocked (most cannot).
        const BLOCKABLE = 1 << 7;
        /// Pierces school/damage immunity effects.
        const UNAFFECTED_BY_INVULNERABILITY = 1 << 8;
        /// Aura may proc from triggered casts.
        const CAN_PROC_WITH_TRIGGERED = 1 << 9;
        /// While this aura's proc handler runs, further procs are disabled.
        const DISABLE_PROC = 1 << 10;
        /// Auto-repeat (wand / shoot style) spell.
        const AUTO_REPEAT = 1 << 11;
        /// Generic cast does not reset this auto action.
        const NOT_RESET_AUTO_ACTIONS = 1 << 12;
        /// Only lands when the caster is behind the target.
        const REQ_CASTER_BEHIND_TARGET = 1 << 13;
        /// Each application creates an independent aura slot (never stacks).
        const MULTI_SLOT_AURA = 1 << 14;
        /// At most one target may carry this aura per caster.
        const SINGLE_TARGET_AURA = 1 << 15;
        /// Aura survives the target's death.
        const DEATH_PERSISTENT = 1 << 16;
        /// May be applied to dead targets.
        const CAN_TARGET_DEAD = 1 << 17;
        /// Cast session cannot be interrupted once started.
        const UNINTERRUPTIBLE = 1 << 18;
        /// Channeled spell (uses the channel slot and duration).
        const CHANNELED = 1 << 19;
    }
}
