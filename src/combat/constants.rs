//! Combat system constants - structural limits in one place
//!
//! Balance values that may be tuned live in `core::config::CombatConfig`.
//! The values here size arrays or encode fixed table layout.

/// Melee attacker slots per victim
pub const MELEE_OPPONENTS_LIMIT: usize = 4;

/// Ranged attacker slots per victim
pub const RANGED_OPPONENTS_LIMIT: usize = 4;

/// Battle records in the pool, including the sentinel at index 0
pub const BATTLES_COUNT: usize = 48;

/// Battles shown at once in a player's battle overview
pub const VISIBLE_BATTLES: usize = 3;

/// Creatures listed per side in a battle overview
pub const BATTLERS_PER_SIDE: usize = 8;

/// Health below `max_health / HEAL_HEALTH_DIVISOR` triggers a heal instance
pub const HEAL_HEALTH_DIVISOR: i64 = 3;

/// Slot count the combat score subtracts live opponents from
pub const SCORE_SLOT_BASE: i64 = 4;

/// Ground route length used when a waiting creature steps sideways
pub const SIDESTEP_DISTANCE: i32 = 768;

/// Single step when backing away from an enemy
pub const BACKSTEP_DISTANCE: i32 = 256;

/// Turns between starting an instance and its effect landing
pub const INSTANCE_ACTION_TURNS: u64 = 2;
