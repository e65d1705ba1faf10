//! Creature combat
//!
//! Opponent slots, the battle pool, fear and weapon selection, and the
//! per-turn behaviour of the combat states.

pub mod battle;
pub mod behavior;
pub mod constants;
pub mod engage;
pub mod fear;
pub mod flee;
pub mod opponents;
pub mod resolver;
pub mod state;
pub mod weapons;

pub use battle::{Battle, BattlePool, BattleSides};
pub use behavior::{
    creature_available_for_combat_this_turn, set_creature_door_combat, set_creature_in_combat,
    set_creature_in_combat_to_the_death, set_creature_object_combat,
};
pub use flee::{creature_combat_flee, creature_look_for_combat};
pub use opponents::{MeleeOpponents, OpponentSlots, RangedOpponents};
pub use resolver::CombatCandidate;
pub use state::{AttackType, CombatData, CombatFlags, CombatState};
pub use weapons::WeaponChoice;
