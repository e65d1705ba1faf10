//! Creature Sim - creature state machine and combat bookkeeping for a dungeon keeper game

pub mod combat;
pub mod core;
pub mod creature;
pub mod ecs;
pub mod rules;
pub mod simulation;
pub mod state;

pub use crate::core::{CombatConfig, Result, SimError};
pub use crate::ecs::World;
pub use crate::simulation::{run_simulation_tick, Simulation};
