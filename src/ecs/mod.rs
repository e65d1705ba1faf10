//! Entity storage: the creature arena and player records

pub mod players;
pub mod world;

pub use players::{PlayerRoster, PlayerState};
pub use world::{Structure, StructureKind, World, MAX_CREATURE_SLOTS};
