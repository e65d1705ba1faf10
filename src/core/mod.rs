pub mod config;
pub mod error;
pub mod types;

pub use config::CombatConfig;
pub use error::{Result, SimError};
pub use types::{BattleId, Coord, CreatureIdx, ModelId, PlayerId, StructureIdx, Turn};
