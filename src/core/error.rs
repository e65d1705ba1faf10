use thiserror::Error;

use crate::core::types::CreatureIdx;
use crate::state::CreatureState;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Creature not found: {0}")]
    CreatureNotFound(CreatureIdx),

    #[error("No free battle slot left in the pool")]
    BattlePoolExhausted,

    #[error("Creature arena used all {0} slots")]
    CreatureSlotsExhausted(usize),

    #[error("No free opponent slot on {0}")]
    NoOpponentSlot(CreatureIdx),

    #[error("Transition denied: {from:?} -> {to:?}")]
    TransitionDenied { from: CreatureState, to: CreatureState },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
