//! Simulation driver
//!
//! `Simulation` bundles the world with the collaborators the creature core
//! calls out to. State handlers receive it whole so they can both mutate the
//! world and query terrain or move bodies.

pub mod collaborators;
pub mod tick;

pub use collaborators::{
    EventLog, IdleJobs, JobCallbacks, JobOutcome, MessageKind, MoveOutcome, Mover, Navigator, Notification,
    OpenFieldNavigator, Presentation, StraightLineMover,
};
pub use tick::{check_win_condition, run_simulation_tick, GameOutcome, SimulationEvent};

use crate::core::config::CombatConfig;
use crate::ecs::world::World;

pub struct Simulation {
    pub world: World,
    pub nav: Box<dyn Navigator>,
    pub mover: Box<dyn Mover>,
    pub jobs: Box<dyn JobCallbacks>,
    pub presentation: Box<dyn Presentation>,
}

impl Simulation {
    pub fn new(config: CombatConfig, seed: u64) -> Self {
        Self::with_world(World::new(config, seed))
    }

    /// Wraps an existing world with the open-field collaborators
    pub fn with_world(world: World) -> Self {
        Self {
            world,
            nav: Box::new(OpenFieldNavigator::default()),
            mover: Box::new(StraightLineMover),
            jobs: Box::new(IdleJobs),
            presentation: Box::new(EventLog::default()),
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::with_world(World::default())
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("turn", &self.world.turn)
            .field("creatures", &self.world.creature_count())
            .finish_non_exhaustive()
    }
}
