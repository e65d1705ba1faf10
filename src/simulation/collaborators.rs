//! Collaborator seams
//!
//! The creature core never walks terrain, moves bodies, runs room jobs or
//! draws anything itself. Those concerns sit behind the traits below, with
//! simple open-field implementations for the skirmish binary and the tests.

use serde::{Deserialize, Serialize};

use crate::core::types::{Coord, CreatureIdx, PlayerId, Turn};
use crate::ecs::world::World;
use crate::state::{CreatureState, MoveCheck};

/// What a sight path towards an enemy allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SightPath {
    #[default]
    None,
    /// Visible and shootable, but no walkable line
    RangedOnly,
    MeleeOk,
}

impl SightPath {
    pub fn is_clear(self) -> bool {
        self != SightPath::None
    }
}

/// Pathfinding and line-of-sight queries
pub trait Navigator {
    /// Walking distance from the creature to `target`, `None` if unreachable
    fn ground_distance(&self, world: &World, creature: CreatureIdx, target: Coord) -> Option<i32>;

    /// Can a flying creature reach `target` hugging walls within `max_hops` slabs?
    fn wall_hug_reachable(
        &self,
        world: &World,
        creature: CreatureIdx,
        target: Coord,
        max_hops: u32,
    ) -> bool;

    fn sight_path(
        &self,
        world: &World,
        creature: CreatureIdx,
        enemy: CreatureIdx,
        distance: i32,
    ) -> SightPath;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveOutcome {
    Arrived,
    Moving,
    Failed,
}

/// Moves creature bodies on the map
pub trait Mover {
    fn move_towards(
        &mut self,
        world: &mut World,
        creature: CreatureIdx,
        target: Coord,
        speed: i32,
    ) -> MoveOutcome;
}

/// Outcome of one turn of a non-combat job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOutcome {
    Continue,
    /// The job destroyed the creature
    Deleted,
    /// The job gave up; the creature returns to its start state
    Reset,
}

/// Behaviour of the non-combat activities (training, sleeping, eating...)
pub trait JobCallbacks {
    fn process(
        &mut self,
        world: &mut World,
        creature: CreatureIdx,
        state: CreatureState,
    ) -> JobOutcome;

    /// Leaves the job; must drop room membership and anything dragged
    fn cleanup(&mut self, world: &mut World, creature: CreatureIdx, _state: CreatureState) -> bool {
        if let Some(c) = world.creature_mut(creature) {
            c.in_room_list = false;
            c.drag_cleanup_pending = false;
        }
        true
    }

    /// Checked every turn while the creature walks towards the job
    fn move_check(
        &mut self,
        _world: &mut World,
        _creature: CreatureIdx,
        _state: CreatureState,
    ) -> MoveCheck {
        MoveCheck::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoundKind {
    /// A fight breaks out
    Fight,
    Swing,
    Hit,
    Cast,
    Death,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    CreatureAttacked,
    CreatureFleeing,
    BattleStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Blood,
    SpellFlash,
    Smoke,
}

/// Fire-and-forget output for the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    Sound {
        kind: SoundKind,
        at: Coord,
    },
    Message {
        kind: MessageKind,
        player: PlayerId,
        subject: CreatureIdx,
        turn: Turn,
    },
    Effect {
        kind: EffectKind,
        at: Coord,
    },
}

pub trait Presentation {
    fn notify(&mut self, notification: Notification);
}

/// Per-player bookkeeping of running fights
pub trait Economy {
    fn increment_fights(&mut self, player: PlayerId);
    /// Must tolerate underflow: log and clamp at zero
    fn decrement_fights(&mut self, player: PlayerId);
    fn fights(&self, player: PlayerId) -> u32;
}

/// Flat open map: everything in range is reachable and visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFieldNavigator {
    /// Pretend every ground route is blocked
    pub ground_blocked: bool,
    /// Sight result handed out for every query
    pub sight: SightPath,
}

impl Default for OpenFieldNavigator {
    fn default() -> Self {
        Self {
            ground_blocked: false,
            sight: SightPath::MeleeOk,
        }
    }
}

impl Navigator for OpenFieldNavigator {
    fn ground_distance(&self, world: &World, creature: CreatureIdx, target: Coord) -> Option<i32> {
        if self.ground_blocked {
            return None;
        }
        world.creature(creature).map(|c| c.pos.distance_2d(&target))
    }

    fn wall_hug_reachable(
        &self,
        world: &World,
        creature: CreatureIdx,
        target: Coord,
        max_hops: u32,
    ) -> bool {
        match world.creature(creature) {
            Some(c) => {
                let hops = c.pos.box_distance(&target) / crate::core::types::COORD_PER_SUBTILE;
                !self.ground_blocked && hops as u32 <= max_hops
            }
            None => false,
        }
    }

    fn sight_path(
        &self,
        _world: &World,
        _creature: CreatureIdx,
        _enemy: CreatureIdx,
        _distance: i32,
    ) -> SightPath {
        self.sight
    }
}

/// Steps straight at the target, never blocked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StraightLineMover;

impl Mover for StraightLineMover {
    fn move_towards(
        &mut self,
        world: &mut World,
        creature: CreatureIdx,
        target: Coord,
        speed: i32,
    ) -> MoveOutcome {
        let Some(c) = world.creature_mut(creature) else {
            return MoveOutcome::Failed;
        };
        let dist = c.pos.distance_2d(&target);
        if dist <= speed.max(1) {
            c.pos = Coord { z: c.pos.z, ..target };
            return MoveOutcome::Arrived;
        }
        let dx = (target.x - c.pos.x) as i64 * speed as i64 / dist as i64;
        let dy = (target.y - c.pos.y) as i64 * speed as i64 / dist as i64;
        c.pos = c.pos.offset(dx as i32, dy as i32);
        MoveOutcome::Moving
    }
}

/// Job callbacks that keep every job running forever
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleJobs;

impl JobCallbacks for IdleJobs {
    fn process(
        &mut self,
        world: &mut World,
        creature: CreatureIdx,
        _state: CreatureState,
    ) -> JobOutcome {
        match world.creature_mut(creature) {
            Some(c) => {
                c.counters.turns_at_job += 1;
                JobOutcome::Continue
            }
            None => JobOutcome::Deleted,
        }
    }
}

/// Presentation sink that records everything it is told
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub events: Vec<Notification>,
}

impl EventLog {
    pub fn messages(&self, kind: MessageKind) -> usize {
        self.events
            .iter()
            .filter(|n| matches!(n, Notification::Message { kind: k, .. } if *k == kind))
            .count()
    }
}

impl Presentation for EventLog {
    fn notify(&mut self, notification: Notification) {
        tracing::trace!("Notification: {:?}", notification);
        self.events.push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_line_mover_arrives() {
        let mut world = World::new(crate::core::config::CombatConfig::default(), 1);
        let stats = crate::creature::CreatureStats::default();
        world.register_model(crate::core::types::ModelId(0), stats);
        let idx = world
            .spawn_creature(crate::core::types::ModelId(0), PlayerId(0), Coord::new(0, 0), 0)
            .expect("spawn");
        let mut mover = StraightLineMover;
        let target = Coord::new(300, 400);
        assert_eq!(mover.move_towards(&mut world, idx, target, 250), MoveOutcome::Moving);
        assert_eq!(world.creature(idx).map(|c| c.pos), Some(Coord::new(150, 200)));
        assert_eq!(mover.move_towards(&mut world, idx, target, 250), MoveOutcome::Arrived);
        assert_eq!(world.creature(idx).map(|c| c.pos), Some(target));
    }

    #[test]
    fn test_event_log_counts_messages() {
        let mut log = EventLog::default();
        log.notify(Notification::Message {
            kind: MessageKind::CreatureAttacked,
            player: PlayerId(0),
            subject: CreatureIdx(1),
            turn: 3,
        });
        log.notify(Notification::Sound {
            kind: SoundKind::Hit,
            at: Coord::default(),
        });
        assert_eq!(log.messages(MessageKind::CreatureAttacked), 1);
        assert_eq!(log.messages(MessageKind::BattleStarted), 0);
    }
}
