//! Behaviour of the non-combat states
//!
//! Idle states and the move wrapper are handled here. Room jobs are opaque to
//! the creature core and go through the `JobCallbacks` collaborator.

use crate::core::types::{CreatureIdx, COORD_PER_SUBTILE};
use crate::simulation::collaborators::{JobOutcome, MoveOutcome};
use crate::simulation::Simulation;
use crate::state::controller::{
    get_creature_state_besides_move, internal_set_thing_state, process_move_check, set_start_state,
    setup_move_to_position,
};
use crate::state::ids::CreatureState;
use crate::state::registry::{MoveCheck, StateOutcome};

/// Idle creatures count the time and drift back to their lair
pub fn creature_doing_nothing(sim: &mut Simulation, idx: CreatureIdx) -> StateOutcome {
    let Some(creature) = sim.world.creature_mut(idx) else {
        return StateOutcome::Deleted;
    };
    creature.counters.turns_at_job += 1;
    let state = creature.state.active;
    let Some(lair) = creature.lair else {
        return StateOutcome::Unchanged;
    };
    if creature.pos.box_distance(&lair) <= 3 * COORD_PER_SUBTILE {
        return StateOutcome::Unchanged;
    }
    if setup_move_to_position(sim, idx, lair, state) {
        tracing::trace!("{} heads back to its lair", idx);
        return StateOutcome::Modified;
    }
    StateOutcome::Unchanged
}

/// Move wrapper: walks to the target, then resumes the continuation
pub fn move_to_position(sim: &mut Simulation, idx: CreatureIdx) -> StateOutcome {
    let Some((target, speed, continuation)) = sim
        .world
        .creature(idx)
        .map(|c| (c.move_target, c.speed(), c.state.continuation))
    else {
        return StateOutcome::Deleted;
    };
    let Some(target) = target else {
        tracing::error!("{} is moving without a destination", idx);
        set_start_state(sim, idx);
        return StateOutcome::ResetOk;
    };
    let moved = sim.mover.move_towards(&mut sim.world, idx, target, speed);
    match process_move_check(sim, idx) {
        MoveCheck::Deleted => return StateOutcome::Deleted,
        MoveCheck::Continue => return StateOutcome::ResetOk,
        MoveCheck::Available => {}
    }
    match moved {
        MoveOutcome::Arrived => {
            if continuation.is_unused() {
                set_start_state(sim, idx);
                return StateOutcome::ResetOk;
            }
            internal_set_thing_state(&mut sim.world, idx, continuation);
            StateOutcome::Modified
        }
        MoveOutcome::Moving => StateOutcome::Modified,
        MoveOutcome::Failed => {
            tracing::debug!("{} could not reach {:?}", idx, target);
            internal_set_thing_state(&mut sim.world, idx, continuation);
            set_start_state(sim, idx);
            StateOutcome::ResetOk
        }
    }
}

/// Runs a room job through the job callbacks
pub fn process_job_state(sim: &mut Simulation, idx: CreatureIdx) -> StateOutcome {
    let Some(state) = sim.world.creature(idx).map(|c| c.state.active) else {
        return StateOutcome::Deleted;
    };
    match sim.jobs.process(&mut sim.world, idx, state) {
        JobOutcome::Continue => StateOutcome::Unchanged,
        JobOutcome::Deleted => StateOutcome::Deleted,
        JobOutcome::Reset => {
            if set_start_state(sim, idx).is_unused() {
                StateOutcome::ResetFail
            } else {
                StateOutcome::ResetOk
            }
        }
    }
}

pub fn cleanup_job_state(sim: &mut Simulation, idx: CreatureIdx) -> bool {
    let Some(state) = sim.world.creature(idx).map(get_creature_state_besides_move) else {
        return false;
    };
    if let Some(creature) = sim.world.creature_mut(idx) {
        creature.instance = None;
    }
    sim.jobs.cleanup(&mut sim.world, idx, state)
}

pub fn job_move_check(sim: &mut Simulation, idx: CreatureIdx) -> MoveCheck {
    let Some(state) = sim.world.creature(idx).map(|c| c.state.continuation) else {
        return MoveCheck::Deleted;
    };
    if state == CreatureState::Unused {
        return MoveCheck::Available;
    }
    sim.jobs.move_check(&mut sim.world, idx, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Coord;
    use crate::simulation::collaborators::OpenFieldNavigator;
    use crate::state::controller::process_creature_state;
    use crate::test_support::{simulation_with_creatures, CountingJobs};

    #[test]
    fn test_move_wrapper_resumes_continuation_on_arrival() {
        let (mut sim, ids) = simulation_with_creatures(1);
        let idx = ids[0];
        let start = sim.world.creature(idx).unwrap().pos;
        let target = start.offset(40, 0);
        assert!(setup_move_to_position(&mut sim, idx, target, CreatureState::Training));
        assert_eq!(process_creature_state(&mut sim, idx), StateOutcome::Modified);
        let c = sim.world.creature(idx).unwrap();
        assert_eq!(c.active_state(), CreatureState::Training);
        assert_eq!(c.pos, target);
    }

    #[test]
    fn test_move_wrapper_keeps_walking() {
        let (mut sim, ids) = simulation_with_creatures(1);
        let idx = ids[0];
        let target = sim.world.creature(idx).unwrap().pos.offset(5000, 0);
        assert!(setup_move_to_position(&mut sim, idx, target, CreatureState::Sleep));
        assert_eq!(process_creature_state(&mut sim, idx), StateOutcome::Modified);
        assert_eq!(
            sim.world.creature(idx).unwrap().active_state(),
            CreatureState::MoveToPosition
        );
    }

    #[test]
    fn test_blocked_move_is_refused() {
        let (mut sim, ids) = simulation_with_creatures(1);
        sim.nav = Box::new(OpenFieldNavigator {
            ground_blocked: true,
            ..Default::default()
        });
        assert!(!setup_move_to_position(&mut sim, ids[0], Coord::new(0, 0), CreatureState::Sleep));
    }

    #[test]
    fn test_job_reset_returns_to_start_state() {
        let (mut sim, ids) = simulation_with_creatures(1);
        let idx = ids[0];
        let jobs = CountingJobs::resetting();
        sim.jobs = Box::new(jobs);
        internal_set_thing_state(&mut sim.world, idx, CreatureState::Training);
        assert_eq!(process_creature_state(&mut sim, idx), StateOutcome::ResetOk);
        assert_eq!(sim.world.creature(idx).unwrap().active_state(), CreatureState::DoingNothing);
    }

    #[test]
    fn test_idle_creature_walks_home() {
        let (mut sim, ids) = simulation_with_creatures(1);
        let idx = ids[0];
        internal_set_thing_state(&mut sim.world, idx, CreatureState::DoingNothing);
        assert_eq!(process_creature_state(&mut sim, idx), StateOutcome::Unchanged);
        let lair = sim.world.creature(idx).unwrap().pos.offset(4000, 0);
        sim.world.creature_mut(idx).unwrap().lair = Some(lair);
        assert_eq!(process_creature_state(&mut sim, idx), StateOutcome::Modified);
        let c = sim.world.creature(idx).unwrap();
        assert_eq!(c.active_state(), CreatureState::MoveToPosition);
        assert_eq!(c.continue_state(), CreatureState::DoingNothing);
    }
}
