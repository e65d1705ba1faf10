//! State controller
//!
//! The only code that writes a creature's active and continuation state.
//! `internal_set_thing_state` is for a state's own logic and checks nothing;
//! `external_set_thing_state` validates the transition and runs the cleanup
//! of the state being left first.

use crate::core::error::{Result, SimError};
use crate::core::types::{Coord, CreatureIdx};
use crate::creature::{Creature, SpellEffects, WorkCounters};
use crate::ecs::world::World;
use crate::simulation::Simulation;
use crate::state::ids::{CreatureState, StateSlot};
use crate::state::registry::{state_registry, MoveCheck, StateOutcome};
use crate::state::transition::can_change_from_state_to;

/// Logical activity, looking through the move wrapper
pub fn get_creature_state_besides_move(creature: &Creature) -> CreatureState {
    creature.state.logical(state_registry())
}

/// Logical activity, also looking through a drop or knock-out in progress
pub fn get_creature_state_besides_interruptions(creature: &Creature) -> CreatureState {
    let registry = state_registry();
    let state = creature.state.logical(registry);
    match (state, creature.interrupted) {
        (CreatureState::BeingDropped | CreatureState::Unconscious, Some(saved)) => saved.logical(registry),
        _ => state,
    }
}

fn reset_state_fields(creature: &mut Creature, state: CreatureState) {
    creature.state = StateSlot::new(state);
    creature.drag_cleanup_pending = false;
    creature.counters = WorkCounters::default();
    creature.instance = None;
}

/// Switches state without validation or cleanup
pub fn internal_set_thing_state(world: &mut World, idx: CreatureIdx, state: CreatureState) -> bool {
    match world.creature_mut(idx) {
        Some(creature) => {
            tracing::trace!("{}: internal state change {:?} to {:?}", idx, creature.state.active, state);
            reset_state_fields(creature, state);
            true
        }
        None => {
            tracing::error!("Cannot set state {:?} of missing creature {}", state, idx);
            false
        }
    }
}

/// Runs the cleanup of the logical state, or just drops the running instance
pub fn cleanup_current_thing_state(sim: &mut Simulation, idx: CreatureIdx) -> bool {
    let Some(state) = sim.world.creature(idx).map(get_creature_state_besides_move) else {
        return false;
    };
    match state_registry().info(state).cleanup {
        Some(cleanup) => cleanup(sim, idx),
        None => {
            if let Some(creature) = sim.world.creature_mut(idx) {
                creature.instance = None;
            }
            true
        }
    }
}

/// Cleans up the current state and enters `state`
pub fn initialise_thing_state(sim: &mut Simulation, idx: CreatureIdx, state: CreatureState) -> bool {
    cleanup_current_thing_state(sim, idx);
    let Some(creature) = sim.world.creature_mut(idx) else {
        tracing::error!("Creature {} vanished during state cleanup", idx);
        return false;
    };
    tracing::debug!("{}: state change {:?} to {:?}", idx, creature.state.active, state);
    reset_state_fields(creature, state);
    if creature.in_room_list {
        tracing::warn!("{} stays in room list even after cleanup", idx);
        creature.in_room_list = false;
    }
    true
}

/// Validated state change requested from outside the current state
pub fn external_set_thing_state(sim: &mut Simulation, idx: CreatureIdx, state: CreatureState) -> bool {
    let Some(creature) = sim.world.creature(idx) else {
        tracing::error!("Cannot set state {:?} of missing creature {}", state, idx);
        return false;
    };
    if !can_change_from_state_to(state_registry(), creature, creature.state.active, state) {
        tracing::debug!(
            "State change {:?} to {:?} for {} not allowed",
            creature.state.active,
            state,
            idx
        );
        return false;
    }
    initialise_thing_state(sim, idx, state)
}

/// `external_set_thing_state` reporting why the change did not happen
pub fn try_external_set_thing_state(sim: &mut Simulation, idx: CreatureIdx, state: CreatureState) -> Result<()> {
    let from = sim
        .world
        .creature(idx)
        .map(|c| c.state.active)
        .ok_or(SimError::CreatureNotFound(idx))?;
    if external_set_thing_state(sim, idx, state) {
        Ok(())
    } else {
        Err(SimError::TransitionDenied { from, to: state })
    }
}

/// Default activity for the creature given its owner and condition
pub fn start_state_for(world: &World, creature: &Creature) -> CreatureState {
    if creature.controlled {
        return CreatureState::ManualControl;
    }
    if creature.effects.contains(SpellEffects::CHICKEN) {
        return CreatureState::PretendChickenSetupMove;
    }
    if creature.effects.contains(SpellEffects::TIMEBOMB) {
        return CreatureState::Timebomb;
    }
    if creature.owner.is_neutral() {
        return CreatureState::Dormant;
    }
    let stats = world.model_stats(creature.model);
    if creature.owner.is_heroes() {
        return stats.map_or(CreatureState::GoodDoingNothing, |s| s.good_start_state);
    }
    match world.players.player(creature.owner) {
        None => CreatureState::Dormant,
        Some(player) if player.lost_level => CreatureState::LeavesBecauseOwnerLost,
        Some(_) => stats.map_or(CreatureState::DoingNothing, |s| s.evil_start_state),
    }
}

/// Puts the creature back into its default activity
pub fn set_start_state(sim: &mut Simulation, idx: CreatureIdx) -> CreatureState {
    let Some((state, previous)) = sim
        .world
        .creature(idx)
        .map(|c| (start_state_for(&sim.world, c), c.state))
    else {
        tracing::error!("Cannot reset missing creature {}", idx);
        return CreatureState::Unused;
    };
    tracing::debug!(
        "{}: start state {:?} (was {:?}, continuing {:?})",
        idx,
        state,
        previous.active,
        previous.continuation
    );
    initialise_thing_state(sim, idx, state);
    state
}

/// Wraps `continuation` in the move state towards `target`
///
/// Fails when the navigator finds no ground route.
pub fn setup_move_to_position(
    sim: &mut Simulation,
    idx: CreatureIdx,
    target: Coord,
    continuation: CreatureState,
) -> bool {
    if sim.nav.ground_distance(&sim.world, idx, target).is_none() {
        return false;
    }
    if !internal_set_thing_state(&mut sim.world, idx, CreatureState::MoveToPosition) {
        return false;
    }
    if let Some(creature) = sim.world.creature_mut(idx) {
        creature.state.continuation = continuation;
        creature.move_target = Some(target);
    }
    true
}

/// Enters an interruption such as a drop, keeping the current state for later
pub fn interrupt_creature_state(sim: &mut Simulation, idx: CreatureIdx, state: CreatureState) -> bool {
    let Some(saved) = sim.world.creature(idx).map(|c| c.state) else {
        return false;
    };
    if !external_set_thing_state(sim, idx, state) {
        return false;
    }
    if let Some(creature) = sim.world.creature_mut(idx) {
        creature.interrupted = Some(saved);
    }
    true
}

/// Leaves an interruption, returning to the saved state or the start state
pub fn resume_interrupted_state(sim: &mut Simulation, idx: CreatureIdx) -> bool {
    let Some(saved) = sim.world.creature_mut(idx).map(|c| c.interrupted.take()) else {
        return false;
    };
    match saved {
        Some(slot) if !slot.active.is_unused() => {
            cleanup_current_thing_state(sim, idx);
            match sim.world.creature_mut(idx) {
                Some(creature) => {
                    reset_state_fields(creature, slot.active);
                    creature.state.continuation = slot.continuation;
                    true
                }
                None => false,
            }
        }
        _ => {
            set_start_state(sim, idx);
            true
        }
    }
}

/// Runs the behaviour of the creature's active state for one turn
pub fn process_creature_state(sim: &mut Simulation, idx: CreatureIdx) -> StateOutcome {
    let Some(active) = sim.world.creature(idx).map(|c| c.state.active) else {
        return StateOutcome::Deleted;
    };
    if active.is_unused() {
        tracing::error!("Creature {} has no state, resetting", idx);
        set_start_state(sim, idx);
        return StateOutcome::ResetOk;
    }
    match state_registry().info(active).process {
        Some(process) => process(sim, idx),
        None => StateOutcome::Unchanged,
    }
}

/// Runs the continuation's move check while the creature is in the move wrapper
pub fn process_move_check(sim: &mut Simulation, idx: CreatureIdx) -> MoveCheck {
    let Some(continuation) = sim.world.creature(idx).map(|c| c.state.continuation) else {
        return MoveCheck::Deleted;
    };
    match state_registry().info(continuation).move_check {
        Some(check) => check(sim, idx),
        None => MoveCheck::Available,
    }
}
