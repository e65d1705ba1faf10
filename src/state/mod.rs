//! Creature state machine
//!
//! State identifiers and the two-level slot, the static registry of state
//! behaviour, the transition rules and the controller that applies them.

pub mod controller;
pub mod handlers;
pub mod ids;
pub mod registry;
pub mod transition;

pub use controller::{
    external_set_thing_state, get_creature_state_besides_interruptions, get_creature_state_besides_move,
    internal_set_thing_state, process_creature_state, set_start_state, try_external_set_thing_state,
};
pub use ids::{CreatureState, GuiJob, StateSlot, StateType};
pub use registry::{state_registry, Conditions, MoveCheck, Overrides, StateFlags, StateInfo, StateOutcome, StateRegistry};
pub use transition::can_change_from_state_to;
