//! Transition validator
//!
//! Decides whether a creature may switch from one activity to another. The
//! source state's type selects which override flag the destination must
//! carry; types without a rule always permit. A chicken, slapped or frozen
//! creature is also kept out of states that forbid its condition.

use crate::creature::Creature;
use crate::state::ids::{CreatureState, StateType};
use crate::state::registry::{Conditions, Overrides, StateRegistry};

/// Override a destination needs to interrupt a source of the given type
///
/// `None` means the type has no rule and any destination is allowed.
pub fn required_override(source_type: StateType) -> Option<Overrides> {
    match source_type {
        StateType::OwnNeeds => Some(Overrides::OWN_NEEDS),
        StateType::Sleep => Some(Overrides::SLEEP),
        StateType::Feed => Some(Overrides::FEED),
        StateType::FightCreature => Some(Overrides::FIGHT_CREATURE),
        StateType::GetsSalary => Some(Overrides::GETS_SALARY),
        StateType::Escape => Some(Overrides::ESCAPE),
        StateType::Unconscious => Some(Overrides::UNCONSCIOUS),
        StateType::AngerJob => Some(Overrides::ANGER_JOB),
        StateType::FightDoor => Some(Overrides::FIGHT_DOOR),
        StateType::FightObject => Some(Overrides::FIGHT_OBJECT),
        StateType::CalledToArms => Some(Overrides::CALL_TO_ARMS),
        StateType::Follow => Some(Overrides::FOLLOW),
        StateType::Idle | StateType::Work | StateType::Move => None,
    }
}

/// States that may always break off to fight a door
fn may_always_fight_door(state: CreatureState) -> bool {
    matches!(
        state,
        CreatureState::Timebomb | CreatureState::ObjectSnipe | CreatureState::ArrivedAtSabotageRoom
    )
}

/// Can `creature` switch from `curr_state` to `next_state`?
pub fn can_change_from_state_to(
    registry: &StateRegistry,
    creature: &Creature,
    curr_state: CreatureState,
    next_state: CreatureState,
) -> bool {
    let mut curr = registry.info(curr_state);
    if curr.state_type == StateType::Move {
        curr = registry.info(creature.state.continuation);
    }
    let next = registry.info(next_state);

    // A possessed creature only drops back to idle
    if creature.controlled && next.state_type != StateType::Idle {
        return false;
    }
    if !next.flags.permits(Conditions::of(creature)) {
        return false;
    }

    if may_always_fight_door(curr_state) && next.state_type == StateType::FightDoor {
        return true;
    }

    if curr.flags.transition && !next.flags.overrides(Overrides::TRANSITION) {
        return false;
    }
    if curr.flags.captive && !next.flags.overrides(Overrides::CAPTIVE) {
        return false;
    }

    match required_override(curr.state_type) {
        Some(needed) => next.flags.overrides(needed),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_creature;
    use crate::state::registry::state_registry;

    #[test]
    fn test_idle_permits_anything() {
        let registry = state_registry();
        let creature = sample_creature();
        for next in CreatureState::ALL {
            assert!(can_change_from_state_to(
                registry,
                &creature,
                CreatureState::DoingNothing,
                next
            ));
        }
    }

    #[test]
    fn test_combat_to_flee_allowed_but_not_to_training() {
        let registry = state_registry();
        let creature = sample_creature();
        assert!(can_change_from_state_to(
            registry,
            &creature,
            CreatureState::InCombat,
            CreatureState::CombatFlee
        ));
        assert!(!can_change_from_state_to(
            registry,
            &creature,
            CreatureState::InCombat,
            CreatureState::Training
        ));
    }

    #[test]
    fn test_move_wrapper_uses_continuation() {
        let registry = state_registry();
        let mut creature = sample_creature();
        creature.state.active = CreatureState::MoveToPosition;
        creature.state.continuation = CreatureState::Sleep;
        // Sleep yields only to states carrying the sleep override
        assert!(!can_change_from_state_to(
            registry,
            &creature,
            CreatureState::MoveToPosition,
            CreatureState::Training
        ));
        assert!(can_change_from_state_to(
            registry,
            &creature,
            CreatureState::MoveToPosition,
            CreatureState::Eat
        ));
    }

    #[test]
    fn test_captive_blocks_without_override() {
        let registry = state_registry();
        let creature = sample_creature();
        assert!(!can_change_from_state_to(
            registry,
            &creature,
            CreatureState::BeingDropped,
            CreatureState::InCombat
        ));
        assert!(can_change_from_state_to(
            registry,
            &creature,
            CreatureState::BeingDropped,
            CreatureState::Unconscious
        ));
    }

    #[test]
    fn test_controlled_creature_only_goes_idle() {
        let registry = state_registry();
        let mut creature = sample_creature();
        creature.controlled = true;
        assert!(!can_change_from_state_to(
            registry,
            &creature,
            CreatureState::ManualControl,
            CreatureState::InCombat
        ));
        assert!(can_change_from_state_to(
            registry,
            &creature,
            CreatureState::ManualControl,
            CreatureState::DoingNothing
        ));
    }

    #[test]
    fn test_timebomb_may_fight_doors() {
        let registry = state_registry();
        let creature = sample_creature();
        assert!(can_change_from_state_to(
            registry,
            &creature,
            CreatureState::Timebomb,
            CreatureState::DoorCombat
        ));
        assert!(!can_change_from_state_to(
            registry,
            &creature,
            CreatureState::Timebomb,
            CreatureState::Training
        ));
    }

    #[test]
    fn test_frozen_creature_cannot_start_fighting() {
        let registry = state_registry();
        let mut creature = sample_creature();
        creature.apply_effect(crate::creature::SpellEffects::FROZEN, 50);
        assert!(!can_change_from_state_to(
            registry,
            &creature,
            CreatureState::DoingNothing,
            CreatureState::InCombat
        ));
        assert!(can_change_from_state_to(
            registry,
            &creature,
            CreatureState::DoingNothing,
            CreatureState::Unconscious
        ));

        creature.expire_effects(50);
        assert!(can_change_from_state_to(
            registry,
            &creature,
            CreatureState::DoingNothing,
            CreatureState::InCombat
        ));
    }

    #[test]
    fn test_slapped_creature_cannot_sleep() {
        let registry = state_registry();
        let mut creature = sample_creature();
        creature.effects.insert(crate::creature::SpellEffects::SLAPPED);
        assert!(!can_change_from_state_to(
            registry,
            &creature,
            CreatureState::DoingNothing,
            CreatureState::Sleep
        ));
        assert!(can_change_from_state_to(
            registry,
            &creature,
            CreatureState::DoingNothing,
            CreatureState::Training
        ));
    }
}
