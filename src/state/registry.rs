//! State registry - static table of every creature activity
//!
//! Maps a state identifier to its behaviour, cleanup and movement-arrival
//! callbacks, its coarse type and the permission flags consumed by the
//! transition validator. Built once and shared read-only for the whole run.

use std::sync::OnceLock;

use bitflags::bitflags;

use crate::core::types::CreatureIdx;
use crate::creature::{Creature, SpellEffects};
use crate::simulation::Simulation;
use crate::state::ids::{CreatureState, StateType};

/// Result of running a state's behaviour for one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateOutcome {
    /// The creature no longer exists
    Deleted,
    Unchanged,
    Modified,
    /// Reset to the start state succeeded
    ResetOk,
    /// Reset to the start state was attempted but failed
    ResetFail,
}

/// Result of the continuation's check while the creature is moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveCheck {
    /// The creature no longer exists
    Deleted,
    /// Nothing to report, keep moving
    Available,
    /// The check changed the state; skip movement this turn
    Continue,
}

pub type ProcessFn = fn(&mut Simulation, CreatureIdx) -> StateOutcome;
pub type CleanupFn = fn(&mut Simulation, CreatureIdx) -> bool;
pub type MoveCheckFn = fn(&mut Simulation, CreatureIdx) -> MoveCheck;

bitflags! {
    /// Destination-side override flags, one per transition rule
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Overrides: u16 {
        const FEED = 0x0001;
        const OWN_NEEDS = 0x0002;
        const SLEEP = 0x0004;
        const FIGHT_CREATURE = 0x0008;
        const GETS_SALARY = 0x0010;
        /// May interrupt a state flagged `transition`
        const TRANSITION = 0x0020;
        /// May interrupt a state flagged `captive`
        const CAPTIVE = 0x0040;
        const ESCAPE = 0x0080;
        const UNCONSCIOUS = 0x0100;
        const ANGER_JOB = 0x0200;
        const FIGHT_OBJECT = 0x0400;
        const FIGHT_DOOR = 0x0800;
        const CALL_TO_ARMS = 0x1000;
        const FOLLOW = 0x2000;
    }
}

bitflags! {
    /// Conditions of a creature that can bar it from entering a state
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Conditions: u8 {
        /// Turned into a chicken
        const CHICKEN = 0x01;
        /// Recently slapped by its keeper
        const SLAPPED = 0x02;
        const FROZEN = 0x04;
    }
}

impl Conditions {
    /// Conditions the creature's current spell effects amount to
    pub fn of(creature: &Creature) -> Self {
        let mut conditions = Self::empty();
        conditions.set(Self::CHICKEN, creature.effects.contains(SpellEffects::CHICKEN));
        conditions.set(Self::SLAPPED, creature.effects.contains(SpellEffects::SLAPPED));
        conditions.set(Self::FROZEN, creature.effects.contains(SpellEffects::FROZEN));
        conditions
    }
}

/// Permission flags of one state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateFlags {
    overrides: Overrides,
    /// Conditions under which the state cannot be entered
    blocked_while: Conditions,
    /// Leaving requires a destination with `Overrides::TRANSITION`
    pub transition: bool,
    /// Leaving requires a destination with `Overrides::CAPTIVE`
    pub captive: bool,
    /// Creature answers a call to arms from this state
    pub react_to_call_to_arms: bool,
}

impl StateFlags {
    pub const NONE: StateFlags = StateFlags {
        overrides: Overrides::empty(),
        blocked_while: Conditions::empty(),
        transition: false,
        captive: false,
        react_to_call_to_arms: false,
    };

    pub fn overriding(overrides: Overrides) -> Self {
        Self { overrides, ..Self::NONE }
    }

    /// Does the state carry any of the given overrides?
    pub fn overrides(&self, item: Overrides) -> bool {
        self.overrides.intersects(item)
    }

    /// May a creature with `conditions` enter the state?
    pub fn permits(&self, conditions: Conditions) -> bool {
        !self.blocked_while.intersects(conditions)
    }

    pub fn blocked_while(mut self, conditions: Conditions) -> Self {
        self.blocked_while |= conditions;
        self
    }

    pub fn transition(mut self) -> Self {
        self.transition = true;
        self
    }

    pub fn captive(mut self) -> Self {
        self.captive = true;
        self
    }

    pub fn reacts_to_call_to_arms(mut self) -> Self {
        self.react_to_call_to_arms = true;
        self
    }
}

/// Everything the registry knows about one state
#[derive(Clone, Copy)]
pub struct StateInfo {
    pub state: CreatureState,
    pub process: Option<ProcessFn>,
    pub cleanup: Option<CleanupFn>,
    pub move_check: Option<MoveCheckFn>,
    pub state_type: StateType,
    pub flags: StateFlags,
}

impl std::fmt::Debug for StateInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateInfo")
            .field("state", &self.state)
            .field("has_process", &self.process.is_some())
            .field("has_cleanup", &self.cleanup.is_some())
            .field("has_move_check", &self.move_check.is_some())
            .field("state_type", &self.state_type)
            .field("flags", &self.flags)
            .finish()
    }
}

impl StateInfo {
    pub fn new(state: CreatureState, state_type: StateType) -> Self {
        Self {
            state,
            process: None,
            cleanup: None,
            move_check: None,
            state_type,
            flags: StateFlags::NONE,
        }
    }

    fn process(mut self, f: ProcessFn) -> Self {
        self.process = Some(f);
        self
    }

    fn cleanup(mut self, f: CleanupFn) -> Self {
        self.cleanup = Some(f);
        self
    }

    fn move_check(mut self, f: MoveCheckFn) -> Self {
        self.move_check = Some(f);
        self
    }

    fn flags(mut self, flags: StateFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Overrides shared by states that yield to almost anything
const YIELDING: Overrides = Overrides::FEED
    .union(Overrides::OWN_NEEDS)
    .union(Overrides::SLEEP)
    .union(Overrides::FIGHT_CREATURE)
    .union(Overrides::GETS_SALARY)
    .union(Overrides::ANGER_JOB)
    .union(Overrides::FIGHT_OBJECT)
    .union(Overrides::FIGHT_DOOR)
    .union(Overrides::CALL_TO_ARMS)
    .union(Overrides::FOLLOW);

/// Overrides of states that can interrupt even transitional or captive states
const FORCED: Overrides = YIELDING
    .union(Overrides::TRANSITION)
    .union(Overrides::CAPTIVE)
    .union(Overrides::ESCAPE);

/// Overrides of the in-combat state
const COMBAT: Overrides = Overrides::FEED
    .union(Overrides::OWN_NEEDS)
    .union(Overrides::SLEEP)
    .union(Overrides::GETS_SALARY)
    .union(Overrides::ESCAPE)
    .union(Overrides::ANGER_JOB)
    .union(Overrides::FIGHT_OBJECT)
    .union(Overrides::CALL_TO_ARMS)
    .union(Overrides::FOLLOW);

/// A chicken or frozen creature cannot take up jobs or fights
const BUSY: Conditions = Conditions::CHICKEN.union(Conditions::FROZEN);

/// Falling asleep is also out of the question right after a slap
const RESTING: Conditions = BUSY.union(Conditions::SLAPPED);

/// Static table of states
#[derive(Debug)]
pub struct StateRegistry {
    states: Vec<StateInfo>,
}

impl StateRegistry {
    /// The built-in creature state table
    pub fn standard() -> Self {
        use crate::combat::behavior;
        use crate::combat::flee;
        use crate::state::handlers;
        use CreatureState as S;

        let states = vec![
            StateInfo::new(S::Unused, StateType::Idle),
            StateInfo::new(S::DoingNothing, StateType::Idle)
                .process(handlers::creature_doing_nothing)
                .flags(StateFlags::NONE.reacts_to_call_to_arms().blocked_while(Conditions::CHICKEN)),
            StateInfo::new(S::GoodDoingNothing, StateType::Idle)
                .process(handlers::creature_doing_nothing)
                .flags(StateFlags::NONE.reacts_to_call_to_arms().blocked_while(Conditions::CHICKEN)),
            StateInfo::new(S::Dormant, StateType::Idle)
                .process(handlers::creature_doing_nothing)
                .flags(
                    StateFlags::overriding(YIELDING)
                        .reacts_to_call_to_arms()
                        .blocked_while(Conditions::CHICKEN | Conditions::SLAPPED),
                ),
            StateInfo::new(S::ManualControl, StateType::Idle),
            StateInfo::new(S::MoveToPosition, StateType::Move)
                .process(handlers::move_to_position)
                .flags(StateFlags::NONE.reacts_to_call_to_arms().blocked_while(Conditions::FROZEN)),
            StateInfo::new(S::Training, StateType::Work)
                .process(handlers::process_job_state)
                .cleanup(handlers::cleanup_job_state)
                .move_check(handlers::job_move_check)
                .flags(StateFlags::NONE.reacts_to_call_to_arms().blocked_while(BUSY)),
            StateInfo::new(S::Researching, StateType::Work)
                .process(handlers::process_job_state)
                .cleanup(handlers::cleanup_job_state)
                .move_check(handlers::job_move_check)
                .flags(StateFlags::NONE.reacts_to_call_to_arms().blocked_while(BUSY)),
            StateInfo::new(S::Manufacturing, StateType::Work)
                .process(handlers::process_job_state)
                .cleanup(handlers::cleanup_job_state)
                .flags(StateFlags::NONE.reacts_to_call_to_arms().blocked_while(BUSY)),
            StateInfo::new(S::Scavenging, StateType::Work)
                .process(handlers::process_job_state)
                .flags(StateFlags::NONE.reacts_to_call_to_arms().blocked_while(BUSY)),
            StateInfo::new(S::GoingHomeToSleep, StateType::Sleep)
                .process(handlers::process_job_state)
                .flags(
                    StateFlags::overriding(Overrides::OWN_NEEDS | Overrides::ANGER_JOB)
                        .reacts_to_call_to_arms()
                        .blocked_while(RESTING),
                ),
            StateInfo::new(S::Sleep, StateType::Sleep)
                .process(handlers::process_job_state)
                .cleanup(handlers::cleanup_job_state)
                .flags(
                    StateFlags::overriding(Overrides::OWN_NEEDS | Overrides::ANGER_JOB)
                        .reacts_to_call_to_arms()
                        .blocked_while(RESTING),
                ),
            StateInfo::new(S::Eat, StateType::Feed)
                .process(handlers::process_job_state)
                .flags(
                    StateFlags::overriding(Overrides::OWN_NEEDS | Overrides::SLEEP | Overrides::ANGER_JOB)
                        .reacts_to_call_to_arms()
                        .blocked_while(BUSY),
                ),
            StateInfo::new(S::TakeSalary, StateType::GetsSalary)
                .process(handlers::process_job_state)
                .move_check(handlers::job_move_check)
                .flags(
                    StateFlags::overriding(Overrides::OWN_NEEDS | Overrides::ANGER_JOB)
                        .reacts_to_call_to_arms()
                        .blocked_while(BUSY),
                ),
            StateInfo::new(S::PersonSulking, StateType::OwnNeeds)
                .process(handlers::process_job_state)
                .flags(StateFlags::NONE.reacts_to_call_to_arms().blocked_while(BUSY)),
            StateInfo::new(S::LeavesOrDies, StateType::OwnNeeds)
                .process(handlers::process_job_state)
                .flags(StateFlags::overriding(FORCED).transition().captive()),
            StateInfo::new(S::LeavesBecauseOwnerLost, StateType::AngerJob)
                .process(handlers::process_job_state)
                .flags(StateFlags::overriding(FORCED).transition().captive()),
            StateInfo::new(S::Timebomb, StateType::Idle)
                .process(handlers::process_job_state)
                .flags(StateFlags::overriding(FORCED).transition().blocked_while(Conditions::CHICKEN)),
            StateInfo::new(S::PretendChickenSetupMove, StateType::Idle)
                .process(handlers::process_job_state)
                .flags(StateFlags::overriding(FORCED).transition().captive()),
            StateInfo::new(S::PretendChickenMove, StateType::Idle)
                .process(handlers::process_job_state)
                .flags(StateFlags::overriding(FORCED).transition().captive()),
            StateInfo::new(S::InCombat, StateType::FightCreature)
                .process(behavior::creature_in_combat)
                .cleanup(behavior::cleanup_combat)
                .flags(StateFlags::overriding(COMBAT).blocked_while(BUSY)),
            // Frozen fighters may still flee
            StateInfo::new(S::CombatFlee, StateType::Escape)
                .process(flee::creature_combat_flee)
                .flags(
                    StateFlags::overriding(COMBAT | Overrides::FIGHT_CREATURE)
                        .blocked_while(Conditions::CHICKEN),
                ),
            StateInfo::new(S::DoorCombat, StateType::FightDoor)
                .process(behavior::creature_door_combat)
                .cleanup(behavior::cleanup_door_combat)
                .flags(
                    StateFlags::overriding(
                        Overrides::FEED
                            | Overrides::OWN_NEEDS
                            | Overrides::FIGHT_CREATURE
                            | Overrides::GETS_SALARY
                            | Overrides::ESCAPE
                            | Overrides::ANGER_JOB
                            | Overrides::FIGHT_OBJECT
                            | Overrides::CALL_TO_ARMS
                            | Overrides::FOLLOW,
                    )
                    .blocked_while(BUSY),
                ),
            StateInfo::new(S::ObjectCombat, StateType::FightObject)
                .process(behavior::creature_object_combat)
                .cleanup(behavior::cleanup_object_combat)
                .flags(
                    StateFlags::overriding(
                        Overrides::FEED
                            | Overrides::OWN_NEEDS
                            | Overrides::SLEEP
                            | Overrides::FIGHT_CREATURE
                            | Overrides::GETS_SALARY
                            | Overrides::ESCAPE
                            | Overrides::ANGER_JOB
                            | Overrides::CALL_TO_ARMS
                            | Overrides::FOLLOW,
                    )
                    .blocked_while(BUSY),
                ),
            StateInfo::new(S::ObjectSnipe, StateType::FightObject)
                .process(behavior::creature_object_combat)
                .cleanup(behavior::cleanup_object_combat)
                .flags(
                    StateFlags::overriding(Overrides::FIGHT_CREATURE | Overrides::ESCAPE | Overrides::CALL_TO_ARMS)
                        .blocked_while(BUSY),
                ),
            StateInfo::new(S::Unconscious, StateType::Unconscious)
                .process(handlers::process_job_state)
                .cleanup(handlers::cleanup_job_state)
                .flags(StateFlags::overriding(FORCED).captive()),
            StateInfo::new(S::BeingDropped, StateType::Idle)
                .process(handlers::process_job_state)
                .cleanup(handlers::cleanup_job_state)
                .flags(StateFlags::NONE.transition().captive()),
            StateInfo::new(S::ArriveAtCallToArms, StateType::CalledToArms)
                .process(handlers::process_job_state)
                .flags(
                    StateFlags::overriding(Overrides::FEED | Overrides::SLEEP | Overrides::GETS_SALARY)
                        .blocked_while(BUSY),
                ),
            StateInfo::new(S::FollowLeader, StateType::Follow)
                .process(handlers::process_job_state)
                .flags(StateFlags::NONE.blocked_while(BUSY)),
            StateInfo::new(S::ArrivedAtSabotageRoom, StateType::Work)
                .process(handlers::process_job_state)
                .flags(StateFlags::NONE.blocked_while(BUSY)),
        ];

        debug_assert_eq!(states.len(), CreatureState::ALL.len());
        Self { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Entry for a raw state index; out-of-range indices yield the sentinel
    pub fn lookup(&self, raw: u16) -> &StateInfo {
        match self.states.get(raw as usize) {
            Some(info) => info,
            None => {
                tracing::error!("State index {} out of range (max {})", raw, self.states.len());
                &self.states[0]
            }
        }
    }

    /// Entry for a known state
    pub fn info(&self, state: CreatureState) -> &StateInfo {
        self.lookup(state as u16)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateInfo> {
        self.states.iter()
    }
}

static REGISTRY: OnceLock<StateRegistry> = OnceLock::new();

/// The process-wide state table
pub fn state_registry() -> &'static StateRegistry {
    REGISTRY.get_or_init(StateRegistry::standard)
}
