//! State identifiers, state types and the two-level state slot

use serde::{Deserialize, Serialize};

/// Identifier of a creature activity
///
/// `Unused` is the sentinel at registry index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[repr(u16)]
pub enum CreatureState {
    #[default]
    Unused = 0,
    DoingNothing,
    GoodDoingNothing,
    Dormant,
    ManualControl,
    /// Move wrapper; the real activity is the continuation
    MoveToPosition,
    Training,
    Researching,
    Manufacturing,
    Scavenging,
    GoingHomeToSleep,
    Sleep,
    Eat,
    TakeSalary,
    PersonSulking,
    LeavesOrDies,
    LeavesBecauseOwnerLost,
    Timebomb,
    PretendChickenSetupMove,
    PretendChickenMove,
    InCombat,
    CombatFlee,
    DoorCombat,
    ObjectCombat,
    ObjectSnipe,
    Unconscious,
    BeingDropped,
    ArriveAtCallToArms,
    FollowLeader,
    ArrivedAtSabotageRoom,
}

impl CreatureState {
    /// Every state in registry order
    pub const ALL: [CreatureState; 30] = [
        CreatureState::Unused,
        CreatureState::DoingNothing,
        CreatureState::GoodDoingNothing,
        CreatureState::Dormant,
        CreatureState::ManualControl,
        CreatureState::MoveToPosition,
        CreatureState::Training,
        CreatureState::Researching,
        CreatureState::Manufacturing,
        CreatureState::Scavenging,
        CreatureState::GoingHomeToSleep,
        CreatureState::Sleep,
        CreatureState::Eat,
        CreatureState::TakeSalary,
        CreatureState::PersonSulking,
        CreatureState::LeavesOrDies,
        CreatureState::LeavesBecauseOwnerLost,
        CreatureState::Timebomb,
        CreatureState::PretendChickenSetupMove,
        CreatureState::PretendChickenMove,
        CreatureState::InCombat,
        CreatureState::CombatFlee,
        CreatureState::DoorCombat,
        CreatureState::ObjectCombat,
        CreatureState::ObjectSnipe,
        CreatureState::Unconscious,
        CreatureState::BeingDropped,
        CreatureState::ArriveAtCallToArms,
        CreatureState::FollowLeader,
        CreatureState::ArrivedAtSabotageRoom,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// State for a raw registry index
    pub fn from_raw(raw: u16) -> Option<CreatureState> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn is_unused(self) -> bool {
        self == CreatureState::Unused
    }
}

/// Coarse category of a state, used for transition legality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum StateType {
    #[default]
    Idle = 0,
    Work = 1,
    OwnNeeds = 2,
    Sleep = 3,
    Feed = 4,
    FightCreature = 5,
    Move = 6,
    GetsSalary = 7,
    Escape = 8,
    Unconscious = 9,
    AngerJob = 10,
    FightDoor = 11,
    FightObject = 12,
    CalledToArms = 13,
    Follow = 14,
}

/// What the GUI shows a creature as doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuiJob {
    Idle,
    Working,
    Fighting,
}

impl StateType {
    pub fn gui_job(self) -> GuiJob {
        match self {
            StateType::Work
            | StateType::Escape
            | StateType::CalledToArms
            | StateType::Follow => GuiJob::Working,
            StateType::FightCreature | StateType::FightDoor | StateType::FightObject => {
                GuiJob::Fighting
            }
            _ => GuiJob::Idle,
        }
    }
}

/// Two-level state: outer (possibly the move wrapper) and the logical continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateSlot {
    pub active: CreatureState,
    /// State to resume after the move wrapper arrives; `Unused` otherwise
    pub continuation: CreatureState,
}

impl StateSlot {
    pub fn new(active: CreatureState) -> Self {
        Self {
            active,
            continuation: CreatureState::Unused,
        }
    }

    /// The logical activity, looking through the move wrapper
    pub fn logical(&self, registry: &super::StateRegistry) -> CreatureState {
        if registry.info(self.active).state_type == StateType::Move {
            self.continuation
        } else {
            self.active
        }
    }

    pub fn is_moving(&self, registry: &super::StateRegistry) -> bool {
        registry.info(self.active).state_type == StateType::Move
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_matches_discriminants() {
        for (i, state) in CreatureState::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
        }
    }

    #[test]
    fn test_from_raw_bounds() {
        assert_eq!(CreatureState::from_raw(0), Some(CreatureState::Unused));
        assert_eq!(CreatureState::from_raw(20), Some(CreatureState::InCombat));
        assert_eq!(CreatureState::from_raw(CreatureState::ALL.len() as u16), None);
        assert_eq!(CreatureState::from_raw(u16::MAX), None);
    }

    #[test]
    fn test_gui_job_mapping() {
        assert_eq!(StateType::Idle.gui_job(), GuiJob::Idle);
        assert_eq!(StateType::Work.gui_job(), GuiJob::Working);
        assert_eq!(StateType::Sleep.gui_job(), GuiJob::Idle);
        assert_eq!(StateType::FightCreature.gui_job(), GuiJob::Fighting);
        assert_eq!(StateType::Escape.gui_job(), GuiJob::Working);
        assert_eq!(StateType::FightObject.gui_job(), GuiJob::Fighting);
        assert_eq!(StateType::Follow.gui_job(), GuiJob::Working);
    }
}
