//! Opponent registry
//!
//! Each creature keeps fixed-capacity slot arrays naming the creatures that are
//! currently attacking it, one for melee attackers and one for ranged ones.

use serde::{Deserialize, Serialize};

use crate::combat::constants::{MELEE_OPPONENTS_LIMIT, RANGED_OPPONENTS_LIMIT};
use crate::core::types::CreatureIdx;

/// Fixed array of attacker slots with a live count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "[Option<CreatureIdx>; N]: Serialize",
    deserialize = "[Option<CreatureIdx>; N]: Deserialize<'de>"
))]
pub struct OpponentSlots<const N: usize> {
    slots: [Option<CreatureIdx>; N],
    count: u8,
}

pub type MeleeOpponents = OpponentSlots<MELEE_OPPONENTS_LIMIT>;
pub type RangedOpponents = OpponentSlots<RANGED_OPPONENTS_LIMIT>;

impl<const N: usize> Default for OpponentSlots<N> {
    fn default() -> Self {
        Self {
            slots: [None; N],
            count: 0,
        }
    }
}

impl<const N: usize> OpponentSlots<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn has_free_slot(&self) -> bool {
        (self.count as usize) < N
    }

    pub fn contains(&self, attacker: CreatureIdx) -> bool {
        self.slots.iter().any(|slot| *slot == Some(attacker))
    }

    /// Claim the first empty slot for `attacker`
    ///
    /// Fails if the attacker is already registered or every slot is taken.
    pub fn add(&mut self, attacker: CreatureIdx) -> bool {
        if self.contains(attacker) {
            tracing::warn!("Attacker {} already in opponent slots", attacker);
            return false;
        }
        if !self.has_free_slot() {
            return false;
        }
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(attacker);
                self.count += 1;
                true
            }
            None => {
                // Count said there was room but every slot is occupied
                tracing::error!("Opponent count {} out of sync with slots", self.count);
                self.count = N as u8;
                false
            }
        }
    }

    /// Free the slot held by `attacker`
    pub fn remove(&mut self, attacker: CreatureIdx) -> bool {
        match self.slots.iter_mut().find(|slot| **slot == Some(attacker)) {
            Some(slot) => {
                *slot = None;
                if self.count == 0 {
                    tracing::warn!("Opponent count already zero while removing {}", attacker);
                } else {
                    self.count -= 1;
                }
                true
            }
            None => false,
        }
    }

    /// Occupied slots in slot order
    pub fn iter(&self) -> impl Iterator<Item = CreatureIdx> + '_ {
        self.slots.iter().filter_map(|slot| *slot)
    }

    /// Snapshot of the occupied slots, for loops that mutate the owner
    pub fn to_vec(&self) -> Vec<CreatureIdx> {
        self.iter().collect()
    }

    pub fn clear(&mut self) {
        self.slots = [None; N];
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_claims_first_empty_slot() {
        let mut slots = MeleeOpponents::new();
        assert!(slots.add(CreatureIdx(3)));
        assert!(slots.add(CreatureIdx(7)));
        assert_eq!(slots.count(), 2);
        assert!(slots.remove(CreatureIdx(3)));
        assert!(slots.add(CreatureIdx(9)));
        // Freed slot 0 is reused before slot 2
        assert_eq!(slots.to_vec(), vec![CreatureIdx(9), CreatureIdx(7)]);
    }

    #[test]
    fn test_duplicate_attacker_rejected() {
        let mut slots = RangedOpponents::new();
        assert!(slots.add(CreatureIdx(1)));
        assert!(!slots.add(CreatureIdx(1)));
        assert_eq!(slots.count(), 1);
    }

    #[test]
    fn test_full_slots_reject() {
        let mut slots = MeleeOpponents::new();
        for i in 1..=MELEE_OPPONENTS_LIMIT as u32 {
            assert!(slots.add(CreatureIdx(i)));
        }
        assert!(!slots.has_free_slot());
        assert!(!slots.add(CreatureIdx(99)));
        assert_eq!(slots.count(), MELEE_OPPONENTS_LIMIT);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut slots = MeleeOpponents::new();
        slots.add(CreatureIdx(2));
        assert!(!slots.remove(CreatureIdx(5)));
        assert_eq!(slots.count(), 1);
    }
}
