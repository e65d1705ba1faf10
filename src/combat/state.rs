//! Combat bookkeeping carried by every creature
//!
//! Every creature has combat data (mandatory but mostly empty outside fights).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::combat::opponents::{MeleeOpponents, RangedOpponents};
use crate::core::types::{BattleId, Coord, CreatureIdx, StructureIdx, Turn};
use crate::simulation::collaborators::SightPath;

bitflags! {
    /// Engagement flags of a fighter
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CombatFlags: u8 {
        /// Holds a melee slot on its enemy
        const MELEE = 0x01;
        /// Holds a ranged slot on its enemy
        const RANGED = 0x02;
        /// Linked into a battle without a slot
        const WAITING = 0x04;
        /// Fighting an inert object
        const OBJECT_FIGHT = 0x08;
        /// Fighting a door
        const DOOR_FIGHT = 0x10;
        /// Any engagement with another creature
        const ENGAGED = Self::MELEE.bits() | Self::RANGED.bits() | Self::WAITING.bits();
        /// Holding an opponent slot
        const SLOTTED = Self::MELEE.bits() | Self::RANGED.bits();
    }
}

/// Combat sub-state inside the in-combat activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CombatState {
    #[default]
    None,
    /// Linked into the battle, waiting for a slot
    Waiting,
    Ranged,
    Melee,
}

/// Kind of attack two creatures can have with each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AttackType {
    #[default]
    Unset,
    Melee,
    Ranged,
}

impl AttackType {
    pub fn is_set(self) -> bool {
        self != AttackType::Unset
    }
}

/// Cached sight-path result, valid for one turn and one enemy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SightCache {
    pub turn: Turn,
    pub enemy: CreatureIdx,
    pub sight: SightPath,
}

/// Per-creature combat data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombatData {
    pub flags: CombatFlags,
    pub state: CombatState,
    /// Attack type chosen for the current fight
    pub attack_type: AttackType,
    /// Current opponent creature
    pub battle_enemy: Option<CreatureIdx>,
    /// Current door or object target
    pub structure_target: Option<StructureIdx>,
    pub battle_id: Option<BattleId>,
    /// Next (newer) participant in the battle list
    pub battle_next: Option<CreatureIdx>,
    /// Previous (older) participant in the battle list
    pub battle_prev: Option<CreatureIdx>,
    /// Creatures attacking this one in melee
    pub opponents_melee: MeleeOpponents,
    /// Creatures attacking this one from range
    pub opponents_ranged: RangedOpponents,
    pub fight_til_death: bool,
    pub sight_cache: Option<SightCache>,
    pub flee_pos: Coord,
    /// Turn the current flee started or was last refreshed
    pub flee_start_turn: Option<Turn>,
}

impl CombatData {
    /// Is this creature engaged in any fight?
    pub fn in_combat(&self) -> bool {
        !self.flags.is_empty()
    }

    /// Holds an opponent slot, as opposed to merely waiting for one
    pub fn is_fighting(&self) -> bool {
        self.flags.intersects(CombatFlags::SLOTTED)
    }

    pub fn has_attackers(&self) -> bool {
        !self.opponents_melee.is_empty() || !self.opponents_ranged.is_empty()
    }

    /// Is `attacker` registered in either slot array?
    pub fn is_attacked_by(&self, attacker: CreatureIdx) -> bool {
        self.opponents_melee.contains(attacker) || self.opponents_ranged.contains(attacker)
    }

    /// All attackers, melee first
    pub fn attackers(&self) -> Vec<CreatureIdx> {
        self.opponents_melee
            .iter()
            .chain(self.opponents_ranged.iter())
            .collect()
    }

    /// Forget the current enemy (flags, target and to-the-death marker)
    pub fn clear_engagement(&mut self, flag: CombatFlags) {
        self.flags.remove(flag);
        self.battle_enemy = None;
        self.fight_til_death = false;
        self.sight_cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_insert_remove() {
        let mut flags = CombatFlags::empty();
        assert!(flags.is_empty());
        flags.insert(CombatFlags::MELEE);
        flags.insert(CombatFlags::DOOR_FIGHT);
        assert!(flags.contains(CombatFlags::MELEE));
        assert!(flags.intersects(CombatFlags::DOOR_FIGHT | CombatFlags::OBJECT_FIGHT));
        flags.remove(CombatFlags::MELEE);
        assert!(!flags.contains(CombatFlags::MELEE));
        assert_eq!(flags.bits(), 0x10);
    }

    #[test]
    fn test_composite_flags() {
        assert!(CombatFlags::ENGAGED.contains(CombatFlags::SLOTTED | CombatFlags::WAITING));
        assert!(!CombatFlags::SLOTTED.contains(CombatFlags::WAITING));
        assert!(!CombatFlags::ENGAGED.intersects(CombatFlags::DOOR_FIGHT | CombatFlags::OBJECT_FIGHT));

        let flags = CombatFlags::RANGED | CombatFlags::OBJECT_FIGHT;
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(serde_json::from_str::<CombatFlags>(&json).unwrap(), flags);
    }

    #[test]
    fn test_clear_engagement_keeps_other_flags() {
        let mut data = CombatData::default();
        data.flags = CombatFlags::WAITING | CombatFlags::DOOR_FIGHT;
        data.battle_enemy = Some(CreatureIdx(4));
        data.fight_til_death = true;
        data.clear_engagement(CombatFlags::WAITING);
        assert_eq!(data.flags, CombatFlags::DOOR_FIGHT);
        assert!(data.battle_enemy.is_none());
        assert!(!data.fight_til_death);
    }

    #[test]
    fn test_attackers_lists_melee_first() {
        let mut data = CombatData::default();
        data.opponents_ranged.add(CreatureIdx(2));
        data.opponents_melee.add(CreatureIdx(9));
        assert_eq!(data.attackers(), vec![CreatureIdx(9), CreatureIdx(2)]);
        assert!(data.is_attacked_by(CreatureIdx(2)));
    }
}
