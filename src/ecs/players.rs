//! Players - owners of creatures, alliances and the fights counter

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::combat::constants::VISIBLE_BATTLES;
use crate::core::types::{BattleId, Coord, PlayerId, Turn};
use crate::simulation::collaborators::Economy;

/// Per-player data the creature core reads or updates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerState {
    /// Creatures of this player currently engaged in a fight
    pub fights_num: u32,
    /// The keeper lost the level; its creatures leave
    pub lost_level: bool,
    /// Owner encourages fleeing; fear thresholds are not softened
    pub tends_to_flee: bool,
    pub heart_pos: Option<Coord>,
    allies: Vec<PlayerId>,
    /// Last turn each battle was reported to this player
    pub battle_events: AHashMap<BattleId, Turn>,
    pub last_combat_location: Option<Coord>,
    /// Battles in the player's overview panel
    pub visible_battles: [Option<BattleId>; VISIBLE_BATTLES],
}

impl PlayerState {
    pub fn allies(&self) -> &[PlayerId] {
        &self.allies
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerRoster {
    players: AHashMap<PlayerId, PlayerState>,
    /// Where fleeing heroes run to
    pub hero_gate: Option<Coord>,
}

impl PlayerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a player, returning its state for further setup
    pub fn add_player(&mut self, id: PlayerId) -> &mut PlayerState {
        self.players.entry(id).or_default()
    }

    pub fn exists(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        self.players.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.players.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Declares a mutual alliance
    pub fn ally(&mut self, a: PlayerId, b: PlayerId) {
        if a == b {
            return;
        }
        let pa = self.add_player(a);
        if !pa.allies.contains(&b) {
            pa.allies.push(b);
        }
        let pb = self.add_player(b);
        if !pb.allies.contains(&a) {
            pb.allies.push(a);
        }
    }

    pub fn are_mutual_allies(&self, a: PlayerId, b: PlayerId) -> bool {
        if a == b {
            return true;
        }
        if a.is_neutral() || b.is_neutral() {
            return false;
        }
        match (self.players.get(&a), self.players.get(&b)) {
            (Some(pa), Some(pb)) => pa.allies.contains(&b) && pb.allies.contains(&a),
            _ => false,
        }
    }

    /// Creatures of these owners leave each other alone unless provoked
    pub fn tolerate_each_other(&self, a: PlayerId, b: PlayerId) -> bool {
        a == b || a.is_neutral() || b.is_neutral() || self.are_mutual_allies(a, b)
    }

    pub fn are_enemies(&self, a: PlayerId, b: PlayerId) -> bool {
        if a == b || a.is_neutral() || b.is_neutral() {
            return false;
        }
        // Missing players are harmless, except heroes who never register as keepers
        if !self.exists(a) && !a.is_heroes() {
            return false;
        }
        if !self.exists(b) && !b.is_heroes() {
            return false;
        }
        match self.players.get(&a) {
            Some(pa) => !pa.allies.contains(&b),
            None => true,
        }
    }

    pub fn tends_to_flee(&self, id: PlayerId) -> bool {
        self.players.get(&id).map(|p| p.tends_to_flee).unwrap_or(false)
    }
}

impl Economy for PlayerRoster {
    fn increment_fights(&mut self, player: PlayerId) {
        self.add_player(player).fights_num += 1;
    }

    fn decrement_fights(&mut self, player: PlayerId) {
        match self.players.get_mut(&player) {
            Some(p) if p.fights_num > 0 => p.fights_num -= 1,
            Some(_) => tracing::warn!("Fights counter of {} already zero", player),
            None => tracing::warn!("Decrementing fights of unknown {}", player),
        }
    }

    fn fights(&self, player: PlayerId) -> u32 {
        self.players.get(&player).map(|p| p.fights_num).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fights_counter_clamps_at_zero() {
        let mut roster = PlayerRoster::new();
        roster.add_player(PlayerId(0));
        roster.increment_fights(PlayerId(0));
        roster.decrement_fights(PlayerId(0));
        roster.decrement_fights(PlayerId(0));
        assert_eq!(roster.fights(PlayerId(0)), 0);
    }

    #[test]
    fn test_neutral_is_nobody_enemy() {
        let mut roster = PlayerRoster::new();
        roster.add_player(PlayerId(0));
        assert!(!roster.are_enemies(PlayerId(0), PlayerId::NEUTRAL));
        assert!(roster.tolerate_each_other(PlayerId(0), PlayerId::NEUTRAL));
        assert!(!roster.are_mutual_allies(PlayerId(0), PlayerId::NEUTRAL));
    }

    #[test]
    fn test_heroes_are_enemies_without_registration() {
        let mut roster = PlayerRoster::new();
        roster.add_player(PlayerId(0));
        assert!(roster.are_enemies(PlayerId(0), PlayerId::HEROES));
        assert!(!roster.are_enemies(PlayerId(0), PlayerId(2)));
    }

    #[test]
    fn test_alliance_is_mutual() {
        let mut roster = PlayerRoster::new();
        roster.ally(PlayerId(0), PlayerId(1));
        assert!(roster.are_mutual_allies(PlayerId(1), PlayerId(0)));
        assert!(!roster.are_enemies(PlayerId(0), PlayerId(1)));
        assert!(roster.tolerate_each_other(PlayerId(0), PlayerId(1)));
    }
}
