//! Per-species creature statistics

use serde::{Deserialize, Serialize};

use crate::combat::state::AttackType;
use crate::core::config::CombatConfig;
use crate::creature::instances::InstanceKind;
use crate::state::CreatureState;

/// Static statistics shared by every creature of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatureStats {
    pub name: String,
    /// Base health at level 0
    pub health: i64,
    /// Base melee strength at level 0
    pub strength: i64,
    /// Hearing range in subtiles
    pub hearing: i32,
    /// Health percentage at which the creature gets scared
    ///
    /// 101 or more means the creature fears every other species.
    pub fear_wounded: u32,
    /// Strength ratio (percent) of an enemy that scares the creature
    pub fear_stronger: u32,
    /// Divides `fear_wounded` and multiplies `fear_stronger` when the owner
    /// does not encourage fleeing; 0 disables the adjustment
    pub fear_noflee_factor: u32,
    pub attack_preference: AttackType,
    pub base_speed: i32,
    /// Footprint width in map coordinates
    pub collision_size: i32,
    pub can_see_invisible: bool,
    pub instances: Vec<InstanceKind>,
    /// Start state for hero-owned creatures
    pub good_start_state: CreatureState,
    /// Start state for keeper-owned creatures
    pub evil_start_state: CreatureState,
}

impl Default for CreatureStats {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            health: 300,
            strength: 30,
            hearing: 8,
            fear_wounded: 10,
            fear_stronger: 10000,
            fear_noflee_factor: 0,
            attack_preference: AttackType::Melee,
            base_speed: 48,
            collision_size: 128,
            can_see_invisible: false,
            instances: vec![InstanceKind::SwingWeaponFist],
            good_start_state: CreatureState::GoodDoingNothing,
            evil_start_state: CreatureState::DoingNothing,
        }
    }
}

impl CreatureStats {
    /// Max health at the given experience level
    pub fn max_health_at(&self, level: u8, config: &CombatConfig) -> i64 {
        self.health + self.health * config.health_increase_per_level_percent * level as i64 / 100
    }

    /// Melee damage at the given experience level
    pub fn melee_damage_at(&self, level: u8, config: &CombatConfig) -> i64 {
        self.strength + self.strength * config.damage_increase_per_level_percent * level as i64 / 100
    }

    /// Hearing range in map coordinates
    pub fn hearing_distance(&self) -> i32 {
        self.hearing * crate::core::types::COORD_PER_SUBTILE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_projection() {
        let stats = CreatureStats {
            health: 1000,
            strength: 100,
            ..Default::default()
        };
        let config = CombatConfig::default();
        assert_eq!(stats.max_health_at(0, &config), 1000);
        assert_eq!(stats.max_health_at(2, &config), 1700);
        assert_eq!(stats.melee_damage_at(4, &config), 240);
    }
}
