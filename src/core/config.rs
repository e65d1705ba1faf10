//! Combat configuration with documented tuning values
//!
//! All balance numbers used by the combat resolver, the fear evaluator and
//! the flee logic are collected here. Structural limits (opponent slot counts,
//! battle pool size) live in `combat::constants` because they size arrays.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::{Result, SimError};

/// Tunable values for the combat and fear systems
///
/// Distances are in map coordinates (256 per subtile), durations in game turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    // === SCORING ===
    /// Extra score an alternative fight needs before a creature abandons its
    /// current partner
    ///
    /// Equal to one free opponent slot, so a switch only happens when the
    /// alternative frees up strictly more than one slot worth of value.
    pub hysteresis_margin: i64,

    /// Score per free opponent slot on the enemy
    pub slot_score_weight: i64,

    /// Bonus for melee engagements, added on top of the slot score
    pub melee_score_bonus: i64,

    /// Penalty applied to an attacker that is scared of the shared victim
    /// when picking who gets displaced
    pub scared_attacker_penalty: i64,

    /// Distance at which the proximity term of the score reaches zero
    pub max_score_distance: i32,

    // === TIMING ===
    /// A fighter looks for a better fight once per this many turns
    ///
    /// The check runs when `(turn + creature_index) % interval == 0`, which
    /// spreads the work across turns.
    pub battle_check_interval: u64,

    /// Mask for the periodic attack type recheck of an ongoing fight
    ///
    /// With 7 the recheck runs every 8 turns per creature.
    pub valid_combat_recheck_mask: u64,

    /// Mask for how often an idle creature scans for enemies
    ///
    /// With 7 each creature looks around every 8 turns.
    pub combat_scan_mask: u64,

    /// Turns after being dropped during which enemy strength cannot scare
    pub fight_fear_delay: u64,

    /// Total turns a fleeing creature keeps fleeing before giving up
    pub game_turns_in_flee: u64,

    /// Lower bound of the escape window (a quarter of `game_turns_in_flee`)
    pub min_escape_turns: u64,

    // === FEAR ===
    /// `fear_wounded` at or above this value makes a creature fear any other species
    pub fear_wounded_saturation: u32,

    /// Radius in subtiles in which allies support a creature against a stronger enemy
    pub fear_support_radius_subtiles: i32,

    /// Max health used for fear comparisons is capped at this value
    pub enemy_max_health_cap: i64,

    /// Percent of base health gained per experience level
    pub health_increase_per_level_percent: i64,

    /// Percent of base strength gained per experience level
    pub damage_increase_per_level_percent: i64,

    // === REACHABILITY ===
    /// Longest ground route (in subtiles) still treated as melee reachable
    pub melee_nav_max_subtiles: i32,

    /// Hop budget for the wall-hugging route check used by flying creatures
    pub wall_hug_max_hops: u32,

    // === MOVEMENT BANDS ===
    /// Waiting fighters back off when closer than this
    pub waiting_retreat_distance: i32,

    /// Waiting fighters close in when further than this
    pub waiting_approach_distance: i32,

    /// Melee fighters back off when closer than this
    pub melee_retreat_distance: i32,

    /// Melee fighters hold position up to this distance
    pub melee_reposition_distance: i32,

    /// Ranged fighters back off when closer than this
    pub ranged_retreat_distance: i32,

    /// Ranged fighters close in when the enemy is beyond this range
    pub ranged_attack_range: i32,

    // === FLEE ===
    /// A fleeing creature is safe when within this box distance of its flee position
    pub flee_zone_radius: i32,

    /// Beyond this distance from the flee position the creature runs for it
    pub distant_flee_distance: i32,

    /// Cornered creatures look for a fight within this distance
    pub near_flee_rescan_distance: i32,

    /// Turns of near fleeing before a cornered creature fights back
    pub near_flee_rescan_turns: u64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            hysteresis_margin: 258,
            slot_score_weight: 258,
            melee_score_bonus: 128,
            scared_attacker_penalty: 512,
            max_score_distance: 5376,

            battle_check_interval: 8,
            valid_combat_recheck_mask: 7,
            combat_scan_mask: 7,
            fight_fear_delay: 160,
            game_turns_in_flee: 200,
            min_escape_turns: 50,

            fear_wounded_saturation: 101,
            fear_support_radius_subtiles: 9,
            enemy_max_health_cap: 15000,
            health_increase_per_level_percent: 35,
            damage_increase_per_level_percent: 35,

            melee_nav_max_subtiles: 21,
            wall_hug_max_hops: 8,

            waiting_retreat_distance: 768,
            waiting_approach_distance: 2048,
            melee_retreat_distance: 156,
            melee_reposition_distance: 284,
            ranged_retreat_distance: 768,
            ranged_attack_range: 2048,

            flee_zone_radius: 1536,
            distant_flee_distance: 1536,
            near_flee_rescan_distance: 2304,
            near_flee_rescan_turns: 8,
        }
    }
}

impl CombatConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CombatConfig = toml::from_str(content)?;
        config.validate().map_err(SimError::Config)?;
        Ok(config)
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.battle_check_interval == 0 {
            return Err("battle_check_interval must be positive".into());
        }

        if self.max_score_distance <= 0 {
            return Err("max_score_distance must be positive".into());
        }

        if self.melee_retreat_distance >= self.melee_reposition_distance {
            return Err(format!(
                "melee_retreat_distance ({}) should be < melee_reposition_distance ({})",
                self.melee_retreat_distance, self.melee_reposition_distance
            ));
        }

        if self.waiting_retreat_distance >= self.waiting_approach_distance {
            return Err(format!(
                "waiting_retreat_distance ({}) should be < waiting_approach_distance ({})",
                self.waiting_retreat_distance, self.waiting_approach_distance
            ));
        }

        if self.hysteresis_margin < 0 || self.scared_attacker_penalty < 0 {
            return Err("Score margins must not be negative".into());
        }

        Ok(())
    }

    /// Escape window of a distant flee
    pub fn escape_turns(&self) -> u64 {
        (self.game_turns_in_flee / 4).max(self.min_escape_turns)
    }
}
