//! Creatures - the simulated entities owned by the world arena

pub mod instances;
pub mod stats;

pub use instances::{InstanceKind, InstanceSet, InstanceTimer, SpellEffects};
pub use stats::CreatureStats;

use serde::{Deserialize, Serialize};

use crate::combat::state::CombatData;
use crate::core::config::CombatConfig;
use crate::core::types::{Coord, CreatureIdx, ModelId, PlayerId, StructureIdx, Turn};
use crate::state::{CreatureState, StateSlot};

/// Per-state working counters, reset on every state change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkCounters {
    pub turns_at_job: u32,
    pub stopped_for_hand_turns: u32,
    pub target_room: Option<u16>,
}

/// What an instance is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceTarget {
    /// Self-buffs
    Caster,
    Creature(CreatureIdx),
    Structure(StructureIdx),
}

/// Instance currently being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveInstance {
    pub kind: InstanceKind,
    pub target: InstanceTarget,
    pub started: Turn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creature {
    pub index: CreatureIdx,
    pub model: ModelId,
    pub owner: PlayerId,
    pub pos: Coord,
    pub health: i64,
    pub max_health: i64,
    pub exp_level: u8,
    pub max_speed: i32,
    pub collision_size: i32,
    pub creation_turn: Turn,
    pub state: StateSlot,
    /// State put aside while a drop or knock-out interrupts the creature
    pub interrupted: Option<StateSlot>,
    /// Destination of the move wrapper state
    pub move_target: Option<Coord>,
    pub instance: Option<ActiveInstance>,
    pub instances: InstanceSet,
    pub effects: SpellEffects,
    /// Turn on which each timed effect wears off
    #[serde(default)]
    pub effect_expiry: Vec<(SpellEffects, Turn)>,
    /// Possessed by its keeper
    pub controlled: bool,
    /// Still registered as a member of a room's worker list
    pub in_room_list: bool,
    /// Dragging something that must be dropped on cleanup
    pub drag_cleanup_pending: bool,
    /// Attacks anyone, including its own side
    pub mad_killing: bool,
    pub counters: WorkCounters,
    pub lair: Option<Coord>,
    /// Turn the keeper last dropped this creature
    pub last_dropped_turn: Option<Turn>,
    pub combat: CombatData,
}

impl Creature {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: CreatureIdx,
        model: ModelId,
        owner: PlayerId,
        pos: Coord,
        stats: &CreatureStats,
        exp_level: u8,
        turn: Turn,
        config: &CombatConfig,
    ) -> Self {
        let max_health = stats.max_health_at(exp_level, config);
        Self {
            index,
            model,
            owner,
            pos,
            health: max_health,
            max_health,
            exp_level,
            max_speed: stats.base_speed,
            collision_size: stats.collision_size,
            creation_turn: turn,
            state: StateSlot::default(),
            interrupted: None,
            move_target: None,
            instance: None,
            instances: InstanceSet::from_kinds(&stats.instances),
            effects: SpellEffects::empty(),
            effect_expiry: Vec::new(),
            controlled: false,
            in_room_list: false,
            drag_cleanup_pending: false,
            mad_killing: false,
            counters: WorkCounters::default(),
            lair: None,
            last_dropped_turn: None,
            combat: CombatData::default(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn active_state(&self) -> CreatureState {
        self.state.active
    }

    pub fn continue_state(&self) -> CreatureState {
        self.state.continuation
    }

    pub fn is_invisible(&self) -> bool {
        self.effects.contains(SpellEffects::INVISIBILITY)
    }

    pub fn has_ranged_weapon(&self) -> bool {
        self.instances.has_ranged_attack()
    }

    pub fn has_melee_weapon(&self) -> bool {
        self.instances.has_melee_attack()
    }

    /// Movement speed after speed and slow effects
    pub fn speed(&self) -> i32 {
        let mut speed = self.max_speed;
        if self.effects.contains(SpellEffects::SPEED) {
            speed *= 2;
        }
        if self.effects.contains(SpellEffects::SLOWED) {
            speed /= 2;
        }
        if self.effects.contains(SpellEffects::FROZEN) {
            speed = 0;
        }
        speed
    }

    /// Applies an effect until the given turn, extending a running one
    pub fn apply_effect(&mut self, effect: SpellEffects, until: Turn) {
        self.effects.insert(effect);
        match self.effect_expiry.iter_mut().find(|(e, _)| *e == effect) {
            Some((_, end)) => *end = (*end).max(until),
            None => self.effect_expiry.push((effect, until)),
        }
    }

    pub fn remove_effect(&mut self, effect: SpellEffects) {
        self.effects.remove(effect);
        self.effect_expiry.retain(|(e, _)| *e != effect);
    }

    /// Drops the effects that ran out by `turn`
    pub fn expire_effects(&mut self, turn: Turn) {
        let effects = &mut self.effects;
        self.effect_expiry.retain(|&(effect, until)| {
            if until <= turn {
                effects.remove(effect);
                false
            } else {
                true
            }
        });
    }

    pub fn is_busy(&self) -> bool {
        self.instance.is_some()
    }

    pub fn requires_healing(&self) -> bool {
        self.health < self.max_health / crate::combat::constants::HEAL_HEALTH_DIVISOR
    }

    /// Still within `delay` turns of being dropped by its keeper
    pub fn recently_dropped(&self, turn: Turn, delay: u64) -> bool {
        self.last_dropped_turn.is_some_and(|dropped| dropped + delay > turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creature_starts_unused_and_healthy() {
        let stats = CreatureStats::default();
        let config = CombatConfig::default();
        let creature = Creature::new(
            CreatureIdx(1),
            ModelId(0),
            PlayerId(0),
            Coord::new(0, 0),
            &stats,
            1,
            0,
            &config,
        );
        assert_eq!(creature.active_state(), CreatureState::Unused);
        assert_eq!(creature.health, creature.max_health);
        assert_eq!(creature.max_health, 405);
        assert!(creature.has_melee_weapon());
        assert!(!creature.has_ranged_weapon());
        assert!(!creature.combat.in_combat());
    }

    #[test]
    fn test_timed_effects_wear_off() {
        let stats = CreatureStats::default();
        let config = CombatConfig::default();
        let mut creature = Creature::new(
            CreatureIdx(1),
            ModelId(0),
            PlayerId(0),
            Coord::new(0, 0),
            &stats,
            0,
            0,
            &config,
        );
        creature.apply_effect(SpellEffects::SLOWED, 10);
        creature.apply_effect(SpellEffects::SLOWED, 20);
        creature.apply_effect(SpellEffects::ARMOUR, 15);
        assert_eq!(creature.speed(), 24);
        creature.expire_effects(15);
        assert!(!creature.effects.contains(SpellEffects::ARMOUR));
        assert!(creature.effects.contains(SpellEffects::SLOWED));
        creature.expire_effects(20);
        assert_eq!(creature.speed(), 48);
        assert!(creature.effect_expiry.is_empty());
    }

    #[test]
    fn test_drop_grace_ends_on_the_delay_turn() {
        let stats = CreatureStats::default();
        let config = CombatConfig::default();
        let mut creature = Creature::new(
            CreatureIdx(1),
            ModelId(0),
            PlayerId(0),
            Coord::new(0, 0),
            &stats,
            0,
            0,
            &config,
        );
        assert!(!creature.recently_dropped(0, 160));
        creature.last_dropped_turn = Some(100);
        assert!(creature.recently_dropped(259, 160));
        assert!(!creature.recently_dropped(260, 160));
    }
}
