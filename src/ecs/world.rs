//! World arena - owns every creature, structure, battle and player record
//!
//! Creatures live in an index arena. Index 0 is never handed out and
//! indices are not reused, so a stale reference simply resolves to nothing.

use ahash::AHashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::combat::battle::BattlePool;
use crate::core::config::CombatConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::{Coord, CreatureIdx, ModelId, PlayerId, StructureIdx, Turn, COORD_PER_SUBTILE};
use crate::creature::{Creature, CreatureStats};
use crate::ecs::players::PlayerRoster;
use crate::simulation::collaborators::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureKind {
    Door,
    Object,
}

/// A door or inert object creatures can attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub kind: StructureKind,
    pub pos: Coord,
    pub health: i64,
    pub owner: PlayerId,
    pub destroyed: bool,
}

/// Default cap on creature slots ever handed out by one world
pub const MAX_CREATURE_SLOTS: usize = u16::MAX as usize;

/// The game world containing all creatures
///
/// Creature slots are never reused: a removed creature leaves an empty slot
/// so stale indices held by battles or opponent lists resolve to nothing.
/// The arena therefore grows with every spawn until `max_creature_slots`.
pub struct World {
    pub turn: Turn,
    creatures: Vec<Option<Creature>>,
    /// Spawning fails once this many slots (index 0 included) exist
    pub max_creature_slots: usize,
    models: AHashMap<ModelId, CreatureStats>,
    pub battles: BattlePool,
    pub players: PlayerRoster,
    structures: Vec<Structure>,
    pub config: CombatConfig,
    pub rng: ChaCha8Rng,
    notifications: Vec<Notification>,
}

impl World {
    pub fn new(config: CombatConfig, seed: u64) -> Self {
        Self {
            turn: 0,
            // Slot 0 stays empty so no live creature ever has index 0
            creatures: vec![None],
            max_creature_slots: MAX_CREATURE_SLOTS,
            models: AHashMap::new(),
            battles: BattlePool::new(),
            players: PlayerRoster::new(),
            structures: Vec::new(),
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            notifications: Vec::new(),
        }
    }

    pub fn register_model(&mut self, model: ModelId, stats: CreatureStats) {
        self.models.insert(model, stats);
    }

    pub fn model_stats(&self, model: ModelId) -> Option<&CreatureStats> {
        self.models.get(&model)
    }

    /// Stats of the creature's species
    pub fn stats_of(&self, idx: CreatureIdx) -> Option<&CreatureStats> {
        self.creature(idx).and_then(|c| self.models.get(&c.model))
    }

    /// Adds a creature in the `Unused` state; the caller picks its start state
    pub fn spawn_creature(
        &mut self,
        model: ModelId,
        owner: PlayerId,
        pos: Coord,
        exp_level: u8,
    ) -> Result<CreatureIdx> {
        let stats = self
            .models
            .get(&model)
            .ok_or_else(|| SimError::Config(format!("Unknown creature model {}", model.0)))?;
        if self.creatures.len() >= self.max_creature_slots {
            tracing::warn!("No creature slot left for {}", stats.name);
            return Err(SimError::CreatureSlotsExhausted(self.max_creature_slots));
        }
        let idx = CreatureIdx(self.creatures.len() as u32);
        let creature = Creature::new(idx, model, owner, pos, stats, exp_level, self.turn, &self.config);
        self.creatures.push(Some(creature));
        tracing::debug!("Spawned {} ({}) for {} at {:?}", idx, stats.name, owner, pos);
        Ok(idx)
    }

    pub fn creature(&self, idx: CreatureIdx) -> Option<&Creature> {
        self.creatures.get(idx.as_usize()).and_then(|slot| slot.as_ref())
    }

    pub fn creature_mut(&mut self, idx: CreatureIdx) -> Option<&mut Creature> {
        self.creatures.get_mut(idx.as_usize()).and_then(|slot| slot.as_mut())
    }

    pub fn exists(&self, idx: CreatureIdx) -> bool {
        self.creature(idx).is_some()
    }

    /// Upper bound on the length of any creature list walk
    pub fn max_index(&self) -> usize {
        self.creatures.len()
    }

    /// Indices of every live creature in ascending order
    pub fn creature_indices(&self) -> Vec<CreatureIdx> {
        self.creatures
            .iter()
            .filter_map(|slot| slot.as_ref().map(|c| c.index))
            .collect()
    }

    pub fn creatures(&self) -> impl Iterator<Item = &Creature> {
        self.creatures.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn creature_count(&self) -> usize {
        self.creatures().count()
    }

    /// Drops the creature from the arena; combat links must be cleared first
    pub fn remove_creature(&mut self, idx: CreatureIdx) -> Option<Creature> {
        if idx.0 == 0 {
            return None;
        }
        self.creatures.get_mut(idx.as_usize()).and_then(|slot| slot.take())
    }

    /// Creatures of `owner` (allies included) within a square of the given radius
    pub fn count_allies_near(&self, pos: Coord, radius_subtiles: i32, owner: PlayerId) -> u32 {
        let radius = radius_subtiles * COORD_PER_SUBTILE;
        self.creatures()
            .filter(|c| c.is_alive())
            .filter(|c| c.owner == owner || self.players.are_mutual_allies(c.owner, owner))
            .filter(|c| c.pos.box_distance(&pos) <= radius)
            .count() as u32
    }

    pub fn players_are_enemies(&self, a: PlayerId, b: PlayerId) -> bool {
        self.players.are_enemies(a, b)
    }

    pub fn add_structure(&mut self, kind: StructureKind, pos: Coord, health: i64, owner: PlayerId) -> StructureIdx {
        self.structures.push(Structure {
            kind,
            pos,
            health,
            owner,
            destroyed: false,
        });
        StructureIdx(self.structures.len() as u32 - 1)
    }

    pub fn structure(&self, idx: StructureIdx) -> Option<&Structure> {
        self.structures.get(idx.0 as usize)
    }

    pub fn structure_mut(&mut self, idx: StructureIdx) -> Option<&mut Structure> {
        self.structures.get_mut(idx.0 as usize)
    }

    /// Queues a notification for the presentation layer
    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn tick(&mut self) {
        self.turn += 1;
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(CombatConfig::default(), 0)
    }
}
