//! Fear evaluation
//!
//! A creature is scared when it is badly wounded, when its species fears
//! every other species, or when the enemy looks much stronger than the
//! creature and the allies standing near that enemy together.

use crate::core::types::CreatureIdx;
use crate::creature::SpellEffects;
use crate::ecs::world::World;

/// Strength estimate used to compare two creatures
///
/// Melee damage times the average of max health and current health.
fn strength_estimate(damage: i64, max_health: i64, health: i64) -> i64 {
    damage * (max_health + health) / 2
}

/// Fear check that ignores the fight-to-the-death marker
pub fn creature_is_actually_scared(world: &World, idx: CreatureIdx, enemy: CreatureIdx) -> bool {
    let (Some(creature), Some(enm)) = (world.creature(idx), world.creature(enemy)) else {
        return false;
    };
    let (Some(stats), Some(enm_stats)) = (world.model_stats(creature.model), world.model_stats(enm.model)) else {
        return false;
    };
    let config = &world.config;

    // Unowned creatures have no enemies to be scared of
    if creature.owner.is_neutral() {
        return false;
    }
    if enm.effects.contains(SpellEffects::TIMEBOMB) && !creature.has_ranged_weapon() {
        return true;
    }

    if stats.fear_wounded >= config.fear_wounded_saturation {
        // Feared species are ignored while only kin are attacking
        if creature.combat.has_attackers() {
            return creature.combat.attackers().into_iter().any(|a| {
                world
                    .creature(a)
                    .is_some_and(|attacker| attacker.model != creature.model)
            });
        }
        return enm.model != creature.model;
    }

    let noflee = stats.fear_noflee_factor as i64;
    let tends_to_flee = world.players.tends_to_flee(creature.owner);
    let fear = if tends_to_flee || noflee == 0 {
        stats.fear_wounded as i64
    } else {
        stats.fear_wounded as i64 / noflee
    };
    if creature.health <= fear * creature.max_health / 100 {
        tracing::trace!(
            "{} is scared due to low health ({}/{})",
            idx,
            creature.health,
            creature.max_health
        );
        return true;
    }

    if creature.recently_dropped(world.turn, config.fight_fear_delay) {
        return false;
    }
    if stats.fear_stronger == 0 {
        return false;
    }
    let fear = if tends_to_flee || noflee == 0 {
        stats.fear_stronger as i64
    } else {
        stats.fear_stronger as i64 * noflee
    };

    let enm_max_health = enm.max_health.min(config.enemy_max_health_cap);
    let enm_strength = strength_estimate(
        enm_stats.melee_damage_at(enm.exp_level, config),
        enm_max_health,
        enm.health,
    );
    let mut own_strength = strength_estimate(
        stats.melee_damage_at(creature.exp_level, config),
        creature.max_health,
        creature.health,
    );
    if enm_strength >= fear * own_strength / 100 {
        let support = world.count_allies_near(enm.pos, config.fear_support_radius_subtiles, creature.owner);
        own_strength *= support as i64;
        if enm_strength >= fear * own_strength / 100 {
            tracing::trace!(
                "{} is scared due to enemy {} strength ({} vs {})",
                idx,
                enemy,
                own_strength,
                enm_strength
            );
            return true;
        }
    }
    false
}

/// Is the creature scared of the enemy? Never while fighting to the death.
pub fn creature_scared(world: &World, idx: CreatureIdx, enemy: CreatureIdx) -> bool {
    match world.creature(idx) {
        Some(c) if c.combat.fight_til_death => false,
        Some(_) => creature_is_actually_scared(world, idx, enemy),
        None => false,
    }
}

/// Is the creature already close enough to where it wants to flee?
pub fn creature_in_flee_zone(world: &World, idx: CreatureIdx) -> bool {
    world
        .creature(idx)
        .is_some_and(|c| c.pos.box_distance(&c.combat.flee_pos) < world.config.flee_zone_radius)
}

/// Scared and not yet safe
pub fn creature_too_scared_for_combat(world: &World, idx: CreatureIdx, enemy: CreatureIdx) -> bool {
    creature_scared(world, idx, enemy) && !creature_in_flee_zone(world, idx)
}
