//! Combat resolver
//!
//! Decides whether two creatures can fight and how, scores candidate fights
//! and moves fighters between partners. A fighter only abandons its current
//! partner when the alternative scores more than `hysteresis_margin` above
//! the fight it already has.

use crate::combat::engage::{
    creature_has_spare_slot_for_combat, remove_attacker, set_creature_combat_state,
};
use crate::combat::fear::creature_is_actually_scared;
use crate::combat::state::{AttackType, CombatFlags, CombatState, SightCache};
use crate::core::types::{CreatureIdx, COORD_PER_SUBTILE};
use crate::ecs::world::World;
use crate::simulation::collaborators::SightPath;
use crate::simulation::Simulation;
use crate::state::controller::{get_creature_state_besides_move, set_start_state};
use crate::state::CreatureState;

/// A fight a creature could take up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatCandidate {
    pub enemy: CreatureIdx,
    pub attack_type: AttackType,
    pub score: i64,
}

/// Distance between the bodies of two creatures, never negative
pub fn get_combat_distance(world: &World, a: CreatureIdx, b: CreatureIdx) -> i32 {
    match (world.creature(a), world.creature(b)) {
        (Some(ca), Some(cb)) => {
            let reach = (ca.collision_size + cb.collision_size) / 2;
            (ca.pos.distance_2d(&cb.pos) - reach).max(0)
        }
        _ => i32::MAX,
    }
}

/// Box distance between two creatures minus their average footprint
fn get_chessboard_combat_distance(world: &World, a: CreatureIdx, b: CreatureIdx) -> i32 {
    match (world.creature(a), world.creature(b)) {
        (Some(ca), Some(cb)) => ca.pos.box_distance(&cb.pos) - (ca.collision_size + cb.collision_size) / 2,
        _ => i32::MAX,
    }
}

/// States in which a creature neither attacks nor can be attacked
fn unavailable_for_combat(state: CreatureState) -> bool {
    matches!(
        state,
        CreatureState::LeavesOrDies
            | CreatureState::LeavesBecauseOwnerLost
            | CreatureState::Unconscious
            | CreatureState::BeingDropped
    )
}

fn will_attack(world: &World, fighter: CreatureIdx, target: CreatureIdx, incl_til_death: bool) -> bool {
    let (Some(fig), Some(enm)) = (world.creature(fighter), world.creature(target)) else {
        return false;
    };
    if !fig.is_alive() || !enm.is_alive() {
        return false;
    }
    if unavailable_for_combat(get_creature_state_besides_move(fig))
        || unavailable_for_combat(get_creature_state_besides_move(enm))
    {
        return false;
    }
    let forced = incl_til_death && fig.combat.fight_til_death;
    if world.players.tolerate_each_other(fig.owner, enm.owner)
        && !fig.mad_killing
        && !enm.mad_killing
        && !forced
    {
        // Friends only keep hitting each other in a fight already under way
        if !fig.combat.in_combat() || fig.combat.battle_enemy != Some(target) {
            return false;
        }
    }
    if fighter == target {
        return false;
    }
    if enm.is_invisible() && !world.model_stats(fig.model).is_some_and(|s| s.can_see_invisible) {
        return false;
    }
    true
}

/// Would the fighter attack the target at all?
pub fn creature_will_attack_creature(world: &World, fighter: CreatureIdx, target: CreatureIdx) -> bool {
    will_attack(world, fighter, target, false)
}

/// Like `creature_will_attack_creature`, but a creature fighting to the death ignores friendship
pub fn creature_will_attack_creature_incl_til_death(
    world: &World,
    fighter: CreatureIdx,
    target: CreatureIdx,
) -> bool {
    will_attack(world, fighter, target, true)
}

/// Sight path towards the enemy, computed at most once per turn and enemy
pub fn combat_has_line_of_sight(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    enemy: CreatureIdx,
    distance: i32,
) -> SightPath {
    let turn = sim.world.turn;
    let cached = sim.world.creature(fighter).and_then(|c| c.combat.sight_cache);
    if let Some(cache) = cached {
        if cache.turn == turn && cache.enemy == enemy {
            return cache.sight;
        }
    }
    let sight = sim.nav.sight_path(&sim.world, fighter, enemy, distance);
    if let Some(c) = sim.world.creature_mut(fighter) {
        c.combat.sight_cache = Some(SightCache { turn, enemy, sight });
    }
    sight
}

/// Can the fighter walk (or fly along walls) to the enemy?
fn creature_can_move_to_combat(sim: &Simulation, fighter: CreatureIdx, enemy: CreatureIdx, move_on_ground: bool) -> bool {
    let Some(target) = sim.world.creature(enemy).map(|e| e.pos) else {
        return false;
    };
    let config = &sim.world.config;
    if move_on_ground {
        sim.nav
            .ground_distance(&sim.world, fighter, target)
            .is_some_and(|d| d < config.melee_nav_max_subtiles * COORD_PER_SUBTILE)
    } else {
        sim.nav
            .wall_hug_reachable(&sim.world, fighter, target, config.wall_hug_max_hops)
    }
}

/// Kind of attack the fighter can have with the enemy at this distance
///
/// Within hearing range a reachable enemy means melee, otherwise a ranged
/// weapon and a sight path are needed. Beyond hearing range the enemy must
/// be seen first; a reachable one is still fought in melee.
pub fn creature_can_have_combat_with_creature(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    enemy: CreatureIdx,
    distance: i32,
    move_on_ground: bool,
) -> AttackType {
    let Some((has_melee, has_ranged, hearing)) = sim.world.creature(fighter).map(|c| {
        let hearing = sim.world.model_stats(c.model).map(|s| s.hearing_distance()).unwrap_or(0);
        (c.has_melee_weapon(), c.has_ranged_weapon(), hearing)
    }) else {
        return AttackType::Unset;
    };
    if hearing >= distance {
        if has_melee && creature_can_move_to_combat(sim, fighter, enemy, move_on_ground) {
            return AttackType::Melee;
        }
        if !has_ranged {
            return AttackType::Unset;
        }
        if !combat_has_line_of_sight(sim, fighter, enemy, distance).is_clear() {
            return AttackType::Unset;
        }
    } else {
        if !combat_has_line_of_sight(sim, fighter, enemy, distance).is_clear() {
            return AttackType::Unset;
        }
        if has_melee && creature_can_move_to_combat(sim, fighter, enemy, move_on_ground) {
            return AttackType::Melee;
        }
    }
    if has_ranged {
        AttackType::Ranged
    } else {
        AttackType::Unset
    }
}

/// Desirability of fighting the enemy with the given attack type
///
/// Free slots on the enemy are worth `slot_score_weight` each, the creature's
/// preferred attack type earns one more slot worth, melee gets a small bonus
/// and closer enemies score up to 256 more.
pub fn get_combat_score(
    world: &World,
    fighter: CreatureIdx,
    enemy: CreatureIdx,
    attack_type: AttackType,
    distance: i32,
) -> i64 {
    let (Some(fig), Some(enm)) = (world.creature(fighter), world.creature(enemy)) else {
        return 0;
    };
    let config = &world.config;
    let weight = config.slot_score_weight;
    let free_ranged = crate::combat::constants::SCORE_SLOT_BASE - enm.combat.opponents_ranged.count() as i64;
    let free_melee = crate::combat::constants::SCORE_SLOT_BASE - enm.combat.opponents_melee.count() as i64;
    let prefers_ranged = world
        .model_stats(fig.model)
        .is_some_and(|s| s.attack_preference == AttackType::Ranged);

    let base = if prefers_ranged {
        if attack_type == AttackType::Ranged || fig.has_ranged_weapon() {
            weight * free_ranged + weight
        } else {
            weight * free_melee + 1 + config.melee_score_bonus
        }
    } else if attack_type == AttackType::Ranged {
        weight * free_ranged + 1
    } else {
        weight * free_melee + weight + config.melee_score_bonus
    };
    let max = config.max_score_distance as i64;
    let distance = (distance.max(0) as i64).min(max);
    base + ((max - distance) << 8) / max
}

fn best_attacker_in(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    attackers: Vec<CreatureIdx>,
    max_distance: i32,
) -> Option<CombatCandidate> {
    let mut best: Option<CombatCandidate> = None;
    for enemy in attackers {
        if !sim.world.exists(enemy) {
            continue;
        }
        let distance = get_combat_distance(&sim.world, fighter, enemy);
        if distance >= max_distance {
            continue;
        }
        let attack_type = creature_can_have_combat_with_creature(sim, fighter, enemy, distance, true);
        if !attack_type.is_set() {
            continue;
        }
        let score = get_combat_score(&sim.world, fighter, enemy, attack_type, distance);
        if score > best.map(|b| b.score).unwrap_or(0) {
            best = Some(CombatCandidate {
                enemy,
                attack_type,
                score,
            });
        }
    }
    best
}

/// Best fight among the creatures already attacking the fighter, melee attackers first
pub fn check_for_possible_combat_with_attacker_within_distance(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    max_distance: i32,
) -> Option<CombatCandidate> {
    let (melee, ranged) = match sim.world.creature(fighter) {
        Some(c) => (c.combat.opponents_melee.to_vec(), c.combat.opponents_ranged.to_vec()),
        None => return None,
    };
    if !melee.is_empty() {
        if let Some(found) = best_attacker_in(sim, fighter, melee, max_distance) {
            return Some(found);
        }
    }
    if !ranged.is_empty() {
        if let Some(found) = best_attacker_in(sim, fighter, ranged, max_distance) {
            return Some(found);
        }
    }
    None
}

pub fn check_for_possible_combat_with_attacker(sim: &mut Simulation, fighter: CreatureIdx) -> Option<CombatCandidate> {
    check_for_possible_combat_with_attacker_within_distance(sim, fighter, i32::MAX)
}

/// Highest scoring creature the fighter is willing and able to attack
pub fn check_for_possible_combat_with_enemy_creature_within_distance(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    max_distance: i32,
) -> Option<CombatCandidate> {
    let mut best: Option<CombatCandidate> = None;
    for enemy in sim.world.creature_indices() {
        if !creature_will_attack_creature(&sim.world, fighter, enemy) {
            continue;
        }
        let distance = get_combat_distance(&sim.world, fighter, enemy);
        if distance >= max_distance {
            continue;
        }
        let attack_type = creature_can_have_combat_with_creature(sim, fighter, enemy, distance, false);
        if !attack_type.is_set() {
            continue;
        }
        let score = get_combat_score(&sim.world, fighter, enemy, attack_type, distance);
        if best.map_or(true, |b| score > b.score) {
            best = Some(CombatCandidate {
                enemy,
                attack_type,
                score,
            });
        }
    }
    if let Some(found) = best {
        tracing::trace!("Best enemy for {} is {} ({:?})", fighter, found.enemy, found.attack_type);
    }
    best
}

/// Someone to fight within the distance: an attacker first, then anybody
pub fn check_for_possible_combat_within_distance(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    max_distance: i32,
) -> Option<CombatCandidate> {
    check_for_possible_combat_with_attacker_within_distance(sim, fighter, max_distance)
        .or_else(|| check_for_possible_combat_with_enemy_creature_within_distance(sim, fighter, max_distance))
}

pub fn check_for_possible_combat(sim: &mut Simulation, fighter: CreatureIdx) -> Option<CombatCandidate> {
    check_for_possible_combat_within_distance(sim, fighter, i32::MAX)
}

/// Is `enemy` engaged with `thing` as its current partner?
pub fn creature_has_creature_in_combat(world: &World, thing: CreatureIdx, enemy: CreatureIdx) -> bool {
    world
        .creature(enemy)
        .is_some_and(|e| e.combat.in_combat() && e.combat.battle_enemy == Some(thing))
}

/// Should the fighter keep fighting `enemy` rather than switch?
pub fn creature_is_most_suitable_for_combat(sim: &mut Simulation, fighter: CreatureIdx, enemy: CreatureIdx) -> bool {
    let Some((attack_type, melee_opponents)) = sim
        .world
        .creature(fighter)
        .map(|c| (c.combat.attack_type, c.combat.opponents_melee.count()))
    else {
        return false;
    };
    if creature_has_creature_in_combat(&sim.world, fighter, enemy) {
        let enemy_in_melee = sim
            .world
            .creature(enemy)
            .is_some_and(|e| e.combat.flags.contains(CombatFlags::MELEE));
        if enemy_in_melee || melee_opponents == 0 {
            return true;
        }
    }
    let distance = get_combat_distance(&sim.world, fighter, enemy);
    let current = get_combat_score(&sim.world, fighter, enemy, attack_type, distance);
    let margin = sim.world.config.hysteresis_margin;
    match check_for_possible_combat_with_attacker(sim, fighter) {
        Some(other) => {
            tracing::trace!(
                "{}: current fight scores {}, {} might give {}",
                fighter,
                current,
                other.enemy,
                other.score
            );
            other.enemy == enemy || other.score <= current + margin
        }
        None => true,
    }
}

/// Attack type still possible against the current enemy, rechecked periodically
pub fn check_for_valid_combat(sim: &mut Simulation, fighter: CreatureIdx, enemy: CreatureIdx) -> AttackType {
    if !creature_will_attack_creature_incl_til_death(&sim.world, fighter, enemy) {
        return AttackType::Unset;
    }
    let Some(attack_type) = sim.world.creature(fighter).map(|c| c.combat.attack_type) else {
        return AttackType::Unset;
    };
    let mask = sim.world.config.valid_combat_recheck_mask;
    if (sim.world.turn + fighter.0 as u64) & mask == 0 {
        let distance = get_combat_distance(&sim.world, fighter, enemy);
        return creature_can_have_combat_with_creature(sim, fighter, enemy, distance, true);
    }
    attack_type
}

/// Is this attack type what the creature itself would pick?
pub fn combat_type_is_choice_of_creature(world: &World, fighter: CreatureIdx, attack_type: AttackType) -> bool {
    let Some(fig) = world.creature(fighter) else {
        return false;
    };
    match attack_type {
        AttackType::Unset => false,
        AttackType::Ranged => fig.combat.attack_type == AttackType::Ranged,
        AttackType::Melee => {
            if fig.combat.attack_type != AttackType::Ranged {
                return true;
            }
            let prefers_ranged = world
                .model_stats(fig.model)
                .is_some_and(|s| s.attack_preference == AttackType::Ranged);
            prefers_ranged && fig.has_ranged_weapon()
        }
    }
}

/// Drops the current fight and engages `enemy` instead
///
/// On failure the fighter goes back to its start state.
pub fn change_current_combat(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    enemy: CreatureIdx,
    attack_type: AttackType,
) -> bool {
    remove_attacker(&mut sim.world, fighter);
    if !set_creature_combat_state(&mut sim.world, fighter, enemy, attack_type) {
        tracing::debug!("{} failed to switch to {}, resetting", fighter, enemy);
        set_start_state(sim, fighter);
        return false;
    }
    true
}

/// Switches to the best attacker if it is clearly better than the current fight
pub fn creature_change_to_most_suitable_combat(sim: &mut Simulation, fighter: CreatureIdx) -> bool {
    let Some(found) = check_for_possible_combat_with_attacker(sim, fighter) else {
        return false;
    };
    let current = sim.world.creature(fighter).and_then(|c| c.combat.battle_enemy);
    if current == Some(found.enemy) {
        return false;
    }
    change_current_combat(sim, fighter, found.enemy, found.attack_type)
}

/// Takes the slot of the enemy's weakest attacker of that kind
///
/// Attackers scared of the enemy count as weaker still. The displaced
/// attacker returns to its start state. Returns true if a swap happened.
pub fn change_creature_with_existing_attacker(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    enemy: CreatureIdx,
    attack_type: AttackType,
) -> bool {
    let Some(attackers) = sim.world.creature(enemy).map(|e| {
        if attack_type == AttackType::Ranged {
            e.combat.opponents_ranged.to_vec()
        } else {
            e.combat.opponents_melee.to_vec()
        }
    }) else {
        return false;
    };
    if attackers.is_empty() {
        tracing::error!("No {:?} attackers on {} to replace", attack_type, enemy);
    }
    let distance = get_chessboard_combat_distance(&sim.world, fighter, enemy);
    let prev_score = get_combat_score(&sim.world, fighter, enemy, attack_type, distance);
    let mut best_score = prev_score;
    let mut weakest = None;
    let penalty = sim.world.config.scared_attacker_penalty;
    for attacker in attackers {
        let Some(own_type) = sim.world.creature(attacker).map(|c| c.combat.attack_type) else {
            continue;
        };
        let distance = get_chessboard_combat_distance(&sim.world, attacker, enemy);
        let mut score = get_combat_score(&sim.world, attacker, enemy, own_type, distance);
        if creature_is_actually_scared(&sim.world, attacker, enemy) {
            score -= penalty;
        }
        if score < best_score {
            best_score = score;
            weakest = Some(attacker);
        }
    }
    let Some(weakest) = weakest else {
        return false;
    };
    tracing::debug!("{} displaces {} from {}", fighter, weakest, enemy);
    set_start_state(sim, weakest);
    remove_attacker(&mut sim.world, fighter);
    set_creature_combat_state(&mut sim.world, fighter, enemy, attack_type)
}

/// Periodically looks for a fight better than the current one
///
/// Only waiting fighters change partners; real fights are left alone unless
/// the same enemy can be fought with the creature's preferred attack type.
/// Returns false when the fighter should keep doing what it does this turn.
pub fn check_for_better_combat(sim: &mut Simulation, fighter: CreatureIdx) -> bool {
    let interval = sim.world.config.battle_check_interval.max(1);
    if (sim.world.turn + fighter.0 as u64) % interval != 0 {
        return false;
    }
    let Some(found) = check_for_possible_combat(sim, fighter) else {
        return true;
    };
    let Some((current_enemy, state)) = sim
        .world
        .creature(fighter)
        .map(|c| (c.combat.battle_enemy, c.combat.state))
    else {
        return false;
    };
    if current_enemy == Some(found.enemy) && combat_type_is_choice_of_creature(&sim.world, fighter, found.attack_type) {
        return change_current_combat(sim, fighter, found.enemy, found.attack_type);
    }
    if state != CombatState::Waiting {
        return false;
    }
    if creature_has_spare_slot_for_combat(&sim.world, found.enemy, found.attack_type) {
        change_current_combat(sim, fighter, found.enemy, found.attack_type)
    } else {
        change_creature_with_existing_attacker(sim, fighter, found.enemy, found.attack_type)
    }
}
