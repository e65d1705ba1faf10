//! Fleeing and looking for fights
//!
//! A scared creature runs to its flee position and wanders there until the
//! flee times out. Cornered creatures turn and fight to the death.

use rand::Rng;

use crate::combat::behavior::{
    set_creature_in_combat, set_creature_in_combat_to_the_death, set_creature_instance, start_fleeing,
};
use crate::combat::engage::get_combat_state_for_combat;
use crate::combat::fear::creature_too_scared_for_combat;
use crate::combat::resolver::{check_for_possible_combat, check_for_possible_combat_within_distance};
use crate::combat::state::CombatState;
use crate::combat::weapons::get_self_spell_casting;
use crate::core::types::{Coord, CreatureIdx, COORD_PER_SUBTILE};
use crate::creature::InstanceTarget;
use crate::ecs::world::World;
use crate::simulation::collaborators::MoveOutcome;
use crate::simulation::Simulation;
use crate::state::controller::{external_set_thing_state, set_start_state, setup_move_to_position};
use crate::state::registry::StateOutcome;
use crate::state::CreatureState;

/// Subtiles in a slab; wandering moves one slab at a time
const SLAB_SUBTILES: i32 = 3;

/// Where the creature runs to when scared
///
/// Heroes run for their gate, keeper creatures for their lair or else the
/// dungeon heart. Anyone else stays put.
pub fn get_flee_position(world: &World, idx: CreatureIdx) -> Option<Coord> {
    let creature = world.creature(idx)?;
    if creature.owner.is_neutral() {
        return Some(creature.pos);
    }
    if creature.owner.is_heroes() {
        return Some(world.players.hero_gate.unwrap_or(creature.pos));
    }
    if let Some(lair) = creature.lair {
        return Some(lair);
    }
    Some(
        world
            .players
            .player(creature.owner)
            .and_then(|p| p.heart_pos)
            .unwrap_or(creature.pos),
    )
}

pub fn setup_combat_flee_position(world: &mut World, idx: CreatureIdx) -> bool {
    let Some(pos) = get_flee_position(world, idx) else {
        return false;
    };
    match world.creature_mut(idx) {
        Some(creature) => {
            creature.combat.flee_pos = pos;
            true
        }
        None => false,
    }
}

/// Picks a random spot one slab away and walks there, fleeing on arrival
fn wander_to_adjacent_slab(sim: &mut Simulation, idx: CreatureIdx) -> bool {
    let Some(pos) = sim.world.creature(idx).map(|c| c.pos) else {
        return false;
    };
    let step = SLAB_SUBTILES * COORD_PER_SUBTILE;
    let first = sim.world.rng.gen_range(0..8usize);
    for i in 0..8 {
        let (dx, dy) = match (first + i) % 8 {
            0 => (1, 0),
            1 => (1, 1),
            2 => (0, 1),
            3 => (-1, 1),
            4 => (-1, 0),
            5 => (-1, -1),
            6 => (0, -1),
            _ => (1, -1),
        };
        if setup_move_to_position(sim, idx, pos.offset(dx * step, dy * step), CreatureState::CombatFlee) {
            return true;
        }
    }
    false
}

fn run_to_flee_position(sim: &mut Simulation, idx: CreatureIdx) {
    let Some((flee_pos, speed)) = sim.world.creature(idx).map(|c| (c.combat.flee_pos, c.speed())) else {
        return;
    };
    if sim.mover.move_towards(&mut sim.world, idx, flee_pos, speed) == MoveOutcome::Failed {
        tracing::debug!("{} cannot reach its flee position, staying here", idx);
        if let Some(creature) = sim.world.creature_mut(idx) {
            creature.combat.flee_pos = creature.pos;
        }
    }
}

/// Behaviour of the combat-flee state
pub fn creature_combat_flee(sim: &mut Simulation, idx: CreatureIdx) -> StateOutcome {
    let turn = sim.world.turn;
    let Some((pos, flee_pos, start, attacked, wounded)) = sim.world.creature(idx).map(|c| {
        (
            c.pos,
            c.combat.flee_pos,
            c.combat.flee_start_turn,
            c.combat.has_attackers(),
            c.requires_healing(),
        )
    }) else {
        return StateOutcome::Deleted;
    };
    let turns_in_flee = start.map_or(0, |start| turn.saturating_sub(start));
    let config = &sim.world.config;
    let (distant, flee_turns, escape_turns) = (
        config.distant_flee_distance,
        config.game_turns_in_flee,
        config.escape_turns(),
    );
    let (rescan_distance, rescan_turns) = (config.near_flee_rescan_distance, config.near_flee_rescan_turns);

    if pos.box_distance(&flee_pos) >= distant {
        tracing::trace!("{} flees from afar ({} turns)", idx, turns_in_flee);
        if attacked || wounded {
            run_to_flee_position(sim, idx);
            if let Some(creature) = sim.world.creature_mut(idx) {
                creature.combat.flee_start_turn = Some(turn);
            }
        } else if turns_in_flee <= flee_turns {
            if turns_in_flee <= escape_turns {
                run_to_flee_position(sim, idx);
            } else {
                wander_to_adjacent_slab(sim, idx);
            }
        } else {
            set_start_state(sim, idx);
            return StateOutcome::ResetOk;
        }
        return StateOutcome::Modified;
    }

    tracing::trace!("{} flees nearby ({} turns)", idx, turns_in_flee);
    if turns_in_flee > rescan_turns {
        if let Some(found) = check_for_possible_combat_within_distance(sim, idx, rescan_distance) {
            tracing::debug!("{} is cornered and turns on {}", idx, found.enemy);
            set_creature_in_combat_to_the_death(sim, idx, found.enemy, found.attack_type);
            return StateOutcome::Modified;
        }
    }
    if turns_in_flee <= flee_turns {
        wander_to_adjacent_slab(sim, idx);
        StateOutcome::Modified
    } else {
        set_start_state(sim, idx);
        StateOutcome::ResetOk
    }
}

fn enter_flee(sim: &mut Simulation, idx: CreatureIdx) -> bool {
    if !external_set_thing_state(sim, idx, CreatureState::CombatFlee) {
        return false;
    }
    start_fleeing(&mut sim.world, idx)
}

/// Looks around for an enemy and fights or flees
///
/// Returns true when the creature entered combat or started fleeing.
pub fn creature_look_for_combat(sim: &mut Simulation, idx: CreatureIdx) -> bool {
    let turn = sim.world.turn;
    let Some(found) = check_for_possible_combat(sim, idx) else {
        let Some((attacked, buff)) = sim
            .world
            .creature(idx)
            .map(|c| (c.combat.has_attackers(), get_self_spell_casting(c, turn)))
        else {
            return false;
        };
        if !attacked {
            return false;
        }
        if let Some(kind) = buff {
            set_creature_instance(&mut sim.world, idx, kind, InstanceTarget::Caster);
            return false;
        }
        // Attacked by someone it cannot fight back
        return enter_flee(sim, idx);
    };

    let Some((flags, attacked, invisible, fear_wounded, recently_dropped)) = sim.world.creature(idx).map(|c| {
        let fear_wounded = sim.world.model_stats(c.model).map_or(0, |s| s.fear_wounded);
        (
            c.combat.flags,
            c.combat.has_attackers(),
            c.is_invisible(),
            fear_wounded,
            c.recently_dropped(turn, sim.world.config.fight_fear_delay),
        )
    }) else {
        return false;
    };
    if !flags.is_empty()
        && get_combat_state_for_combat(&sim.world, idx, found.enemy, found.attack_type) == CombatState::Waiting
    {
        return false;
    }
    if !attacked && invisible && fear_wounded >= sim.world.config.fear_wounded_saturation {
        return false;
    }

    if flags.is_empty() {
        setup_combat_flee_position(&mut sim.world, idx);
    }
    if !creature_too_scared_for_combat(&sim.world, idx, found.enemy) || recently_dropped {
        return set_creature_in_combat(sim, idx, found.enemy, found.attack_type);
    }
    if invisible && !attacked {
        return false;
    }
    tracing::debug!("{} is too scared to fight {}", idx, found.enemy);
    enter_flee(sim, idx)
}
