//! Per-turn combat behaviour
//!
//! The in-combat, door-combat and object-combat states, their combat
//! sub-states and the movement that keeps a fighter at the right distance.
//! Attacks only start instances here; `simulation::tick` resolves them.

use rand::Rng;

use crate::combat::constants::{BACKSTEP_DISTANCE, SIDESTEP_DISTANCE};
use crate::combat::engage::{remove_all_traces_of_combat, set_creature_combat_state};
use crate::combat::fear::creature_too_scared_for_combat;
use crate::combat::flee::setup_combat_flee_position;
use crate::combat::resolver::{
    check_for_better_combat, check_for_valid_combat, combat_has_line_of_sight, combat_type_is_choice_of_creature,
    creature_change_to_most_suitable_combat, creature_is_most_suitable_for_combat, get_combat_distance,
};
use crate::combat::state::{AttackType, CombatFlags, CombatState};
use crate::combat::weapons::{
    get_best_melee_offensive_weapon, get_best_ranged_offensive_weapon, get_self_spell_casting, WeaponChoice,
};
use crate::core::types::{Coord, CreatureIdx, StructureIdx, COORD_PER_SUBTILE};
use crate::creature::{ActiveInstance, InstanceKind, InstanceTarget};
use crate::ecs::world::{StructureKind, World};
use crate::simulation::collaborators::{MessageKind, MoveOutcome, Notification, SoundKind};
use crate::simulation::Simulation;
use crate::state::controller::{external_set_thing_state, set_start_state, setup_move_to_position};
use crate::state::registry::{state_registry, StateOutcome};
use crate::state::transition::can_change_from_state_to;
use crate::state::CreatureState;

/// What a fighter is currently swinging at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CombatTarget {
    Creature(CreatureIdx),
    Structure(StructureIdx),
}

impl CombatTarget {
    fn instance_target(self) -> InstanceTarget {
        match self {
            CombatTarget::Creature(idx) => InstanceTarget::Creature(idx),
            CombatTarget::Structure(idx) => InstanceTarget::Structure(idx),
        }
    }

    fn pos(self, world: &World) -> Option<Coord> {
        match self {
            CombatTarget::Creature(idx) => world.creature(idx).map(|c| c.pos),
            CombatTarget::Structure(idx) => world.structure(idx).map(|s| s.pos),
        }
    }

    fn distance(self, world: &World, fighter: CreatureIdx) -> i32 {
        match self {
            CombatTarget::Creature(idx) => get_combat_distance(world, fighter, idx),
            CombatTarget::Structure(idx) => match (world.creature(fighter), world.structure(idx)) {
                (Some(f), Some(s)) => (f.pos.distance_2d(&s.pos) - f.collision_size / 2).max(0),
                _ => i32::MAX,
            },
        }
    }
}

/// Starts an instance if the creature is free and the instance has cooled down
pub fn set_creature_instance(world: &mut World, idx: CreatureIdx, kind: InstanceKind, target: InstanceTarget) -> bool {
    let turn = world.turn;
    let Some(creature) = world.creature_mut(idx) else {
        return false;
    };
    if creature.is_busy() || !creature.instances.has_reset(kind, turn) {
        return false;
    }
    creature.instances.mark_used(kind, turn);
    creature.instance = Some(ActiveInstance {
        kind,
        target,
        started: turn,
    });
    let at = creature.pos;
    tracing::trace!("{} starts {:?} on {:?}", idx, kind, target);
    let sound = if kind.is_melee_attack() {
        SoundKind::Swing
    } else {
        SoundKind::Cast
    };
    world.notify(Notification::Sound { kind: sound, at });
    true
}

fn cast_self_buff(sim: &mut Simulation, idx: CreatureIdx) -> bool {
    let turn = sim.world.turn;
    match sim.world.creature(idx).and_then(|c| get_self_spell_casting(c, turn)) {
        Some(kind) => set_creature_instance(&mut sim.world, idx, kind, InstanceTarget::Caster),
        None => false,
    }
}

fn has_sight(sim: &mut Simulation, fighter: CreatureIdx, target: CombatTarget, distance: i32) -> bool {
    match target {
        CombatTarget::Creature(enemy) => combat_has_line_of_sight(sim, fighter, enemy, distance).is_clear(),
        CombatTarget::Structure(_) => true,
    }
}

fn approach(sim: &mut Simulation, fighter: CreatureIdx, target: CombatTarget) -> MoveOutcome {
    let Some(pos) = target.pos(&sim.world) else {
        return MoveOutcome::Failed;
    };
    let speed = sim.world.creature(fighter).map_or(0, |c| c.speed());
    sim.mover.move_towards(&mut sim.world, fighter, pos, speed)
}

/// Backs away from the target
///
/// Tries running straight away (unless fighting a door or object), then a
/// backstep along the major axis and finally a sidestep to a random side.
/// The backstep and sidestep resume `continuation` once done.
pub fn creature_retreat_from_combat(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    target_pos: Coord,
    continuation: CreatureState,
    try_opposite: bool,
) -> bool {
    let Some((pos, flags, speed)) = sim
        .world
        .creature(fighter)
        .map(|c| (c.pos, c.combat.flags, c.speed()))
    else {
        return false;
    };
    let dx = target_pos.x - pos.x;
    let dy = target_pos.y - pos.y;

    if try_opposite && !flags.intersects(CombatFlags::DOOR_FIGHT | CombatFlags::OBJECT_FIGHT) {
        let away = pos.offset(-dx, -dy);
        if sim.mover.move_towards(&mut sim.world, fighter, away, speed) != MoveOutcome::Failed {
            return true;
        }
    }

    let vertical = dy.abs() >= dx.abs();
    let backstep = if vertical {
        pos.offset(0, if dy <= 0 { BACKSTEP_DISTANCE } else { -BACKSTEP_DISTANCE })
    } else {
        pos.offset(if dx <= 0 { BACKSTEP_DISTANCE } else { -BACKSTEP_DISTANCE }, 0)
    };
    if setup_move_to_position(sim, fighter, backstep, continuation) {
        return true;
    }

    let side = if sim.world.rng.gen_bool(0.5) { 1 } else { -1 };
    let sidestep = if vertical {
        pos.offset(SIDESTEP_DISTANCE * side, 0)
    } else {
        pos.offset(0, SIDESTEP_DISTANCE * side)
    };
    if setup_move_to_position(sim, fighter, sidestep, continuation) {
        return true;
    }
    tracing::debug!("{} has nowhere to retreat to", fighter);
    false
}

fn retreat_from(sim: &mut Simulation, fighter: CreatureIdx, target: CombatTarget, continuation: CreatureState, try_opposite: bool) -> bool {
    match target.pos(&sim.world) {
        Some(pos) => creature_retreat_from_combat(sim, fighter, pos, continuation, try_opposite),
        None => false,
    }
}

/// Another fighter of the same enemy standing on the fighter's subtile
fn fighter_shares_my_subtile(world: &World, fighter: CreatureIdx, enemy: CreatureIdx) -> bool {
    let Some(me) = world.creature(fighter) else {
        return false;
    };
    let (x, y) = (me.pos.subtile_x(), me.pos.subtile_y());
    world.creatures().any(|c| {
        c.index != fighter
            && c.combat.battle_enemy == Some(enemy)
            && c.combat.flags.intersects(CombatFlags::SLOTTED)
            && c.pos.subtile_x() == x
            && c.pos.subtile_y() == y
    })
}

/// Walks to a free spot around the enemy at melee distance
fn creature_move_to_a_space_around_enemy(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    enemy: CreatureIdx,
    continuation: CreatureState,
) -> bool {
    const AROUND: [(i32, i32); 8] = [(1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1)];
    let (Some(me), Some(enm)) = (sim.world.creature(fighter), sim.world.creature(enemy)) else {
        return false;
    };
    let reach = sim.world.config.melee_reposition_distance + (me.collision_size + enm.collision_size) / 2;
    let enemy_pos = enm.pos;
    let occupied: Vec<(i32, i32)> = sim
        .world
        .creatures()
        .filter(|c| c.index != fighter && c.combat.battle_enemy == Some(enemy))
        .map(|c| (c.pos.subtile_x(), c.pos.subtile_y()))
        .collect();
    // Start from the side the fighter already stands on
    let first = AROUND
        .iter()
        .enumerate()
        .min_by_key(|(_, (ax, ay))| {
            let spot = enemy_pos.offset(ax * reach, ay * reach);
            spot.distance_2d(&me.pos)
        })
        .map_or(0, |(i, _)| i);
    for step in 0..AROUND.len() {
        let (ax, ay) = AROUND[(first + step) % AROUND.len()];
        let spot = enemy_pos.offset(ax * reach, ay * reach);
        if occupied.contains(&(spot.subtile_x(), spot.subtile_y())) {
            continue;
        }
        if setup_move_to_position(sim, fighter, spot, continuation) {
            return true;
        }
    }
    tracing::debug!("{} found no melee spot around {}", fighter, enemy);
    false
}

/// Keeps a waiting fighter out of the way while it waits for a slot
///
/// Returns true when the fighter is free to act this turn.
pub fn waiting_combat_move(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    enemy: CreatureIdx,
    distance: i32,
    continuation: CreatureState,
) -> bool {
    let Some(busy) = sim.world.creature(fighter).map(|c| c.is_busy()) else {
        return false;
    };
    if busy {
        return false;
    }
    let target = CombatTarget::Creature(enemy);
    let (retreat_below, approach_above) = (
        sim.world.config.waiting_retreat_distance,
        sim.world.config.waiting_approach_distance,
    );
    if distance < retreat_below {
        retreat_from(sim, fighter, target, continuation, true);
        return false;
    }
    if distance > approach_above {
        approach(sim, fighter, target);
        return false;
    }
    if cast_self_buff(sim, fighter) {
        return false;
    }
    if sim.world.creature(fighter).is_some_and(|c| c.has_ranged_weapon()) {
        if has_sight(sim, fighter, target, distance) {
            let turn = sim.world.turn;
            let weapon = sim
                .world
                .creature(fighter)
                .and_then(|c| get_best_ranged_offensive_weapon(c, distance, turn).ready());
            if let Some(kind) = weapon {
                set_creature_instance(&mut sim.world, fighter, kind, target.instance_target());
                return false;
            }
        } else {
            approach(sim, fighter, target);
        }
    }
    true
}

/// Keeps a ranged fighter within shooting distance and sight
///
/// Returns true when the fighter may shoot this turn.
fn ranged_combat_move(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    target: CombatTarget,
    distance: i32,
    continuation: CreatureState,
) -> bool {
    if sim.world.creature(fighter).map_or(true, |c| c.is_busy()) {
        return false;
    }
    if !has_sight(sim, fighter, target, distance) {
        if approach(sim, fighter, target) == MoveOutcome::Failed {
            set_start_state(sim, fighter);
        }
        return false;
    }
    let (retreat_below, range) = (
        sim.world.config.ranged_retreat_distance,
        sim.world.config.ranged_attack_range,
    );
    if distance < retreat_below {
        return !retreat_from(sim, fighter, target, continuation, true);
    }
    if distance > range {
        approach(sim, fighter, target);
    }
    true
}

/// Closes in on the target and holds a melee spot
///
/// Returns true when the fighter may strike this turn.
fn melee_combat_move(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    target: CombatTarget,
    distance: i32,
    continuation: CreatureState,
) -> bool {
    let Some((busy, flags)) = sim.world.creature(fighter).map(|c| (c.is_busy(), c.combat.flags)) else {
        return false;
    };
    if busy {
        return false;
    }
    let (retreat_below, hold_within) = (
        sim.world.config.melee_retreat_distance,
        sim.world.config.melee_reposition_distance,
    );
    if distance < retreat_below {
        return !retreat_from(sim, fighter, target, continuation, false);
    }
    let structure_fight = flags.intersects(CombatFlags::DOOR_FIGHT | CombatFlags::OBJECT_FIGHT);
    if distance <= hold_within {
        let CombatTarget::Creature(enemy) = target else {
            return true;
        };
        if structure_fight || !fighter_shares_my_subtile(&sim.world, fighter, enemy) {
            return true;
        }
        return !creature_move_to_a_space_around_enemy(sim, fighter, enemy, continuation);
    }

    if cast_self_buff(sim, fighter) {
        return false;
    }
    if !structure_fight {
        if let CombatTarget::Creature(_) = target {
            if has_sight(sim, fighter, target, distance) {
                let turn = sim.world.turn;
                let weapon = sim
                    .world
                    .creature(fighter)
                    .and_then(|c| get_best_ranged_offensive_weapon(c, distance, turn).ready());
                if let Some(kind) = weapon {
                    set_creature_instance(&mut sim.world, fighter, kind, target.instance_target());
                    return false;
                }
            }
        }
    }
    if approach(sim, fighter, target) == MoveOutcome::Failed
        && sim.world.creature(fighter).is_some_and(|c| !c.has_ranged_weapon())
        && !cast_self_buff(sim, fighter)
        && !retreat_from(sim, fighter, target, continuation, false)
    {
        tracing::debug!("{} is stuck and cannot reach its target", fighter);
        set_start_state(sim, fighter);
    }
    false
}

fn combat_enemy(sim: &Simulation, fighter: CreatureIdx) -> Option<CreatureIdx> {
    sim.world
        .creature(fighter)
        .and_then(|c| c.combat.battle_enemy)
        .filter(|e| sim.world.creature(*e).is_some_and(|enm| enm.is_alive()))
}

/// Runs the partner checks shared by every creature combat sub-state
///
/// Returns the enemy when the fighter should go on fighting it this turn.
fn recheck_combat_partner(sim: &mut Simulation, fighter: CreatureIdx) -> Option<CreatureIdx> {
    let enemy = combat_enemy(sim, fighter)?;
    if !creature_is_most_suitable_for_combat(sim, fighter, enemy) {
        tracing::trace!("{} is not the best partner for {}", fighter, enemy);
        creature_change_to_most_suitable_combat(sim, fighter);
        return None;
    }
    let attack_type = check_for_valid_combat(sim, fighter, enemy);
    if !combat_type_is_choice_of_creature(&sim.world, fighter, attack_type) {
        tracing::trace!("{:?} combat is not the choice of {}", attack_type, fighter);
        set_start_state(sim, fighter);
        return None;
    }
    Some(enemy)
}

fn creature_in_combat_wait(sim: &mut Simulation, fighter: CreatureIdx) {
    if check_for_better_combat(sim, fighter) {
        return;
    }
    let Some(enemy) = recheck_combat_partner(sim, fighter) else {
        return;
    };
    let distance = get_combat_distance(&sim.world, fighter, enemy);
    waiting_combat_move(sim, fighter, enemy, distance, CreatureState::InCombat);
}

fn creature_in_ranged_combat(sim: &mut Simulation, fighter: CreatureIdx) {
    let Some(enemy) = recheck_combat_partner(sim, fighter) else {
        return;
    };
    let turn = sim.world.turn;
    let distance = get_combat_distance(&sim.world, fighter, enemy);
    let Some((buff, weapon)) = sim.world.creature(fighter).map(|c| {
        let buff = get_self_spell_casting(c, turn);
        (buff, get_best_ranged_offensive_weapon(c, distance, turn))
    }) else {
        return;
    };
    if buff.is_none() && !weapon.is_some() {
        tracing::debug!("{} has no ranged weapon to fight with", fighter);
        set_start_state(sim, fighter);
        return;
    }
    let target = CombatTarget::Creature(enemy);
    if !ranged_combat_move(sim, fighter, target, distance, CreatureState::InCombat) {
        return;
    }
    match (buff, weapon.ready()) {
        (Some(kind), _) => {
            set_creature_instance(&mut sim.world, fighter, kind, InstanceTarget::Caster);
        }
        (None, Some(kind)) => {
            set_creature_instance(&mut sim.world, fighter, kind, target.instance_target());
        }
        (None, None) => {}
    }
}

fn creature_in_melee_combat(sim: &mut Simulation, fighter: CreatureIdx) {
    let Some(enemy) = recheck_combat_partner(sim, fighter) else {
        return;
    };
    let turn = sim.world.turn;
    let distance = get_combat_distance(&sim.world, fighter, enemy);
    let Some(weapon) = sim
        .world
        .creature(fighter)
        .map(|c| get_best_melee_offensive_weapon(c, distance, turn))
    else {
        return;
    };
    if !weapon.is_some() {
        tracing::debug!("{} has no melee weapon to fight with", fighter);
        set_start_state(sim, fighter);
        return;
    }
    let target = CombatTarget::Creature(enemy);
    if !melee_combat_move(sim, fighter, target, distance, CreatureState::InCombat) {
        return;
    }
    if let Some(kind) = weapon.ready() {
        set_creature_instance(&mut sim.world, fighter, kind, target.instance_target());
    }
}

/// Behaviour of the in-combat state
pub fn creature_in_combat(sim: &mut Simulation, fighter: CreatureIdx) -> StateOutcome {
    let Some(sub_state) = sim.world.creature(fighter).map(|c| c.combat.state) else {
        return StateOutcome::Deleted;
    };
    let Some(enemy) = combat_enemy(sim, fighter) else {
        tracing::debug!("{} lost its enemy", fighter);
        set_start_state(sim, fighter);
        return StateOutcome::ResetOk;
    };
    if creature_too_scared_for_combat(&sim.world, fighter, enemy) {
        if !external_set_thing_state(sim, fighter, CreatureState::CombatFlee) {
            tracing::error!("{} is scared of {} but cannot flee", fighter, enemy);
            return StateOutcome::Unchanged;
        }
        start_fleeing(&mut sim.world, fighter);
        return StateOutcome::Modified;
    }
    match sub_state {
        CombatState::Waiting => creature_in_combat_wait(sim, fighter),
        CombatState::Ranged => creature_in_ranged_combat(sim, fighter),
        CombatState::Melee => creature_in_melee_combat(sim, fighter),
        CombatState::None => {
            tracing::error!("{} is in combat without a combat state", fighter);
            set_start_state(sim, fighter);
            return StateOutcome::ResetOk;
        }
    }
    StateOutcome::Modified
}

/// Picks the flee position and stamps the flee start
pub(crate) fn start_fleeing(world: &mut World, idx: CreatureIdx) -> bool {
    if !setup_combat_flee_position(world, idx) {
        return false;
    }
    let turn = world.turn;
    let Some(creature) = world.creature_mut(idx) else {
        return false;
    };
    creature.combat.flee_start_turn = Some(turn);
    let owner = creature.owner;
    tracing::debug!("{} starts fleeing", idx);
    if !owner.is_neutral() {
        world.notify(Notification::Message {
            kind: MessageKind::CreatureFleeing,
            player: owner,
            subject: idx,
            turn,
        });
    }
    true
}

pub fn cleanup_combat(sim: &mut Simulation, idx: CreatureIdx) -> bool {
    remove_all_traces_of_combat(&mut sim.world, idx);
    if let Some(creature) = sim.world.creature_mut(idx) {
        creature.instance = None;
    }
    true
}

fn cleanup_structure_combat(sim: &mut Simulation, idx: CreatureIdx, flag: CombatFlags) -> bool {
    if let Some(creature) = sim.world.creature_mut(idx) {
        creature.combat.flags.remove(flag);
        creature.combat.structure_target = None;
        creature.combat.battle_enemy = None;
        creature.combat.state = CombatState::None;
        creature.instance = None;
    }
    true
}

pub fn cleanup_door_combat(sim: &mut Simulation, idx: CreatureIdx) -> bool {
    cleanup_structure_combat(sim, idx, CombatFlags::DOOR_FIGHT)
}

pub fn cleanup_object_combat(sim: &mut Simulation, idx: CreatureIdx) -> bool {
    cleanup_structure_combat(sim, idx, CombatFlags::OBJECT_FIGHT)
}

fn structure_melee_combat(sim: &mut Simulation, fighter: CreatureIdx, target: StructureIdx, continuation: CreatureState) {
    let target = CombatTarget::Structure(target);
    let turn = sim.world.turn;
    let distance = target.distance(&sim.world, fighter);
    let Some(weapon) = sim
        .world
        .creature(fighter)
        .map(|c| get_best_melee_offensive_weapon(c, distance, turn))
    else {
        return;
    };
    if !weapon.is_some() {
        tracing::error!("{} has no melee instance to fight a structure", fighter);
        set_start_state(sim, fighter);
        return;
    }
    if melee_combat_move(sim, fighter, target, distance, continuation) {
        if let Some(kind) = weapon.ready() {
            set_creature_instance(&mut sim.world, fighter, kind, target.instance_target());
        }
    }
}

fn structure_ranged_combat(sim: &mut Simulation, fighter: CreatureIdx, target: StructureIdx, continuation: CreatureState) {
    let target = CombatTarget::Structure(target);
    let turn = sim.world.turn;
    let distance = target.distance(&sim.world, fighter);
    let weapon = sim
        .world
        .creature(fighter)
        .map(|c| get_best_ranged_offensive_weapon(c, distance, turn))
        .unwrap_or(WeaponChoice::Nothing);
    if !weapon.is_some() {
        tracing::warn!("{} has no ranged instance to fight a structure", fighter);
    }
    if ranged_combat_move(sim, fighter, target, distance, continuation) {
        if let Some(kind) = weapon.ready() {
            set_creature_instance(&mut sim.world, fighter, kind, target.instance_target());
        }
    }
}

/// Common checks of door and object fights; yields the live target
fn structure_fight_target(sim: &mut Simulation, fighter: CreatureIdx, flag: CombatFlags) -> Option<StructureIdx> {
    let (flags, target, owner) = sim
        .world
        .creature(fighter)
        .map(|c| (c.combat.flags, c.combat.structure_target, c.owner))?;
    if !flags.contains(flag) {
        tracing::error!("{} fights a structure without the matching flag", fighter);
        set_start_state(sim, fighter);
        return None;
    }
    let live = target.and_then(|t| sim.world.structure(t).filter(|s| !s.destroyed).map(|s| (t, s.owner)));
    let Some((target, structure_owner)) = live else {
        tracing::debug!("{} has no structure left to fight", fighter);
        set_start_state(sim, fighter);
        return None;
    };
    let hostile = if flag == CombatFlags::DOOR_FIGHT {
        !sim.world.players.are_mutual_allies(owner, structure_owner)
    } else {
        sim.world.players_are_enemies(owner, structure_owner)
    };
    if !hostile {
        set_start_state(sim, fighter);
        return None;
    }
    Some(target)
}

fn structure_combat(sim: &mut Simulation, fighter: CreatureIdx, flag: CombatFlags) -> StateOutcome {
    let Some(continuation) = sim.world.creature(fighter).map(|c| c.state.active) else {
        return StateOutcome::Deleted;
    };
    let Some(target) = structure_fight_target(sim, fighter, flag) else {
        return StateOutcome::ResetOk;
    };
    match sim.world.creature(fighter).map(|c| c.combat.state) {
        Some(CombatState::Melee) => structure_melee_combat(sim, fighter, target, continuation),
        Some(CombatState::Ranged) => structure_ranged_combat(sim, fighter, target, continuation),
        _ => {
            tracing::error!("{} has an invalid structure fight state", fighter);
            set_start_state(sim, fighter);
            return StateOutcome::ResetOk;
        }
    }
    StateOutcome::Modified
}

/// Behaviour of the door-combat state
pub fn creature_door_combat(sim: &mut Simulation, fighter: CreatureIdx) -> StateOutcome {
    structure_combat(sim, fighter, CombatFlags::DOOR_FIGHT)
}

/// Behaviour of the object-combat and object-snipe states
pub fn creature_object_combat(sim: &mut Simulation, fighter: CreatureIdx) -> StateOutcome {
    structure_combat(sim, fighter, CombatFlags::OBJECT_FIGHT)
}

fn set_creature_structure_combat(sim: &mut Simulation, fighter: CreatureIdx, target: StructureIdx, state: CreatureState) -> bool {
    let Some(flags) = sim.world.creature(fighter).map(|c| c.combat.flags) else {
        return false;
    };
    if flags.intersects(CombatFlags::ENGAGED) {
        tracing::debug!("{} is fighting a creature and ignores structure", fighter);
        return false;
    }
    let Some(kind) = sim.world.structure(target).filter(|s| !s.destroyed).map(|s| s.kind) else {
        return false;
    };
    if !external_set_thing_state(sim, fighter, state) {
        return false;
    }
    let flag = match kind {
        StructureKind::Door => CombatFlags::DOOR_FIGHT,
        StructureKind::Object => CombatFlags::OBJECT_FIGHT,
    };
    let sub_state = match sim.world.creature(fighter) {
        Some(c) if c.has_melee_weapon() => CombatState::Melee,
        Some(c) if c.has_ranged_weapon() => CombatState::Ranged,
        Some(_) => {
            tracing::debug!("{} has no way to damage a structure", fighter);
            set_start_state(sim, fighter);
            return false;
        }
        None => return false,
    };
    let Some(creature) = sim.world.creature_mut(fighter) else {
        return false;
    };
    creature.combat.flags.insert(flag);
    creature.combat.structure_target = Some(target);
    creature.combat.state = sub_state;
    tracing::debug!("{} starts fighting structure {:?}", fighter, target);
    true
}

/// Sends the fighter against an enemy door
pub fn set_creature_door_combat(sim: &mut Simulation, fighter: CreatureIdx, door: StructureIdx) -> bool {
    set_creature_structure_combat(sim, fighter, door, CreatureState::DoorCombat)
}

/// Sends the fighter against an enemy object
pub fn set_creature_object_combat(sim: &mut Simulation, fighter: CreatureIdx, object: StructureIdx) -> bool {
    set_creature_structure_combat(sim, fighter, object, CreatureState::ObjectCombat)
}

/// Puts the fighter into combat with the enemy
///
/// Only a door or object fight may already be running; it is dropped by the
/// state change.
pub fn set_creature_in_combat(sim: &mut Simulation, fighter: CreatureIdx, enemy: CreatureIdx, attack_type: AttackType) -> bool {
    let Some(flags) = sim.world.creature(fighter).map(|c| c.combat.flags) else {
        return false;
    };
    let mut creature_flags = flags;
    creature_flags.remove(CombatFlags::DOOR_FIGHT | CombatFlags::OBJECT_FIGHT);
    if !creature_flags.is_empty() {
        tracing::error!("{} is already in combat with flags {:#x}", fighter, flags.bits());
        return false;
    }
    if !external_set_thing_state(sim, fighter, CreatureState::InCombat) {
        tracing::error!("{} cannot enter combat", fighter);
        return false;
    }
    if let Some(creature) = sim.world.creature_mut(fighter) {
        creature.combat.fight_til_death = false;
    }
    if !set_creature_combat_state(&mut sim.world, fighter, enemy, attack_type) {
        tracing::warn!("{} could not set up combat with {}", fighter, enemy);
        set_start_state(sim, fighter);
        return false;
    }
    setup_combat_flee_position(&mut sim.world, fighter);
    true
}

/// Like `set_creature_in_combat`, but the fighter will never flee
pub fn set_creature_in_combat_to_the_death(
    sim: &mut Simulation,
    fighter: CreatureIdx,
    enemy: CreatureIdx,
    attack_type: AttackType,
) -> bool {
    let Some(flags) = sim.world.creature(fighter).map(|c| c.combat.flags) else {
        return false;
    };
    if !flags.is_empty() {
        tracing::warn!("{} is already in combat, not fighting to the death", fighter);
        return false;
    }
    if !external_set_thing_state(sim, fighter, CreatureState::InCombat) {
        return false;
    }
    if !set_creature_combat_state(&mut sim.world, fighter, enemy, attack_type) {
        tracing::warn!("{} could not set up a fight to the death with {}", fighter, enemy);
        set_start_state(sim, fighter);
        return false;
    }
    if let Some(creature) = sim.world.creature_mut(fighter) {
        creature.combat.fight_til_death = true;
    }
    true
}

/// Should the creature look for enemies this turn?
///
/// Each creature scans on its own turn slot and only while it is free to
/// start a fight.
pub fn creature_available_for_combat_this_turn(world: &World, idx: CreatureIdx) -> bool {
    let Some(creature) = world.creature(idx) else {
        return false;
    };
    if (world.turn + idx.0 as u64) & world.config.combat_scan_mask != 0 {
        return false;
    }
    if !creature.is_alive() || creature.owner.is_neutral() || creature.combat.in_combat() {
        return false;
    }
    let registry = state_registry();
    let state = creature.state.logical(registry);
    if matches!(
        state,
        CreatureState::CombatFlee
            | CreatureState::Unconscious
            | CreatureState::BeingDropped
            | CreatureState::LeavesOrDies
            | CreatureState::LeavesBecauseOwnerLost
    ) {
        return false;
    }
    can_change_from_state_to(registry, creature, creature.state.active, CreatureState::InCombat)
}

/// Distance within which a resolved instance still lands
pub(crate) fn instance_reach(kind: InstanceKind) -> i32 {
    if kind.is_melee_attack() {
        3 * COORD_PER_SUBTILE
    } else {
        i32::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::engage::add_melee_attacker;
    use crate::core::types::{Coord, PlayerId};
    use crate::creature::SpellEffects;
    use crate::simulation::collaborators::OpenFieldNavigator;
    use crate::state::controller::internal_set_thing_state;
    use crate::test_support::two_side_simulation;

    #[test]
    fn test_enter_combat_engages_and_sets_flee_position() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(400, 0));
        sim.world.creature_mut(a).unwrap().lair = Some(Coord::new(-5000, 0));
        assert!(set_creature_in_combat(&mut sim, a, b, AttackType::Melee));
        let c = sim.world.creature(a).unwrap();
        assert_eq!(c.active_state(), CreatureState::InCombat);
        assert_eq!(c.combat.state, CombatState::Melee);
        assert_eq!(c.combat.battle_enemy, Some(b));
        assert_eq!(c.combat.flee_pos, Coord::new(-5000, 0));
        assert!(!c.combat.fight_til_death);
        // Second entry is refused while engaged
        assert!(!set_creature_in_combat(&mut sim, a, b, AttackType::Melee));
    }

    #[test]
    fn test_fight_to_the_death_marks_fighter() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(400, 0));
        assert!(set_creature_in_combat_to_the_death(&mut sim, a, b, AttackType::Melee));
        assert!(sim.world.creature(a).unwrap().combat.fight_til_death);
    }

    #[test]
    fn test_melee_strike_starts_instance() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(300, 0));
        assert!(set_creature_in_combat(&mut sim, a, b, AttackType::Melee));
        assert_eq!(creature_in_combat(&mut sim, a), StateOutcome::Modified);
        let c = sim.world.creature(a).unwrap();
        let instance = c.instance.expect("strike");
        assert_eq!(instance.kind, InstanceKind::SwingWeaponFist);
        assert_eq!(instance.target, InstanceTarget::Creature(b));
        assert!(!c.instances.has_reset(InstanceKind::SwingWeaponFist, sim.world.turn));
    }

    #[test]
    fn test_melee_fighter_closes_distance() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(1200, 0));
        assert!(set_creature_in_combat(&mut sim, a, b, AttackType::Melee));
        creature_in_combat(&mut sim, a);
        let c = sim.world.creature(a).unwrap();
        assert!(c.instance.is_none());
        assert_eq!(c.pos, Coord::new(48, 0));
    }

    #[test]
    fn test_too_close_melee_fighter_backs_off() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(200, 0));
        assert!(set_creature_in_combat(&mut sim, a, b, AttackType::Melee));
        creature_in_combat(&mut sim, a);
        let c = sim.world.creature(a).unwrap();
        assert_eq!(c.active_state(), CreatureState::MoveToPosition);
        assert_eq!(c.continue_state(), CreatureState::InCombat);
        assert_eq!(c.move_target, Some(Coord::new(-BACKSTEP_DISTANCE, 0)));
        // Still engaged while stepping back
        assert!(c.combat.flags.contains(CombatFlags::MELEE));
    }

    #[test]
    fn test_lost_enemy_resets_fighter() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(300, 0));
        assert!(set_creature_in_combat(&mut sim, a, b, AttackType::Melee));
        sim.world.creature_mut(b).unwrap().health = 0;
        assert_eq!(creature_in_combat(&mut sim, a), StateOutcome::ResetOk);
        let c = sim.world.creature(a).unwrap();
        assert_eq!(c.active_state(), CreatureState::DoingNothing);
        assert!(!c.combat.in_combat());
    }

    #[test]
    fn test_scared_fighter_flees() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(300, 0));
        sim.world.creature_mut(a).unwrap().lair = Some(Coord::new(-8000, 0));
        assert!(set_creature_in_combat(&mut sim, a, b, AttackType::Melee));
        sim.world.turn = 40;
        sim.world.creature_mut(a).unwrap().health = 1;
        assert_eq!(creature_in_combat(&mut sim, a), StateOutcome::Modified);
        let c = sim.world.creature(a).unwrap();
        assert_eq!(c.active_state(), CreatureState::CombatFlee);
        assert_eq!(c.combat.flee_start_turn, Some(40));
        assert!(!c.combat.in_combat());
        assert!(!sim.world.creature(b).unwrap().combat.has_attackers());
    }

    #[test]
    fn test_ranged_fighter_with_blocked_sight_approaches() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(1500, 0));
        sim.world.creature_mut(a).unwrap().instances.learn(InstanceKind::Fireball);
        assert!(set_creature_in_combat(&mut sim, a, b, AttackType::Ranged));
        assert_eq!(sim.world.creature(a).unwrap().combat.state, CombatState::Ranged);
        sim.nav = Box::new(OpenFieldNavigator {
            sight: crate::simulation::collaborators::SightPath::None,
            ..Default::default()
        });
        creature_in_ranged_combat(&mut sim, a);
        let c = sim.world.creature(a).unwrap();
        assert!(c.instance.is_none());
        assert_eq!(c.pos, Coord::new(48, 0));
    }

    #[test]
    fn test_ranged_fighter_shoots_in_range() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(1500, 0));
        sim.world.creature_mut(a).unwrap().instances.learn(InstanceKind::Fireball);
        assert!(set_creature_in_combat(&mut sim, a, b, AttackType::Ranged));
        creature_in_ranged_combat(&mut sim, a);
        let instance = sim.world.creature(a).unwrap().instance.expect("shot");
        assert_eq!(instance.kind, InstanceKind::Fireball);
    }

    #[test]
    fn test_door_combat_lifecycle() {
        let (mut sim, a, _) = two_side_simulation(Coord::new(0, 0), Coord::new(5000, 5000));
        let door = sim
            .world
            .add_structure(StructureKind::Door, Coord::new(250, 0), 500, PlayerId(1));
        assert!(set_creature_door_combat(&mut sim, a, door));
        let c = sim.world.creature(a).unwrap();
        assert_eq!(c.active_state(), CreatureState::DoorCombat);
        assert!(c.combat.flags.contains(CombatFlags::DOOR_FIGHT));
        assert_eq!(creature_door_combat(&mut sim, a), StateOutcome::Modified);
        let instance = sim.world.creature(a).unwrap().instance.expect("strike");
        assert_eq!(instance.target, InstanceTarget::Structure(door));

        sim.world.structure_mut(door).unwrap().destroyed = true;
        assert_eq!(creature_door_combat(&mut sim, a), StateOutcome::ResetOk);
        let c = sim.world.creature(a).unwrap();
        assert!(c.combat.flags.is_empty());
        assert!(c.combat.structure_target.is_none());
    }

    #[test]
    fn test_allied_door_is_left_alone() {
        let (mut sim, a, _) = two_side_simulation(Coord::new(0, 0), Coord::new(5000, 5000));
        let door = sim
            .world
            .add_structure(StructureKind::Door, Coord::new(250, 0), 500, PlayerId(1));
        assert!(set_creature_door_combat(&mut sim, a, door));
        sim.world.players.ally(PlayerId(0), PlayerId(1));
        sim.world.players.ally(PlayerId(1), PlayerId(0));
        assert_eq!(creature_door_combat(&mut sim, a), StateOutcome::ResetOk);
    }

    #[test]
    fn test_creature_fight_replaces_object_fight() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(400, 0));
        let object = sim
            .world
            .add_structure(StructureKind::Object, Coord::new(0, 300), 200, PlayerId(1));
        assert!(set_creature_object_combat(&mut sim, a, object));
        assert!(set_creature_in_combat(&mut sim, a, b, AttackType::Melee));
        let c = sim.world.creature(a).unwrap();
        assert!(!c.combat.flags.contains(CombatFlags::OBJECT_FIGHT));
        assert!(c.combat.structure_target.is_none());
        assert!(c.combat.flags.contains(CombatFlags::MELEE));
    }

    #[test]
    fn test_scan_slot_and_state_gate_availability() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(400, 0));
        internal_set_thing_state(&mut sim.world, a, CreatureState::DoingNothing);
        sim.world.turn = 8 - a.0 as u64;
        assert!(creature_available_for_combat_this_turn(&sim.world, a));
        sim.world.turn += 1;
        assert!(!creature_available_for_combat_this_turn(&sim.world, a));
        sim.world.turn -= 1;
        internal_set_thing_state(&mut sim.world, a, CreatureState::CombatFlee);
        assert!(!creature_available_for_combat_this_turn(&sim.world, a));
        internal_set_thing_state(&mut sim.world, a, CreatureState::DoingNothing);
        assert!(add_melee_attacker(&mut sim.world, a, b));
        assert!(!creature_available_for_combat_this_turn(&sim.world, a));
    }

    #[test]
    fn test_self_buff_has_priority_while_waiting() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(1000, 0));
        sim.world.creature_mut(a).unwrap().instances.learn(InstanceKind::Armour);
        assert!(!waiting_combat_move(&mut sim, a, b, 1000, CreatureState::InCombat));
        let c = sim.world.creature(a).unwrap();
        assert_eq!(c.instance.map(|i| i.target), Some(InstanceTarget::Caster));
        assert!(!c.effects.contains(SpellEffects::ARMOUR));
    }
}
