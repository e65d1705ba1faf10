//! Tick system - advances the whole simulation by one game turn
//!
//! Timed effects wear off, finished instances land, the dead are removed and
//! then every creature gets its combat scan and its state behaviour, in index
//! order. Notifications queued on the world are handed to the presentation
//! at the end of the turn.

use crate::combat::behavior::{creature_available_for_combat_this_turn, instance_reach};
use crate::combat::constants::{HEAL_HEALTH_DIVISOR, INSTANCE_ACTION_TURNS};
use crate::combat::battle::visible_battles;
use crate::combat::engage::remove_all_traces_of_combat;
use crate::combat::flee::creature_look_for_combat;
use crate::combat::resolver::get_combat_distance;
use crate::core::types::{CreatureIdx, PlayerId, StructureIdx, Turn};
use crate::creature::{ActiveInstance, InstanceKind, InstanceTarget, SpellEffects};
use crate::ecs::world::World;
use crate::simulation::collaborators::{EffectKind, Notification, SoundKind};
use crate::simulation::Simulation;
use crate::state::controller::{cleanup_current_thing_state, process_creature_state};
use crate::state::registry::StateOutcome;

/// Turns a freeze, slow or poison lasts
const HOSTILE_EFFECT_TURNS: Turn = 60;

/// Health lost every turn while poisoned
const POISON_DAMAGE_PER_TURN: i64 = 2;

/// Events generated during a simulation tick
///
/// Returned by `run_simulation_tick` for the skirmish report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationEvent {
    /// An instance hit a creature
    CombatHit {
        attacker: CreatureIdx,
        victim: CreatureIdx,
        damage: i64,
    },
    StructureHit {
        attacker: CreatureIdx,
        structure: StructureIdx,
        damage: i64,
    },
    StructureDestroyed {
        structure: StructureIdx,
    },
    /// A self-buff took effect
    SpellCast {
        caster: CreatureIdx,
        kind: InstanceKind,
    },
    CreatureDied {
        creature: CreatureIdx,
        owner: PlayerId,
    },
    /// The state handler reported the creature gone
    CreatureDeleted {
        creature: CreatureIdx,
    },
    GameOver {
        turn: Turn,
        outcome: GameOutcome,
    },
}

/// Outcome of a skirmish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    /// Only mutually tolerant players have creatures left
    Victory { survivors: Vec<PlayerId> },
    /// Nobody is left standing
    Draw,
    InProgress,
}

/// Run a single simulation tick
///
/// 1. Expire timed effects and apply poison
/// 2. Resolve instances that finished their action turns
/// 3. Remove dead creatures
/// 4. Per creature: look for combat when its scan turn comes up, then run
///    its state behaviour
/// 5. Refresh the battle overview of every player
/// 6. Hand queued notifications to the presentation
/// 7. Report `GameOver` once no two players are left quarrelling
/// 8. Advance the turn counter
pub fn run_simulation_tick(sim: &mut Simulation) -> Vec<SimulationEvent> {
    let mut events = Vec::new();

    update_effects(&mut sim.world);
    resolve_instances(&mut sim.world, &mut events);
    remove_dead_creatures(sim, &mut events);
    process_creatures(sim, &mut events);

    for player in sim.world.players.ids() {
        visible_battles(&mut sim.world, player);
    }
    for notification in sim.world.drain_notifications() {
        sim.presentation.notify(notification);
    }

    let outcome = check_win_condition(&sim.world);
    if outcome != GameOutcome::InProgress {
        events.push(SimulationEvent::GameOver {
            turn: sim.world.turn,
            outcome,
        });
    }

    sim.world.tick();
    events
}

fn update_effects(world: &mut World) {
    let turn = world.turn;
    for idx in world.creature_indices() {
        let Some(creature) = world.creature_mut(idx) else {
            continue;
        };
        creature.expire_effects(turn);
        if creature.effects.contains(SpellEffects::POISONED) {
            creature.health -= POISON_DAMAGE_PER_TURN;
        }
    }
}

/// Lands every instance that has been performed for long enough
fn resolve_instances(world: &mut World, events: &mut Vec<SimulationEvent>) {
    let turn = world.turn;
    for idx in world.creature_indices() {
        let Some(instance) = world.creature(idx).and_then(|c| c.instance) else {
            continue;
        };
        if instance.started + INSTANCE_ACTION_TURNS > turn {
            continue;
        }
        if let Some(creature) = world.creature_mut(idx) {
            creature.instance = None;
        }
        match instance.target {
            InstanceTarget::Caster => apply_self_buff(world, idx, instance.kind, events),
            InstanceTarget::Creature(victim) => strike_creature(world, idx, victim, instance, events),
            InstanceTarget::Structure(target) => strike_structure(world, idx, target, instance, events),
        }
    }
}

fn instance_damage(world: &World, caster: CreatureIdx, kind: InstanceKind) -> i64 {
    let mut damage = kind.base_damage();
    if kind.is_melee_attack() {
        if let Some(c) = world.creature(caster) {
            damage += world.model_stats(c.model).map_or(0, |s| s.melee_damage_at(c.exp_level, &world.config));
        }
    }
    damage
}

fn apply_self_buff(world: &mut World, idx: CreatureIdx, kind: InstanceKind, events: &mut Vec<SimulationEvent>) {
    let until = world.turn + kind.default_reset_turns() as Turn;
    let Some(creature) = world.creature_mut(idx) else {
        return;
    };
    match kind {
        InstanceKind::Heal => {
            creature.health = (creature.health + creature.max_health / HEAL_HEALTH_DIVISOR).min(creature.max_health);
        }
        InstanceKind::Armour => creature.apply_effect(SpellEffects::ARMOUR, until),
        InstanceKind::Speed => creature.apply_effect(SpellEffects::SPEED, until),
        InstanceKind::Invisibility => creature.apply_effect(SpellEffects::INVISIBILITY, until),
        InstanceKind::Rebound => creature.apply_effect(SpellEffects::REBOUND, until),
        InstanceKind::Fly => creature.apply_effect(SpellEffects::FLYING, until),
        InstanceKind::Wind => creature.remove_effect(SpellEffects::POISONED),
        _ => {
            tracing::warn!("{} cast {:?} on itself", idx, kind);
            return;
        }
    }
    let at = creature.pos;
    world.notify(Notification::Effect {
        kind: EffectKind::SpellFlash,
        at,
    });
    events.push(SimulationEvent::SpellCast { caster: idx, kind });
}

fn strike_creature(
    world: &mut World,
    attacker: CreatureIdx,
    victim: CreatureIdx,
    instance: ActiveInstance,
    events: &mut Vec<SimulationEvent>,
) {
    let kind = instance.kind;
    if !world.creature(victim).is_some_and(|c| c.is_alive()) {
        return;
    }
    if get_combat_distance(world, attacker, victim) > instance_reach(kind) {
        tracing::trace!("{} missed {}, out of reach", attacker, victim);
        return;
    }
    let mut damage = instance_damage(world, attacker, kind);
    let rebound = kind.is_ranged_attack()
        && world
            .creature(victim)
            .is_some_and(|c| c.effects.contains(SpellEffects::REBOUND));
    let target = if rebound { attacker } else { victim };
    let until = world.turn + HOSTILE_EFFECT_TURNS;
    let Some(creature) = world.creature_mut(target) else {
        return;
    };
    if creature.effects.contains(SpellEffects::ARMOUR) {
        damage /= 2;
    }
    creature.health -= damage;
    match kind {
        InstanceKind::Freeze => creature.apply_effect(SpellEffects::FROZEN, until),
        InstanceKind::Slow => creature.apply_effect(SpellEffects::SLOWED, until),
        InstanceKind::PoisonCloud => creature.apply_effect(SpellEffects::POISONED, until),
        _ => {}
    }
    let at = creature.pos;
    if kind == InstanceKind::Drain && !rebound {
        if let Some(caster) = world.creature_mut(attacker) {
            caster.health = (caster.health + damage).min(caster.max_health);
        }
    }

    tracing::debug!("{} hit {} with {:?} for {}", attacker, target, kind, damage);
    world.notify(Notification::Sound {
        kind: SoundKind::Hit,
        at,
    });
    world.notify(Notification::Effect {
        kind: if kind.is_melee_attack() {
            EffectKind::Blood
        } else {
            EffectKind::SpellFlash
        },
        at,
    });
    events.push(SimulationEvent::CombatHit {
        attacker,
        victim: target,
        damage,
    });
}

fn strike_structure(
    world: &mut World,
    attacker: CreatureIdx,
    target: StructureIdx,
    instance: ActiveInstance,
    events: &mut Vec<SimulationEvent>,
) {
    let kind = instance.kind;
    let Some((pos, collision)) = world.creature(attacker).map(|c| (c.pos, c.collision_size)) else {
        return;
    };
    let damage = instance_damage(world, attacker, kind);
    let Some(structure) = world.structure_mut(target) else {
        return;
    };
    if structure.destroyed || pos.distance_2d(&structure.pos) - collision / 2 > instance_reach(kind) {
        return;
    }
    structure.health -= damage;
    let at = structure.pos;
    let destroyed = structure.health <= 0;
    if destroyed {
        structure.destroyed = true;
    }
    world.notify(Notification::Sound {
        kind: SoundKind::Hit,
        at,
    });
    events.push(SimulationEvent::StructureHit {
        attacker,
        structure: target,
        damage,
    });
    if destroyed {
        tracing::debug!("{:?} destroyed by {}", target, attacker);
        world.notify(Notification::Effect {
            kind: EffectKind::Smoke,
            at,
        });
        events.push(SimulationEvent::StructureDestroyed { structure: target });
    }
}

fn remove_dead_creatures(sim: &mut Simulation, events: &mut Vec<SimulationEvent>) {
    for idx in sim.world.creature_indices() {
        let Some((alive, owner, at)) = sim.world.creature(idx).map(|c| (c.is_alive(), c.owner, c.pos)) else {
            continue;
        };
        if alive {
            continue;
        }
        tracing::info!("{} of {} died", idx, owner);
        cleanup_current_thing_state(sim, idx);
        remove_all_traces_of_combat(&mut sim.world, idx);
        sim.world.remove_creature(idx);
        sim.world.notify(Notification::Sound {
            kind: SoundKind::Death,
            at,
        });
        events.push(SimulationEvent::CreatureDied { creature: idx, owner });
    }
}

fn process_creatures(sim: &mut Simulation, events: &mut Vec<SimulationEvent>) {
    for idx in sim.world.creature_indices() {
        if !sim.world.exists(idx) {
            continue;
        }
        if creature_available_for_combat_this_turn(&sim.world, idx) {
            creature_look_for_combat(sim, idx);
        }
        if process_creature_state(sim, idx) == StateOutcome::Deleted {
            tracing::debug!("{} was deleted by its state", idx);
            remove_all_traces_of_combat(&mut sim.world, idx);
            sim.world.remove_creature(idx);
            events.push(SimulationEvent::CreatureDeleted { creature: idx });
        }
    }
}

/// Checks whether any two remaining players still have a quarrel
pub fn check_win_condition(world: &World) -> GameOutcome {
    let mut owners: Vec<PlayerId> = world
        .creatures()
        .filter(|c| c.is_alive() && !c.owner.is_neutral())
        .map(|c| c.owner)
        .collect();
    owners.sort();
    owners.dedup();

    if owners.is_empty() {
        return GameOutcome::Draw;
    }
    let quarrel = owners
        .iter()
        .any(|a| owners.iter().any(|b| world.players_are_enemies(*a, *b)));
    if quarrel {
        GameOutcome::InProgress
    } else {
        GameOutcome::Victory { survivors: owners }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::behavior::{set_creature_door_combat, set_creature_in_combat};
    use crate::combat::state::AttackType;
    use crate::core::types::Coord;
    use crate::ecs::world::StructureKind;
    use crate::state::controller::internal_set_thing_state;
    use crate::state::CreatureState;
    use crate::test_support::{simulation_with_creatures, two_side_simulation};

    #[test]
    fn test_tick_advances_counter() {
        let (mut sim, _) = simulation_with_creatures(2);
        assert_eq!(sim.world.turn, 0);
        for _ in 0..10 {
            run_simulation_tick(&mut sim);
        }
        assert_eq!(sim.world.turn, 10);
        assert_eq!(sim.world.creature_count(), 2);
    }

    #[test]
    fn test_unused_creatures_get_start_state() {
        let (mut sim, ids) = simulation_with_creatures(1);
        run_simulation_tick(&mut sim);
        assert_eq!(sim.world.creature(ids[0]).unwrap().active_state(), CreatureState::DoingNothing);
    }

    #[test]
    fn test_lone_player_wins() {
        let (sim, _) = simulation_with_creatures(3);
        assert_eq!(
            check_win_condition(&sim.world),
            GameOutcome::Victory {
                survivors: vec![PlayerId(0)]
            }
        );
        let (sim, _, _) = two_side_simulation(Coord::new(0, 0), Coord::new(500, 0));
        assert_eq!(check_win_condition(&sim.world), GameOutcome::InProgress);
    }

    #[test]
    fn test_melee_strike_lands_after_action_turns() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(200, 0));
        sim.world.creature_mut(a).unwrap().instance = Some(ActiveInstance {
            kind: InstanceKind::SwingWeaponFist,
            target: InstanceTarget::Creature(b),
            started: 0,
        });
        let before = sim.world.creature(b).unwrap().health;
        let mut events = Vec::new();
        sim.world.turn = 1;
        resolve_instances(&mut sim.world, &mut events);
        assert!(events.is_empty());
        sim.world.turn = 2;
        resolve_instances(&mut sim.world, &mut events);
        // Fist 20 plus level 0 strength 30
        assert_eq!(
            events,
            vec![SimulationEvent::CombatHit {
                attacker: a,
                victim: b,
                damage: 50
            }]
        );
        assert_eq!(sim.world.creature(b).unwrap().health, before - 50);
        assert!(sim.world.creature(a).unwrap().instance.is_none());
    }

    #[test]
    fn test_armour_halves_and_rebound_reflects() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(200, 0));
        sim.world.creature_mut(b).unwrap().apply_effect(SpellEffects::ARMOUR, 100);
        sim.world.creature_mut(a).unwrap().instance = Some(ActiveInstance {
            kind: InstanceKind::SwingWeaponFist,
            target: InstanceTarget::Creature(b),
            started: 0,
        });
        sim.world.turn = 5;
        let mut events = Vec::new();
        resolve_instances(&mut sim.world, &mut events);
        assert!(matches!(events[0], SimulationEvent::CombatHit { damage: 25, .. }));

        sim.world.creature_mut(b).unwrap().apply_effect(SpellEffects::REBOUND, 100);
        sim.world.creature_mut(a).unwrap().instance = Some(ActiveInstance {
            kind: InstanceKind::Freeze,
            target: InstanceTarget::Creature(b),
            started: 0,
        });
        events.clear();
        resolve_instances(&mut sim.world, &mut events);
        assert!(matches!(events[0], SimulationEvent::CombatHit { victim, .. } if victim == a));
        assert_eq!(sim.world.creature(a).unwrap().speed(), 0);
    }

    #[test]
    fn test_melee_out_of_reach_misses() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(5000, 0));
        sim.world.creature_mut(a).unwrap().instance = Some(ActiveInstance {
            kind: InstanceKind::SwingWeaponSword,
            target: InstanceTarget::Creature(b),
            started: 0,
        });
        sim.world.turn = 2;
        let mut events = Vec::new();
        resolve_instances(&mut sim.world, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn test_heal_restores_a_third() {
        let (mut sim, a, _) = two_side_simulation(Coord::new(0, 0), Coord::new(5000, 0));
        let c = sim.world.creature_mut(a).unwrap();
        c.health = 10;
        c.instance = Some(ActiveInstance {
            kind: InstanceKind::Heal,
            target: InstanceTarget::Caster,
            started: 0,
        });
        sim.world.turn = 2;
        let mut events = Vec::new();
        resolve_instances(&mut sim.world, &mut events);
        assert_eq!(sim.world.creature(a).unwrap().health, 110);
        assert_eq!(
            events,
            vec![SimulationEvent::SpellCast {
                caster: a,
                kind: InstanceKind::Heal
            }]
        );
    }

    #[test]
    fn test_dead_creature_leaves_no_traces() {
        let (mut sim, a, b) = two_side_simulation(Coord::new(0, 0), Coord::new(300, 0));
        assert!(set_creature_in_combat(&mut sim, a, b, AttackType::Melee));
        assert!(set_creature_in_combat(&mut sim, b, a, AttackType::Melee));
        sim.world.creature_mut(b).unwrap().health = 0;
        let events = run_simulation_tick(&mut sim);
        assert!(events.contains(&SimulationEvent::CreatureDied {
            creature: b,
            owner: PlayerId(1)
        }));
        assert!(!sim.world.exists(b));
        let c = sim.world.creature(a).unwrap();
        assert!(!c.combat.has_attackers());
        assert_eq!(sim.world.battles.active_count(), 0);
        assert!(events.iter().any(|e| matches!(e, SimulationEvent::GameOver { .. })));
    }

    #[test]
    fn test_door_is_destroyed() {
        let (mut sim, a, _) = two_side_simulation(Coord::new(0, 0), Coord::new(9000, 9000));
        let door = sim
            .world
            .add_structure(StructureKind::Door, Coord::new(200, 0), 40, PlayerId(1));
        assert!(set_creature_door_combat(&mut sim, a, door));
        sim.world.creature_mut(a).unwrap().instance = Some(ActiveInstance {
            kind: InstanceKind::SwingWeaponFist,
            target: InstanceTarget::Structure(door),
            started: 0,
        });
        sim.world.turn = 2;
        let mut events = Vec::new();
        resolve_instances(&mut sim.world, &mut events);
        assert!(events.contains(&SimulationEvent::StructureDestroyed { structure: door }));
        assert!(sim.world.structure(door).unwrap().destroyed);
    }

    #[test]
    fn test_notifications_reach_presentation() {
        let (mut sim, a, _) = two_side_simulation(Coord::new(0, 0), Coord::new(600, 0));
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        struct Sink(std::rc::Rc<std::cell::RefCell<Vec<Notification>>>);
        impl crate::simulation::collaborators::Presentation for Sink {
            fn notify(&mut self, notification: Notification) {
                self.0.borrow_mut().push(notification);
            }
        }
        sim.presentation = Box::new(Sink(log.clone()));
        internal_set_thing_state(&mut sim.world, a, CreatureState::DoingNothing);
        sim.world.turn = 8 - (a.0 as Turn % 8);
        run_simulation_tick(&mut sim);
        assert!(!log.borrow().is_empty());
        assert!(sim.world.drain_notifications().is_empty());
    }
}
