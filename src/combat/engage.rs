//! Engagement bookkeeping
//!
//! Claims and frees opponent slots, keeps the combat flags of the fighter in
//! step with them and links both parties into a battle. Everything here works
//! on the world arena alone; movement and sight are never consulted.

use crate::combat::battle::{battle_add, battle_remove};
use crate::combat::state::{AttackType, CombatFlags, CombatState};
use crate::core::types::CreatureIdx;
use crate::ecs::world::World;
use crate::simulation::collaborators::{Economy, MessageKind, Notification, SoundKind};

/// Which slot array of the victim an engagement uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Melee,
    Ranged,
}

impl SlotKind {
    fn flag(self) -> CombatFlags {
        match self {
            SlotKind::Melee => CombatFlags::MELEE,
            SlotKind::Ranged => CombatFlags::RANGED,
        }
    }
}

fn enemy_has_free_slot(world: &World, enemy: CreatureIdx, kind: SlotKind) -> bool {
    world.creature(enemy).is_some_and(|e| match kind {
        SlotKind::Melee => e.combat.opponents_melee.has_free_slot(),
        SlotKind::Ranged => e.combat.opponents_ranged.has_free_slot(),
    })
}

/// Does the enemy still have a free slot for this kind of attack?
pub fn creature_has_spare_slot_for_combat(
    world: &World,
    enemy: CreatureIdx,
    attack_type: AttackType,
) -> bool {
    match attack_type {
        AttackType::Melee => enemy_has_free_slot(world, enemy, SlotKind::Melee),
        AttackType::Ranged => enemy_has_free_slot(world, enemy, SlotKind::Ranged),
        AttackType::Unset => false,
    }
}

fn add_slot_attacker(world: &mut World, fighter: CreatureIdx, enemy: CreatureIdx, kind: SlotKind) -> bool {
    let Some(fig) = world.creature(fighter) else {
        return false;
    };
    if fig.combat.in_combat() {
        tracing::debug!("{} already in combat with flags {:#x}", fighter, fig.combat.flags.bits());
        return false;
    }
    if !enemy_has_free_slot(world, enemy, kind) {
        return false;
    }
    if let Some(fig) = world.creature_mut(fighter) {
        fig.combat.flags.insert(kind.flag());
        fig.combat.battle_enemy = Some(enemy);
    }
    let added = world.creature_mut(enemy).is_some_and(|e| match kind {
        SlotKind::Melee => e.combat.opponents_melee.add(fighter),
        SlotKind::Ranged => e.combat.opponents_ranged.add(fighter),
    });
    if !added {
        tracing::error!("Cannot add {:?} attacker {} to {}", kind, fighter, enemy);
        if let Some(fig) = world.creature_mut(fighter) {
            fig.combat.clear_engagement(kind.flag());
        }
        return false;
    }
    if !battle_add(world, fighter, enemy) {
        if let Some(e) = world.creature_mut(enemy) {
            match kind {
                SlotKind::Melee => e.combat.opponents_melee.remove(fighter),
                SlotKind::Ranged => e.combat.opponents_ranged.remove(fighter),
            };
        }
        if let Some(fig) = world.creature_mut(fighter) {
            fig.combat.clear_engagement(kind.flag());
        }
        return false;
    }
    tracing::debug!("{} engages {} ({:?})", fighter, enemy, kind);
    true
}

pub fn add_melee_attacker(world: &mut World, fighter: CreatureIdx, enemy: CreatureIdx) -> bool {
    add_slot_attacker(world, fighter, enemy, SlotKind::Melee)
}

pub fn add_ranged_attacker(world: &mut World, fighter: CreatureIdx, enemy: CreatureIdx) -> bool {
    add_slot_attacker(world, fighter, enemy, SlotKind::Ranged)
}

/// Links the fighter into the battle without claiming a slot
pub fn add_waiting_attacker(world: &mut World, fighter: CreatureIdx, enemy: CreatureIdx) -> bool {
    let Some(fig) = world.creature_mut(fighter) else {
        return false;
    };
    if fig.combat.in_combat() {
        tracing::debug!("{} already in combat, cannot wait for {}", fighter, enemy);
        return false;
    }
    fig.combat.flags.insert(CombatFlags::WAITING);
    fig.combat.battle_enemy = Some(enemy);
    if !battle_add(world, fighter, enemy) {
        if let Some(fig) = world.creature_mut(fighter) {
            fig.combat.clear_engagement(CombatFlags::WAITING);
        }
        return false;
    }
    tracing::debug!("{} waits for a slot on {}", fighter, enemy);
    true
}

fn decrement_fights_of(world: &mut World, fighter: CreatureIdx) {
    if let Some(owner) = world.creature(fighter).map(|c| c.owner) {
        world.players.decrement_fights(owner);
    }
}

fn remove_slot_attacker(world: &mut World, fighter: CreatureIdx, kind: SlotKind) {
    decrement_fights_of(world, fighter);
    let enemy = world.creature(fighter).and_then(|c| c.combat.battle_enemy);
    if let Some(e) = enemy.and_then(|e| world.creature_mut(e)) {
        if !e.combat.has_attackers() {
            tracing::warn!("{} has no attackers while removing {}", e.index, fighter);
        }
        let removed = match kind {
            SlotKind::Melee => e.combat.opponents_melee.remove(fighter),
            SlotKind::Ranged => e.combat.opponents_ranged.remove(fighter),
        };
        if !removed {
            tracing::error!("{:?} attacker {} not found in slots of {}", kind, fighter, e.index);
        }
    }
    if let Some(fig) = world.creature_mut(fighter) {
        fig.combat.clear_engagement(kind.flag());
        fig.combat.state = CombatState::None;
    }
    if world.creature(fighter).is_some_and(|c| c.combat.battle_id.is_some()) {
        battle_remove(world, fighter);
    }
}

pub fn remove_melee_attacker(world: &mut World, fighter: CreatureIdx) {
    remove_slot_attacker(world, fighter, SlotKind::Melee);
}

pub fn remove_ranged_attacker(world: &mut World, fighter: CreatureIdx) {
    remove_slot_attacker(world, fighter, SlotKind::Ranged);
}

pub fn remove_waiting_attacker(world: &mut World, fighter: CreatureIdx) {
    decrement_fights_of(world, fighter);
    if let Some(fig) = world.creature_mut(fighter) {
        fig.combat.clear_engagement(CombatFlags::WAITING);
        fig.combat.state = CombatState::None;
    }
    if world.creature(fighter).is_some_and(|c| c.combat.battle_id.is_some()) {
        battle_remove(world, fighter);
    }
}

/// Ends whatever engagement the fighter has with its current enemy
pub fn remove_attacker(world: &mut World, fighter: CreatureIdx) {
    let Some(flags) = world.creature(fighter).map(|c| c.combat.flags) else {
        return;
    };
    if flags.contains(CombatFlags::MELEE) {
        remove_melee_attacker(world, fighter);
    } else if flags.contains(CombatFlags::RANGED) {
        remove_ranged_attacker(world, fighter);
    } else if flags.contains(CombatFlags::WAITING) {
        remove_waiting_attacker(world, fighter);
    }
}

/// Disengages every creature holding a melee slot on the victim
pub fn remove_all_melee_combat_attackers(world: &mut World, victim: CreatureIdx) {
    let attackers = match world.creature(victim) {
        Some(c) => c.combat.opponents_melee.to_vec(),
        None => return,
    };
    for attacker in attackers {
        if world.exists(attacker) {
            remove_melee_attacker(world, attacker);
        }
    }
    if let Some(c) = world.creature_mut(victim) {
        if !c.combat.opponents_melee.is_empty() {
            tracing::error!(
                "{} melee opponents left on {} after removing all",
                c.combat.opponents_melee.count(),
                victim
            );
            c.combat.opponents_melee.clear();
        }
    }
}

/// Disengages every creature holding a ranged slot on the victim
pub fn remove_all_ranged_combat_attackers(world: &mut World, victim: CreatureIdx) {
    let attackers = match world.creature(victim) {
        Some(c) => c.combat.opponents_ranged.to_vec(),
        None => return,
    };
    for attacker in attackers {
        if world.exists(attacker) {
            remove_ranged_attacker(world, attacker);
        }
    }
    if let Some(c) = world.creature_mut(victim) {
        if !c.combat.opponents_ranged.is_empty() {
            tracing::error!(
                "{} ranged opponents left on {} after removing all",
                c.combat.opponents_ranged.count(),
                victim
            );
            c.combat.opponents_ranged.clear();
        }
    }
}

/// Drops battle membership left behind once all fights are gone
pub fn cleanup_battle_leftovers(world: &mut World, idx: CreatureIdx) {
    if world.creature(idx).is_some_and(|c| c.combat.battle_id.is_some()) {
        tracing::debug!("Removing {} from its battle leftovers", idx);
        battle_remove(world, idx);
    }
}

/// Removes the creature from every fight, as attacker and as victim
///
/// Safe to call repeatedly; a creature already out of combat is untouched.
pub fn remove_all_traces_of_combat(world: &mut World, idx: CreatureIdx) {
    let engaged = world
        .creature(idx)
        .is_some_and(|c| c.combat.flags.intersects(CombatFlags::ENGAGED));
    if engaged {
        remove_attacker(world, idx);
    }
    remove_all_ranged_combat_attackers(world, idx);
    remove_all_melee_combat_attackers(world, idx);
    cleanup_battle_leftovers(world, idx);
}

/// Engages the fighter with the enemy, picking the sub-state by slot availability
///
/// Counts the fight for the owner, announces the first attack on the victim
/// and tries ranged, melee and waiting engagements in preference order.
pub fn set_creature_combat_state(
    world: &mut World,
    fighter: CreatureIdx,
    enemy: CreatureIdx,
    attack_type: AttackType,
) -> bool {
    let Some((owner, has_ranged, preference)) = world.creature(fighter).map(|c| {
        let preference = world
            .model_stats(c.model)
            .map(|s| s.attack_preference)
            .unwrap_or_default();
        (c.owner, c.has_ranged_weapon(), preference)
    }) else {
        return false;
    };
    let Some((enemy_owner, enemy_flags, enemy_pos)) =
        world.creature(enemy).map(|e| (e.owner, e.combat.flags, e.pos))
    else {
        return false;
    };

    world.players.increment_fights(owner);
    if let Some(fig) = world.creature_mut(fighter) {
        fig.combat.attack_type = attack_type;
    }
    if !enemy_flags.intersects(CombatFlags::ENGAGED) && !enemy_owner.is_neutral() {
        let turn = world.turn;
        world.notify(Notification::Message {
            kind: MessageKind::CreatureAttacked,
            player: enemy_owner,
            subject: enemy,
            turn,
        });
    }

    let state = if attack_type == AttackType::Ranged {
        if add_ranged_attacker(world, fighter, enemy) {
            Some(CombatState::Ranged)
        } else if add_waiting_attacker(world, fighter, enemy) {
            Some(CombatState::Waiting)
        } else {
            None
        }
    } else if preference == AttackType::Ranged && has_ranged && add_ranged_attacker(world, fighter, enemy) {
        Some(CombatState::Ranged)
    } else if add_melee_attacker(world, fighter, enemy) {
        Some(CombatState::Melee)
    } else if has_ranged && add_ranged_attacker(world, fighter, enemy) {
        Some(CombatState::Ranged)
    } else if add_waiting_attacker(world, fighter, enemy) {
        Some(CombatState::Waiting)
    } else {
        None
    };

    match state {
        Some(state) => {
            if let Some(fig) = world.creature_mut(fighter) {
                fig.combat.state = state;
            }
            world.notify(Notification::Sound {
                kind: SoundKind::Fight,
                at: enemy_pos,
            });
            true
        }
        None => {
            tracing::debug!("{} could not engage {}", fighter, enemy);
            world.players.decrement_fights(owner);
            false
        }
    }
}

/// Sub-state an engagement would end up in, without engaging
pub fn get_combat_state_for_combat(
    world: &World,
    fighter: CreatureIdx,
    enemy: CreatureIdx,
    attack_type: AttackType,
) -> CombatState {
    let Some(fig) = world.creature(fighter) else {
        return CombatState::None;
    };
    let ranged_free = enemy_has_free_slot(world, enemy, SlotKind::Ranged);
    if attack_type == AttackType::Ranged {
        return if ranged_free {
            CombatState::Ranged
        } else {
            CombatState::Waiting
        };
    }
    let preference = world
        .model_stats(fig.model)
        .map(|s| s.attack_preference)
        .unwrap_or_default();
    let has_ranged = fig.has_ranged_weapon();
    if preference == AttackType::Ranged && has_ranged && ranged_free {
        return CombatState::Ranged;
    }
    if enemy_has_free_slot(world, enemy, SlotKind::Melee) {
        return CombatState::Melee;
    }
    if !has_ranged {
        return CombatState::Waiting;
    }
    if ranged_free {
        CombatState::Ranged
    } else {
        CombatState::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::constants::MELEE_OPPONENTS_LIMIT;
    use crate::core::types::PlayerId;
    use crate::simulation::collaborators::Economy;
    use crate::test_support::world_with_creatures;

    /// One victim owned by player 1 and `n` attackers owned by player 0
    fn skirmish(n: usize) -> (World, CreatureIdx, Vec<CreatureIdx>) {
        let (mut world, ids) = world_with_creatures(n + 1);
        world.players.add_player(PlayerId(1));
        let victim = ids[0];
        if let Some(v) = world.creature_mut(victim) {
            v.owner = PlayerId(1);
        }
        (world, victim, ids[1..].to_vec())
    }

    #[test]
    fn test_melee_engagement_links_battle_and_slot() {
        let (mut world, victim, attackers) = skirmish(1);
        let fighter = attackers[0];
        assert!(set_creature_combat_state(&mut world, fighter, victim, AttackType::Melee));
        let fig = world.creature(fighter).unwrap();
        let vic = world.creature(victim).unwrap();
        assert_eq!(fig.combat.state, CombatState::Melee);
        assert!(fig.combat.flags.contains(CombatFlags::MELEE));
        assert_eq!(vic.combat.opponents_melee.count(), 1);
        assert!(fig.combat.battle_id.is_some());
        assert_eq!(fig.combat.battle_id, vic.combat.battle_id);
        assert_eq!(world.players.fights(PlayerId(0)), 1);
        let attacked = world
            .drain_notifications()
            .into_iter()
            .filter(|n| matches!(n, Notification::Message { kind: MessageKind::CreatureAttacked, .. }))
            .count();
        assert_eq!(attacked, 1);
    }

    #[test]
    fn test_full_slots_fall_back_to_waiting() {
        let (mut world, victim, attackers) = skirmish(MELEE_OPPONENTS_LIMIT + 1);
        for fighter in &attackers[..MELEE_OPPONENTS_LIMIT] {
            assert!(set_creature_combat_state(&mut world, *fighter, victim, AttackType::Melee));
        }
        let late = attackers[MELEE_OPPONENTS_LIMIT];
        assert_eq!(
            get_combat_state_for_combat(&world, late, victim, AttackType::Melee),
            CombatState::Waiting
        );
        assert!(set_creature_combat_state(&mut world, late, victim, AttackType::Melee));
        let fig = world.creature(late).unwrap();
        assert_eq!(fig.combat.state, CombatState::Waiting);
        assert!(fig.combat.flags.contains(CombatFlags::WAITING));
        assert_eq!(world.creature(victim).unwrap().combat.opponents_melee.count(), MELEE_OPPONENTS_LIMIT);
        assert_eq!(fig.combat.battle_id, world.creature(victim).unwrap().combat.battle_id);
    }

    #[test]
    fn test_already_engaged_fighter_is_rejected() {
        let (mut world, victim, attackers) = skirmish(1);
        let fighter = attackers[0];
        assert!(add_melee_attacker(&mut world, fighter, victim));
        assert!(!add_ranged_attacker(&mut world, fighter, victim));
        assert!(!add_waiting_attacker(&mut world, fighter, victim));
        assert_eq!(world.creature(victim).unwrap().combat.opponents_ranged.count(), 0);
    }

    #[test]
    fn test_removing_last_fighter_dissolves_battle() {
        let (mut world, victim, attackers) = skirmish(MELEE_OPPONENTS_LIMIT + 1);
        for fighter in &attackers {
            set_creature_combat_state(&mut world, *fighter, victim, AttackType::Melee);
        }
        let battle = world.creature(victim).unwrap().combat.battle_id.unwrap();
        for fighter in &attackers[..MELEE_OPPONENTS_LIMIT] {
            remove_attacker(&mut world, *fighter);
        }
        // Only the waiting creature is left, so nobody really fights any more
        assert!(!world.battles.exists(battle));
        for idx in attackers.iter().chain(std::iter::once(&victim)) {
            assert!(world.creature(*idx).unwrap().combat.battle_id.is_none());
        }
    }

    #[test]
    fn test_remove_all_traces_is_idempotent() {
        let (mut world, victim, attackers) = skirmish(2);
        for fighter in &attackers {
            set_creature_combat_state(&mut world, *fighter, victim, AttackType::Melee);
        }
        remove_all_traces_of_combat(&mut world, victim);
        remove_all_traces_of_combat(&mut world, victim);
        let vic = world.creature(victim).unwrap();
        assert!(!vic.combat.has_attackers());
        assert!(vic.combat.battle_id.is_none());
        for fighter in &attackers {
            let fig = world.creature(*fighter).unwrap();
            assert!(fig.combat.flags.is_empty());
            assert!(fig.combat.battle_enemy.is_none());
        }
        assert_eq!(world.players.fights(PlayerId(0)), 0);
        assert_eq!(world.battles.active_count(), 0);
    }

    #[test]
    fn test_spare_slot_by_attack_type() {
        let (world, victim, _) = skirmish(0);
        assert!(creature_has_spare_slot_for_combat(&world, victim, AttackType::Melee));
        assert!(creature_has_spare_slot_for_combat(&world, victim, AttackType::Ranged));
        assert!(!creature_has_spare_slot_for_combat(&world, victim, AttackType::Unset));
    }
}
