//! Battle pool
//!
//! A fixed array of battle records. Each record keeps the head and tail of
//! an intrusive list threaded through the participants' combat data, so the
//! world arena stays the sole owner of every creature. `first` is the oldest
//! member and `battle_next` links towards newer ones.
//!
//! Every walk over a list is bounded by the arena size; a longer walk means
//! the links are corrupt and is logged and abandoned.

use serde::{Deserialize, Serialize};

use crate::combat::constants::{BATTLERS_PER_SIDE, BATTLES_COUNT, VISIBLE_BATTLES};
use crate::core::types::{BattleId, CreatureIdx, PlayerId};
use crate::ecs::world::World;
use crate::simulation::collaborators::{MessageKind, Notification};

/// One group of creatures fighting related fights
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battle {
    pub first: Option<CreatureIdx>,
    pub last: Option<CreatureIdx>,
    /// Listed participants, waiting ones included
    pub fighters_num: u32,
}

impl Battle {
    pub fn is_empty(&self) -> bool {
        self.fighters_num == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattlePool {
    battles: Vec<Battle>,
}

impl Default for BattlePool {
    fn default() -> Self {
        Self::new()
    }
}

impl BattlePool {
    pub fn new() -> Self {
        Self {
            battles: vec![Battle::default(); BATTLES_COUNT],
        }
    }

    fn valid(id: BattleId) -> bool {
        id.0 > 0 && id.as_usize() < BATTLES_COUNT
    }

    pub fn get(&self, id: BattleId) -> Option<&Battle> {
        if !Self::valid(id) {
            tracing::error!("Invalid {}", id);
            return None;
        }
        self.battles.get(id.as_usize())
    }

    pub fn get_mut(&mut self, id: BattleId) -> Option<&mut Battle> {
        if !Self::valid(id) {
            tracing::error!("Invalid {}", id);
            return None;
        }
        self.battles.get_mut(id.as_usize())
    }

    /// Does the battle currently have participants?
    pub fn exists(&self, id: BattleId) -> bool {
        Self::valid(id) && self.battles[id.as_usize()].fighters_num > 0
    }

    /// Every usable battle id, sentinel excluded
    pub fn ids() -> impl DoubleEndedIterator<Item = BattleId> {
        (1..BATTLES_COUNT).map(|i| BattleId(i as u8))
    }

    pub fn active_count(&self) -> usize {
        Self::ids().filter(|id| self.exists(*id)).count()
    }

    pub fn reset(&mut self) {
        for battle in &mut self.battles {
            *battle = Battle::default();
        }
    }
}

/// Walks a battle list from its oldest member, bounded by the arena size
pub fn battle_members(world: &World, id: BattleId) -> Vec<CreatureIdx> {
    let mut members = Vec::new();
    let Some(battle) = world.battles.get(id) else {
        return members;
    };
    let limit = world.max_index();
    let mut cursor = battle.first;
    while let Some(idx) = cursor {
        let Some(creature) = world.creature(idx) else {
            tracing::error!("Jump to invalid creature {} in {}", idx, id);
            break;
        };
        members.push(idx);
        cursor = creature.combat.battle_next;
        if members.len() > limit {
            tracing::error!("Infinite loop detected when sweeping {}", id);
            break;
        }
    }
    members
}

/// Appends the creature as the newest member of the battle
pub fn insert_in_battle_list(world: &mut World, idx: CreatureIdx, id: BattleId) {
    let Some(battle) = world.battles.get(id).copied() else {
        return;
    };
    let Some(creature) = world.creature_mut(idx) else {
        tracing::error!("Cannot add missing creature {} to {}", idx, id);
        return;
    };
    creature.combat.battle_prev = battle.last;
    creature.combat.battle_next = None;
    creature.combat.battle_id = Some(id);
    if let Some(last) = battle.last {
        match world.creature_mut(last) {
            Some(tail) => tail.combat.battle_next = Some(idx),
            None => tracing::warn!("Tail {} of {} is gone", last, id),
        }
    }
    if let Some(battle) = world.battles.get_mut(id) {
        if battle.first.is_none() {
            battle.first = Some(idx);
        }
        battle.last = Some(idx);
        battle.fighters_num += 1;
    }
}

/// Unlinks the creature from its battle, truncating around broken neighbours
pub fn remove_from_battle_list(world: &mut World, idx: CreatureIdx) {
    let Some(creature) = world.creature_mut(idx) else {
        tracing::error!("Creature {} should have been removed from battle before death", idx);
        return;
    };
    let Some(id) = creature.combat.battle_id.take() else {
        return;
    };
    let prev = creature.combat.battle_prev.take();
    let next = creature.combat.battle_next.take();

    // A neighbour that no longer exists cuts the list short at this point
    let next = next.filter(|n| {
        let ok = world.exists(*n);
        if !ok {
            tracing::warn!("Invalid next {} in {}, truncating", n, id);
        }
        ok
    });
    let prev = prev.filter(|p| {
        let ok = world.exists(*p);
        if !ok {
            tracing::warn!("Invalid previous {} in {}, truncating", p, id);
        }
        ok
    });
    if let Some(newer) = next.and_then(|n| world.creature_mut(n)) {
        newer.combat.battle_prev = prev;
    }
    if let Some(older) = prev.and_then(|p| world.creature_mut(p)) {
        older.combat.battle_next = next;
    }

    let Some(battle) = world.battles.get_mut(id) else {
        return;
    };
    if next.is_none() {
        battle.last = prev;
    }
    if prev.is_none() {
        battle.first = next;
    }
    if battle.fighters_num > 0 {
        battle.fighters_num -= 1;
    } else {
        tracing::warn!("Removing {} from {}, but counter is 0", idx, id);
    }
    if battle.fighters_num == 0 && (battle.first.is_some() || battle.last.is_some()) {
        tracing::warn!("Empty {} still had links, clearing", id);
        *battle = Battle::default();
    }
}

/// Participants that are actually fighting (holding an opponent slot)
pub fn count_really_in_combat(world: &World, id: BattleId) -> usize {
    battle_members(world, id)
        .into_iter()
        .filter(|idx| world.creature(*idx).is_some_and(|c| c.combat.is_fighting()))
        .count()
}

/// Dissolves the battle when nobody is really fighting any more
///
/// Returns true if the battle is over.
pub fn cleanup_battle(world: &mut World, id: BattleId) -> bool {
    if world.battles.get(id).is_none() {
        return true;
    }
    let count = count_really_in_combat(world, id);
    if count > 0 {
        tracing::trace!("There are still {} participants in {}", count, id);
        return false;
    }
    let limit = world.max_index();
    let mut removed = 0usize;
    while let Some(first) = world.battles.get(id).and_then(|b| b.first) {
        if !world.exists(first) {
            tracing::error!("Jump to invalid creature {} in {}", first, id);
            if let Some(battle) = world.battles.get_mut(id) {
                *battle = Battle::default();
            }
            break;
        }
        remove_from_battle_list(world, first);
        removed += 1;
        if removed > limit {
            tracing::error!("Infinite loop detected when dissolving {}", id);
            break;
        }
    }
    tracing::debug!("Dissolved {}, removed {} wanderers", id, removed);
    true
}

/// Does any fighting member of the battle target one of the two creatures?
fn battle_targets_any_of(world: &World, id: BattleId, a: CreatureIdx, b: CreatureIdx) -> bool {
    battle_members(world, id).into_iter().any(|idx| {
        world.creature(idx).is_some_and(|c| {
            c.combat.is_fighting()
                && c.combat
                    .battle_enemy
                    .is_some_and(|enemy| (enemy == a || enemy == b) && world.exists(enemy))
        })
    })
}

/// Battle the pair should join: one already aimed at either of them, else the first free one
pub fn find_battle_for_thing(world: &World, fighter: CreatureIdx, enemy: CreatureIdx) -> Option<BattleId> {
    let mut free = None;
    for id in BattlePool::ids() {
        if world.battles.exists(id) {
            if battle_targets_any_of(world, id, fighter, enemy) {
                return Some(id);
            }
        } else if free.is_none() {
            free = Some(id);
        }
    }
    if free.is_none() {
        tracing::error!("No free battle structures");
    }
    free
}

/// Links fighter and enemy into a common battle
///
/// The fighter leaves its previous battle first, and that battle is
/// reconciled before anyone is inserted into the new one.
pub fn battle_add(world: &mut World, fighter: CreatureIdx, enemy: CreatureIdx) -> bool {
    if !world.exists(fighter) || !world.exists(enemy) {
        tracing::error!("Attempt to create battle with invalid creature {} / {}", fighter, enemy);
        return false;
    }
    if let Some(old) = world.creature(fighter).and_then(|c| c.combat.battle_id) {
        remove_from_battle_list(world, fighter);
        cleanup_battle(world, old);
    }
    if world.creature(fighter).and_then(|c| c.combat.battle_id).is_some() {
        tracing::error!("Removing {} from battle doesn't seem to have effect", fighter);
        return false;
    }
    let enemy_battle = world.creature(enemy).and_then(|c| c.combat.battle_id);
    let id = match enemy_battle.or_else(|| find_battle_for_thing(world, fighter, enemy)) {
        Some(id) => id,
        None => return false,
    };
    let fresh = !world.battles.exists(id);
    insert_in_battle_list(world, fighter, id);
    if enemy_battle.is_none() {
        insert_in_battle_list(world, enemy, id);
    }
    if fresh {
        tracing::debug!("{} started between {} and {}", id, fighter, enemy);
    }
    update_battle_events(world, id);
    cleanup_battle(world, id);
    true
}

/// Takes the fighter out of its battle, dissolving the battle if it is over
pub fn battle_remove(world: &mut World, fighter: CreatureIdx) -> bool {
    let id = world.creature(fighter).and_then(|c| c.combat.battle_id);
    let fight_over = match id {
        Some(id) => {
            remove_from_battle_list(world, fighter);
            cleanup_battle(world, id)
        }
        None => {
            tracing::error!("Attempt to remove {} from battle when it isn't in one", fighter);
            false
        }
    };
    if world.creature(fighter).and_then(|c| c.combat.battle_id).is_some() {
        tracing::error!("Removing {} from battle doesn't seem to have effect", fighter);
        return false;
    }
    if fight_over {
        if let Some(id) = id {
            clear_battle_events(world, id);
        }
    }
    true
}

/// Refreshes each involved keeper's record of where fighting happens
pub fn update_battle_events(world: &mut World, id: BattleId) {
    let members = battle_members(world, id);
    let Some(pos) = members.last().and_then(|idx| world.creature(*idx)).map(|c| c.pos) else {
        return;
    };
    let mut owners: Vec<PlayerId> = members
        .iter()
        .filter_map(|idx| world.creature(*idx).map(|c| c.owner))
        .collect();
    owners.sort();
    owners.dedup();
    let turn = world.turn;
    for owner in owners.iter().copied() {
        if owner.is_neutral() || owner.is_heroes() {
            continue;
        }
        let Some(player) = world.players.player_mut(owner) else {
            continue;
        };
        player.last_combat_location = Some(pos);
        let is_new = player.battle_events.insert(id, turn).is_none();
        if is_new {
            let subject = members[0];
            world.notify(Notification::Message {
                kind: MessageKind::BattleStarted,
                player: owner,
                subject,
                turn,
            });
        }
    }
}

fn clear_battle_events(world: &mut World, id: BattleId) {
    for owner in world.players.ids() {
        if let Some(player) = world.players.player_mut(owner) {
            player.battle_events.remove(&id);
        }
    }
}

/// Does the battle include a creature of the player?
pub fn battle_with_creature_of_player(world: &World, player: PlayerId, id: BattleId) -> bool {
    battle_members(world, id)
        .into_iter()
        .any(|idx| world.creature(idx).is_some_and(|c| c.owner == player))
}

pub fn find_first_battle_of_mine(world: &World, player: PlayerId) -> Option<BattleId> {
    BattlePool::ids().find(|id| world.battles.exists(*id) && battle_with_creature_of_player(world, player, *id))
}

pub fn find_last_battle_of_mine(world: &World, player: PlayerId) -> Option<BattleId> {
    BattlePool::ids()
        .rev()
        .find(|id| world.battles.exists(*id) && battle_with_creature_of_player(world, player, *id))
}

/// Next battle of the player after `prev`, wrapping to the first one
pub fn find_next_battle_of_mine(world: &World, player: PlayerId, prev: Option<BattleId>) -> Option<BattleId> {
    let start = prev.map(|id| id.as_usize() + 1).unwrap_or(1);
    (start..BATTLES_COUNT)
        .map(|i| BattleId(i as u8))
        .find(|id| world.battles.exists(*id) && battle_with_creature_of_player(world, player, *id))
        .or_else(|| find_first_battle_of_mine(world, player))
}

/// Previous battle of the player before `next`, wrapping to the last one
pub fn find_previous_battle_of_mine(world: &World, player: PlayerId, next: Option<BattleId>) -> Option<BattleId> {
    let end = next.map(|id| id.as_usize()).unwrap_or(BATTLES_COUNT);
    (1..end)
        .rev()
        .map(|i| BattleId(i as u8))
        .find(|id| world.battles.exists(*id) && battle_with_creature_of_player(world, player, *id))
        .or_else(|| find_last_battle_of_mine(world, player))
}

fn find_next_battle_excluding(
    world: &World,
    player: PlayerId,
    prev: Option<BattleId>,
    shown: &[Option<BattleId>],
) -> Option<BattleId> {
    let first = find_next_battle_of_mine(world, player, prev)?;
    let mut id = first;
    while shown.contains(&Some(id)) {
        id = find_next_battle_of_mine(world, player, Some(id))?;
        if id == first {
            return None;
        }
    }
    Some(id)
}

/// Refreshes the player's overview panel and returns the battles shown
///
/// Finished battles drop out, remaining ones move to the front and empty
/// places are filled with other battles of the player.
pub fn visible_battles(world: &mut World, player: PlayerId) -> Vec<BattleId> {
    let Some(mut shown) = world.players.player(player).map(|p| p.visible_battles) else {
        return Vec::new();
    };
    let mut cursor = None;
    for slot in shown.iter_mut() {
        match *slot {
            Some(id) if world.battles.exists(id) => cursor = Some(id),
            _ => *slot = None,
        }
    }
    let mut compacted: Vec<Option<BattleId>> = shown.iter().copied().filter(Option::is_some).collect();
    compacted.resize(VISIBLE_BATTLES, None);
    shown.copy_from_slice(&compacted);
    for i in 0..VISIBLE_BATTLES {
        if shown[i].is_none() {
            if let Some(id) = find_next_battle_excluding(world, player, cursor, &shown) {
                shown[i] = Some(id);
                cursor = Some(id);
            }
        }
    }
    if let Some(p) = world.players.player_mut(player) {
        p.visible_battles = shown;
    }
    shown.iter().flatten().copied().collect()
}

/// Friendly and enemy participants of a battle, as seen by one player
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSides {
    pub friendly: Vec<CreatureIdx>,
    pub enemy: Vec<CreatureIdx>,
}

pub fn battle_sides(world: &World, player: PlayerId, id: BattleId) -> BattleSides {
    let mut sides = BattleSides::default();
    for idx in battle_members(world, id) {
        let Some(creature) = world.creature(idx) else {
            continue;
        };
        let side = if world.players.are_mutual_allies(player, creature.owner) {
            &mut sides.friendly
        } else {
            &mut sides.enemy
        };
        if side.len() < BATTLERS_PER_SIDE {
            side.push(idx);
        }
    }
    sides
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::state::CombatFlags;
    use crate::test_support::world_with_creatures;

    fn list_is_consistent(world: &World, id: BattleId) -> bool {
        let members = battle_members(world, id);
        let battle = *world.battles.get(id).unwrap();
        if members.len() as u32 != battle.fighters_num {
            return false;
        }
        members.first().copied() == battle.first && members.last().copied() == battle.last
    }

    #[test]
    fn test_insert_appends_newest_last() {
        let (mut world, ids) = world_with_creatures(3);
        let battle = BattleId(1);
        for idx in &ids {
            insert_in_battle_list(&mut world, *idx, battle);
        }
        assert_eq!(battle_members(&world, battle), ids);
        assert_eq!(world.battles.get(battle).unwrap().fighters_num, 3);
        assert!(list_is_consistent(&world, battle));
    }

    #[test]
    fn test_remove_middle_relinks_neighbours() {
        let (mut world, ids) = world_with_creatures(3);
        let battle = BattleId(2);
        for idx in &ids {
            insert_in_battle_list(&mut world, *idx, battle);
        }
        remove_from_battle_list(&mut world, ids[1]);
        assert_eq!(battle_members(&world, battle), vec![ids[0], ids[2]]);
        assert!(list_is_consistent(&world, battle));
        assert!(world.creature(ids[1]).unwrap().combat.battle_id.is_none());
    }

    #[test]
    fn test_sole_participant_removal_resets_battle() {
        let (mut world, ids) = world_with_creatures(1);
        let battle = BattleId(5);
        insert_in_battle_list(&mut world, ids[0], battle);
        remove_from_battle_list(&mut world, ids[0]);
        assert_eq!(*world.battles.get(battle).unwrap(), Battle::default());
    }

    #[test]
    fn test_cleanup_dissolves_waiting_only_battle() {
        let (mut world, ids) = world_with_creatures(3);
        let battle = BattleId(1);
        for idx in &ids {
            insert_in_battle_list(&mut world, *idx, battle);
        }
        world.creature_mut(ids[0]).unwrap().combat.flags = CombatFlags::MELEE;
        assert!(!cleanup_battle(&mut world, battle));
        world.creature_mut(ids[0]).unwrap().combat.flags = CombatFlags::empty();
        assert!(cleanup_battle(&mut world, battle));
        assert_eq!(*world.battles.get(battle).unwrap(), Battle::default());
        for idx in &ids {
            assert!(world.creature(*idx).unwrap().combat.battle_id.is_none());
        }
    }

    #[test]
    fn test_sentinel_battle_is_invalid() {
        let pool = BattlePool::new();
        assert!(pool.get(BattleId(0)).is_none());
        assert!(pool.get(BattleId(BATTLES_COUNT as u8)).is_none());
        assert!(!pool.exists(BattleId(0)));
        assert_eq!(BattlePool::ids().count(), BATTLES_COUNT - 1);
    }

    #[test]
    fn test_truncates_on_missing_neighbour() {
        let (mut world, ids) = world_with_creatures(3);
        let battle = BattleId(1);
        for idx in &ids {
            insert_in_battle_list(&mut world, *idx, battle);
        }
        // Newest member vanishes without unlinking
        world.remove_creature(ids[2]);
        remove_from_battle_list(&mut world, ids[1]);
        let b = *world.battles.get(battle).unwrap();
        assert_eq!(b.last, Some(ids[0]));
        assert_eq!(b.fighters_num, 2);
    }

    #[test]
    fn test_battle_navigation_wraps() {
        let (mut world, ids) = world_with_creatures(4);
        insert_in_battle_list(&mut world, ids[0], BattleId(3));
        insert_in_battle_list(&mut world, ids[1], BattleId(3));
        insert_in_battle_list(&mut world, ids[2], BattleId(7));
        insert_in_battle_list(&mut world, ids[3], BattleId(7));
        let me = PlayerId(0);
        assert_eq!(find_first_battle_of_mine(&world, me), Some(BattleId(3)));
        assert_eq!(find_next_battle_of_mine(&world, me, Some(BattleId(3))), Some(BattleId(7)));
        assert_eq!(find_next_battle_of_mine(&world, me, Some(BattleId(7))), Some(BattleId(3)));
        assert_eq!(find_previous_battle_of_mine(&world, me, Some(BattleId(3))), Some(BattleId(7)));
        assert_eq!(visible_battles(&mut world, me), vec![BattleId(3), BattleId(7)]);
    }

    #[test]
    fn test_battle_sides_split_by_alliance() {
        let (mut world, ids) = world_with_creatures(2);
        world.creature_mut(ids[1]).unwrap().owner = PlayerId(1);
        world.players.add_player(PlayerId(1));
        insert_in_battle_list(&mut world, ids[0], BattleId(1));
        insert_in_battle_list(&mut world, ids[1], BattleId(1));
        let sides = battle_sides(&world, PlayerId(0), BattleId(1));
        assert_eq!(sides.friendly, vec![ids[0]]);
        assert_eq!(sides.enemy, vec![ids[1]]);
    }
}
