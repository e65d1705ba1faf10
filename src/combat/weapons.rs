//! Weapon selection
//!
//! Weapons are looked up in static tables ordered from most to least
//! preferred. Each entry names an instance and the band of distances in which
//! it is worth using.

use serde::{Deserialize, Serialize};

use crate::core::types::Turn;
use crate::creature::{Creature, InstanceKind, SpellEffects};

/// One row of a weapon table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatWeapon {
    pub instance: InstanceKind,
    pub range_min: i32,
    pub range_max: i32,
}

impl CombatWeapon {
    pub const fn new(instance: InstanceKind, range_min: i32, range_max: i32) -> Self {
        Self {
            instance,
            range_min,
            range_max,
        }
    }

    pub fn in_range(&self, distance: i32) -> bool {
        self.range_min <= distance && distance <= self.range_max
    }
}

/// Ranged weapons, strongest first
pub static RANGED_OFFENSIVE_WEAPONS: &[CombatWeapon] = &[
    CombatWeapon::new(InstanceKind::FireBomb, 768, i32::MAX),
    CombatWeapon::new(InstanceKind::Lightning, 0, 2560),
    CombatWeapon::new(InstanceKind::Hailstorm, 768, i32::MAX),
    CombatWeapon::new(InstanceKind::Drain, 156, i32::MAX),
    CombatWeapon::new(InstanceKind::PoisonCloud, 768, i32::MAX),
    CombatWeapon::new(InstanceKind::Freeze, 156, i32::MAX),
    CombatWeapon::new(InstanceKind::Slow, 156, i32::MAX),
    CombatWeapon::new(InstanceKind::NavigatingMissile, 156, i32::MAX),
    CombatWeapon::new(InstanceKind::Fireball, 156, i32::MAX),
    CombatWeapon::new(InstanceKind::FireArrow, 156, i32::MAX),
    CombatWeapon::new(InstanceKind::Missile, 156, i32::MAX),
];

/// Close-range strikes, strongest first
pub static MELEE_OFFENSIVE_WEAPONS: &[CombatWeapon] = &[
    CombatWeapon::new(InstanceKind::WordOfPower, 0, 768),
    CombatWeapon::new(InstanceKind::FlameBreath, 0, 768),
    CombatWeapon::new(InstanceKind::Fart, 0, 284),
    CombatWeapon::new(InstanceKind::SwingWeaponSword, 0, 284),
    CombatWeapon::new(InstanceKind::SwingWeaponFist, 0, 284),
];

/// Outcome of a weapon lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponChoice {
    /// Off cooldown and in range
    Ready(InstanceKind),
    /// Known, but cooling down or out of range
    NotReady(InstanceKind),
    Nothing,
}

impl WeaponChoice {
    /// Instance id, its negation for the not-ready hint, or 0
    pub fn as_raw(self) -> i32 {
        match self {
            WeaponChoice::Ready(kind) => kind.id(),
            WeaponChoice::NotReady(kind) => -kind.id(),
            WeaponChoice::Nothing => 0,
        }
    }

    pub fn ready(self) -> Option<InstanceKind> {
        match self {
            WeaponChoice::Ready(kind) => Some(kind),
            _ => None,
        }
    }

    /// Anything usable at all, ready or not
    pub fn is_some(self) -> bool {
        self != WeaponChoice::Nothing
    }
}

/// First usable weapon of the table for the distance
///
/// Falls back to the first known but unready weapon as a hint.
pub fn select_from_table(creature: &Creature, table: &[CombatWeapon], distance: i32, turn: Turn) -> WeaponChoice {
    let mut hint = WeaponChoice::Nothing;
    for weapon in table {
        if !creature.instances.is_available(weapon.instance) {
            continue;
        }
        if creature.instances.has_reset(weapon.instance, turn) && weapon.in_range(distance) {
            return WeaponChoice::Ready(weapon.instance);
        }
        if hint == WeaponChoice::Nothing {
            hint = WeaponChoice::NotReady(weapon.instance);
        }
    }
    hint
}

/// Would this self-preservation instance help the creature right now?
fn self_buff_needed(creature: &Creature, kind: InstanceKind) -> bool {
    let effects = creature.effects;
    match kind {
        InstanceKind::Heal => creature.requires_healing(),
        InstanceKind::Armour => !effects.contains(SpellEffects::ARMOUR),
        InstanceKind::Rebound => !effects.contains(SpellEffects::REBOUND),
        InstanceKind::Speed => !effects.contains(SpellEffects::SPEED),
        InstanceKind::Invisibility => !effects.contains(SpellEffects::INVISIBILITY),
        InstanceKind::Fly => !effects.contains(SpellEffects::FLYING),
        InstanceKind::Wind => effects.contains(SpellEffects::POISONED),
        _ => false,
    }
}

/// Self-preservation instances in priority order
pub static SELF_PRESERVATION_ORDER: &[InstanceKind] = &[
    InstanceKind::Heal,
    InstanceKind::Wind,
    InstanceKind::Armour,
    InstanceKind::Rebound,
    InstanceKind::Invisibility,
    InstanceKind::Speed,
    InstanceKind::Fly,
];

/// Self-buff the creature should cast now, if any
pub fn get_self_spell_casting(creature: &Creature, turn: Turn) -> Option<InstanceKind> {
    SELF_PRESERVATION_ORDER.iter().copied().find(|kind| {
        creature.instances.is_available(*kind)
            && creature.instances.has_reset(*kind, turn)
            && self_buff_needed(creature, *kind)
    })
}

/// Self-preservation first, then the table
pub fn select_weapon(creature: &Creature, table: &[CombatWeapon], distance: i32, turn: Turn) -> WeaponChoice {
    match get_self_spell_casting(creature, turn) {
        Some(kind) => WeaponChoice::Ready(kind),
        None => select_from_table(creature, table, distance, turn),
    }
}

pub fn get_best_ranged_offensive_weapon(creature: &Creature, distance: i32, turn: Turn) -> WeaponChoice {
    select_from_table(creature, RANGED_OFFENSIVE_WEAPONS, distance, turn)
}

pub fn get_best_melee_offensive_weapon(creature: &Creature, distance: i32, turn: Turn) -> WeaponChoice {
    select_from_table(creature, MELEE_OFFENSIVE_WEAPONS, distance, turn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_creature;

    #[test]
    fn test_cooling_weapon_gives_negative_hint() {
        let mut creature = sample_creature();
        creature.instances.learn(InstanceKind::Fireball);
        creature.instances.mark_used(InstanceKind::Fireball, 100);
        let table = [CombatWeapon::new(InstanceKind::Fireball, 156, 400)];
        let choice = select_weapon(&creature, &table, 200, 105);
        assert_eq!(choice, WeaponChoice::NotReady(InstanceKind::Fireball));
        assert_eq!(choice.as_raw(), -InstanceKind::Fireball.id());
    }

    #[test]
    fn test_out_of_range_is_hint_not_failure() {
        let mut creature = sample_creature();
        creature.instances.learn(InstanceKind::Fireball);
        let table = [CombatWeapon::new(InstanceKind::Fireball, 156, 400)];
        assert_eq!(select_weapon(&creature, &table, 100, 0).as_raw(), -5);
        assert_eq!(select_weapon(&creature, &table, 300, 0).as_raw(), 5);
    }

    #[test]
    fn test_unknown_weapons_give_nothing() {
        let creature = sample_creature();
        assert_eq!(get_best_ranged_offensive_weapon(&creature, 1000, 0), WeaponChoice::Nothing);
        assert_eq!(WeaponChoice::Nothing.as_raw(), 0);
    }

    #[test]
    fn test_table_order_wins() {
        let mut creature = sample_creature();
        creature.instances.learn(InstanceKind::SwingWeaponSword);
        assert_eq!(
            get_best_melee_offensive_weapon(&creature, 200, 0),
            WeaponChoice::Ready(InstanceKind::SwingWeaponSword)
        );
        creature.instances.mark_used(InstanceKind::SwingWeaponSword, 0);
        assert_eq!(
            get_best_melee_offensive_weapon(&creature, 200, 1),
            WeaponChoice::Ready(InstanceKind::SwingWeaponFist)
        );
    }

    #[test]
    fn test_self_preservation_comes_first() {
        let mut creature = sample_creature();
        creature.instances.learn(InstanceKind::Heal);
        creature.instances.learn(InstanceKind::Armour);
        assert_eq!(get_self_spell_casting(&creature, 0), Some(InstanceKind::Armour));
        creature.health = 1;
        assert_eq!(
            select_weapon(&creature, MELEE_OFFENSIVE_WEAPONS, 100, 0),
            WeaponChoice::Ready(InstanceKind::Heal)
        );
        creature.health = creature.max_health;
        creature.effects.insert(SpellEffects::ARMOUR);
        assert_eq!(get_self_spell_casting(&creature, 0), None);
    }
}
