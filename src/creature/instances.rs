//! Creature instances (timed actions) and spell effects

use ahash::AHashMap;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::core::types::Turn;

/// A timed action a creature can perform: a strike, a spell or a self-buff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum InstanceKind {
    Null = 0,
    SwingWeaponSword = 1,
    SwingWeaponFist = 2,
    Fireball = 5,
    FireArrow = 6,
    Missile = 7,
    NavigatingMissile = 8,
    Lightning = 9,
    FireBomb = 10,
    Freeze = 11,
    Hailstorm = 12,
    PoisonCloud = 13,
    Drain = 14,
    Slow = 15,
    WordOfPower = 16,
    Fart = 17,
    FlameBreath = 18,
    Heal = 20,
    Armour = 21,
    Speed = 22,
    Invisibility = 23,
    Rebound = 24,
    Fly = 25,
    Wind = 26,
}

impl InstanceKind {
    /// Numeric id; its negation is used as the "not ready yet" hint
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Projectile or spell that hits from a distance
    pub fn is_ranged_attack(self) -> bool {
        matches!(
            self,
            InstanceKind::Fireball
                | InstanceKind::FireArrow
                | InstanceKind::Missile
                | InstanceKind::NavigatingMissile
                | InstanceKind::Lightning
                | InstanceKind::FireBomb
                | InstanceKind::Freeze
                | InstanceKind::Hailstorm
                | InstanceKind::PoisonCloud
                | InstanceKind::Drain
                | InstanceKind::Slow
        )
    }

    /// Close-range strike
    pub fn is_melee_attack(self) -> bool {
        matches!(
            self,
            InstanceKind::SwingWeaponSword
                | InstanceKind::SwingWeaponFist
                | InstanceKind::WordOfPower
                | InstanceKind::Fart
                | InstanceKind::FlameBreath
        )
    }

    /// Self-preservation spell cast on the caster
    pub fn is_self_buff(self) -> bool {
        matches!(
            self,
            InstanceKind::Heal
                | InstanceKind::Armour
                | InstanceKind::Speed
                | InstanceKind::Invisibility
                | InstanceKind::Rebound
                | InstanceKind::Fly
                | InstanceKind::Wind
        )
    }

    /// Turns before the instance can be used again
    pub fn default_reset_turns(self) -> u32 {
        match self {
            InstanceKind::Null => 0,
            InstanceKind::SwingWeaponSword | InstanceKind::SwingWeaponFist => 8,
            InstanceKind::FireArrow | InstanceKind::Missile => 10,
            InstanceKind::Fireball | InstanceKind::NavigatingMissile | InstanceKind::Slow => 20,
            InstanceKind::Lightning | InstanceKind::Drain | InstanceKind::FlameBreath => 25,
            InstanceKind::FireBomb | InstanceKind::Freeze | InstanceKind::Fart => 30,
            InstanceKind::Hailstorm | InstanceKind::PoisonCloud | InstanceKind::WordOfPower => 40,
            InstanceKind::Heal | InstanceKind::Speed => 100,
            InstanceKind::Armour | InstanceKind::Rebound | InstanceKind::Wind => 150,
            InstanceKind::Invisibility | InstanceKind::Fly => 200,
        }
    }

    /// Damage dealt on resolution (0 for self-buffs)
    pub fn base_damage(self) -> i64 {
        match self {
            InstanceKind::SwingWeaponSword => 30,
            InstanceKind::SwingWeaponFist => 20,
            InstanceKind::FireArrow | InstanceKind::Missile => 15,
            InstanceKind::Fireball | InstanceKind::NavigatingMissile => 25,
            InstanceKind::Lightning | InstanceKind::FireBomb => 40,
            InstanceKind::Drain | InstanceKind::FlameBreath => 30,
            InstanceKind::Freeze | InstanceKind::Slow => 5,
            InstanceKind::Hailstorm | InstanceKind::PoisonCloud => 35,
            InstanceKind::WordOfPower => 60,
            InstanceKind::Fart => 10,
            _ => 0,
        }
    }
}

/// Cooldown tracking for one known instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTimer {
    pub reset_turns: u32,
    pub last_used: Option<Turn>,
}

impl InstanceTimer {
    pub fn new(reset_turns: u32) -> Self {
        Self {
            reset_turns,
            last_used: None,
        }
    }

    pub fn has_reset(&self, turn: Turn) -> bool {
        match self.last_used {
            Some(used) => turn >= used + self.reset_turns as u64,
            None => true,
        }
    }
}

/// Instances a creature knows, with their cooldowns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceSet {
    timers: AHashMap<InstanceKind, InstanceTimer>,
}

impl InstanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_kinds(kinds: &[InstanceKind]) -> Self {
        let mut set = Self::new();
        for kind in kinds {
            set.learn(*kind);
        }
        set
    }

    pub fn learn(&mut self, kind: InstanceKind) {
        if kind == InstanceKind::Null {
            return;
        }
        self.timers
            .entry(kind)
            .or_insert_with(|| InstanceTimer::new(kind.default_reset_turns()));
    }

    pub fn is_available(&self, kind: InstanceKind) -> bool {
        self.timers.contains_key(&kind)
    }

    pub fn has_reset(&self, kind: InstanceKind, turn: Turn) -> bool {
        self.timers
            .get(&kind)
            .map(|timer| timer.has_reset(turn))
            .unwrap_or(false)
    }

    pub fn mark_used(&mut self, kind: InstanceKind, turn: Turn) {
        if let Some(timer) = self.timers.get_mut(&kind) {
            timer.last_used = Some(turn);
        }
    }

    pub fn has_ranged_attack(&self) -> bool {
        self.timers.keys().any(|kind| kind.is_ranged_attack())
    }

    pub fn has_melee_attack(&self) -> bool {
        self.timers.keys().any(|kind| kind.is_melee_attack())
    }

    pub fn kinds(&self) -> impl Iterator<Item = InstanceKind> + '_ {
        self.timers.keys().copied()
    }
}

bitflags! {
    /// Spell effects currently affecting a creature
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SpellEffects: u16 {
        const CHICKEN = 0x0001;
        const TIMEBOMB = 0x0002;
        const INVISIBILITY = 0x0004;
        const ARMOUR = 0x0008;
        const SPEED = 0x0010;
        const REBOUND = 0x0020;
        const FLYING = 0x0040;
        /// Inside a poison cloud; a wind instance can clear it
        const POISONED = 0x0080;
        const FROZEN = 0x0100;
        const SLOWED = 0x0200;
        /// Recently slapped by its keeper
        const SLAPPED = 0x0400;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_categories_disjoint() {
        let all = [
            InstanceKind::SwingWeaponSword,
            InstanceKind::Fireball,
            InstanceKind::Freeze,
            InstanceKind::Heal,
            InstanceKind::Wind,
            InstanceKind::FlameBreath,
        ];
        for kind in all {
            let categories = [kind.is_ranged_attack(), kind.is_melee_attack(), kind.is_self_buff()];
            assert_eq!(categories.iter().filter(|c| **c).count(), 1, "{:?}", kind);
        }
    }

    #[test]
    fn test_timer_reset() {
        let mut set = InstanceSet::from_kinds(&[InstanceKind::Fireball]);
        assert!(set.is_available(InstanceKind::Fireball));
        assert!(set.has_reset(InstanceKind::Fireball, 0));
        set.mark_used(InstanceKind::Fireball, 100);
        assert!(!set.has_reset(InstanceKind::Fireball, 110));
        assert!(set.has_reset(InstanceKind::Fireball, 120));
    }

    #[test]
    fn test_unknown_instance_never_ready() {
        let set = InstanceSet::new();
        assert!(!set.is_available(InstanceKind::Heal));
        assert!(!set.has_reset(InstanceKind::Heal, 1000));
    }

    #[test]
    fn test_weapon_presence() {
        let set = InstanceSet::from_kinds(&[InstanceKind::SwingWeaponFist, InstanceKind::Heal]);
        assert!(set.has_melee_attack());
        assert!(!set.has_ranged_attack());
    }

    #[test]
    fn test_spell_effects() {
        let mut effects = SpellEffects::empty();
        effects.insert(SpellEffects::ARMOUR | SpellEffects::SPEED);
        assert!(effects.contains(SpellEffects::ARMOUR));
        effects.remove(SpellEffects::ARMOUR);
        assert!(!effects.contains(SpellEffects::ARMOUR));
        assert!(effects.contains(SpellEffects::SPEED));
    }
}
