//! Creature models: the built-in roster and TOML loading

mod loader;

pub use loader::{load_creature_models, parse_creature_models};

use crate::combat::state::AttackType;
use crate::core::types::ModelId;
use crate::creature::{CreatureStats, InstanceKind};
use crate::ecs::world::World;
use crate::state::CreatureState;

/// Creature models keyed by id, in file order
pub type CreatureModels = Vec<(ModelId, CreatureStats)>;

pub const MODEL_TROLL: ModelId = ModelId(1);
pub const MODEL_WARLOCK: ModelId = ModelId(2);
pub const MODEL_BILE_DEMON: ModelId = ModelId(3);
pub const MODEL_KNIGHT: ModelId = ModelId(4);
pub const MODEL_ARCHER: ModelId = ModelId(5);
pub const MODEL_FAIRY: ModelId = ModelId(6);

/// Built-in roster used when no model file is given
pub fn default_models() -> CreatureModels {
    use InstanceKind::*;
    vec![
        (
            MODEL_TROLL,
            CreatureStats {
                name: "troll".into(),
                health: 350,
                strength: 40,
                fear_wounded: 10,
                base_speed: 40,
                instances: vec![SwingWeaponSword, Speed],
                ..Default::default()
            },
        ),
        (
            MODEL_WARLOCK,
            CreatureStats {
                name: "warlock".into(),
                health: 200,
                strength: 15,
                hearing: 12,
                fear_wounded: 30,
                fear_stronger: 200,
                attack_preference: AttackType::Ranged,
                instances: vec![SwingWeaponFist, Fireball, Heal],
                ..Default::default()
            },
        ),
        (
            MODEL_BILE_DEMON,
            CreatureStats {
                name: "bile_demon".into(),
                health: 600,
                strength: 35,
                fear_wounded: 5,
                base_speed: 32,
                collision_size: 192,
                instances: vec![SwingWeaponFist, Fart],
                ..Default::default()
            },
        ),
        (
            MODEL_KNIGHT,
            CreatureStats {
                name: "knight".into(),
                health: 450,
                strength: 45,
                fear_wounded: 5,
                instances: vec![SwingWeaponSword, Armour],
                good_start_state: CreatureState::GoodDoingNothing,
                ..Default::default()
            },
        ),
        (
            MODEL_ARCHER,
            CreatureStats {
                name: "archer".into(),
                health: 220,
                strength: 20,
                hearing: 14,
                fear_wounded: 20,
                attack_preference: AttackType::Ranged,
                base_speed: 56,
                instances: vec![SwingWeaponFist, FireArrow],
                ..Default::default()
            },
        ),
        (
            MODEL_FAIRY,
            CreatureStats {
                name: "fairy".into(),
                health: 150,
                strength: 10,
                hearing: 16,
                fear_wounded: 101,
                attack_preference: AttackType::Ranged,
                base_speed: 64,
                collision_size: 96,
                can_see_invisible: true,
                instances: vec![SwingWeaponFist, Missile, Heal, Invisibility],
                ..Default::default()
            },
        ),
    ]
}

/// Registers every model with the world
pub fn register_models(world: &mut World, models: &CreatureModels) {
    for (id, stats) in models {
        world.register_model(*id, stats.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster_has_unique_ids() {
        let models = default_models();
        let mut ids: Vec<u16> = models.iter().map(|(id, _)| id.0).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), models.len());
    }

    #[test]
    fn test_every_default_model_can_fight() {
        for (_, stats) in default_models() {
            assert!(
                stats.instances.iter().any(|k| k.is_melee_attack() || k.is_ranged_attack()),
                "{} has no attack",
                stats.name
            );
        }
    }

    #[test]
    fn test_register_models() {
        let mut world = World::default();
        register_models(&mut world, &default_models());
        assert_eq!(world.model_stats(MODEL_WARLOCK).map(|s| s.name.as_str()), Some("warlock"));
    }

    #[test]
    fn test_bundled_model_file_parses() {
        let models = parse_creature_models(include_str!("../../data/creatures.toml")).unwrap();
        assert_eq!(models.len(), default_models().len());
    }
}
