//! Load creature models from TOML files
//!
//! ```toml
//! [[creature]]
//! id = 3
//! name = "warlock"
//! health = 200
//! attack_preference = "Ranged"
//! instances = ["SwingWeaponFist", "Fireball", "Heal"]
//! ```
//!
//! Missing fields take the `CreatureStats` defaults.

use std::path::Path;

use ahash::AHashSet;
use serde::Deserialize;

use crate::core::error::{Result, SimError};
use crate::core::types::ModelId;
use crate::creature::CreatureStats;
use crate::rules::CreatureModels;

#[derive(Debug, Deserialize)]
struct ModelFile {
    #[serde(default, rename = "creature")]
    creatures: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: u16,
    #[serde(flatten)]
    stats: CreatureStats,
}

/// Load every creature model from a TOML file
pub fn load_creature_models(path: &Path) -> Result<CreatureModels> {
    let content = std::fs::read_to_string(path)?;
    let models = parse_creature_models(&content)?;
    tracing::info!("Loaded {} creature models from {}", models.len(), path.display());
    Ok(models)
}

pub fn parse_creature_models(content: &str) -> Result<CreatureModels> {
    let file: ModelFile = toml::from_str(content)?;
    let mut seen = AHashSet::new();
    let mut models = Vec::with_capacity(file.creatures.len());

    for entry in file.creatures {
        let id = ModelId(entry.id);
        if !seen.insert(id) {
            return Err(SimError::Config(format!("duplicate creature model id {}", entry.id)));
        }
        validate_stats(&entry.stats)
            .map_err(|e| SimError::Config(format!("creature model {} ({}): {}", entry.id, entry.stats.name, e)))?;
        models.push((id, entry.stats));
    }

    Ok(models)
}

fn validate_stats(stats: &CreatureStats) -> std::result::Result<(), String> {
    if stats.health <= 0 {
        return Err("health must be positive".into());
    }
    if stats.base_speed < 0 {
        return Err("base_speed cannot be negative".into());
    }
    if stats.collision_size <= 0 {
        return Err("collision_size must be positive".into());
    }
    if stats.instances.is_empty() {
        return Err("a creature needs at least one instance".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::state::AttackType;
    use crate::creature::InstanceKind;

    #[test]
    fn test_parse_minimal_model_uses_defaults() {
        let models = parse_creature_models(
            r#"
            [[creature]]
            id = 7
            name = "troll"
            strength = 45
            "#,
        )
        .unwrap();
        assert_eq!(models.len(), 1);
        let (id, stats) = &models[0];
        assert_eq!(*id, ModelId(7));
        assert_eq!(stats.name, "troll");
        assert_eq!(stats.strength, 45);
        assert_eq!(stats.health, CreatureStats::default().health);
    }

    #[test]
    fn test_parse_enums_and_instances() {
        let models = parse_creature_models(
            r#"
            [[creature]]
            id = 3
            name = "warlock"
            attack_preference = "Ranged"
            instances = ["SwingWeaponFist", "Fireball", "Heal"]
            good_start_state = "GoodDoingNothing"
            "#,
        )
        .unwrap();
        let stats = &models[0].1;
        assert_eq!(stats.attack_preference, AttackType::Ranged);
        assert_eq!(
            stats.instances,
            vec![InstanceKind::SwingWeaponFist, InstanceKind::Fireball, InstanceKind::Heal]
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = parse_creature_models(
            r#"
            [[creature]]
            id = 1
            [[creature]]
            id = 1
            "#,
        );
        assert!(matches!(result, Err(SimError::Config(_))));
    }

    #[test]
    fn test_invalid_health_rejected() {
        let result = parse_creature_models(
            r#"
            [[creature]]
            id = 1
            health = 0
            "#,
        );
        assert!(matches!(result, Err(SimError::Config(msg)) if msg.contains("health")));
    }

    #[test]
    fn test_bad_toml_is_reported() {
        assert!(matches!(parse_creature_models("[[creature"), Err(SimError::Toml(_))));
    }
}
