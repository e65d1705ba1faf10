//! Headless Skirmish Runner
//!
//! Spawns a keeper warband and a hero warband on an open field, runs the
//! creature simulation and prints a summary of the fight.

use std::path::PathBuf;

use clap::Parser;
use creature_sim::core::types::{Coord, CreatureIdx, ModelId, PlayerId};
use creature_sim::core::CombatConfig;
use creature_sim::rules::{default_models, load_creature_models, register_models, CreatureModels};
use creature_sim::simulation::{run_simulation_tick, GameOutcome, Simulation, SimulationEvent};
use serde::Serialize;

/// Headless skirmish between a keeper warband and a hero warband
#[derive(Parser, Debug)]
#[command(name = "skirmish")]
#[command(about = "Run a creature skirmish and report the outcome")]
struct Args {
    /// Maximum game turns before calling it a draw
    #[arg(long, default_value_t = 2000)]
    ticks: u64,

    /// Random seed for deterministic runs
    #[arg(long)]
    seed: Option<u64>,

    /// Creatures per warband
    #[arg(long, default_value_t = 6)]
    size: usize,

    /// Creature model file (TOML); the built-in roster is used otherwise
    #[arg(long)]
    models: Option<PathBuf>,

    /// Combat tuning file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct SideReport {
    player: String,
    spawned: usize,
    alive: usize,
    remaining_health: i64,
    hits_dealt: u32,
    damage_dealt: i64,
    deaths: u32,
}

#[derive(Debug, Serialize)]
struct SkirmishReport {
    seed: u64,
    turns: u64,
    outcome: String,
    spells_cast: u32,
    structures_destroyed: u32,
    keepers: SideReport,
    heroes: SideReport,
}

const KEEPER: PlayerId = PlayerId(0);
const KEEPER_MODELS: [ModelId; 3] = [ModelId(1), ModelId(2), ModelId(3)];
const HERO_MODELS: [ModelId; 3] = [ModelId(4), ModelId(5), ModelId(6)];

fn main() -> creature_sim::Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some(directives) => tracing_subscriber::EnvFilter::new(directives),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("creature_sim=info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let seed = args.seed.unwrap_or_else(rand::random);
    let config = match &args.config {
        Some(path) => CombatConfig::load(path)?,
        None => CombatConfig::default(),
    };
    let models = match &args.models {
        Some(path) => load_creature_models(path)?,
        None => default_models(),
    };

    tracing::info!("Starting skirmish: {} per side, seed {}", args.size, seed);
    let mut sim = Simulation::new(config, seed);
    let (keepers, heroes) = setup_field(&mut sim, &models, args.size)?;

    let mut report = SkirmishReport {
        seed,
        turns: 0,
        outcome: "Undecided".into(),
        spells_cast: 0,
        structures_destroyed: 0,
        keepers: SideReport {
            player: KEEPER.to_string(),
            spawned: keepers.len(),
            ..Default::default()
        },
        heroes: SideReport {
            player: PlayerId::HEROES.to_string(),
            spawned: heroes.len(),
            ..Default::default()
        },
    };

    while sim.world.turn < args.ticks {
        let events = run_simulation_tick(&mut sim);
        let mut finished = None;
        for event in events {
            match event {
                SimulationEvent::CombatHit { attacker, damage, .. } => {
                    let side = if keepers.contains(&attacker) {
                        &mut report.keepers
                    } else {
                        &mut report.heroes
                    };
                    side.hits_dealt += 1;
                    side.damage_dealt += damage;
                }
                SimulationEvent::CreatureDied { owner, .. } => {
                    if owner == KEEPER {
                        report.keepers.deaths += 1;
                    } else {
                        report.heroes.deaths += 1;
                    }
                }
                SimulationEvent::SpellCast { .. } => report.spells_cast += 1,
                SimulationEvent::StructureDestroyed { .. } => report.structures_destroyed += 1,
                SimulationEvent::GameOver { outcome, .. } => finished = Some(outcome),
                SimulationEvent::StructureHit { .. } | SimulationEvent::CreatureDeleted { .. } => {}
            }
        }
        if let Some(outcome) = finished {
            report.outcome = describe(&outcome);
            break;
        }
    }
    report.turns = sim.world.turn;
    summarize_side(&sim, &keepers, &mut report.keepers);
    summarize_side(&sim, &heroes, &mut report.heroes);
    tracing::info!("Skirmish finished after {} turns: {}", report.turns, report.outcome);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }
    Ok(())
}

/// Places both warbands facing each other across the field
fn setup_field(
    sim: &mut Simulation,
    models: &CreatureModels,
    size: usize,
) -> creature_sim::Result<(Vec<CreatureIdx>, Vec<CreatureIdx>)> {
    register_models(&mut sim.world, models);
    sim.world.players.add_player(KEEPER).heart_pos = Some(Coord::from_subtiles(5, 30));
    sim.world.players.hero_gate = Some(Coord::from_subtiles(75, 30));

    let keeper_models = pick_models(models, &KEEPER_MODELS);
    let hero_models = pick_models(models, &HERO_MODELS);
    let mut keepers = Vec::with_capacity(size);
    let mut heroes = Vec::with_capacity(size);
    for i in 0..size {
        let row = 20 + 3 * i as i32;
        let model = keeper_models[i % keeper_models.len()];
        let idx = sim.world.spawn_creature(model, KEEPER, Coord::from_subtiles(25, row), 1)?;
        if let Some(c) = sim.world.creature_mut(idx) {
            c.lair = Some(Coord::from_subtiles(10, row));
        }
        keepers.push(idx);

        let model = hero_models[i % hero_models.len()];
        heroes.push(
            sim.world
                .spawn_creature(model, PlayerId::HEROES, Coord::from_subtiles(55, row), 1)?,
        );
    }
    Ok((keepers, heroes))
}

/// The wanted models that exist, or every loaded model
fn pick_models(models: &CreatureModels, wanted: &[ModelId]) -> Vec<ModelId> {
    let found: Vec<ModelId> = wanted
        .iter()
        .copied()
        .filter(|id| models.iter().any(|(m, _)| m == id))
        .collect();
    if found.is_empty() {
        models.iter().map(|(id, _)| *id).collect()
    } else {
        found
    }
}

fn summarize_side(sim: &Simulation, members: &[CreatureIdx], side: &mut SideReport) {
    for idx in members {
        if let Some(c) = sim.world.creature(*idx) {
            side.alive += 1;
            side.remaining_health += c.health;
        }
    }
}

fn describe(outcome: &GameOutcome) -> String {
    match outcome {
        GameOutcome::Victory { survivors } => {
            let names: Vec<String> = survivors.iter().map(|p| p.to_string()).collect();
            format!("Victory for {}", names.join(", "))
        }
        GameOutcome::Draw => "Draw".into(),
        GameOutcome::InProgress => "Undecided".into(),
    }
}

fn print_text(report: &SkirmishReport) {
    println!("Skirmish Result");
    println!("===============");
    println!("Outcome: {}", report.outcome);
    println!("Turns: {}", report.turns);
    println!("Spells cast: {}", report.spells_cast);
    for side in [&report.keepers, &report.heroes] {
        println!();
        println!("{}", side.player);
        println!("  Alive: {}/{}", side.alive, side.spawned);
        println!("  Remaining health: {}", side.remaining_health);
        println!("  Hits: {} for {} damage", side.hits_dealt, side.damage_dealt);
        println!("  Deaths: {}", side.deaths);
    }
    println!();
    println!("Seed: {}", report.seed);
}
