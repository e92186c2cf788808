//! Evaluate command - run generations of the demo population
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: build_engine_config(), run_generations(), print_results()
//! - Level 3: random_population(), next_generation()
//! - Level 4: file I/O, formatting utilities

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;

use arena_core::{FitnessEntry, GenomeEntry, PluginRegistry};
use arena_tournament::{demo, EngineConfig, GenerationReport, TournamentEngine, TournamentFormat};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Swiss,
    Glicko,
}

impl From<FormatArg> for TournamentFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Swiss => TournamentFormat::Swiss,
            FormatArg::Glicko => TournamentFormat::Glicko,
        }
    }
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Population size
    #[arg(long, default_value = "32")]
    pub population: usize,

    /// Number of generations to run
    #[arg(long, default_value = "5")]
    pub generations: usize,

    /// Worker threads
    #[arg(long, default_value = "4")]
    pub threads: usize,

    /// Pairing strategy
    #[arg(long, value_enum, default_value = "swiss")]
    pub format: FormatArg,

    /// Engine configuration JSON; command-line flags override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Strength the baseline environment is centred on
    #[arg(long, default_value = "0.5")]
    pub baseline: f64,

    /// Print the final generation's fitness as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run evaluate command
///
/// 1. Build engine configuration
/// 2. Bring up the engine on the demo plugins
/// 3. Evaluate and breed for the requested generations
/// 4. Report
pub async fn run(args: EvaluateArgs, seed: Option<u64>) -> Result<()> {
    let config = build_engine_config(&args, seed)?;
    let mut rng = create_rng(seed);

    tracing::info!(
        "Starting evaluation: pop={}, gen={}, threads={}, format={:?}",
        args.population,
        args.generations,
        config.thread_count,
        config.format
    );

    let mut registry = PluginRegistry::new();
    demo::register(&mut registry);
    let mut engine = TournamentEngine::new(
        registry,
        demo::plugin_keys(),
        json!({ "baseline": args.baseline }),
        config,
    )
    .await
    .context("Failed to start tournament engine")?;

    let population = random_population(args.population, &mut rng);
    let outcome = run_generations(&mut engine, population, args.generations, &mut rng).await;
    engine.shutdown().await;

    let report = outcome?;
    print_results(&report, &args)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

/// Load the optional config file, then apply command-line overrides
fn build_engine_config(args: &EvaluateArgs, seed: Option<u64>) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    config.thread_count = args.threads;
    config.format = args.format.into();
    if seed.is_some() {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

/// Evaluate each generation and breed the next from its fitness
async fn run_generations(
    engine: &mut TournamentEngine,
    mut population: Vec<GenomeEntry>,
    generations: usize,
    rng: &mut ChaCha8Rng,
) -> Result<GenerationReport> {
    let mut report = GenerationReport::default();
    for gen in 0..generations {
        report = engine.evaluate(&population).await?;

        tracing::info!(
            "Generation {}: best={:.3}, avg={:.3}, rounds={}",
            gen + 1,
            report.best_fitness().unwrap_or(0.0),
            report.mean_fitness().unwrap_or(0.0),
            report.rounds_played
        );

        if gen + 1 < generations {
            population = next_generation(&population, &report.fitness, rng);
        }
    }
    Ok(report)
}

fn print_results(report: &GenerationReport, args: &EvaluateArgs) -> Result<()> {
    if args.json {
        let json = serde_json::to_string_pretty(&report.fitness)?;
        println!("{}", json);
        return Ok(());
    }

    println!("\n=== Final Generation ===");
    println!("Entries:      {}", report.fitness.len());
    println!("Rounds:       {}", report.rounds_played);
    println!("Best fitness: {:.3}", report.best_fitness().unwrap_or(0.0));
    println!("Avg fitness:  {:.3}", report.mean_fitness().unwrap_or(0.0));
    if let Some(best) = &report.best {
        println!(
            "Best genome:  species {} organism {} {}",
            best.species_index, best.organism_index, best.options
        );
    }
    if let Some(seed_ai) = &report.seed_ai {
        println!(
            "Seed AI:      rating {:.1} rd {:.1}",
            seed_ai.rating, seed_ai.rd
        );
    }
    Ok(())
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

/// Genomes per species in the demo population
const SPECIES_SIZE: usize = 8;

/// Random two-weight linear genomes
fn random_population(size: usize, rng: &mut ChaCha8Rng) -> Vec<GenomeEntry> {
    (0..size)
        .map(|i| {
            let weights = [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)];
            GenomeEntry::new(
                (i / SPECIES_SIZE) as u32,
                i as u32,
                demo::linear_genome(&weights),
            )
        })
        .collect()
}

/// Keep the fitter half, refill with mutated copies under fresh ids
fn next_generation(
    population: &[GenomeEntry],
    fitness: &[FitnessEntry],
    rng: &mut ChaCha8Rng,
) -> Vec<GenomeEntry> {
    let mut ranked: Vec<(&GenomeEntry, f64)> = population
        .iter()
        .zip(fitness)
        .map(|(entry, f)| (entry, f.fitness))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let survivors = population.len().div_ceil(2);
    let mut next: Vec<GenomeEntry> = ranked
        .iter()
        .take(survivors)
        .map(|(entry, _)| (*entry).clone())
        .collect();

    let mut organism = population
        .iter()
        .map(|e| e.organism_index)
        .max()
        .map_or(0, |max| max + 1);
    while next.len() < population.len() && survivors > 0 {
        let parent = next[rng.gen_range(0..survivors)].clone();
        let weights: Vec<f64> = weights_of(&parent)
            .iter()
            .map(|w| w + rng.gen_range(-0.1..0.1))
            .collect();
        next.push(GenomeEntry::new(
            parent.species_index,
            organism,
            demo::linear_genome(&weights),
        ));
        organism += 1;
    }
    next
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn load_config(path: &Path) -> Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

fn weights_of(entry: &GenomeEntry) -> Vec<f64> {
    entry
        .options
        .get("weights")
        .and_then(|w| w.as_array())
        .map(|ws| ws.iter().filter_map(|w| w.as_f64()).collect())
        .unwrap_or_default()
}

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> EvaluateArgs {
        EvaluateArgs {
            population: 6,
            generations: 2,
            threads: 2,
            format: FormatArg::Glicko,
            config: None,
            baseline: 0.5,
            json: false,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let config = build_engine_config(&args(), Some(9)).unwrap();
        assert_eq!(config.format, TournamentFormat::Glicko);
        assert_eq!(config.thread_count, 2);
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let mut bad = args();
        bad.threads = 0;
        assert!(build_engine_config(&bad, None).is_err());
    }

    #[test]
    fn test_random_population_ids_unique() {
        let mut rng = create_rng(Some(42));
        let population = random_population(20, &mut rng);

        assert_eq!(population.len(), 20);
        assert_eq!(population[19].species_index, 2);
        let mut ids: Vec<_> = population.iter().map(|e| e.id().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn test_next_generation_keeps_best_and_fresh_ids() {
        let mut rng = create_rng(Some(1));
        let population = random_population(5, &mut rng);
        let fitness: Vec<FitnessEntry> = population
            .iter()
            .enumerate()
            .map(|(i, e)| FitnessEntry {
                species_index: e.species_index,
                organism_index: e.organism_index,
                fitness: i as f64,
            })
            .collect();

        let next = next_generation(&population, &fitness, &mut rng);

        assert_eq!(next.len(), 5);
        assert_eq!(next[0], population[4]);
        assert_eq!(next[1], population[3]);
        assert_eq!(next[2], population[2]);
        assert_eq!(next[3].organism_index, 5);
        assert_eq!(next[4].organism_index, 6);
        assert_eq!(weights_of(&next[3]).len(), 2);
    }

    #[test]
    fn test_create_rng_with_seed() {
        let mut rng1 = create_rng(Some(42));
        let mut rng2 = create_rng(Some(42));
        assert_eq!(rng1.gen::<u64>(), rng2.gen::<u64>());
    }
}
