//! Tournament engine - one generation from population to fitness
//!
//! Level 1 - Orchestration

use std::sync::Arc;

use arena_core::{ArenaError, FitnessEntry, GenomeEntry, GenomeId, Player, PluginRegistry, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use crate::config::{EngineConfig, PluginKeys, TournamentFormat};
use crate::fitness::{glicko_fitness_calculator, FitnessComponents};
use crate::glicko::{GlickoPlayer, RatedMatch, RatingRegistry};
use crate::heroes::{add_fillers, select_best_genome_by_raw_rating, HallOfFame, HeroGenome};
use crate::matchmaking::{
    create_glicko_matches, pairwise_outcome, score_seed_tournaments, PreviousOpponents,
};
use crate::pool::{PoolConfig, WorkerPool};
use crate::protocol::{EvaluatorInit, GenomeFactoryInit};
use crate::rounds::{play_round, players_for};
use crate::swiss::{run_swiss, swiss_round_count};

/// Seats and score range of a plugin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreBounds {
    pub min: f64,
    pub max: f64,
}

impl ScoreBounds {
    fn pair(self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Map a raw score onto [0, 1] without clamping
    pub fn normalize(self, raw: f64) -> f64 {
        let span = self.max - self.min;
        if span == 0.0 {
            0.0
        } else {
            (raw - self.min) / span
        }
    }
}

/// Outcome of one evaluated generation
#[derive(Clone, Debug, Default)]
pub struct GenerationReport {
    /// One entry per input genome, in input order
    pub fitness: Vec<FitnessEntry>,
    /// Generation's strongest genome
    pub best: Option<GenomeEntry>,
    /// Baseline player after seeding (Glicko format only)
    pub seed_ai: Option<GlickoPlayer>,
    pub rounds_played: usize,
}

impl GenerationReport {
    pub fn best_fitness(&self) -> Option<f64> {
        self.fitness.iter().map(|f| f.fitness).reduce(f64::max)
    }

    pub fn mean_fitness(&self) -> Option<f64> {
        if self.fitness.is_empty() {
            return None;
        }
        let sum: f64 = self.fitness.iter().map(|f| f.fitness).sum();
        Some(sum / self.fitness.len() as f64)
    }
}

/// Evaluates populations through a worker pool
pub struct TournamentEngine {
    config: EngineConfig,
    pool: WorkerPool,
    player_size: usize,
    game_bounds: ScoreBounds,
    environment_bounds: ScoreBounds,
    hall: HallOfFame,
    rng: ChaCha8Rng,
    generation: usize,
}

impl TournamentEngine {
    /// Validate the configuration and bring up the worker pool
    pub async fn new(
        registry: PluginRegistry,
        keys: PluginKeys,
        environment_options: Value,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        keys.validate()?;

        // Local instances only answer shape questions; workers own their own
        let game = registry.create_game(&keys.game, &environment_options)?;
        let environment = registry.create_environment(&keys.environment, &environment_options)?;
        let player_size = game.player_size();
        if config.format == TournamentFormat::Glicko && player_size != 2 {
            return Err(ArenaError::validation(format!(
                "glicko format needs a two-player game, {} seats {}",
                game.description(),
                player_size
            )));
        }
        let game_bounds = ScoreBounds {
            min: game.min_score(),
            max: game.max_score(),
        };
        let environment_bounds = ScoreBounds {
            min: environment.min_score(),
            max: environment.max_score(),
        };

        let pool = WorkerPool::initialize(
            Arc::new(registry),
            EvaluatorInit::new(keys, environment_options),
            PoolConfig::new(config.thread_count, config.task_capacity),
        )
        .await?;

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Ok(Self {
            hall: HallOfFame::new(config.heroes.hall_capacity),
            config,
            pool,
            player_size,
            game_bounds,
            environment_bounds,
            rng,
            generation: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall
    }

    /// Generations evaluated so far
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Forward genome factory configuration to every worker
    pub async fn init_genome_factory(&self, init: GenomeFactoryInit) -> Result<()> {
        self.pool.init_genome_factory(init).await
    }

    /// Score one generation
    ///
    /// Any pool error aborts the generation; no partial results are kept.
    pub async fn evaluate(&mut self, entries: &[GenomeEntry]) -> Result<GenerationReport> {
        let ids = unique_ids(entries)?;
        self.pool.clear_genome_cache().await?;

        let report = match self.config.format {
            TournamentFormat::Swiss => self.evaluate_swiss(entries, &ids).await?,
            TournamentFormat::Glicko => self.evaluate_glicko(entries, &ids).await?,
        };

        self.generation += 1;
        tracing::info!(
            generation = self.generation,
            entries = entries.len(),
            rounds = report.rounds_played,
            best = report.best_fitness().unwrap_or(0.0),
            "generation evaluated"
        );
        Ok(report)
    }

    /// Stop the worker pool
    pub async fn shutdown(&self) {
        self.pool.terminate().await;
    }

    // ========================================================================
    // Level 2 - Formats
    // ========================================================================

    async fn evaluate_swiss(
        &mut self,
        entries: &[GenomeEntry],
        ids: &[GenomeId],
    ) -> Result<GenerationReport> {
        let players = to_players(entries)?;
        let result = run_swiss(
            &self.pool,
            &players,
            self.player_size,
            self.game_bounds.pair(),
            &mut self.rng,
        )
        .await?;

        let fitness = fitness_entries(entries, ids, |id| result.score_for(id));
        let best = entries
            .iter()
            .zip(&fitness)
            .max_by(|(_, a), (_, b)| {
                a.fitness
                    .partial_cmp(&b.fitness)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(entry, _)| entry.clone());

        Ok(GenerationReport {
            fitness,
            best,
            seed_ai: None,
            rounds_played: result.rounds_played,
        })
    }

    async fn evaluate_glicko(
        &mut self,
        entries: &[GenomeEntry],
        ids: &[GenomeId],
    ) -> Result<GenerationReport> {
        let glicko = self.config.glicko.clone();
        let mut registry = RatingRegistry::new(&glicko);
        for &id in ids {
            registry.get_or_create(id);
        }

        let seed = if glicko.seed_evaluations > 0 {
            let players = to_players(entries)?;
            Some(
                score_seed_tournaments(
                    &self.pool,
                    &players,
                    &mut registry,
                    &glicko,
                    self.environment_bounds.pair(),
                )
                .await?,
            )
        } else {
            None
        };

        // Heroes and fillers join the matches but never the output
        let mut hero_ids = FxHashSet::default();
        let mut filler_ids = FxHashSet::default();
        let mut match_entries = entries.to_vec();
        if self.config.heroes.enabled && !self.hall.is_empty() {
            let heroes = self.hall.inject(
                entries,
                self.config.heroes.max_active,
                &mut registry,
                &mut hero_ids,
                &filler_ids,
            )?;
            match_entries.extend(heroes);
        }
        add_fillers(&mut match_entries, self.player_size, &mut filler_ids, &mut self.rng)?;

        let by_id: FxHashMap<GenomeId, Player> = match_entries
            .iter()
            .map(|e| e.to_player().map(|p| (p.id, p)))
            .collect::<Result<_>>()?;
        let match_ids: Vec<GenomeId> = match_entries
            .iter()
            .map(GenomeEntry::id)
            .collect::<Result<_>>()?;
        for &id in &match_ids {
            registry.get_or_create(id);
        }

        tracing::debug!(
            real = entries.len(),
            heroes = hero_ids.len(),
            fillers = filler_ids.len(),
            "glicko population assembled"
        );

        let env = self
            .play_glicko_rounds(&match_ids, &by_id, &mut registry)
            .await?;

        let fitness = fitness_entries(entries, ids, |id| {
            let env_score = env.averages.get(&id).copied().unwrap_or(0.0);
            let seed_score = seed.as_ref().and_then(|s| s.normalized_for(id));
            let player = registry.get(id).copied().unwrap_or(GlickoPlayer::new(
                glicko.default_rating,
                glicko.default_rd,
                glicko.default_vol,
            ));
            let components = FitnessComponents::from_rating(seed_score, env_score, &player, &glicko);
            glicko_fitness_calculator(&components, &self.config.weights)
        });

        let best = select_best_genome_by_raw_rating(entries, &registry, &filler_ids).cloned();
        if self.config.heroes.enabled {
            self.promote_heroes(entries, &registry);
        }

        Ok(GenerationReport {
            fitness,
            best,
            seed_ai: seed.map(|s| s.seed_ai),
            rounds_played: env.rounds_played,
        })
    }

    // ========================================================================
    // Level 3 - Steps
    // ========================================================================

    /// Adaptive rounds with one rating period each
    async fn play_glicko_rounds(
        &self,
        match_ids: &[GenomeId],
        by_id: &FxHashMap<GenomeId, Player>,
        registry: &mut RatingRegistry,
    ) -> Result<EnvScores> {
        let rounds = self
            .config
            .glicko
            .rounds
            .unwrap_or_else(|| swiss_round_count(match_ids.len()))
            .max(1);
        let mut previous = PreviousOpponents::default();
        let mut totals: FxHashMap<GenomeId, (f64, u32)> = FxHashMap::default();
        let mut rounds_played = 0;

        for round in 0..rounds {
            let pairs = create_glicko_matches(match_ids, registry, &mut previous, self.player_size)?;
            if pairs.is_empty() {
                tracing::debug!(round = round + 1, "no unplayed pairings left");
                break;
            }

            let groups = pairs
                .iter()
                .map(|&(a, b)| players_for(&[a, b], by_id))
                .collect::<Result<Vec<_>>>()?;
            let results = play_round(&self.pool, groups).await?;

            let mut rated = Vec::with_capacity(results.len());
            for scores in results {
                let [a, b] = scores.as_slice() else {
                    return Err(ArenaError::protocol(format!(
                        "pairwise match returned {} scores",
                        scores.len()
                    )));
                };
                let na = self.game_bounds.normalize(a.score);
                let nb = self.game_bounds.normalize(b.score);
                for (id, normalized) in [(a.id, na), (b.id, nb)] {
                    let total = totals.entry(id).or_insert((0.0, 0));
                    total.0 += normalized;
                    total.1 += 1;
                }
                rated.push(RatedMatch {
                    a: a.id,
                    b: b.id,
                    score: pairwise_outcome(na, nb),
                });
            }

            registry.apply_period(&rated);
            rounds_played += 1;
            tracing::debug!(round = round + 1, of = rounds, matches = rated.len(), "glicko round complete");
        }

        Ok(EnvScores {
            averages: totals
                .into_iter()
                .map(|(id, (sum, count))| (id, sum / count as f64))
                .collect(),
            rounds_played,
        })
    }

    /// Move this generation's top rated entries into the hall of fame
    fn promote_heroes(&mut self, entries: &[GenomeEntry], registry: &RatingRegistry) {
        let mut rated: Vec<HeroGenome> = entries
            .iter()
            .filter_map(|entry| {
                let id = entry.id().ok()?;
                registry.get(id).map(|&rating| HeroGenome {
                    entry: entry.clone(),
                    rating,
                })
            })
            .collect();
        rated.sort_by(|a, b| {
            b.rating
                .rating
                .partial_cmp(&a.rating.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rated.truncate(self.config.heroes.per_generation);
        let promoted = rated.len();
        self.hall.admit(rated);
        tracing::debug!(promoted, hall = self.hall.len(), "hall of fame updated");
    }
}

/// Per-genome average normalized game score
struct EnvScores {
    averages: FxHashMap<GenomeId, f64>,
    rounds_played: usize,
}

// ============================================================================
// Level 4 - Utilities
// ============================================================================

fn unique_ids(entries: &[GenomeEntry]) -> Result<Vec<GenomeId>> {
    let mut seen = FxHashSet::default();
    entries
        .iter()
        .map(|entry| {
            let id = entry.id()?;
            if !seen.insert(id) {
                return Err(ArenaError::validation(format!("duplicate genome id {id}")));
            }
            Ok(id)
        })
        .collect()
}

fn to_players(entries: &[GenomeEntry]) -> Result<Vec<Player>> {
    entries.iter().map(GenomeEntry::to_player).collect()
}

fn fitness_entries(
    entries: &[GenomeEntry],
    ids: &[GenomeId],
    mut score: impl FnMut(GenomeId) -> f64,
) -> Vec<FitnessEntry> {
    entries
        .iter()
        .zip(ids)
        .map(|(entry, &id)| FitnessEntry {
            species_index: entry.species_index,
            organism_index: entry.organism_index,
            fitness: score(id),
        })
        .collect()
}
