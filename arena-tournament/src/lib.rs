//! Arena Tournament - Population evaluation through pooled match play
//!
//! This crate provides the tournament infrastructure:
//! - A worker pool running matches on dedicated threads
//! - Swiss scheduling by cumulative score
//! - Glicko-2 matchmaking with baseline seeding and a hall of fame
//! - Weighted fitness composition
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: TournamentEngine::evaluate, run_swiss (orchestration)
//! - Level 2: play_round, score_seed_tournaments, matchmaking (phases)
//! - Level 3: pairing, hero mangling, fillers, rating updates (steps)
//! - Level 4: configuration, protocol, utilities

mod cache;
mod config;
pub mod demo;
mod engine;
mod fitness;
mod glicko;
mod heroes;
mod matchmaking;
mod pool;
mod protocol;
mod rounds;
mod swiss;
mod worker;

pub use config::{
    EngineConfig, FitnessWeights, GlickoConfig, HeroConfig, PluginKeys, TournamentFormat,
};
pub use engine::{GenerationReport, ScoreBounds, TournamentEngine};
pub use fitness::{glicko_fitness_calculator, FitnessComponents};
pub use glicko::{Glicko2, GlickoPlayer, RatedMatch, RatingRegistry};
pub use heroes::{
    add_fillers, create_mangled_hero_entry, sample_heroes_uniformly,
    select_best_genome_by_raw_rating, HallOfFame, HeroGenome, HERO_ID_OFFSET,
};
pub use matchmaking::{
    create_glicko_matches, pairwise_outcome, score_seed_tournaments, PreviousOpponents,
    SeedOutcome,
};
pub use pool::{PoolConfig, WorkerPool};
pub use protocol::{
    ActionType, EvaluatorInit, GenomeFactoryInit, MatchMode, MatchRequest, Message,
};
pub use rounds::{play_baseline_round, play_round, process_game_scores};
pub use swiss::{
    create_swiss_groups, normalize_tournament_scores, rank_by_score, run_swiss,
    swiss_round_count, SwissResult,
};
