//! Glicko matchmaking - rating-ordered pairing and baseline seeding
//!
//! Level 2 - Phase-level implementation

use arena_core::{ArenaError, GenomeId, Player, PlayerScore, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::JoinSet;

use crate::config::GlickoConfig;
use crate::glicko::{GlickoPlayer, RatingRegistry};
use crate::pool::WorkerPool;
use crate::rounds::play_baseline_round;

/// Opponents already faced, accumulated across one session's rounds
pub type PreviousOpponents = FxHashMap<GenomeId, FxHashSet<GenomeId>>;

// ============================================================================
// Pairing
// ============================================================================

/// Pair entries by current rating without rematches
///
/// Entries are sorted by rating, highest first (unrated counts as 0). Each
/// unpaired entry takes the next unpaired entry below it that it has not
/// faced yet; an entry with no such candidate sits out the round. New pairs
/// are recorded in `previous` in both directions.
pub fn create_glicko_matches(
    entries: &[GenomeId],
    ratings: &RatingRegistry,
    previous: &mut PreviousOpponents,
    player_size: usize,
) -> Result<Vec<(GenomeId, GenomeId)>> {
    if player_size != 2 {
        return Err(ArenaError::validation(format!(
            "glicko matchmaking pairs two players, got match size {player_size}"
        )));
    }

    let rating = |id: &GenomeId| ratings.rating(*id).unwrap_or(0.0);
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| {
        rating(b)
            .partial_cmp(&rating(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut paired = vec![false; sorted.len()];
    let mut matches = Vec::with_capacity(sorted.len() / 2);

    for i in 0..sorted.len() {
        if paired[i] {
            continue;
        }
        let a = sorted[i];
        let faced = previous.get(&a);
        let partner = (i + 1..sorted.len()).find(|&j| {
            !paired[j] && sorted[j] != a && !faced.is_some_and(|set| set.contains(&sorted[j]))
        });

        if let Some(j) = partner {
            let b = sorted[j];
            paired[i] = true;
            paired[j] = true;
            previous.entry(a).or_default().insert(b);
            previous.entry(b).or_default().insert(a);
            matches.push((a, b));
        }
    }

    Ok(matches)
}

/// Outcome of a pairwise game for the first player, in [0, 1]
///
/// Both scores are already normalized onto the game's range.
pub fn pairwise_outcome(normalized_a: f64, normalized_b: f64) -> f64 {
    (0.5 + (normalized_a - normalized_b) / 2.0).clamp(0.0, 1.0)
}

// ============================================================================
// Seed tournaments
// ============================================================================

/// Averages from the baseline seeding pass
#[derive(Clone, Debug)]
pub struct SeedOutcome {
    /// Average raw environment score per genome
    pub raw: FxHashMap<GenomeId, f64>,
    /// Average score normalized onto the environment range, unclamped
    pub normalized: FxHashMap<GenomeId, f64>,
    /// Virtual baseline player's rating after the last round
    pub seed_ai: GlickoPlayer,
}

impl SeedOutcome {
    pub fn normalized_for(&self, id: GenomeId) -> Option<f64> {
        self.normalized.get(&id).copied()
    }
}

/// Warm ratings up against the environment baseline
///
/// All `seed_evaluations` rounds are dispatched at once. Results are then
/// folded in round order: every entry plays the SeedAI once per round, and
/// each round is one batched rating period for entries and SeedAI alike.
pub async fn score_seed_tournaments(
    pool: &WorkerPool,
    players: &[Player],
    registry: &mut RatingRegistry,
    config: &GlickoConfig,
    score_bounds: (f64, f64),
) -> Result<SeedOutcome> {
    let rounds = run_seed_rounds(pool, players, config.seed_evaluations).await?;

    let (min_score, max_score) = score_bounds;
    let span = max_score - min_score;
    let normalize = |raw: f64| if span == 0.0 { 0.0 } else { (raw - min_score) / span };

    let system = registry.system();
    let mut seed_ai = GlickoPlayer::new(config.seed_ai_rating, config.seed_ai_rd, config.seed_ai_vol);
    let mut raw_sums: FxHashMap<GenomeId, f64> = FxHashMap::default();
    let mut norm_sums: FxHashMap<GenomeId, f64> = FxHashMap::default();

    for scores in &rounds {
        let mut seed_results = Vec::with_capacity(scores.len());
        let mut updated = Vec::with_capacity(scores.len());

        for score in scores {
            let normalized = normalize(score.score);
            let outcome = normalized.clamp(0.0, 1.0);
            *raw_sums.entry(score.id).or_insert(0.0) += score.score;
            *norm_sums.entry(score.id).or_insert(0.0) += normalized;

            let before = registry.get_or_create(score.id);
            updated.push((score.id, system.rate(before, &[(seed_ai, outcome)])));
            seed_results.push((before, 1.0 - outcome));
        }

        seed_ai = system.rate(seed_ai, &seed_results);
        for (id, player) in updated {
            registry.insert(id, player);
        }
    }

    tracing::debug!(
        rounds = rounds.len(),
        seed_ai_rating = seed_ai.rating,
        "seed tournaments complete"
    );

    let count = rounds.len().max(1) as f64;
    Ok(SeedOutcome {
        raw: raw_sums.into_iter().map(|(id, s)| (id, s / count)).collect(),
        normalized: norm_sums.into_iter().map(|(id, s)| (id, s / count)).collect(),
        seed_ai,
    })
}

/// Dispatch every seed round concurrently, results indexed by round
async fn run_seed_rounds(
    pool: &WorkerPool,
    players: &[Player],
    evaluations: usize,
) -> Result<Vec<Vec<PlayerScore>>> {
    let mut set = JoinSet::new();
    for round in 0..evaluations {
        let pool = pool.clone();
        let players = players.to_vec();
        set.spawn(async move { (round, play_baseline_round(&pool, players).await) });
    }

    let mut rounds = vec![Vec::new(); evaluations];
    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((round, Ok(scores))) => rounds[round] = scores,
            Ok((_, Err(e))) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(ArenaError::protocol(format!(
                    "seed round task failed: {e}"
                )));
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(rounds),
    }
}
