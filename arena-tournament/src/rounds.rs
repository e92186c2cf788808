//! Round dispatch - fire every match of a round, await them all
//!
//! Level 2 - Phase-level implementation

use arena_core::{ArenaError, GenomeId, Player, PlayerScore, Result};
use rustc_hash::FxHashMap;
use tokio::task::JoinSet;

use crate::pool::WorkerPool;

/// Play every group concurrently through the pool
///
/// Returns one score list per match, in completion order. All matches are
/// drained even after a failure so no request is left running; the first
/// error is returned.
pub async fn play_round(
    pool: &WorkerPool,
    groups: Vec<Vec<Player>>,
) -> Result<Vec<Vec<PlayerScore>>> {
    let mut set = JoinSet::new();
    for group in groups {
        let pool = pool.clone();
        set.spawn(async move { pool.evaluate_match(group).await });
    }
    collect(set).await
}

/// Score every player against the environment baseline concurrently
pub async fn play_baseline_round(pool: &WorkerPool, players: Vec<Player>) -> Result<Vec<PlayerScore>> {
    let mut set = JoinSet::new();
    for player in players {
        let pool = pool.clone();
        set.spawn(async move { pool.evaluate_baseline(player).await });
    }
    collect(set).await
}

async fn collect<T: Send + 'static>(mut set: JoinSet<Result<T>>) -> Result<Vec<T>> {
    let mut scores = Vec::with_capacity(set.len());
    let mut first_error = None;

    while let Some(joined) = set.join_next().await {
        let outcome = joined
            .map_err(|e| ArenaError::protocol(format!("match task failed: {e}")))
            .and_then(|result| result);
        match outcome {
            Ok(value) => scores.push(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(scores),
    }
}

/// Average every score a genome earned this round
pub fn process_game_scores(
    results: impl IntoIterator<Item = PlayerScore>,
) -> FxHashMap<GenomeId, f64> {
    let mut totals: FxHashMap<GenomeId, (f64, u32)> = FxHashMap::default();
    for result in results {
        let total = totals.entry(result.id).or_insert((0.0, 0));
        total.0 += result.score;
        total.1 += 1;
    }

    totals
        .into_iter()
        .map(|(id, (sum, count))| (id, sum / count as f64))
        .collect()
}

/// Resolve a group of ids to wire players
pub fn players_for(
    group: &[GenomeId],
    players: &FxHashMap<GenomeId, Player>,
) -> Result<Vec<Player>> {
    group
        .iter()
        .map(|id| {
            players
                .get(id)
                .cloned()
                .ok_or_else(|| ArenaError::validation(format!("unknown genome {id} in pairing")))
        })
        .collect()
}
