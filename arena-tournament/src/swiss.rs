//! Swiss scheduler - rank a population in ceil(log2 N) rounds
//!
//! Level 1 - Orchestration and Level 2 - Phases
//!
//! Round one pairs a uniform shuffle; later rounds pair adjacent entries by
//! cumulative score. A short final group is padded with entries taken from
//! the shuffled order, and padded entries keep the score they earn.

use arena_core::{ArenaError, GenomeId, Player, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use rustc_hash::FxHashMap;

use crate::pool::WorkerPool;
use crate::rounds::{play_round, players_for, process_game_scores};

/// Result of a Swiss tournament
#[derive(Clone, Debug, Default)]
pub struct SwissResult {
    /// Cumulative score mapped onto roughly [0, 1]
    pub normalized: FxHashMap<GenomeId, f64>,
    /// Averaged score per genome, one map per round
    pub round_scores: Vec<FxHashMap<GenomeId, f64>>,
    pub rounds_played: usize,
}

impl SwissResult {
    /// Normalized score for a genome (0.0 if it never played)
    pub fn score_for(&self, id: GenomeId) -> f64 {
        self.normalized.get(&id).copied().unwrap_or(0.0)
    }
}

// ============================================================================
// Level 1 - Orchestration
// ============================================================================

/// Run a Swiss tournament over `players`
///
/// # Arguments
/// * `pool` - Worker pool evaluating each group
/// * `players` - Participants, each with a unique id
/// * `player_size` - Seats per match
/// * `score_bounds` - Game's (min, max) raw score per match
/// * `rng` - Source for the round-one shuffle
///
/// A population of fewer than two entries plays no rounds and every entry
/// scores 0.0.
pub async fn run_swiss<R: Rng + ?Sized>(
    pool: &WorkerPool,
    players: &[Player],
    player_size: usize,
    score_bounds: (f64, f64),
    rng: &mut R,
) -> Result<SwissResult> {
    let ids: Vec<GenomeId> = players.iter().map(|p| p.id).collect();
    let rounds = swiss_round_count(ids.len());

    if rounds == 0 {
        tracing::warn!(entries = ids.len(), "population too small for a Swiss round");
        return Ok(SwissResult {
            normalized: ids.iter().map(|&id| (id, 0.0)).collect(),
            ..Default::default()
        });
    }
    if player_size == 0 || ids.len() < player_size {
        return Err(ArenaError::validation(format!(
            "{} entries cannot fill matches of {}",
            ids.len(),
            player_size
        )));
    }

    let by_id: FxHashMap<GenomeId, Player> =
        players.iter().map(|p| (p.id, p.clone())).collect();
    if by_id.len() != ids.len() {
        return Err(ArenaError::validation("duplicate genome ids in Swiss population"));
    }

    let mut shuffled = ids.clone();
    shuffled.shuffle(rng);

    let mut cumulative: FxHashMap<GenomeId, f64> = ids.iter().map(|&id| (id, 0.0)).collect();
    let mut round_scores = Vec::with_capacity(rounds);

    for round in 0..rounds {
        let order = if round == 0 {
            shuffled.clone()
        } else {
            rank_by_score(&shuffled, &cumulative)
        };

        let scores = play_swiss_round(pool, &order, &shuffled, player_size, &by_id).await?;
        for (id, score) in &scores {
            *cumulative.entry(*id).or_insert(0.0) += score;
        }

        tracing::debug!(round = round + 1, of = rounds, "swiss round complete");
        round_scores.push(scores);
    }

    let normalized = normalize_tournament_scores(&round_scores, score_bounds.0, score_bounds.1);

    Ok(SwissResult {
        normalized,
        round_scores,
        rounds_played: rounds,
    })
}

// ============================================================================
// Level 2 - Phases
// ============================================================================

/// Pair, dispatch and average one round
async fn play_swiss_round(
    pool: &WorkerPool,
    order: &[GenomeId],
    shuffled: &[GenomeId],
    player_size: usize,
    by_id: &FxHashMap<GenomeId, Player>,
) -> Result<FxHashMap<GenomeId, f64>> {
    let groups = create_swiss_groups(order, shuffled, player_size)
        .iter()
        .map(|group| players_for(group, by_id))
        .collect::<Result<Vec<_>>>()?;

    let results = play_round(pool, groups).await?;
    Ok(process_game_scores(results.into_iter().flatten()))
}

// ============================================================================
// Level 3 - Steps
// ============================================================================

/// ceil(log2 n), zero for n < 2
pub fn swiss_round_count(n: usize) -> usize {
    if n < 2 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// Order ids by score, highest first; ties keep their relative order
pub fn rank_by_score(ids: &[GenomeId], scores: &FxHashMap<GenomeId, f64>) -> Vec<GenomeId> {
    let score = |id: &GenomeId| scores.get(id).copied().unwrap_or(0.0);
    let mut ranked = ids.to_vec();
    ranked.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

/// Partition `order` into groups of `player_size`
///
/// A short final group is topped up from `padding_order`, skipping ids
/// already in that group.
pub fn create_swiss_groups(
    order: &[GenomeId],
    padding_order: &[GenomeId],
    player_size: usize,
) -> Vec<Vec<GenomeId>> {
    if player_size == 0 {
        return Vec::new();
    }

    let mut groups: Vec<Vec<GenomeId>> = order.chunks(player_size).map(<[_]>::to_vec).collect();

    if let Some(last) = groups.last_mut() {
        for &id in padding_order {
            if last.len() >= player_size {
                break;
            }
            if !last.contains(&id) {
                last.push(id);
            }
        }
    }

    groups
}

/// Map cumulative per-round scores onto roughly [0, 1]
///
/// `(sum - min * rounds) / ((max - min) * rounds)`. Raw scores outside the
/// declared bounds map outside [0, 1]; nothing is clamped.
pub fn normalize_tournament_scores(
    round_scores: &[FxHashMap<GenomeId, f64>],
    min_score: f64,
    max_score: f64,
) -> FxHashMap<GenomeId, f64> {
    let rounds = round_scores.len() as f64;
    let mut sums: FxHashMap<GenomeId, f64> = FxHashMap::default();
    for scores in round_scores {
        for (&id, &score) in scores {
            *sums.entry(id).or_insert(0.0) += score;
        }
    }

    let span = (max_score - min_score) * rounds;
    sums.into_iter()
        .map(|(id, sum)| {
            let normalized = if span == 0.0 {
                0.0
            } else {
                (sum - min_score * rounds) / span
            };
            (id, normalized)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    fn ids(n: u32) -> Vec<GenomeId> {
        (0..n).map(|o| GenomeId::pack(0, o).unwrap()).collect()
    }

    #[test]
    fn test_swiss_round_count() {
        assert_eq!(swiss_round_count(0), 0);
        assert_eq!(swiss_round_count(1), 0);
        assert_eq!(swiss_round_count(2), 1);
        assert_eq!(swiss_round_count(3), 2);
        assert_eq!(swiss_round_count(4), 2);
        assert_eq!(swiss_round_count(5), 3);
        assert_eq!(swiss_round_count(1024), 10);
        assert_eq!(swiss_round_count(1025), 11);
    }

    #[test]
    fn test_groups_even_population() {
        let order = ids(4);
        let groups = create_swiss_groups(&order, &order, 2);

        assert_eq!(groups.len(), 2);
        let mut seen = FxHashSet::default();
        for group in &groups {
            assert_eq!(group.len(), 2);
            for id in group {
                assert!(seen.insert(*id), "player appeared twice");
            }
        }
    }

    #[test]
    fn test_groups_odd_population_pads_once() {
        let order = ids(5);
        let mut shuffled = order.clone();
        shuffled.reverse();
        let groups = create_swiss_groups(&order, &shuffled, 2);

        assert_eq!(groups.len(), 3);
        let mut counts: FxHashMap<GenomeId, usize> = FxHashMap::default();
        for group in &groups {
            assert_eq!(group.len(), 2);
            assert_ne!(group[0], group[1], "duplicate player within a game");
            for id in group {
                *counts.entry(*id).or_insert(0) += 1;
            }
        }
        assert_eq!(counts.len(), 5);
        assert_eq!(counts.values().filter(|&&c| c == 2).count(), 1);
    }

    #[test]
    fn test_padding_skips_members_of_last_group() {
        let order = ids(5);
        // First padding candidate is already in the last group
        let padding = vec![order[4], order[2]];
        let groups = create_swiss_groups(&order, &padding, 2);
        assert_eq!(groups[2], vec![order[4], order[2]]);
    }

    #[test]
    fn test_round_two_pairs_adjacent_ranks() {
        let order = ids(5);
        let scores: FxHashMap<GenomeId, f64> = order
            .iter()
            .zip([1.0, 2.0, 3.0, 4.0, 5.0])
            .map(|(&id, s)| (id, s))
            .collect();

        let ranked = rank_by_score(&order, &scores);
        let groups = create_swiss_groups(&ranked, &order, 2);

        assert_eq!(groups[0], vec![order[4], order[3]]);
        assert_eq!(groups[1], vec![order[2], order[1]]);
        assert_eq!(groups[2][0], order[0]);
        assert_eq!(groups[2].len(), 2);
        assert_ne!(groups[2][1], order[0]);
    }

    #[test]
    fn test_groups_larger_match_size() {
        let order = ids(7);
        let groups = create_swiss_groups(&order, &order, 3);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2], vec![order[6], order[0], order[1]]);
    }

    #[test]
    fn test_normalize_maps_to_unit_range() {
        let a = GenomeId::pack(0, 1).unwrap();
        let b = GenomeId::pack(0, 2).unwrap();
        let round1: FxHashMap<_, _> = [(a, 1.0), (b, 0.0)].into_iter().collect();
        let round2: FxHashMap<_, _> = [(a, 1.0), (b, 0.5)].into_iter().collect();

        let normalized = normalize_tournament_scores(&[round1, round2], 0.0, 1.0);
        assert_eq!(normalized[&a], 1.0);
        assert_eq!(normalized[&b], 0.25);
    }

    #[test]
    fn test_normalize_shifts_by_min_score() {
        let a = GenomeId::pack(0, 1).unwrap();
        let round: FxHashMap<_, _> = [(a, 0.0)].into_iter().collect();
        let normalized = normalize_tournament_scores(&[round.clone(), round], -1.0, 1.0);
        assert_eq!(normalized[&a], 0.5);
    }

    #[test]
    fn test_normalize_does_not_clamp() {
        let a = GenomeId::pack(0, 1).unwrap();
        let round: FxHashMap<_, _> = [(a, 1.5)].into_iter().collect();
        let normalized = normalize_tournament_scores(&[round], 0.0, 1.0);
        assert!(normalized[&a] > 1.0);
    }

    #[test]
    fn test_normalize_zero_rounds() {
        assert!(normalize_tournament_scores(&[], 0.0, 1.0).is_empty());
    }
}
