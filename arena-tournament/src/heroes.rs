//! Hero curation - hall of fame, ID mangling and filler padding
//!
//! Level 3 - Step-level implementation
//!
//! Heroes are strong genomes from earlier generations replayed as opponents.
//! They enter a generation under mangled ids far above the population's own
//! indices. Fillers are clones that pad a population to a whole number of
//! matches. Neither appears in fitness output.

use arena_core::{ArenaError, GenomeEntry, GenomeId, Result};
use rand::Rng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::glicko::{GlickoPlayer, RatingRegistry};

/// Offset between the population's highest index and hero indices
pub const HERO_ID_OFFSET: u32 = 100_000;

/// A past genome with the rating it earned
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeroGenome {
    pub entry: GenomeEntry,
    pub rating: GlickoPlayer,
}

// ============================================================================
// Sampling
// ============================================================================

/// Evenly spaced picks from `n` sorted candidates
pub fn uniform_sample_indices(n: usize, max_active: usize) -> Vec<usize> {
    if n <= max_active {
        return (0..n).collect();
    }
    match max_active {
        0 => Vec::new(),
        1 => vec![n - 1],
        m => (0..m)
            .map(|i| ((i * (n - 1)) as f64 / (m - 1) as f64).round() as usize)
            .collect(),
    }
}

/// Pick at most `max_active` heroes spread across the rating range
///
/// Candidates are sorted by rating ascending; the weakest and strongest are
/// always kept. A single slot keeps the strongest.
pub fn sample_heroes_uniformly(mut heroes: Vec<HeroGenome>, max_active: usize) -> Vec<HeroGenome> {
    if heroes.len() <= max_active {
        return heroes;
    }
    heroes.sort_by(|a, b| {
        a.rating
            .rating
            .partial_cmp(&b.rating.rating)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    uniform_sample_indices(heroes.len(), max_active)
        .into_iter()
        .map(|i| heroes[i].clone())
        .collect()
}

// ============================================================================
// Synthetic ids
// ============================================================================

/// Highest species and organism index among entries not in `excluded`
fn max_indices(entries: &[GenomeEntry], excluded: &[&FxHashSet<GenomeId>]) -> Result<(u32, u32)> {
    let mut max = (0, 0);
    for entry in entries {
        let id = entry.id()?;
        if excluded.iter().any(|set| set.contains(&id)) {
            continue;
        }
        max.0 = max.0.max(entry.species_index);
        max.1 = max.1.max(entry.organism_index);
    }
    Ok(max)
}

/// Copy of `original` under a mangled id
///
/// The base indices come from the real population only, so existing heroes
/// and fillers never push later heroes' ids upward.
pub fn create_mangled_hero_entry(
    original: &GenomeEntry,
    hero_index: usize,
    population: &[GenomeEntry],
    hero_ids: &FxHashSet<GenomeId>,
    filler_ids: &FxHashSet<GenomeId>,
) -> Result<GenomeEntry> {
    let (max_species, max_organism) = max_indices(population, &[hero_ids, filler_ids])?;
    let hero_index = u32::try_from(hero_index)
        .map_err(|_| ArenaError::validation(format!("hero index {hero_index} too large")))?;

    let entry = GenomeEntry::new(
        max_species.saturating_add(HERO_ID_OFFSET),
        max_organism
            .saturating_add(HERO_ID_OFFSET)
            .saturating_add(hero_index),
        original.options.clone(),
    );
    entry.id()?;
    Ok(entry)
}

/// Highest-rated entry that is not a filler
pub fn select_best_genome_by_raw_rating<'a>(
    entries: &'a [GenomeEntry],
    ratings: &RatingRegistry,
    filler_ids: &FxHashSet<GenomeId>,
) -> Option<&'a GenomeEntry> {
    let mut best: Option<(&GenomeEntry, f64)> = None;
    for entry in entries {
        let Ok(id) = entry.id() else { continue };
        if filler_ids.contains(&id) {
            continue;
        }
        let Some(rating) = ratings.rating(id) else { continue };
        if best.map_or(true, |(_, r)| rating > r) {
            best = Some((entry, rating));
        }
    }
    best.map(|(entry, _)| entry)
}

/// Pad `entries` to a multiple of `match_player_size` with clones
///
/// Each filler copies a randomly chosen existing entry under the id
/// (max species, max organism + k). Filler ids are recorded so they can be
/// dropped from the output.
pub fn add_fillers<R: Rng + ?Sized>(
    entries: &mut Vec<GenomeEntry>,
    match_player_size: usize,
    filler_ids: &mut FxHashSet<GenomeId>,
    rng: &mut R,
) -> Result<()> {
    if match_player_size == 0 {
        return Err(ArenaError::validation("match size must be at least 1"));
    }
    let remainder = entries.len() % match_player_size;
    if entries.is_empty() || remainder == 0 {
        return Ok(());
    }

    let (max_species, max_organism) = max_indices(entries, &[])?;
    let originals = entries.len();
    for k in 1..=(match_player_size - remainder) as u32 {
        let source = &entries[rng.gen_range(0..originals)];
        let filler = GenomeEntry::new(
            max_species,
            max_organism.saturating_add(k),
            source.options.clone(),
        );
        filler_ids.insert(filler.id()?);
        entries.push(filler);
    }
    Ok(())
}

// ============================================================================
// Hall of fame
// ============================================================================

/// Capped pool of past heroes, kept for the engine's lifetime
#[derive(Clone, Debug)]
pub struct HallOfFame {
    heroes: Vec<HeroGenome>,
    capacity: usize,
}

impl HallOfFame {
    pub fn new(capacity: usize) -> Self {
        Self {
            heroes: Vec::new(),
            capacity,
        }
    }

    pub fn heroes(&self) -> &[HeroGenome] {
        &self.heroes
    }

    pub fn len(&self) -> usize {
        self.heroes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heroes.is_empty()
    }

    /// Add heroes, then thin the hall back down to capacity
    pub fn admit(&mut self, heroes: impl IntoIterator<Item = HeroGenome>) {
        self.heroes.extend(heroes);
        if self.heroes.len() > self.capacity {
            let all = std::mem::take(&mut self.heroes);
            self.heroes = sample_heroes_uniformly(all, self.capacity);
        }
    }

    /// Mangled entries for up to `max_active` heroes
    ///
    /// Each hero is registered in `registry` with its stored rating and its
    /// mangled id is added to `hero_ids`.
    pub fn inject(
        &self,
        population: &[GenomeEntry],
        max_active: usize,
        registry: &mut RatingRegistry,
        hero_ids: &mut FxHashSet<GenomeId>,
        filler_ids: &FxHashSet<GenomeId>,
    ) -> Result<Vec<GenomeEntry>> {
        let active = sample_heroes_uniformly(self.heroes.clone(), max_active);
        let mut entries = Vec::with_capacity(active.len());

        for (index, hero) in active.iter().enumerate() {
            let entry =
                create_mangled_hero_entry(&hero.entry, index, population, hero_ids, filler_ids)?;
            let id = entry.id()?;
            registry.insert(id, hero.rating);
            hero_ids.insert(id);
            entries.push(entry);
        }

        Ok(entries)
    }
}
