//! Fitness composition - blend rating components into one scalar
//!
//! Level 2 - Phase-level implementation

use crate::config::{FitnessWeights, GlickoConfig};
use crate::glicko::GlickoPlayer;

/// Normalized inputs to the fitness blend for one genome
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FitnessComponents {
    /// Average normalized seed score; absent when seeding is off
    pub seed: Option<f64>,
    /// Average normalized game score across adaptive rounds
    pub env: f64,
    /// Normalized rating
    pub glicko: f64,
    /// Normalized `rating - 2 * rd`
    pub conservative: f64,
}

impl FitnessComponents {
    /// Components for a rated genome
    ///
    /// Ratings map through the configured range; nothing is clamped, so a
    /// conservative rating below the floor gives a negative component.
    pub fn from_rating(
        seed: Option<f64>,
        env: f64,
        player: &GlickoPlayer,
        config: &GlickoConfig,
    ) -> Self {
        Self {
            seed,
            env,
            glicko: config.normalize_rating(player.rating),
            conservative: config.normalize_rating(player.conservative_rating()),
        }
    }
}

/// Weighted sum of the components
///
/// With no seed score the seed weight moves onto the rating weight, so the
/// total weight is unchanged. The result is not clamped.
pub fn glicko_fitness_calculator(components: &FitnessComponents, weights: &FitnessWeights) -> f64 {
    let (seed_term, glicko_weight) = match components.seed {
        Some(seed) => (seed * weights.seed, weights.glicko),
        None => (0.0, weights.glicko + weights.seed),
    };

    seed_term
        + components.env * weights.env
        + components.glicko * glicko_weight
        + components.conservative * weights.conservative
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> FitnessWeights {
        FitnessWeights {
            seed: 0.2,
            env: 0.3,
            glicko: 0.4,
            conservative: 0.1,
        }
    }

    #[test]
    fn test_all_ones_sum_to_one() {
        let components = FitnessComponents {
            seed: Some(1.0),
            env: 1.0,
            glicko: 1.0,
            conservative: 1.0,
        };
        let fitness = glicko_fitness_calculator(&components, &weights());
        assert!((fitness - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_missing_seed_folds_into_glicko() {
        let components = FitnessComponents {
            seed: None,
            env: 0.6,
            glicko: 0.7,
            conservative: 0.4,
        };
        let fitness = glicko_fitness_calculator(&components, &weights());
        assert!((fitness - 0.64).abs() < 1e-5);
    }

    #[test]
    fn test_fitness_not_clamped() {
        let components = FitnessComponents {
            seed: Some(1.5),
            env: 1.5,
            glicko: 1.5,
            conservative: 1.5,
        };
        assert!(glicko_fitness_calculator(&components, &weights()) > 1.0);

        let low = FitnessComponents {
            conservative: -2.0,
            ..Default::default()
        };
        assert!(glicko_fitness_calculator(&low, &weights()) < 0.0);
    }

    #[test]
    fn test_components_from_rating() {
        let config = GlickoConfig::default();
        let player = GlickoPlayer::new(1500.0, 350.0, 0.06);
        let components = FitnessComponents::from_rating(Some(0.5), 0.25, &player, &config);

        assert_eq!(components.seed, Some(0.5));
        assert_eq!(components.env, 0.25);
        assert!((components.glicko - 0.5).abs() < 1e-12);
        assert!((components.conservative - 800.0 / 3000.0).abs() < 1e-12);
    }
}
