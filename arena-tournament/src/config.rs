//! Configuration types for tournament evaluation
//!
//! Level 4 - Utilities and configuration

use arena_core::{ArenaError, Result};
use serde::{Deserialize, Serialize};

/// Pairing strategy for a generation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentFormat {
    /// Pair by cumulative score for ceil(log2 N) rounds
    #[default]
    Swiss,
    /// Pair by live Glicko-2 rating, with seeding and heroes
    Glicko,
}

/// Glicko-2 system and matchmaking parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlickoConfig {
    /// System constant constraining volatility change
    pub tau: f64,
    /// Rating for a genome seen for the first time
    pub default_rating: f64,
    pub default_rd: f64,
    pub default_vol: f64,
    /// Priors for the virtual baseline player
    pub seed_ai_rating: f64,
    pub seed_ai_rd: f64,
    pub seed_ai_vol: f64,
    /// Baseline rounds before adaptive pairing (0 disables seeding)
    pub seed_evaluations: usize,
    /// Adaptive rounds; None means ceil(log2 N)
    pub rounds: Option<usize>,
    /// Rating mapped to 0.0 when normalizing
    pub rating_floor: f64,
    /// Rating mapped to 1.0 when normalizing
    pub rating_ceiling: f64,
}

impl Default for GlickoConfig {
    fn default() -> Self {
        Self {
            tau: 0.5,
            default_rating: 1500.0,
            default_rd: 350.0,
            default_vol: 0.06,
            seed_ai_rating: 1500.0,
            seed_ai_rd: 350.0,
            seed_ai_vol: 0.06,
            seed_evaluations: 3,
            rounds: None,
            rating_floor: 0.0,
            rating_ceiling: 3000.0,
        }
    }
}

impl GlickoConfig {
    /// Map a rating onto the configured range without clamping
    pub fn normalize_rating(&self, rating: f64) -> f64 {
        (rating - self.rating_floor) / (self.rating_ceiling - self.rating_floor)
    }
}

/// Hall of fame parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeroConfig {
    pub enabled: bool,
    /// Heroes injected into one generation
    pub max_active: usize,
    /// Heroes retained across generations
    pub hall_capacity: usize,
    /// Top performers promoted after each generation
    pub per_generation: usize,
}

impl Default for HeroConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_active: 4,
            hall_capacity: 64,
            per_generation: 1,
        }
    }
}

/// Weights for the fitness composer
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessWeights {
    pub seed: f64,
    pub env: f64,
    pub glicko: f64,
    pub conservative: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            seed: 0.2,
            env: 0.3,
            glicko: 0.4,
            conservative: 0.1,
        }
    }
}

impl FitnessWeights {
    pub fn validate(&self) -> Result<()> {
        let all = [
            ("seed", self.seed),
            ("env", self.env),
            ("glicko", self.glicko),
            ("conservative", self.conservative),
        ];
        for (name, weight) in all {
            if !(weight > 0.0) {
                return Err(ArenaError::validation(format!(
                    "{name} weight must be positive, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

/// Keys the workers use to resolve their collaborators
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginKeys {
    pub game: String,
    pub environment: String,
    pub genome_factory: String,
}

impl PluginKeys {
    pub fn new(
        game: impl Into<String>,
        environment: impl Into<String>,
        genome_factory: impl Into<String>,
    ) -> Self {
        Self {
            game: game.into(),
            environment: environment.into(),
            genome_factory: genome_factory.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.game.is_empty() || self.environment.is_empty() || self.genome_factory.is_empty() {
            return Err(ArenaError::validation("plugin keys must not be empty"));
        }
        Ok(())
    }
}

/// Engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub format: TournamentFormat,
    /// Worker threads
    pub thread_count: usize,
    /// Match requests admitted at once, queued ones included
    pub task_capacity: usize,
    /// Random seed for reproducibility (None = entropy)
    pub seed: Option<u64>,
    pub glicko: GlickoConfig,
    pub heroes: HeroConfig,
    pub weights: FitnessWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            format: TournamentFormat::Swiss,
            thread_count: 4,
            task_capacity: 256,
            seed: None,
            glicko: GlickoConfig::default(),
            heroes: HeroConfig::default(),
            weights: FitnessWeights::default(),
        }
    }
}

impl EngineConfig {
    /// Create Swiss config with the given worker count
    pub fn swiss(thread_count: usize) -> Self {
        Self {
            format: TournamentFormat::Swiss,
            thread_count,
            ..Default::default()
        }
    }

    /// Create Glicko config with the given worker count
    pub fn glicko(thread_count: usize) -> Self {
        Self {
            format: TournamentFormat::Glicko,
            thread_count,
            ..Default::default()
        }
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_weights(mut self, weights: FitnessWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_heroes(mut self, heroes: HeroConfig) -> Self {
        self.heroes = heroes;
        self
    }

    pub fn with_glicko(mut self, glicko: GlickoConfig) -> Self {
        self.glicko = glicko;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(ArenaError::validation("thread_count must be at least 1"));
        }
        if self.task_capacity == 0 {
            return Err(ArenaError::validation("task_capacity must be at least 1"));
        }
        if !(self.glicko.rating_ceiling > self.glicko.rating_floor) {
            return Err(ArenaError::validation(format!(
                "rating range [{}, {}] is empty",
                self.glicko.rating_floor, self.glicko.rating_ceiling
            )));
        }
        if self.glicko.tau <= 0.0 {
            return Err(ArenaError::validation("tau must be positive"));
        }
        if self.heroes.enabled && self.heroes.hall_capacity == 0 {
            return Err(ArenaError::validation(
                "hall_capacity must be at least 1 when heroes are enabled",
            ));
        }
        self.weights.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.format, TournamentFormat::Swiss);
        assert_eq!(config.thread_count, 4);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_config_glicko() {
        let config = EngineConfig::glicko(2).with_seed(7);
        assert_eq!(config.format, TournamentFormat::Glicko);
        assert_eq!(config.thread_count, 2);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = EngineConfig::swiss(0);
        assert!(matches!(config.validate(), Err(ArenaError::Validation(_))));
    }

    #[test]
    fn test_non_positive_weight_rejected() {
        let weights = FitnessWeights {
            glicko: 0.0,
            ..Default::default()
        };
        assert!(weights.validate().is_err());

        let weights = FitnessWeights {
            seed: -0.1,
            ..Default::default()
        };
        assert!(EngineConfig::default().with_weights(weights).validate().is_err());
    }

    #[test]
    fn test_empty_plugin_key_rejected() {
        assert!(PluginKeys::new("duel", "", "linear").validate().is_err());
        assert!(PluginKeys::new("duel", "baseline", "linear").validate().is_ok());
    }

    #[test]
    fn test_normalize_rating_not_clamped() {
        let glicko = GlickoConfig::default();
        assert_eq!(glicko.normalize_rating(1500.0), 0.5);
        assert!(glicko.normalize_rating(3300.0) > 1.0);
        assert!(glicko.normalize_rating(-150.0) < 0.0);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"format": "glicko", "thread_count": 8, "heroes": {"max_active": 2}}"#)
                .unwrap();
        assert_eq!(config.format, TournamentFormat::Glicko);
        assert_eq!(config.thread_count, 8);
        assert_eq!(config.heroes.max_active, 2);
        assert_eq!(config.heroes.hall_capacity, 64);
        assert_eq!(config.weights, FitnessWeights::default());
    }
}
