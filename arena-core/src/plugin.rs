//! Collaborator interfaces and the plugin registry
//!
//! The engine never knows which game is played or how a genome becomes a
//! runnable network. Those pieces register a constructor under a string key
//! at process start; workers resolve the keys they are told about in
//! `INIT_EVALUATOR`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ArenaError, Result};
use crate::genome::GenomeFactoryOptions;

/// Future that stays on the worker thread that created it
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Runnable form of a genome
pub trait Executor {
    fn execute(&mut self, input: &[f64]) -> Result<Vec<f64>>;

    /// Whether this executor must be driven through [`Executor::execute_async`]
    fn is_async(&self) -> bool {
        false
    }

    fn execute_async<'a>(&'a mut self, input: &'a [f64]) -> LocalBoxFuture<'a, Result<Vec<f64>>> {
        Box::pin(async move { self.execute(input) })
    }
}

/// Outcome of one game or environment evaluation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameData {
    /// Raw score per executor, in seat order
    pub scores: Vec<f64>,
    /// Game length, informational only
    pub rounds: u32,
}

impl GameData {
    pub fn new(scores: Vec<f64>) -> Self {
        Self { scores, rounds: 0 }
    }
}

/// A game that pits `player_size` executors against each other
pub trait GameExecutor {
    fn description(&self) -> &str;

    /// Seats per match
    fn player_size(&self) -> usize;

    /// Lowest raw score a seat can earn
    fn min_score(&self) -> f64;

    /// Highest raw score a seat can earn
    fn max_score(&self) -> f64;

    fn is_async(&self) -> bool {
        false
    }

    fn play(&self, executors: &mut [Box<dyn Executor>]) -> Result<GameData>;

    fn play_async<'a>(
        &'a self,
        executors: &'a mut [Box<dyn Executor>],
    ) -> LocalBoxFuture<'a, Result<GameData>> {
        Box::pin(async move { self.play(executors) })
    }
}

/// A fixed baseline that scores a single executor
pub trait Environment {
    fn description(&self) -> &str;

    fn min_score(&self) -> f64;

    fn max_score(&self) -> f64;

    fn is_async(&self) -> bool {
        false
    }

    fn evaluate(&self, executors: &mut [Box<dyn Executor>]) -> Result<GameData>;

    fn evaluate_async<'a>(
        &'a self,
        executors: &'a mut [Box<dyn Executor>],
    ) -> LocalBoxFuture<'a, Result<GameData>> {
        Box::pin(async move { self.evaluate(executors) })
    }

    /// Options that rebuild an equivalent environment inside a worker
    fn to_factory_options(&self) -> Value;
}

/// Turns serialized genome data into an executor
///
/// The chain is config -> state -> genome -> phenotype -> executor. Config and
/// state are built once per worker; the rest once per genome.
pub trait GenomeFactory {
    fn create_config(&self, config_data: &Value) -> Result<Value>;

    fn create_state(&self, config: &Value, init_config: &Value) -> Result<Value>;

    fn create_genome(
        &self,
        config: &Value,
        state: &Value,
        genome_options: &Value,
        factory_options: &GenomeFactoryOptions,
    ) -> Result<Value>;

    fn create_phenotype(&self, genome: &Value) -> Result<Value>;

    fn create_executor(&self, phenotype: &Value) -> Result<Box<dyn Executor>>;
}

type GameCtor = Arc<dyn Fn(&Value) -> Result<Box<dyn GameExecutor>> + Send + Sync>;
type EnvironmentCtor = Arc<dyn Fn(&Value) -> Result<Box<dyn Environment>> + Send + Sync>;
type GenomeFactoryCtor = Arc<dyn Fn() -> Box<dyn GenomeFactory> + Send + Sync>;

/// Constructors for every collaborator, keyed by name
///
/// Cheap to clone; workers each hold a copy and build their own instances.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    games: FxHashMap<String, GameCtor>,
    environments: FxHashMap<String, EnvironmentCtor>,
    genome_factories: FxHashMap<String, GenomeFactoryCtor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a game constructor; it receives the environment options
    pub fn register_game<F>(&mut self, key: impl Into<String>, ctor: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Box<dyn GameExecutor>> + Send + Sync + 'static,
    {
        self.games.insert(key.into(), Arc::new(ctor));
        self
    }

    pub fn register_environment<F>(&mut self, key: impl Into<String>, ctor: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Box<dyn Environment>> + Send + Sync + 'static,
    {
        self.environments.insert(key.into(), Arc::new(ctor));
        self
    }

    pub fn register_genome_factory<F>(&mut self, key: impl Into<String>, ctor: F) -> &mut Self
    where
        F: Fn() -> Box<dyn GenomeFactory> + Send + Sync + 'static,
    {
        self.genome_factories.insert(key.into(), Arc::new(ctor));
        self
    }

    pub fn create_game(&self, key: &str, options: &Value) -> Result<Box<dyn GameExecutor>> {
        let ctor = self
            .games
            .get(key)
            .ok_or_else(|| ArenaError::validation(format!("no game registered as {key:?}")))?;
        ctor(options)
    }

    pub fn create_environment(&self, key: &str, options: &Value) -> Result<Box<dyn Environment>> {
        let ctor = self.environments.get(key).ok_or_else(|| {
            ArenaError::validation(format!("no environment registered as {key:?}"))
        })?;
        ctor(options)
    }

    pub fn create_genome_factory(&self, key: &str) -> Result<Box<dyn GenomeFactory>> {
        let ctor = self.genome_factories.get(key).ok_or_else(|| {
            ArenaError::validation(format!("no genome factory registered as {key:?}"))
        })?;
        Ok(ctor())
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut games: Vec<_> = self.games.keys().collect();
        let mut environments: Vec<_> = self.environments.keys().collect();
        let mut factories: Vec<_> = self.genome_factories.keys().collect();
        games.sort();
        environments.sort();
        factories.sort();
        f.debug_struct("PluginRegistry")
            .field("games", &games)
            .field("environments", &environments)
            .field("genome_factories", &factories)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl Executor for Echo {
        fn execute(&mut self, input: &[f64]) -> Result<Vec<f64>> {
            Ok(input.to_vec())
        }
    }

    struct SumGame;

    impl GameExecutor for SumGame {
        fn description(&self) -> &str {
            "sum"
        }
        fn player_size(&self) -> usize {
            2
        }
        fn min_score(&self) -> f64 {
            0.0
        }
        fn max_score(&self) -> f64 {
            1.0
        }
        fn play(&self, executors: &mut [Box<dyn Executor>]) -> Result<GameData> {
            let scores = executors
                .iter_mut()
                .map(|e| e.execute(&[0.25]).map(|out| out[0]))
                .collect::<Result<Vec<_>>>()?;
            Ok(GameData::new(scores))
        }
    }

    #[test]
    fn test_registry_resolves_game() {
        let mut registry = PluginRegistry::new();
        registry.register_game("sum", |_| Ok(Box::new(SumGame)));

        let game = registry.create_game("sum", &json!({})).unwrap();
        assert_eq!(game.player_size(), 2);
        assert_eq!(game.description(), "sum");
    }

    #[test]
    fn test_registry_unknown_key() {
        let registry = PluginRegistry::new();
        let err = registry.create_game("chess", &json!({})).err().unwrap();
        assert!(matches!(err, ArenaError::Validation(_)));
        assert!(registry.create_genome_factory("neat").is_err());
        assert!(registry.create_environment("maze", &json!(null)).is_err());
    }

    #[test]
    fn test_default_async_play_delegates() {
        let game = SumGame;
        let mut executors: Vec<Box<dyn Executor>> = vec![Box::new(Echo), Box::new(Echo)];
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let data = runtime.block_on(game.play_async(&mut executors)).unwrap();
        assert_eq!(data.scores, vec![0.25, 0.25]);
    }
}
