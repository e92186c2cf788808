//! Reference collaborators
//!
//! A tiny deterministic game family used by the CLI and by tests. A genome is
//! a weight vector; its executor is a linear unit whose response to an
//! all-ones input is its "strength". Stronger executors win duels and score
//! higher against the baseline.

use arena_core::{
    ArenaError, Environment, Executor, GameData, GameExecutor, GenomeFactory,
    GenomeFactoryOptions, PluginRegistry, Result,
};
use serde_json::{json, Value};

use crate::config::PluginKeys;

pub const DUEL_GAME: &str = "duel";
pub const BASELINE_ENVIRONMENT: &str = "baseline";
pub const LINEAR_FACTORY: &str = "linear";

/// Register the demo collaborators under their default keys
pub fn register(registry: &mut PluginRegistry) {
    registry
        .register_game(DUEL_GAME, |_| Ok(Box::new(DuelGame)))
        .register_environment(BASELINE_ENVIRONMENT, |options| {
            Ok(Box::new(BaselineEnvironment::from_options(options)?))
        })
        .register_genome_factory(LINEAR_FACTORY, || Box::new(LinearGenomeFactory));
}

/// Keys matching [`register`]
pub fn plugin_keys() -> PluginKeys {
    PluginKeys::new(DUEL_GAME, BASELINE_ENVIRONMENT, LINEAR_FACTORY)
}

/// Genome options for a linear genome with the given weights
pub fn linear_genome(weights: &[f64]) -> GenomeFactoryOptions {
    json!({ "weights": weights })
}

/// Response of an executor to the probe input
fn strength(executor: &mut Box<dyn Executor>, inputs: usize) -> Result<f64> {
    let output = executor.execute(&vec![1.0; inputs])?;
    output
        .first()
        .copied()
        .ok_or_else(|| ArenaError::gameplay("executor produced no output"))
}

/// Weighted sum executor
pub struct LinearExecutor {
    weights: Vec<f64>,
}

impl Executor for LinearExecutor {
    fn execute(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let sum = self
            .weights
            .iter()
            .zip(input)
            .map(|(w, x)| w * x)
            .sum::<f64>();
        Ok(vec![sum])
    }
}

/// Builds [`LinearExecutor`]s from `{ "weights": [...] }`
pub struct LinearGenomeFactory;

impl GenomeFactory for LinearGenomeFactory {
    fn create_config(&self, config_data: &Value) -> Result<Value> {
        let inputs = config_data.get("inputs").and_then(Value::as_u64).unwrap_or(2);
        Ok(json!({ "inputs": inputs }))
    }

    fn create_state(&self, _config: &Value, init_config: &Value) -> Result<Value> {
        Ok(json!({ "init": init_config }))
    }

    fn create_genome(
        &self,
        config: &Value,
        _state: &Value,
        _genome_options: &Value,
        factory_options: &GenomeFactoryOptions,
    ) -> Result<Value> {
        let inputs = config.get("inputs").and_then(Value::as_u64).unwrap_or(2) as usize;
        let weights = parse_weights(factory_options)?;
        if weights.len() > inputs {
            return Err(ArenaError::gameplay(format!(
                "genome has {} weights but config allows {}",
                weights.len(),
                inputs
            )));
        }
        Ok(json!({ "weights": weights }))
    }

    fn create_phenotype(&self, genome: &Value) -> Result<Value> {
        Ok(genome.clone())
    }

    fn create_executor(&self, phenotype: &Value) -> Result<Box<dyn Executor>> {
        Ok(Box::new(LinearExecutor {
            weights: parse_weights(phenotype)?,
        }))
    }
}

fn parse_weights(value: &Value) -> Result<Vec<f64>> {
    value
        .get("weights")
        .and_then(Value::as_array)
        .ok_or_else(|| ArenaError::gameplay("genome options carry no weights"))?
        .iter()
        .map(|w| {
            w.as_f64()
                .ok_or_else(|| ArenaError::gameplay(format!("weight {w} is not a number")))
        })
        .collect()
}

/// Two executors compare strengths; the stronger scores 1, ties split
pub struct DuelGame;

impl GameExecutor for DuelGame {
    fn description(&self) -> &str {
        "linear duel"
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
        if executors.len() != 2 {
            return Err(ArenaError::gameplay(format!(
                "duel needs 2 executors, got {}",
                executors.len()
            )));
        }
        let a = strength(&mut executors[0], 2)?;
        let b = strength(&mut executors[1], 2)?;
        let scores = match a.partial_cmp(&b) {
            Some(std::cmp::Ordering::Greater) => vec![1.0, 0.0],
            Some(std::cmp::Ordering::Less) => vec![0.0, 1.0],
            _ => vec![0.5, 0.5],
        };
        Ok(GameData { scores, rounds: 1 })
    }
}

/// Scores one executor against a fixed strength with a logistic curve
pub struct BaselineEnvironment {
    baseline: f64,
}

impl BaselineEnvironment {
    pub fn new(baseline: f64) -> Self {
        Self { baseline }
    }

    pub fn from_options(options: &Value) -> Result<Self> {
        let baseline = match options.get("baseline") {
            None => 0.0,
            Some(v) => v
                .as_f64()
                .ok_or_else(|| ArenaError::validation(format!("baseline {v} is not a number")))?,
        };
        Ok(Self::new(baseline))
    }
}

impl Environment for BaselineEnvironment {
    fn description(&self) -> &str {
        "logistic baseline"
    }

    fn min_score(&self) -> f64 {
        0.0
    }

    fn max_score(&self) -> f64 {
        1.0
    }

    fn evaluate(&self, executors: &mut [Box<dyn Executor>]) -> Result<GameData> {
        let executor = executors
            .first_mut()
            .ok_or_else(|| ArenaError::gameplay("baseline needs one executor"))?;
        let s = strength(executor, 2)?;
        let score = 1.0 / (1.0 + (-(s - self.baseline)).exp());
        Ok(GameData::new(vec![score]))
    }

    fn to_factory_options(&self) -> Value {
        json!({ "baseline": self.baseline })
    }
}
