//! Worker thread - hydrates genomes and plays matches
//!
//! Level 3 - Step-level implementation
//!
//! Each worker owns its collaborators, its genome cache and a single-threaded
//! runtime for asynchronous games. Nothing here is shared with the
//! coordinator; all traffic goes through [`WorkerCommand`]s.

use std::sync::Arc;

use arena_core::{
    ArenaError, Environment, Executor, GameData, GameExecutor, GenomeFactory, Player,
    PlayerScore, PluginRegistry, Result,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::cache::{CachedGenome, GenomeCache};
use crate::protocol::{EvaluatorInit, GenomeFactoryInit, MatchMode, MatchRequest, Message};

/// Reply channel for one request
pub(crate) type ReplySender = oneshot::Sender<Result<Message>>;

/// A message delivered to a worker, with the channel its answer goes to
pub(crate) struct WorkerCommand {
    pub message: Message,
    pub reply: Option<ReplySender>,
}

/// Collaborators resolved from `INIT_EVALUATOR`
struct Evaluator {
    game: Box<dyn GameExecutor>,
    environment: Box<dyn Environment>,
    factory: Box<dyn GenomeFactory>,
}

/// Config and shared state built from `INIT_GENOME_FACTORY`
struct GenomeState {
    config: Value,
    state: Value,
    genome_options: Value,
}

/// Thread-local worker state
struct Worker {
    index: usize,
    registry: Arc<PluginRegistry>,
    evaluator: Option<Evaluator>,
    genome_state: Option<GenomeState>,
    cache: GenomeCache,
    runtime: tokio::runtime::Runtime,
}

/// Worker thread entry point
///
/// Runs until it receives `TERMINATE` or the coordinator drops its sender.
pub(crate) fn run(
    index: usize,
    registry: Arc<PluginRegistry>,
    mut inbox: mpsc::UnboundedReceiver<WorkerCommand>,
) {
    let mut worker = match Worker::new(index, registry) {
        Ok(worker) => worker,
        Err(e) => {
            tracing::warn!(worker = index, "worker failed to start: {}", e);
            return;
        }
    };

    while let Some(command) = inbox.blocking_recv() {
        if matches!(command.message, Message::Terminate) {
            tracing::debug!(worker = index, "worker terminating");
            break;
        }

        let outcome = worker.handle(command.message);
        if let Some(reply) = command.reply {
            // Receiver gone means the caller stopped waiting
            let _ = reply.send(outcome);
        }
    }
}

impl Worker {
    fn new(index: usize, registry: Arc<PluginRegistry>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ArenaError::WorkerFault {
                worker: index,
                reason: format!("runtime: {e}"),
            })?;

        Ok(Self {
            index,
            registry,
            evaluator: None,
            genome_state: None,
            cache: GenomeCache::new(1),
            runtime,
        })
    }

    /// Dispatch one message to its handler
    fn handle(&mut self, message: Message) -> Result<Message> {
        let action = message.action_type();
        if !action.is_worker_bound() {
            return Err(ArenaError::protocol(format!(
                "worker {} received coordinator-bound {}",
                self.index, action
            )));
        }

        match message {
            Message::InitEvaluator(init) => {
                self.init_evaluator(init)?;
                Ok(Message::InitEvaluatorSuccess)
            }
            Message::InitGenomeFactory(init) => {
                self.init_genome_factory(init)?;
                Ok(Message::InitGenomeFactorySuccess)
            }
            Message::RequestEvaluateMatch(request) => {
                let scores = self.evaluate_match(request)?;
                Ok(Message::RespondEvaluateMatch(scores))
            }
            Message::RequestClearGenomeCache => {
                tracing::trace!(
                    worker = self.index,
                    cached = self.cache.len(),
                    capacity = self.cache.capacity(),
                    "clearing genome cache"
                );
                self.cache.reset();
                Ok(Message::RespondClearGenomeCache)
            }
            _ => Err(ArenaError::protocol(format!(
                "worker {} has no handler for {}",
                self.index, action
            ))),
        }
    }

    fn init_evaluator(&mut self, init: EvaluatorInit) -> Result<()> {
        let keys = &init.keys;
        let game = self.registry.create_game(&keys.game, &init.environment_options)?;
        let environment = self
            .registry
            .create_environment(&keys.environment, &init.environment_options)?;
        let factory = self.registry.create_genome_factory(&keys.genome_factory)?;

        tracing::debug!(
            worker = self.index,
            game = game.description(),
            environment = environment.description(),
            "evaluator initialized"
        );

        self.evaluator = Some(Evaluator {
            game,
            environment,
            factory,
        });
        self.genome_state = None;
        self.cache = GenomeCache::new(init.cache_capacity);
        Ok(())
    }

    fn init_genome_factory(&mut self, init: GenomeFactoryInit) -> Result<()> {
        let evaluator = self.evaluator()?;
        let config = evaluator.factory.create_config(&init.config_data)?;
        let state = evaluator.factory.create_state(&config, &init.init_config)?;

        self.genome_state = Some(GenomeState {
            config,
            state,
            genome_options: init.genome_options,
        });
        // Executors built under the old config are stale
        self.cache.reset();
        Ok(())
    }

    fn evaluator(&self) -> Result<&Evaluator> {
        self.evaluator.as_ref().ok_or_else(|| {
            ArenaError::protocol(format!(
                "worker {} received a request before INIT_EVALUATOR",
                self.index
            ))
        })
    }

    /// Build config and state with empty init data if the coordinator never sent any
    fn ensure_genome_state(&mut self) -> Result<()> {
        if self.genome_state.is_none() {
            self.init_genome_factory(GenomeFactoryInit::default())?;
        }
        Ok(())
    }

    fn evaluate_match(&mut self, request: MatchRequest) -> Result<Vec<PlayerScore>> {
        let expected = match request.mode {
            MatchMode::Tournament => self.evaluator()?.game.player_size(),
            MatchMode::Baseline => 1,
        };
        if request.players.len() != expected {
            return Err(ArenaError::gameplay(format!(
                "expected {} executors, got {}",
                expected,
                request.players.len()
            )));
        }

        self.ensure_genome_state()?;

        let mut seats = Vec::with_capacity(request.players.len());
        let mut executors = Vec::with_capacity(request.players.len());
        for player in &request.players {
            let cached = self.hydrate(player)?;
            seats.push((player.id, cached.genome, cached.phenotype));
            executors.push(cached.executor);
        }

        let outcome = self.play(request.mode, &mut executors);

        // Executors go back into the cache whether or not the game succeeded
        for ((id, genome, phenotype), executor) in seats.into_iter().zip(executors) {
            self.cache.insert(
                id,
                CachedGenome {
                    genome,
                    phenotype,
                    executor,
                },
            );
        }

        let data = outcome?;
        if data.scores.len() != request.players.len() {
            return Err(ArenaError::gameplay(format!(
                "game returned {} scores for {} players",
                data.scores.len(),
                request.players.len()
            )));
        }

        Ok(request
            .players
            .iter()
            .zip(data.scores)
            .map(|(player, score)| PlayerScore::new(player.id, score))
            .collect())
    }

    /// Run the game or environment, choosing the async path when anything demands it
    fn play(&self, mode: MatchMode, executors: &mut [Box<dyn Executor>]) -> Result<GameData> {
        let evaluator = self.evaluator()?;
        let any_async = executors.iter().any(|e| e.is_async());

        match mode {
            MatchMode::Tournament => {
                if any_async || evaluator.game.is_async() {
                    self.runtime.block_on(evaluator.game.play_async(executors))
                } else {
                    evaluator.game.play(executors)
                }
            }
            MatchMode::Baseline => {
                if any_async || evaluator.environment.is_async() {
                    self.runtime
                        .block_on(evaluator.environment.evaluate_async(executors))
                } else {
                    evaluator.environment.evaluate(executors)
                }
            }
        }
    }

    /// Fetch from cache or run the factory chain
    fn hydrate(&mut self, player: &Player) -> Result<CachedGenome> {
        if let Some(cached) = self.cache.take(player.id) {
            return Ok(cached);
        }
        self.build(player)
    }

    fn build(&self, player: &Player) -> Result<CachedGenome> {
        let factory = &self.evaluator()?.factory;
        let genome_state = self
            .genome_state
            .as_ref()
            .ok_or_else(|| ArenaError::protocol("genome factory is not initialized"))?;

        let genome = factory.create_genome(
            &genome_state.config,
            &genome_state.state,
            &genome_state.genome_options,
            &player.options,
        )?;
        let phenotype = factory.create_phenotype(&genome)?;
        let executor = factory.create_executor(&phenotype)?;

        tracing::trace!(worker = self.index, genome = %player.id, "hydrated genome");

        Ok(CachedGenome {
            genome,
            phenotype,
            executor,
        })
    }
}
