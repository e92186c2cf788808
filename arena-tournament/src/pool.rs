//! Worker pool - bounded concurrent match evaluation
//!
//! Level 2 - Phase-level implementation
//!
//! The pool owns `thread_count` worker threads. A match acquires an admission
//! permit (at most `task_capacity` requests admitted) and a dispatch permit (at
//! most `thread_count` in flight), then leases one idle worker. The lease
//! returns the worker on drop, so pool and semaphore state are restored on
//! every exit path. Each worker serves a single request at a time.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use arena_core::{ArenaError, Player, PlayerScore, PluginRegistry, Result};
use tokio::sync::{mpsc, oneshot, Notify, Semaphore, SemaphorePermit};

use crate::protocol::{ActionType, EvaluatorInit, GenomeFactoryInit, MatchRequest, Message};
use crate::worker::{self, WorkerCommand};

/// Pool sizing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Worker threads, and the cap on simultaneously dispatched requests
    pub thread_count: usize,
    /// Requests admitted before callers start blocking (population size)
    pub task_capacity: usize,
}

impl PoolConfig {
    pub fn new(thread_count: usize, task_capacity: usize) -> Self {
        Self {
            thread_count,
            task_capacity,
        }
    }
}

/// Coordinator-side handle to one worker thread
struct WorkerHandle {
    index: usize,
    sender: mpsc::UnboundedSender<WorkerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    fn spawn(index: usize, registry: Arc<PluginRegistry>) -> Result<Self> {
        let (sender, inbox) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name(format!("arena-worker-{index}"))
            .spawn(move || worker::run(index, registry, inbox))
            .map_err(|e| ArenaError::WorkerFault {
                worker: index,
                reason: format!("spawn failed: {e}"),
            })?;

        Ok(Self {
            index,
            sender,
            thread: Some(thread),
        })
    }

    fn fault(&self, reason: &str) -> ArenaError {
        ArenaError::WorkerFault {
            worker: self.index,
            reason: reason.to_string(),
        }
    }

    /// Send a message; the returned receiver resolves with the worker's answer
    fn send(&self, message: Message) -> Result<oneshot::Receiver<Result<Message>>> {
        let (reply, answer) = oneshot::channel();
        self.sender
            .send(WorkerCommand {
                message,
                reply: Some(reply),
            })
            .map_err(|_| self.fault("worker is not accepting messages"))?;
        Ok(answer)
    }

    /// Await a reply and check it is the acknowledgement `request` expects
    async fn receive(
        &self,
        request: ActionType,
        answer: oneshot::Receiver<Result<Message>>,
    ) -> Result<Message> {
        let message = answer
            .await
            .map_err(|_| self.fault("worker dropped the request"))??;

        let got = message.action_type();
        if request.reply() != Some(got) {
            return Err(ArenaError::protocol(format!(
                "worker {} answered {} with {}",
                self.index, request, got
            )));
        }
        Ok(message)
    }

    async fn call(&self, message: Message) -> Result<Message> {
        let request = message.action_type();
        let answer = self.send(message)?;
        self.receive(request, answer).await
    }

    /// Ask the worker to stop; returns the thread to join
    fn terminate(mut self) -> Option<JoinHandle<()>> {
        let _ = self.sender.send(WorkerCommand {
            message: Message::Terminate,
            reply: None,
        });
        self.thread.take()
    }
}

/// Send one message to every worker, then await every acknowledgement
async fn broadcast(workers: &[WorkerHandle], message: &Message) -> Result<()> {
    let request = message.action_type();
    let mut pending = Vec::with_capacity(workers.len());
    for worker in workers {
        pending.push((worker, worker.send(message.clone())?));
    }

    let mut first_error = None;
    for (worker, answer) in pending {
        if let Err(e) = worker.receive(request, answer).await {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct PoolInner {
    registry: Arc<PluginRegistry>,
    config: PoolConfig,
    evaluator_init: EvaluatorInit,
    genome_init: Mutex<Option<GenomeFactoryInit>>,
    idle: Mutex<Vec<WorkerHandle>>,
    admission: Semaphore,
    dispatch: Semaphore,
    live_workers: AtomicUsize,
    /// Signalled when a failed respawn retires a dispatch permit
    shrunk: Notify,
    /// Broadcasts gather permits one by one, so only one may gather at a time
    broadcasting: tokio::sync::Mutex<()>,
    next_index: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    terminated: AtomicBool,
    stopped: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolInner {
    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<WorkerHandle>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, worker: WorkerHandle) {
        if self.terminated.load(Ordering::SeqCst) {
            if let Some(thread) = worker.terminate() {
                self.stopped
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(thread);
            }
        } else {
            self.idle().push(worker);
        }
    }

    /// Spawn a worker and replay the initialization it missed
    async fn spawn_initialized(&self) -> Result<WorkerHandle> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let worker = WorkerHandle::spawn(index, self.registry.clone())?;

        worker
            .call(Message::InitEvaluator(self.evaluator_init.clone()))
            .await?;

        let genome_init = self
            .genome_init
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(init) = genome_init {
            worker.call(Message::InitGenomeFactory(init)).await?;
        }
        Ok(worker)
    }
}

/// Leased worker; goes back to the idle set when dropped
struct Lease<'a> {
    pool: &'a PoolInner,
    worker: Option<WorkerHandle>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.release(worker);
        }
    }
}

/// Tracks one dispatched request
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Pool of worker threads evaluating matches
///
/// Cloning is cheap and shares the same workers.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Spawn workers and wait until every one acknowledges `INIT_EVALUATOR`
    ///
    /// Any worker reporting an error fails the whole pool.
    pub async fn initialize(
        registry: Arc<PluginRegistry>,
        mut init: EvaluatorInit,
        config: PoolConfig,
    ) -> Result<Self> {
        if config.thread_count == 0 {
            return Err(ArenaError::validation("thread_count must be at least 1"));
        }
        init.keys.validate()?;
        let task_capacity = config.task_capacity.max(1);
        if init.cache_capacity == 0 {
            init.cache_capacity = task_capacity;
        }

        let mut workers = Vec::with_capacity(config.thread_count);
        for index in 0..config.thread_count {
            match WorkerHandle::spawn(index, registry.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    shutdown(workers).await;
                    return Err(e);
                }
            }
        }

        let message = Message::InitEvaluator(init.clone());
        if let Err(e) = broadcast(&workers, &message).await {
            shutdown(workers).await;
            return Err(e);
        }

        tracing::info!(
            threads = config.thread_count,
            task_capacity,
            game = %init.keys.game,
            "worker pool initialized"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                registry,
                config: PoolConfig::new(config.thread_count, task_capacity),
                evaluator_init: init,
                genome_init: Mutex::new(None),
                idle: Mutex::new(workers),
                admission: Semaphore::new(task_capacity),
                dispatch: Semaphore::new(config.thread_count),
                live_workers: AtomicUsize::new(config.thread_count),
                shrunk: Notify::new(),
                broadcasting: tokio::sync::Mutex::new(()),
                next_index: AtomicUsize::new(config.thread_count),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                terminated: AtomicBool::new(false),
                stopped: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> PoolConfig {
        self.inner.config
    }

    /// Requests currently dispatched to a worker
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest [`WorkerPool::in_flight`] observed since start
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn live_workers(&self) -> usize {
        self.inner.live_workers.load(Ordering::SeqCst)
    }

    pub fn idle_workers(&self) -> usize {
        self.inner.idle().len()
    }

    /// Play one match; scores come back in seat order
    pub async fn evaluate_match(&self, players: Vec<Player>) -> Result<Vec<PlayerScore>> {
        self.dispatch(MatchRequest::tournament(players)).await
    }

    /// Score one player against the environment's baseline
    pub async fn evaluate_baseline(&self, player: Player) -> Result<PlayerScore> {
        let scores = self.dispatch(MatchRequest::baseline(player)).await?;
        scores
            .into_iter()
            .next()
            .ok_or_else(|| ArenaError::protocol("baseline evaluation returned no score"))
    }

    async fn dispatch(&self, request: MatchRequest) -> Result<Vec<PlayerScore>> {
        let inner = &*self.inner;
        let _admitted = inner.admission.acquire().await.map_err(|_| closed())?;
        let slot = inner.dispatch.acquire().await.map_err(|_| closed())?;

        let worker = inner.idle().pop().ok_or_else(|| {
            ArenaError::protocol("dispatch slot granted but no idle worker available")
        })?;
        let mut lease = Lease {
            pool: inner,
            worker: Some(worker),
        };

        let result = {
            let _flight = InFlight::enter(&inner.in_flight, &inner.peak_in_flight);
            match lease.worker.as_ref() {
                Some(worker) => worker.call(Message::RequestEvaluateMatch(request)).await,
                None => Err(ArenaError::protocol("lease lost its worker")),
            }
        };

        match result {
            Ok(Message::RespondEvaluateMatch(scores)) => Ok(scores),
            Ok(other) => Err(ArenaError::protocol(format!(
                "unexpected reply {}",
                other.action_type()
            ))),
            Err(e) if e.is_worker_fault() => {
                let slot = self.replace_faulted(&mut lease, slot).await;
                // The fresh worker must be idle before its permit is released
                drop(lease);
                drop(slot);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Swap a dead worker for a fresh one so capacity does not shrink
    ///
    /// Hands the dispatch permit back unless the respawn failed, in which case
    /// the permit is retired along with the worker.
    async fn replace_faulted<'p>(
        &self,
        lease: &mut Lease<'_>,
        slot: SemaphorePermit<'p>,
    ) -> Option<SemaphorePermit<'p>> {
        let Some(dead) = lease.worker.take() else {
            return Some(slot);
        };
        tracing::warn!(worker = dead.index, "worker faulted, respawning");
        // The thread is gone or wedged; detach rather than join
        drop(dead);

        match self.inner.spawn_initialized().await {
            Ok(fresh) => {
                tracing::info!(worker = fresh.index, "replacement worker ready");
                lease.worker = Some(fresh);
                Some(slot)
            }
            Err(e) => {
                tracing::warn!("respawn failed, pool shrinks: {}", e);
                self.inner.live_workers.fetch_sub(1, Ordering::SeqCst);
                slot.forget();
                self.inner.shrunk.notify_waiters();
                None
            }
        }
    }

    /// Send `INIT_GENOME_FACTORY` to every worker and remember it for respawns
    pub async fn init_genome_factory(&self, init: GenomeFactoryInit) -> Result<()> {
        *self
            .inner
            .genome_init
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(init.clone());
        self.broadcast_idle(Message::InitGenomeFactory(init)).await
    }

    /// Drop every worker's hydrated genomes; call before each generation
    pub async fn clear_genome_cache(&self) -> Result<()> {
        self.broadcast_idle(Message::RequestClearGenomeCache).await
    }

    /// Broadcast once no match is in flight
    ///
    /// Permits are taken one at a time against the live worker count, which a
    /// failed respawn may lower while we wait.
    async fn broadcast_idle(&self, message: Message) -> Result<()> {
        let inner = &*self.inner;
        let _turn = inner.broadcasting.lock().await;
        let mut held = Vec::new();
        loop {
            let shrunk = inner.shrunk.notified();
            if held.len() >= inner.live_workers.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                permit = inner.dispatch.acquire() => held.push(permit.map_err(|_| closed())?),
                _ = shrunk => {}
            }
        }

        let workers = std::mem::take(&mut *inner.idle());
        let result = broadcast(&workers, &message).await;
        for worker in workers {
            inner.release(worker);
        }

        tracing::debug!(action = %message.action_type(), "broadcast complete");
        result
    }

    /// Stop every worker
    ///
    /// Best effort: idle workers are told to stop and joined, busy ones are
    /// stopped when their current request finishes.
    pub async fn terminate(&self) {
        let inner = &*self.inner;
        if inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.admission.close();
        inner.dispatch.close();

        let workers = std::mem::take(&mut *inner.idle());
        let mut threads: Vec<JoinHandle<()>> = workers
            .into_iter()
            .filter_map(WorkerHandle::terminate)
            .collect();
        threads.extend(std::mem::take(
            &mut *inner.stopped.lock().unwrap_or_else(|e| e.into_inner()),
        ));

        join_threads(threads).await;
        tracing::info!("worker pool terminated");
    }
}

fn closed() -> ArenaError {
    ArenaError::protocol("worker pool has been terminated")
}

async fn shutdown(workers: Vec<WorkerHandle>) {
    let threads = workers
        .into_iter()
        .filter_map(WorkerHandle::terminate)
        .collect();
    join_threads(threads).await;
}

async fn join_threads(threads: Vec<JoinHandle<()>>) {
    let joined = tokio::task::spawn_blocking(move || {
        for thread in threads {
            if thread.join().is_err() {
                tracing::warn!("worker thread panicked during shutdown");
            }
        }
    })
    .await;
    if joined.is_err() {
        tracing::warn!("failed to join worker threads");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use arena_core::{Executor, GameData, GameExecutor, GenomeEntry};
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> Arc<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        demo::register(&mut registry);
        Arc::new(registry)
    }

    fn init() -> EvaluatorInit {
        EvaluatorInit::new(demo::plugin_keys(), json!({"baseline": 0.5}))
    }

    fn player(organism: u32, weights: &[f64]) -> Player {
        GenomeEntry::new(0, organism, demo::linear_genome(weights))
            .to_player()
            .unwrap()
    }

    /// Duel whose worker dies shortly after a seat stronger than 100 sits down
    struct TrapDuel;

    impl GameExecutor for TrapDuel {
        fn description(&self) -> &str {
            "trap"
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
            for executor in executors.iter_mut() {
                if executor.execute(&[1.0, 1.0])?[0] > 100.0 {
                    std::thread::sleep(Duration::from_millis(100));
                    panic!("trap sprung");
                }
            }
            demo::DuelGame.play(executors)
        }
    }

    /// Registry whose trap game can be built `constructions` times
    fn trap_registry(constructions: usize) -> Arc<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        demo::register(&mut registry);
        let built = Arc::new(AtomicUsize::new(0));
        registry.register_game("trap", move |_| {
            if built.fetch_add(1, Ordering::SeqCst) < constructions {
                Ok(Box::new(TrapDuel))
            } else {
                Err(ArenaError::validation("trap game exhausted"))
            }
        });
        Arc::new(registry)
    }

    fn trap_init() -> EvaluatorInit {
        let mut init = init();
        init.keys.game = "trap".to_string();
        init
    }

    #[tokio::test]
    async fn test_evaluate_match_scores_in_seat_order() {
        let pool = WorkerPool::initialize(registry(), init(), PoolConfig::new(2, 4))
            .await
            .unwrap();

        let scores = pool
            .evaluate_match(vec![player(1, &[0.1]), player(2, &[0.9])])
            .await
            .unwrap();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].id, player(1, &[]).id);
        assert_eq!(scores[0].score, 0.0);
        assert_eq!(scores[1].score, 1.0);
        assert_eq!(pool.idle_workers(), 2);
        assert_eq!(pool.in_flight(), 0);
        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_baseline_evaluation() {
        let pool = WorkerPool::initialize(registry(), init(), PoolConfig::new(1, 1))
            .await
            .unwrap();

        let score = pool.evaluate_baseline(player(4, &[0.25, 0.25])).await.unwrap();
        assert!((score.score - 0.5).abs() < 1e-12);
        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_unknown_plugin_fails_initialize() {
        let mut bad = init();
        bad.keys.game = "chess".to_string();

        let result = WorkerPool::initialize(registry(), bad, PoolConfig::new(2, 2)).await;
        assert!(matches!(result, Err(ArenaError::Validation(_))));
    }

    #[tokio::test]
    async fn test_gameplay_error_restores_worker() {
        let pool = WorkerPool::initialize(registry(), init(), PoolConfig::new(1, 2))
            .await
            .unwrap();

        // Duel requires two seats
        let err = pool.evaluate_match(vec![player(1, &[0.1])]).await.unwrap_err();
        assert!(matches!(err, ArenaError::Gameplay(_)));
        assert_eq!(pool.idle_workers(), 1);

        let ok = pool
            .evaluate_match(vec![player(1, &[0.1]), player(2, &[0.2])])
            .await;
        assert!(ok.is_ok());
        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_requests_fail_after_terminate() {
        let pool = WorkerPool::initialize(registry(), init(), PoolConfig::new(1, 1))
            .await
            .unwrap();
        pool.terminate().await;

        let err = pool
            .evaluate_match(vec![player(1, &[0.1]), player(2, &[0.2])])
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_clear_cache_and_genome_init_broadcast() {
        let pool = WorkerPool::initialize(registry(), init(), PoolConfig::new(3, 6))
            .await
            .unwrap();

        pool.init_genome_factory(GenomeFactoryInit {
            config_data: json!({"inputs": 1}),
            ..Default::default()
        })
        .await
        .unwrap();
        pool.clear_genome_cache().await.unwrap();
        assert_eq!(pool.idle_workers(), 3);

        // Config now allows a single weight
        let err = pool
            .evaluate_match(vec![player(1, &[0.1, 0.2]), player(2, &[0.2])])
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::Gameplay(_)));
        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_get_replacement_worker_after_fault() {
        let pool = WorkerPool::initialize(trap_registry(usize::MAX), trap_init(), PoolConfig::new(1, 8))
            .await
            .unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        {
            let pool = pool.clone();
            tasks.spawn(async move {
                pool.evaluate_match(vec![player(1, &[500.0]), player(2, &[0.1])])
                    .await
            });
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        for organism in 0..3 {
            let pool = pool.clone();
            tasks.spawn(async move {
                pool.evaluate_match(vec![
                    player(10 + organism, &[0.1]),
                    player(20 + organism, &[0.2]),
                ])
                .await
            });
        }

        let mut faults = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(scores) => assert_eq!(scores.len(), 2),
                Err(e) if e.is_worker_fault() => faults += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(faults, 1);
        assert_eq!(pool.live_workers(), 1);
        assert_eq!(pool.idle_workers(), 1);
        pool.terminate().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_broadcast_finishes_when_respawn_fails() {
        // Both initial workers build the game; the replacement cannot
        let pool = WorkerPool::initialize(trap_registry(2), trap_init(), PoolConfig::new(2, 4))
            .await
            .unwrap();

        let faulting = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.evaluate_match(vec![player(1, &[500.0]), player(2, &[0.1])])
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cleared = tokio::time::timeout(Duration::from_secs(5), pool.clear_genome_cache()).await;
        assert!(matches!(cleared, Ok(Ok(()))));

        let err = faulting.await.unwrap().unwrap_err();
        assert!(err.is_worker_fault());
        assert_eq!(pool.live_workers(), 1);

        let ok = pool
            .evaluate_match(vec![player(3, &[0.1]), player(4, &[0.2])])
            .await;
        assert!(ok.is_ok());
        pool.terminate().await;
    }
}
