//! # WorkerPool: lifecycle-managed offloading of CPU-bound jobs.
//!
//! The pool is itself a [`Component`]: opening it starts the [`Dispatcher`]
//! (and, with `eager_spawn`, the full worker set); closing it drains
//! outstanding work for `grace` and then force-terminates whatever is left.
//!
//! ## Modes
//! ```text
//! use_workers = true:   execute(job) ──► Dispatcher ──► worker unit (thread or process)
//! use_workers = false:  execute(job) ──► spawn_blocking(JobRegistry::execute)
//! ```
//!
//! ## Rules
//! - `execute` on a pool that is not `Open` fails with [`JobError::NotOpen`]
//!   (or [`JobError::Closed`] once closing started, or once the dispatcher is
//!   gone after a failed close).
//! - Typed helpers fail with [`JobError::UnexpectedOutput`] if a worker answers
//!   with the wrong output shape.
//! - `ec_verify` consults the [`SigCache`] before dispatching and records
//!   successful verifications.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{JobError, LifecycleError};
use crate::events::Bus;
use crate::jobs::{InputSignature, Job, JobOutput, JobRegistry, KeyRing, SignedInputs};
use crate::lifecycle::{Component, LifecycleController, LifecycleState, Observe};
use crate::sigcache::SigCache;
use crate::worker::{ProcessSpawner, Spawn, ThreadSpawner};

use super::dispatcher::{Command, Dispatcher, DrainReport};

/// Component name of the pool.
pub const POOL_NAME: &str = "workers";

/// Capacity of the command queue between pool handles and the dispatcher.
const COMMAND_QUEUE: usize = 1024;

#[derive(Clone, Debug)]
struct PoolSettings {
    use_workers: bool,
    limit: usize,
    timeout: Option<Duration>,
    grace: Duration,
    eager: bool,
}

impl PoolSettings {
    fn from_config(cfg: &Config) -> Self {
        Self {
            use_workers: cfg.use_workers,
            limit: cfg.worker_limit(),
            timeout: cfg.job_timeout(),
            grace: cfg.grace,
            eager: cfg.eager_spawn,
        }
    }
}

struct Link {
    commands: mpsc::Sender<Command>,
    join: JoinHandle<()>,
}

/// Lifecycle hooks and state behind a [`WorkerPool`].
pub(crate) struct PoolCore {
    settings: PoolSettings,
    bus: Bus,
    spawner: Arc<dyn Spawn>,
    registry: Arc<JobRegistry>,
    sigs: SigCache,
    link: Mutex<Option<Link>>,
}

#[async_trait]
impl Component for PoolCore {
    fn name(&self) -> &str {
        POOL_NAME
    }

    async fn on_open(&self) -> anyhow::Result<()> {
        if !self.settings.use_workers {
            info!(component = POOL_NAME, "workers disabled; jobs run inline");
            return Ok(());
        }

        let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
        let mut dispatcher = Dispatcher::new(
            Arc::from(POOL_NAME),
            self.bus.clone(),
            Arc::clone(&self.spawner),
            self.settings.limit,
            self.settings.timeout,
        );
        if self.settings.eager {
            dispatcher
                .prespawn(self.settings.limit)
                .context("eager worker spawn failed")?;
        }
        let join = tokio::spawn(dispatcher.run(rx));
        *self.link.lock() = Some(Link { commands, join });

        info!(
            component = POOL_NAME,
            limit = self.settings.limit,
            timeout = ?self.settings.timeout,
            eager = self.settings.eager,
            "worker pool started"
        );
        Ok(())
    }

    async fn on_close(&self) -> anyhow::Result<()> {
        let link = self.link.lock().take();
        let Some(Link { commands, join }) = link else {
            return Ok(());
        };

        let (done, report) = oneshot::channel();
        let grace = self.settings.grace;
        if commands.send(Command::Drain { grace, done }).await.is_ok() {
            match report.await {
                Ok(DrainReport { forced: 0 }) => debug!(component = POOL_NAME, "worker pool drained"),
                Ok(DrainReport { forced }) => {
                    warn!(component = POOL_NAME, forced, ?grace, "worker pool closed with jobs force-terminated")
                }
                Err(_) => debug!(component = POOL_NAME, "dispatcher stopped before reporting"),
            }
        }
        drop(commands);

        if let Err(e) = join.await {
            if e.is_panic() {
                anyhow::bail!("dispatcher panicked: {e}");
            }
        }
        Ok(())
    }
}

impl PoolCore {
    async fn execute(&self, job: Job) -> Result<JobOutput, JobError> {
        if !self.settings.use_workers {
            return self.execute_inline(job).await;
        }
        // The link outlives `Open` only when a close started or failed after the dispatcher stopped.
        let commands = self
            .link
            .lock()
            .as_ref()
            .map(|l| l.commands.clone())
            .ok_or(JobError::Closed)?;

        let (reply, result) = oneshot::channel();
        commands
            .send(Command::Submit { job, reply })
            .await
            .map_err(|_| JobError::Closed)?;
        result.await.unwrap_or(Err(JobError::Closed))
    }

    async fn execute_inline(&self, job: Job) -> Result<JobOutput, JobError> {
        let name = job.name();
        let registry = Arc::clone(&self.registry);
        match tokio::task::spawn_blocking(move || registry.execute(job)).await {
            Ok(Ok(out)) => Ok(out),
            Ok(Err(message)) => Err(JobError::Failed { job: name, message }),
            Err(e) => Err(JobError::Crashed {
                reason: format!("{name}: {e}"),
                attempts: 1,
            }),
        }
    }
}

/// Handle to a pool of worker units.
///
/// Cloning yields another handle to the same pool.
///
/// # Example
/// ```no_run
/// use workvisor::{Bus, Config, JobRegistry, WorkerPool};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = WorkerPool::new(&Config::default(), Bus::default(), JobRegistry::new());
/// pool.open().await?;
/// let key = pool.scrypt(b"pass".to_vec(), b"NaCl".to_vec(), 1024, 8, 16, 64).await?;
/// assert_eq!(key.len(), 64);
/// pool.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WorkerPool {
    lifecycle: LifecycleController<PoolCore>,
}

impl WorkerPool {
    /// Creates a closed pool.
    ///
    /// Workers are child processes of `cfg.worker_file` when set, threads otherwise.
    pub fn new(cfg: &Config, bus: Bus, registry: JobRegistry) -> Self {
        let registry = Arc::new(registry);
        let spawner: Arc<dyn Spawn> = match &cfg.worker_file {
            Some(program) => Arc::new(
                ProcessSpawner::new(program)
                    .with_args(cfg.worker_args.clone())
                    .with_network(cfg.network),
            ),
            None => Arc::new(ThreadSpawner::new(Arc::clone(&registry))),
        };
        Self::build(cfg, bus, registry, spawner)
    }

    /// Creates a closed pool using a custom worker transport.
    pub fn with_spawner(cfg: &Config, bus: Bus, registry: JobRegistry, spawner: Arc<dyn Spawn>) -> Self {
        Self::build(cfg, bus, Arc::new(registry), spawner)
    }

    fn build(cfg: &Config, bus: Bus, registry: Arc<JobRegistry>, spawner: Arc<dyn Spawn>) -> Self {
        let core = Arc::new(PoolCore {
            settings: PoolSettings::from_config(cfg),
            bus: bus.clone(),
            spawner,
            registry,
            sigs: SigCache::new(cfg.sig_cache_size),
            link: Mutex::new(None),
        });
        Self {
            lifecycle: LifecycleController::new(core, bus),
        }
    }

    /// Starts the pool. See [`LifecycleController::open`].
    pub async fn open(&self) -> Result<(), LifecycleError> {
        self.lifecycle.open().await
    }

    /// Drains and stops the pool. See [`LifecycleController::close`].
    pub async fn close(&self) -> Result<(), LifecycleError> {
        self.lifecycle.close().await
    }

    /// Alias of [`close`](Self::close).
    pub async fn destroy(&self) -> Result<(), LifecycleError> {
        self.lifecycle.destroy().await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// True when jobs are accepted.
    pub fn is_open(&self) -> bool {
        self.lifecycle.is_open()
    }

    /// Registers a lifecycle observer.
    pub fn observe(&self, observer: Arc<dyn Observe>) {
        self.lifecycle.observe(observer);
    }

    /// The pool's signature cache.
    pub fn sig_cache(&self) -> &SigCache {
        &self.lifecycle.component().sigs
    }

    fn ensure_open(&self) -> Result<(), JobError> {
        match self.lifecycle.state() {
            LifecycleState::Open => Ok(()),
            LifecycleState::Closing => Err(JobError::Closed),
            LifecycleState::Idle | LifecycleState::Opening => Err(JobError::NotOpen),
        }
    }

    /// Runs one job and returns its output.
    pub async fn execute(&self, job: Job) -> Result<JobOutput, JobError> {
        self.ensure_open()?;
        self.lifecycle.component().execute(job).await
    }

    async fn run<T>(&self, job: Job, pick: fn(JobOutput) -> Option<T>) -> Result<T, JobError> {
        let name = job.name();
        pick(self.execute(job).await?).ok_or(JobError::UnexpectedOutput { job: name })
    }

    /// Verifies every input of a raw transaction.
    pub async fn verify(&self, tx: Vec<u8>, flags: u32) -> Result<bool, JobError> {
        self.run(Job::Verify { tx, flags }, JobOutput::into_bool).await
    }

    /// Verifies one input of a raw transaction.
    pub async fn verify_input(&self, tx: Vec<u8>, index: u32, flags: u32) -> Result<bool, JobError> {
        self.run(Job::VerifyInput { tx, index, flags }, JobOutput::into_bool)
            .await
    }

    /// Signs every input the given key rings own.
    pub async fn sign(&self, tx: Vec<u8>, rings: Vec<KeyRing>, sighash: u32) -> Result<SignedInputs, JobError> {
        self.run(Job::Sign { tx, rings, sighash }, JobOutput::into_signed)
            .await
    }

    /// Signs one input; `None` when `key` does not own it.
    pub async fn sign_input(
        &self,
        tx: Vec<u8>,
        index: u32,
        key: Vec<u8>,
        sighash: u32,
    ) -> Result<Option<InputSignature>, JobError> {
        self.run(
            Job::SignInput {
                tx,
                index,
                key,
                sighash,
            },
            JobOutput::into_input_signed,
        )
        .await
    }

    /// Verifies a DER signature, consulting the signature cache first.
    pub async fn ec_verify(&self, msg: Vec<u8>, sig: Vec<u8>, key: Vec<u8>) -> Result<bool, JobError> {
        self.ensure_open()?;
        let sigs = self.sig_cache();
        let cache_key = SigCache::key(&msg, &sig, &key);
        if sigs.contains(&cache_key) {
            return Ok(true);
        }
        let valid = self
            .run(Job::EcVerify { msg, sig, key }, JobOutput::into_bool)
            .await?;
        if valid {
            sigs.insert(cache_key);
        }
        Ok(valid)
    }

    /// Signs a 32-byte digest, returning a DER signature.
    pub async fn ec_sign(&self, msg: Vec<u8>, key: Vec<u8>) -> Result<Vec<u8>, JobError> {
        self.run(Job::EcSign { msg, key }, JobOutput::into_signature)
            .await
    }

    /// Searches `[start, end]` for a nonce meeting `target`.
    pub async fn mine(&self, header: Vec<u8>, target: [u8; 32], start: u32, end: u32) -> Result<Option<u32>, JobError> {
        self.run(
            Job::Mine {
                header,
                target,
                start,
                end,
            },
            JobOutput::into_nonce,
        )
        .await
    }

    /// Derives a key with scrypt.
    pub async fn scrypt(
        &self,
        passwd: Vec<u8>,
        salt: Vec<u8>,
        n: u64,
        r: u32,
        p: u32,
        len: usize,
    ) -> Result<Vec<u8>, JobError> {
        self.run(
            Job::Scrypt {
                passwd,
                salt,
                n,
                r,
                p,
                len,
            },
            JobOutput::into_key,
        )
        .await
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("state", &self.state())
            .field("sig_cache", self.sig_cache())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use crate::test_utils::{Behavior, ScriptedSpawner, StubBackend};
    use crate::worker::WorkerEvent;
    use crate::worker::protocol::WorkerId;
    use tokio::sync::broadcast;

    fn config(workers: usize) -> Config {
        Config {
            max_workers: workers,
            worker_timeout: Duration::ZERO,
            grace: Duration::from_secs(5),
            ..Config::default()
        }
    }

    fn timed(workers: usize) -> Config {
        Config {
            worker_timeout: Duration::from_millis(100),
            ..config(workers)
        }
    }

    fn pool(cfg: &Config, spawner: &ScriptedSpawner) -> (WorkerPool, Bus) {
        let bus = Bus::new(256);
        let pool = WorkerPool::with_spawner(cfg, bus.clone(), JobRegistry::new(), Arc::new(spawner.clone()));
        (pool, bus)
    }

    fn easy_mine(start: u32) -> Job {
        Job::Mine {
            header: vec![0; 80],
            target: [0xff; 32],
            start,
            end: start + 10,
        }
    }

    async fn until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached");
    }

    async fn next_of(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == kind {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn test_execute_requires_open_pool() {
        let spawner = ScriptedSpawner::new(Behavior::Respond);
        let (pool, _bus) = pool(&config(1), &spawner);

        assert_eq!(pool.execute(easy_mine(0)).await, Err(JobError::NotOpen));
        pool.open().await.unwrap();
        assert_eq!(pool.mine(vec![0; 80], [0xff; 32], 3, 9).await, Ok(Some(3)));
        pool.close().await.unwrap();
        assert_eq!(pool.execute(easy_mine(0)).await, Err(JobError::NotOpen));
        assert_eq!(spawner.spawned(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let spawner = ScriptedSpawner::new(Behavior::Hold);
        let (pool, _bus) = pool(&config(3), &spawner);
        pool.open().await.unwrap();

        let calls: Vec<_> = (0..3u32)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.execute(easy_mine(i * 100)).await })
            })
            .collect();
        until(|| spawner.held() == 3).await;
        assert_eq!(spawner.spawned(), 3);

        spawner.release(2);
        spawner.release(1);
        spawner.release(0);

        let mut starts = Vec::new();
        for call in calls {
            match call.await.unwrap() {
                Ok(JobOutput::Nonce(Some(n))) => starts.push(n),
                other => panic!("unexpected result: {other:?}"),
            }
        }
        starts.sort_unstable();
        assert_eq!(starts, vec![0, 100, 200]);
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_each_caller_gets_its_own_answer() {
        let spawner = ScriptedSpawner::new(Behavior::Hold);
        let (pool, _bus) = pool(&config(2), &spawner);
        pool.open().await.unwrap();

        let a = tokio::spawn({
            let pool = pool.clone();
            async move { pool.mine(vec![0; 80], [0xff; 32], 11, 20).await }
        });
        until(|| spawner.held() == 1).await;
        let b = tokio::spawn({
            let pool = pool.clone();
            async move { pool.mine(vec![0; 80], [0xff; 32], 22, 30).await }
        });
        until(|| spawner.held() == 2).await;

        spawner.release(1);
        assert_eq!(b.await.unwrap(), Ok(Some(22)));
        spawner.release(0);
        assert_eq!(a.await.unwrap(), Ok(Some(11)));
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_hung_worker_is_replaced_and_job_retried_once() {
        let spawner = ScriptedSpawner::new(Behavior::Respond).with_sequence([Behavior::Hang]);
        let (pool, bus) = pool(&timed(1), &spawner);
        let mut events = bus.subscribe();
        pool.open().await.unwrap();

        assert_eq!(pool.mine(vec![0; 80], [0xff; 32], 5, 6).await, Ok(Some(5)));

        let deliveries = spawner.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert_ne!(deliveries[0].0, deliveries[1].0, "retry must use another worker");
        assert_ne!(deliveries[0].1, deliveries[1].1, "retry must use a fresh request id");

        let timed_out = next_of(&mut events, EventKind::JobTimedOut).await;
        assert_eq!(timed_out.worker, Some(deliveries[0].0));
        let retried = next_of(&mut events, EventKind::JobRetried).await;
        assert_eq!(retried.attempt, Some(2));
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_timeout_fails_the_job() {
        let spawner = ScriptedSpawner::new(Behavior::Hang);
        let (pool, _bus) = pool(&timed(1), &spawner);
        pool.open().await.unwrap();

        let err = pool.execute(easy_mine(0)).await.unwrap_err();
        assert_eq!(
            err,
            JobError::Timeout {
                timeout: Duration::from_millis(100),
                attempts: 2
            }
        );
        assert!(err.is_worker_failure());
        assert_eq!(spawner.spawned(), 2);
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_crash_does_not_leak_queued_jobs() {
        let spawner = ScriptedSpawner::new(Behavior::Respond).with_sequence([Behavior::Crash]);
        let (pool, _bus) = pool(&config(1), &spawner);
        pool.open().await.unwrap();

        let calls: Vec<_> = (0..4u32)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.execute(easy_mine(i)).await })
            })
            .collect();
        for (i, call) in calls.into_iter().enumerate() {
            assert_eq!(call.await.unwrap(), Ok(JobOutput::Nonce(Some(i as u32))));
        }
        assert_eq!(spawner.spawned(), 2);
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_repeated_crash_fails_with_crashed() {
        let spawner = ScriptedSpawner::new(Behavior::Respond).with_sequence([Behavior::Crash, Behavior::Crash]);
        let (pool, _bus) = pool(&config(1), &spawner);
        pool.open().await.unwrap();

        match pool.execute(easy_mine(0)).await {
            Err(JobError::Crashed { reason, attempts }) => {
                assert_eq!(attempts, 2);
                assert_eq!(reason, "crashed");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(pool.execute(easy_mine(7)).await, Ok(JobOutput::Nonce(Some(7))));
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unmatched_response_is_discarded() {
        let spawner = ScriptedSpawner::new(Behavior::Hold);
        let (pool, bus) = pool(&config(1), &spawner);
        let mut events = bus.subscribe();
        pool.open().await.unwrap();

        let call = tokio::spawn({
            let pool = pool.clone();
            async move { pool.execute(easy_mine(1)).await }
        });
        until(|| spawner.held() == 1).await;

        spawner.forge(0, 9_999);
        let discarded = next_of(&mut events, EventKind::ResponseDiscarded).await;
        assert_eq!(discarded.request, Some(9_999));

        spawner.release(0);
        assert_eq!(call.await.unwrap(), Ok(JobOutput::Nonce(Some(1))));
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_job_failure_is_reported_not_retried() {
        let spawner = ScriptedSpawner::new(Behavior::Respond);
        let (pool, _bus) = pool(&config(1), &spawner);
        pool.open().await.unwrap();

        let err = pool.ec_sign(vec![1], vec![2]).await.unwrap_err();
        assert!(matches!(err, JobError::Failed { job: "ecSign", .. }));
        assert_eq!(spawner.deliveries().len(), 1);
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_drains_queued_jobs() {
        let spawner = ScriptedSpawner::new(Behavior::Hold);
        let (pool, bus) = pool(&config(1), &spawner);
        let mut events = bus.subscribe();
        pool.open().await.unwrap();

        let calls: Vec<_> = (0..2u32)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.execute(easy_mine(i)).await })
            })
            .collect();
        until(|| spawner.held() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let closing = tokio::spawn({
            let pool = pool.clone();
            async move { pool.close().await }
        });
        until(|| pool.state() == LifecycleState::Closing).await;
        assert_eq!(pool.execute(easy_mine(9)).await, Err(JobError::Closed));

        spawner.release(0);
        until(|| spawner.held() == 1).await;
        spawner.release(0);

        for call in calls {
            assert!(call.await.unwrap().is_ok());
        }
        closing.await.unwrap().unwrap();
        next_of(&mut events, EventKind::AllStoppedWithin).await;
    }

    #[tokio::test]
    async fn test_grace_exceeded_fails_outstanding_jobs() {
        let spawner = ScriptedSpawner::new(Behavior::Hang);
        let cfg = Config {
            grace: Duration::from_millis(30),
            ..config(1)
        };
        let (pool, bus) = pool(&cfg, &spawner);
        let mut events = bus.subscribe();
        pool.open().await.unwrap();

        let call = tokio::spawn({
            let pool = pool.clone();
            async move { pool.execute(easy_mine(0)).await }
        });
        until(|| spawner.deliveries().len() == 1).await;

        pool.close().await.unwrap();
        assert_eq!(call.await.unwrap(), Err(JobError::Closed));
        let exceeded = next_of(&mut events, EventKind::GraceExceeded).await;
        assert_eq!(exceeded.timeout_ms, Some(30));
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces_as_error() {
        let spawner = ScriptedSpawner::new(Behavior::Respond);
        spawner.refuse_spawns(true);
        let (pool, _bus) = pool(&config(1), &spawner);
        pool.open().await.unwrap();

        assert!(matches!(
            pool.execute(easy_mine(0)).await,
            Err(JobError::Spawn { .. })
        ));

        spawner.refuse_spawns(false);
        assert_eq!(pool.execute(easy_mine(4)).await, Ok(JobOutput::Nonce(Some(4))));
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_eager_spawn_starts_every_worker() {
        let spawner = ScriptedSpawner::new(Behavior::Respond);
        let cfg = Config {
            eager_spawn: true,
            ..config(3)
        };
        let (pool, _bus) = pool(&cfg, &spawner);
        pool.open().await.unwrap();
        assert_eq!(spawner.spawned(), 3);
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_eager_spawn_fails_open() {
        let spawner = ScriptedSpawner::new(Behavior::Respond);
        spawner.refuse_spawns(true);
        let cfg = Config {
            eager_spawn: true,
            ..config(2)
        };
        let (pool, _bus) = pool(&cfg, &spawner);

        let err = pool.open().await.unwrap_err();
        assert_eq!(err.as_label(), "lifecycle_open_failed");
        assert_eq!(pool.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_inline_mode_runs_without_workers() {
        let spawner = ScriptedSpawner::new(Behavior::Respond);
        let cfg = Config {
            use_workers: false,
            ..config(2)
        };
        let bus = Bus::default();
        let registry = JobRegistry::new().with_backend(Arc::new(StubBackend::new(2)));
        let pool = WorkerPool::with_spawner(&cfg, bus, registry, Arc::new(spawner.clone()));
        pool.open().await.unwrap();

        assert_eq!(pool.mine(vec![0; 80], [0xff; 32], 8, 9).await, Ok(Some(8)));
        assert_eq!(pool.verify(vec![1], 0).await, Ok(true));
        assert_eq!(
            pool.sign_input(vec![1], 1, StubBackend::OWNER.to_vec(), 3).await,
            Ok(Some(InputSignature {
                script: vec![1, 3],
                witness: vec![],
            }))
        );
        assert_eq!(spawner.spawned(), 0);
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_ec_verify_caches_only_successes() {
        use secp256k1::{PublicKey, Secp256k1, SecretKey};

        let spawner = ScriptedSpawner::new(Behavior::Respond);
        let (pool, _bus) = pool(&config(1), &spawner);
        pool.open().await.unwrap();

        let secret = [0x33; 32];
        let public = PublicKey::from_secret_key(&Secp256k1::new(), &SecretKey::from_slice(&secret).unwrap())
            .serialize()
            .to_vec();
        let msg = crate::jobs::crypto::hash256(b"payload").to_vec();
        let sig = pool.ec_sign(msg.clone(), secret.to_vec()).await.unwrap();

        assert_eq!(pool.ec_verify(msg.clone(), sig.clone(), public.clone()).await, Ok(true));
        assert_eq!(pool.ec_verify(msg.clone(), sig.clone(), public.clone()).await, Ok(true));
        assert_eq!(pool.ec_verify(vec![0; 32], sig, public).await, Ok(false));

        // ecSign + first ecVerify + failing ecVerify; the repeat was a cache hit
        assert_eq!(spawner.deliveries().len(), 3);
        assert_eq!(pool.sig_cache().len(), 1);
        pool.close().await.unwrap();
    }

    struct ExplodingSpawner;

    impl Spawn for ExplodingSpawner {
        fn spawn(
            &self,
            _id: WorkerId,
            _events: mpsc::UnboundedSender<WorkerEvent>,
        ) -> std::io::Result<crate::worker::WorkerChannel> {
            panic!("spawner exploded");
        }
    }

    #[tokio::test]
    async fn test_dead_dispatcher_reports_closed() {
        let pool = WorkerPool::with_spawner(&config(1), Bus::new(64), JobRegistry::new(), Arc::new(ExplodingSpawner));
        pool.open().await.unwrap();

        assert_eq!(pool.execute(easy_mine(0)).await, Err(JobError::Closed));

        let err = pool.close().await.unwrap_err();
        assert_eq!(err.as_label(), "lifecycle_close_failed");
        assert!(err.to_string().contains("dispatcher panicked"), "{err}");
        assert_eq!(pool.state(), LifecycleState::Open);
        assert_eq!(pool.execute(easy_mine(0)).await, Err(JobError::Closed));

        pool.close().await.unwrap();
        assert_eq!(pool.state(), LifecycleState::Idle);
        assert_eq!(pool.execute(easy_mine(0)).await, Err(JobError::NotOpen));
    }

    #[tokio::test]
    async fn test_thread_workers_retire_before_replacement() {
        let bus = Bus::new(256);
        let mut events = bus.subscribe();
        let pool = WorkerPool::new(&timed(1), bus, JobRegistry::new());
        pool.open().await.unwrap();

        let err = pool.mine(vec![0; 80], [0; 32], 0, u32::MAX).await.unwrap_err();
        assert_eq!(
            err,
            JobError::Timeout {
                timeout: Duration::from_millis(100),
                attempts: 2
            }
        );

        let (mut alive, mut peak, mut exited) = (0i32, 0i32, 0);
        while exited < 2 {
            let ev = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("killed worker never retired")
                .unwrap();
            match ev.kind {
                EventKind::WorkerSpawned => {
                    alive += 1;
                    peak = peak.max(alive);
                }
                EventKind::WorkerExited => {
                    alive -= 1;
                    exited += 1;
                }
                _ => {}
            }
        }
        assert_eq!(peak, 1, "a replacement started before the hung worker retired");
        assert_eq!(alive, 0);
        pool.close().await.unwrap();
    }
}
