//! # Context: owns the event plumbing and the worker pool of one node.
//!
//! ## Architecture
//! ```text
//! ContextBuilder::build()
//!   ├─ Bus (broadcast)
//!   ├─ SubscriberSet (one bounded queue + worker per subscriber)
//!   ├─ listener: Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!   └─ WorkerPool (closed)
//!
//! run_until_signal():
//!   pool.open() ─► wait_for_shutdown_signal() ─► pool.close()
//!                                                   ├─ drained  → AllStoppedWithin
//!                                                   └─ deadline → GraceExceeded
//! shutdown():
//!   pool.close() ─► stop listener (flush) ─► SubscriberSet::shutdown()
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use workvisor::{Config, Context};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = Context::builder(Config::default()).build();
//!     ctx.run_until_signal().await?;
//!     ctx.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    error::LifecycleError,
    events::{Bus, Event},
    subscribers::SubscriberSet,
};

use super::{builder::ContextBuilder, pool::WorkerPool, shutdown};

/// Application context: configuration, event bus, subscribers and worker pool.
pub struct Context {
    cfg: Config,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    pool: WorkerPool,
    token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Context {
    /// Returns a builder.
    pub fn builder(cfg: Config) -> ContextBuilder {
        ContextBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        pool: WorkerPool,
        token: CancellationToken,
    ) -> Self {
        let listener = subscriber_listener(bus.subscribe(), Arc::clone(&subs), token.clone());
        Self {
            cfg,
            bus,
            subs,
            pool,
            token,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Event bus shared by every publisher of this context.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subs.len()
    }

    /// Opens the pool, waits for a termination signal, then closes the pool.
    ///
    /// If signal handlers cannot be registered the pool is closed right away.
    pub async fn run_until_signal(&self) -> Result<(), LifecycleError> {
        self.pool.open().await?;
        info!(network = self.cfg.network.as_str(), "running; waiting for shutdown signal");
        match shutdown::wait_for_shutdown_signal().await {
            Ok(signal) => info!(signal, "shutdown requested"),
            Err(e) => error!(error = %e, "cannot listen for shutdown signals"),
        }
        self.pool.close().await
    }

    /// Closes the pool and stops event delivery after flushing queued events.
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        let closed = self.pool.close().await;

        self.token.cancel();
        let listener = self.listener.lock().take();
        if let Some(handle) = listener {
            let _ = handle.await;
        }
        match Arc::try_unwrap(self.subs) {
            Ok(subs) => subs.shutdown().await,
            Err(_) => warn!("subscriber set still shared; skipping subscriber shutdown"),
        }
        closed
    }
}

/// Forwards bus events to the subscriber set until cancelled.
///
/// On cancellation, events already buffered are forwarded before exiting.
fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    subs: Arc<SubscriberSet>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = token.cancelled() => {
                    while let Ok(ev) = rx.try_recv() {
                        subs.emit(&ev);
                    }
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::events::EventKind;
    use crate::subscribers::Subscribe;
    use crate::test_utils::{Behavior, ScriptedSpawner, StubBackend};

    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().push(ev.kind);
        }

        fn name(&self) -> &'static str {
            "collect"
        }
    }

    #[tokio::test]
    async fn test_pool_events_reach_subscribers() {
        let collect = Arc::new(Collect(Mutex::new(Vec::new())));
        let sub: Arc<dyn Subscribe> = collect.clone();
        let ctx = Context::builder(Config {
            max_workers: 1,
            ..Config::default()
        })
        .with_subscribers(vec![sub])
        .with_spawner(Arc::new(ScriptedSpawner::new(Behavior::Respond)))
        .build();
        assert_eq!(ctx.subscriber_count(), 1);

        ctx.pool().open().await.unwrap();
        assert_eq!(ctx.pool().mine(vec![0; 80], [0xff; 32], 0, 1).await, Ok(Some(0)));
        ctx.shutdown().await.unwrap();

        let seen = collect.0.lock().clone();
        let lifecycle: Vec<_> = seen
            .iter()
            .copied()
            .filter(|k| matches!(k, EventKind::PreOpen | EventKind::Open | EventKind::PreClose | EventKind::Close))
            .collect();
        assert_eq!(
            lifecycle,
            vec![EventKind::PreOpen, EventKind::Open, EventKind::PreClose, EventKind::Close]
        );
        assert!(seen.contains(&EventKind::WorkerSpawned));
        assert!(seen.contains(&EventKind::JobDispatched));
        assert!(seen.contains(&EventKind::AllStoppedWithin));
    }

    #[tokio::test]
    async fn test_thread_workers_use_installed_backend() {
        let ctx = Context::builder(Config {
            max_workers: 2,
            worker_timeout: Duration::from_secs(5),
            ..Config::default()
        })
        .with_backend(Arc::new(StubBackend::new(3)))
        .build();

        ctx.pool().open().await.unwrap();
        assert_eq!(ctx.pool().verify_input(vec![1], 2, 0).await, Ok(true));
        assert_eq!(ctx.pool().verify_input(vec![1], 3, 0).await, Ok(false));
        ctx.shutdown().await.unwrap();
    }
}
