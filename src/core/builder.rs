use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    events::Bus,
    jobs::{JobRegistry, TransactionBackend},
    subscribers::{Subscribe, SubscriberSet},
    worker::Spawn,
};

use super::{context::Context, pool::WorkerPool};

/// Builder for constructing a [`Context`] with optional features.
pub struct ContextBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    registry: JobRegistry,
    spawner: Option<Arc<dyn Spawn>>,
}

impl ContextBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            registry: JobRegistry::new(),
            spawner: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (lifecycle transitions, worker
    /// churn, timeouts) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Installs the transaction backend used by thread and inline workers.
    ///
    /// Process workers build their own registry in the worker executable.
    pub fn with_backend(mut self, backend: Arc<dyn TransactionBackend>) -> Self {
        self.registry = self.registry.with_backend(backend);
        self
    }

    /// Replaces the worker transport chosen from the configuration.
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawn>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Builds the context; the pool starts closed.
    ///
    /// Must be called inside a Tokio runtime (subscriber workers are spawned here).
    pub fn build(self) -> Context {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let pool = match self.spawner {
            Some(spawner) => WorkerPool::with_spawner(&self.cfg, bus.clone(), self.registry, spawner),
            None => WorkerPool::new(&self.cfg, bus.clone(), self.registry),
        };
        Context::new_internal(self.cfg, bus, subs, pool, CancellationToken::new())
    }
}
