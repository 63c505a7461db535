//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the application context and
//! its worker pool, and [`Options`], the partial overlay applied once at startup
//! through [`Config::set`].
//!
//! ## Sentinel values
//! - `max_workers = 0` → one worker per available CPU
//! - `worker_timeout = 0s` → no per-job timeout
//! - `sig_cache_size = 0` → signature cache disabled

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Chain the node runs on.
///
/// Jobs are network-agnostic; the value is forwarded to process workers so
/// their logs identify the node they serve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    #[default]
    Main,
    /// Public test network.
    Testnet,
    /// Local regression-test network.
    Regtest,
    /// Simulation network.
    Simnet,
}

impl Network {
    /// Returns the lowercase network name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
            Network::Simnet => "simnet",
        }
    }
}

/// Global configuration for the application context.
///
/// ## Field semantics
/// - `use_workers`: offload jobs to worker units (`false` = run inline on the blocking pool)
/// - `max_workers`: pool capacity (`0` = available parallelism)
/// - `worker_timeout`: per-attempt job timeout (`0s` = none)
/// - `grace`: how long `close()` drains before force-killing workers
/// - `eager_spawn`: spawn the full worker set on open instead of on demand
/// - `sig_cache_size`: signature cache entries (`0` = disabled)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `worker_file`: executable for process workers (`None` = thread workers)
#[derive(Clone, Debug)]
pub struct Config {
    /// Network selection.
    pub network: Network,

    /// Whether jobs are offloaded to workers at all.
    pub use_workers: bool,

    /// Maximum number of worker units.
    ///
    /// - `0` = one per available CPU
    /// - `n > 0` = at most `n` workers alive at once
    pub max_workers: usize,

    /// Per-attempt job timeout.
    ///
    /// On expiry the worker is presumed hung, killed, and the job retried once.
    pub worker_timeout: Duration,

    /// Drain deadline used by `close()`.
    pub grace: Duration,

    /// Spawn `max_workers` workers during `open()`.
    pub eager_spawn: bool,

    /// Capacity of the signature cache.
    pub sig_cache_size: usize,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,

    /// Worker executable; when set, workers are child processes.
    pub worker_file: Option<PathBuf>,

    /// Extra arguments passed to the worker executable.
    pub worker_args: Vec<String>,
}

impl Config {
    /// Applies startup options on top of the current values.
    ///
    /// Unspecified options keep their current (compiled-in) values; any given
    /// flag toggles its feature outright.
    pub fn set(&mut self, opts: Options) {
        if let Some(network) = opts.network {
            self.network = network;
        }
        if let Some(use_workers) = opts.workers {
            self.use_workers = use_workers;
        }
        if let Some(size) = opts.workers_size {
            self.max_workers = size;
        }
        if let Some(ms) = opts.workers_timeout {
            self.worker_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = opts.workers_grace {
            self.grace = Duration::from_millis(ms);
        }
        if let Some(eager) = opts.workers_eager {
            self.eager_spawn = eager;
        }
        if let Some(size) = opts.sig_cache_size {
            self.sig_cache_size = size;
        }
        if let Some(file) = opts.worker_file {
            self.worker_file = Some(file);
        }
        if let Some(args) = opts.worker_args {
            self.worker_args = args;
        }
    }

    /// Returns the effective pool capacity (never zero).
    #[inline]
    pub fn worker_limit(&self) -> usize {
        if self.max_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
        } else {
            self.max_workers
        }
    }

    /// Returns the per-attempt timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → timeout applied per dispatch
    #[inline]
    pub fn job_timeout(&self) -> Option<Duration> {
        if self.worker_timeout == Duration::ZERO {
            None
        } else {
            Some(self.worker_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `network = Main`
    /// - `use_workers = true`
    /// - `max_workers = 0` (available parallelism)
    /// - `worker_timeout = 120s`
    /// - `grace = 5s`
    /// - `eager_spawn = false` (spawn on demand)
    /// - `sig_cache_size = 50_000`
    /// - `bus_capacity = 1024`
    /// - `worker_file = None` (thread workers)
    fn default() -> Self {
        Self {
            network: Network::default(),
            use_workers: true,
            max_workers: 0,
            worker_timeout: Duration::from_secs(120),
            grace: Duration::from_secs(5),
            eager_spawn: false,
            sig_cache_size: 50_000,
            bus_capacity: 1024,
            worker_file: None,
            worker_args: Vec::new(),
        }
    }
}

/// Startup options supplied by the bootstrap layer.
///
/// Every field is optional; see [`Config::set`]. Durations are milliseconds.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Options {
    /// `network`: network selection.
    pub network: Option<Network>,
    /// `workers`: offload jobs to workers (`false` = run inline).
    pub workers: Option<bool>,
    /// `workers-size`: maximum worker units (`0` = one per CPU).
    pub workers_size: Option<usize>,
    /// `workers-timeout`: per-attempt job timeout in milliseconds (`0` = none).
    pub workers_timeout: Option<u64>,
    /// `workers-grace`: drain deadline of `close()` in milliseconds.
    pub workers_grace: Option<u64>,
    /// `workers-eager`: spawn the full worker set during `open()`.
    pub workers_eager: Option<bool>,
    /// `sig-cache-size`: signature cache entries (`0` = disabled).
    pub sig_cache_size: Option<usize>,
    /// `worker-file`: path of the worker executable.
    pub worker_file: Option<PathBuf>,
    /// `worker-args`: extra arguments for the worker executable.
    pub worker_args: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unspecified_options_keep_defaults() {
        let mut cfg = Config::default();
        cfg.set(Options {
            workers_size: Some(3),
            ..Options::default()
        });

        assert_eq!(cfg.max_workers, 3);
        assert_eq!(cfg.worker_timeout, Duration::from_secs(120));
        assert_eq!(cfg.sig_cache_size, 50_000);
        assert!(cfg.use_workers);
    }

    #[test]
    fn test_flags_toggle_outright() {
        let mut cfg = Config::default();
        cfg.set(Options {
            workers: Some(false),
            workers_eager: Some(true),
            network: Some(Network::Regtest),
            ..Options::default()
        });

        assert!(!cfg.use_workers);
        assert!(cfg.eager_spawn);
        assert_eq!(cfg.network, Network::Regtest);
    }

    #[test]
    fn test_options_from_json() {
        let opts: Options = serde_json::from_str(
            r#"{"network":"testnet","workers-size":4,"workers-timeout":250,"sig-cache-size":0}"#,
        )
        .unwrap();

        let mut cfg = Config::default();
        cfg.set(opts);

        assert_eq!(cfg.network, Network::Testnet);
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.job_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.sig_cache_size, 0);
    }

    #[test]
    fn test_every_key_applies_in_documented_units() {
        let opts: Options = serde_json::from_str(
            r#"{
                "workers": false,
                "workers-eager": true,
                "workers-timeout": 0,
                "workers-grace": 1500,
                "worker-file": "/opt/bin/workvisor-worker",
                "worker-args": ["--quiet"]
            }"#,
        )
        .unwrap();

        let mut cfg = Config::default();
        cfg.set(opts);

        assert!(!cfg.use_workers);
        assert!(cfg.eager_spawn);
        assert_eq!(cfg.job_timeout(), None);
        assert_eq!(cfg.grace, Duration::from_millis(1500));
        assert_eq!(cfg.worker_file, Some(PathBuf::from("/opt/bin/workvisor-worker")));
        assert_eq!(cfg.worker_args, vec!["--quiet".to_string()]);
    }

    #[test]
    fn test_sentinels() {
        let cfg = Config {
            max_workers: 0,
            worker_timeout: Duration::ZERO,
            bus_capacity: 0,
            ..Config::default()
        };

        assert!(cfg.worker_limit() >= 1);
        assert_eq!(cfg.job_timeout(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
