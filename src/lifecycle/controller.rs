//! # LifecycleController: open/close state machine for one component.
//!
//! Every long-lived subsystem (chain, mempool, wallet, peer pool, the worker
//! pool itself) implements [`Component`] and is driven through a
//! [`LifecycleController`].
//!
//! ## State machine
//! ```text
//!            open()                  success
//!   Idle ───────────────► Opening ───────────────► Open
//!    ▲                      │                       │
//!    │        failure       │                       │ close()
//!    ├──────────────────────┘                       ▼
//!    │                    success                Closing
//!    └───────────────────────────────────────────────┤
//!                                  failure           │
//!                        Open ◄──────────────────────┘
//! ```
//!
//! ## Rules
//! - Only `Idle` (for open) and `Open` (for close) start a new transition.
//! - Calls landing on an in-flight transition of the same direction become
//!   **waiters** and settle with that transition's outcome, in registration order.
//! - Calls landing on an in-flight transition of the opposite direction fail
//!   immediately with [`LifecycleError::Usage`].
//! - The transition runs on its own task, holding the [`ExclusivityLock`] for
//!   the whole hook invocation; a caller that stops waiting does not strand it.
//!
//! ## Notification order
//! ```text
//! success: PreOpen → on_open() → Open → release lock → settle waiters
//! failure: PreOpen → on_open() → reject waiters → Error → release lock
//! ```
//! Observers ([`Observe`]) are called synchronously in registration order; the
//! same notifications are published on the [`Bus`] for passive monitoring.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::LifecycleError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::panic_message;

use super::lock::ExclusivityLock;

/// Hooks every lifecycle-managed component provides.
///
/// Both hooks are required: a component without them does not compile.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use workvisor::Component;
///
/// struct Mempool;
///
/// #[async_trait]
/// impl Component for Mempool {
///     fn name(&self) -> &str { "mempool" }
///
///     async fn on_open(&self) -> anyhow::Result<()> {
///         // load persisted entries...
///         Ok(())
///     }
///
///     async fn on_close(&self) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Stable component name used in errors, logs and events.
    fn name(&self) -> &str;

    /// Initialization hook, invoked once per open transition.
    async fn on_open(&self) -> anyhow::Result<()>;

    /// Teardown hook, invoked once per close transition.
    async fn on_close(&self) -> anyhow::Result<()>;
}

/// Current phase of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Closed (initial).
    Idle,
    /// Open transition in flight.
    Opening,
    /// Open and usable.
    Open,
    /// Close transition in flight.
    Closing,
}

/// Notification delivered to [`Observe`] implementations.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// About to run `on_open`.
    PreOpen,
    /// Open transition succeeded.
    Open,
    /// About to run `on_close`.
    PreClose,
    /// Close transition succeeded.
    Close,
    /// A transition failed (general error channel).
    Error(LifecycleError),
}

impl LifecycleEvent {
    fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::PreOpen => EventKind::PreOpen,
            LifecycleEvent::Open => EventKind::Open,
            LifecycleEvent::PreClose => EventKind::PreClose,
            LifecycleEvent::Close => EventKind::Close,
            LifecycleEvent::Error(_) => EventKind::LifecycleFailed,
        }
    }
}

/// Synchronous observer of lifecycle notifications.
///
/// Called on the transition task; keep it short and non-blocking.
pub trait Observe: Send + Sync + 'static {
    /// Receives one notification for `component`.
    fn on_lifecycle(&self, component: &str, event: &LifecycleEvent);
}

type Outcome = Result<(), LifecycleError>;

#[derive(Clone, Copy, Debug)]
enum Direction {
    Open,
    Close,
}

struct Machine {
    state: LifecycleState,
    waiters: Vec<oneshot::Sender<Outcome>>,
}

impl Machine {
    fn enlist(&mut self) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }
}

struct Shared<C> {
    component: Arc<C>,
    name: Arc<str>,
    lock: ExclusivityLock,
    bus: Bus,
    observers: RwLock<Vec<Arc<dyn Observe>>>,
    machine: Mutex<Machine>,
}

/// Drives [`Component`] hooks through the open/close state machine.
///
/// Cloning yields another handle to the same state machine.
pub struct LifecycleController<C: Component> {
    shared: Arc<Shared<C>>,
}

impl<C: Component> Clone for LifecycleController<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Component> LifecycleController<C> {
    /// Creates a controller in [`LifecycleState::Idle`].
    pub fn new(component: Arc<C>, bus: Bus) -> Self {
        let name: Arc<str> = Arc::from(component.name());
        Self {
            shared: Arc::new(Shared {
                component,
                name,
                lock: ExclusivityLock::new(),
                bus,
                observers: RwLock::new(Vec::new()),
                machine: Mutex::new(Machine {
                    state: LifecycleState::Idle,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    /// Opens the component.
    ///
    /// - `Open` → returns `Ok(())` immediately.
    /// - `Opening` → waits for the in-flight transition.
    /// - `Closing` → fails with [`LifecycleError::Usage`].
    /// - `Idle` → starts the open transition and waits for it.
    pub async fn open(&self) -> Result<(), LifecycleError> {
        let waiter = {
            let mut m = self.shared.machine.lock();
            match m.state {
                LifecycleState::Open => return Ok(()),
                LifecycleState::Closing => {
                    return Err(self.shared.usage("cannot open while closing"));
                }
                LifecycleState::Opening => m.enlist(),
                LifecycleState::Idle => {
                    m.state = LifecycleState::Opening;
                    let rx = m.enlist();
                    tokio::spawn(Arc::clone(&self.shared).transition(Direction::Open));
                    rx
                }
            }
        };
        self.shared.settle(waiter).await
    }

    /// Closes the component.
    ///
    /// - `Idle` → returns `Ok(())` immediately without invoking `on_close`.
    /// - `Closing` → waits for the in-flight transition.
    /// - `Opening` → fails with [`LifecycleError::Usage`].
    /// - `Open` → starts the close transition and waits for it.
    pub async fn close(&self) -> Result<(), LifecycleError> {
        let waiter = {
            let mut m = self.shared.machine.lock();
            match m.state {
                LifecycleState::Idle => return Ok(()),
                LifecycleState::Opening => {
                    return Err(self.shared.usage("cannot close while opening"));
                }
                LifecycleState::Closing => m.enlist(),
                LifecycleState::Open => {
                    m.state = LifecycleState::Closing;
                    let rx = m.enlist();
                    tokio::spawn(Arc::clone(&self.shared).transition(Direction::Close));
                    rx
                }
            }
        };
        self.shared.settle(waiter).await
    }

    /// Alias of [`close`](Self::close).
    pub async fn destroy(&self) -> Result<(), LifecycleError> {
        self.close().await
    }

    /// Registers a synchronous observer; delivery follows registration order.
    pub fn observe(&self, observer: Arc<dyn Observe>) {
        self.shared.observers.write().push(observer);
    }

    /// Returns the current state.
    pub fn state(&self) -> LifecycleState {
        self.shared.machine.lock().state
    }

    /// True when the component is `Open`.
    pub fn is_open(&self) -> bool {
        self.state() == LifecycleState::Open
    }

    /// Returns the managed component.
    pub fn component(&self) -> &Arc<C> {
        &self.shared.component
    }

    /// Returns the component name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl<C: Component> Shared<C> {
    fn usage(&self, reason: &'static str) -> LifecycleError {
        warn!(component = %self.name, reason, "lifecycle misuse");
        LifecycleError::Usage {
            component: self.name.to_string(),
            reason,
        }
    }

    async fn settle(&self, waiter: oneshot::Receiver<Outcome>) -> Outcome {
        waiter.await.unwrap_or_else(|_| {
            Err(LifecycleError::Abandoned {
                component: self.name.to_string(),
            })
        })
    }

    /// Runs one transition end to end; always settles every waiter.
    async fn transition(self: Arc<Self>, dir: Direction) {
        let release = self.lock.lock().await;

        let (pre, done, hook) = match dir {
            Direction::Open => (LifecycleEvent::PreOpen, LifecycleEvent::Open, "on_open"),
            Direction::Close => (LifecycleEvent::PreClose, LifecycleEvent::Close, "on_close"),
        };
        self.notify(&pre);
        debug!(component = %self.name, hook, "running lifecycle hook");

        let fut = match dir {
            Direction::Open => self.component.on_open(),
            Direction::Close => self.component.on_close(),
        };
        let res = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => Err(anyhow::anyhow!(
                "{hook} panicked: {}",
                panic_message(panic.as_ref())
            )),
        };

        let (outcome, waiters) = {
            let mut m = self.machine.lock();
            let outcome = match (dir, res) {
                (Direction::Open, Ok(())) => {
                    m.state = LifecycleState::Open;
                    Ok(())
                }
                (Direction::Close, Ok(())) => {
                    m.state = LifecycleState::Idle;
                    Ok(())
                }
                (Direction::Open, Err(e)) => {
                    m.state = LifecycleState::Idle;
                    Err(LifecycleError::OpenFailed {
                        component: self.name.to_string(),
                        error: Arc::new(e),
                    })
                }
                (Direction::Close, Err(e)) => {
                    m.state = LifecycleState::Open;
                    Err(LifecycleError::CloseFailed {
                        component: self.name.to_string(),
                        error: Arc::new(e),
                    })
                }
            };
            (outcome, std::mem::take(&mut m.waiters))
        };

        match outcome {
            Ok(()) => {
                self.notify(&done);
                drop(release);
                for w in waiters {
                    let _ = w.send(Ok(()));
                }
            }
            Err(err) => {
                error!(component = %self.name, error = %err, "lifecycle transition failed");
                for w in waiters {
                    let _ = w.send(Err(err.clone()));
                }
                self.notify(&LifecycleEvent::Error(err));
                drop(release);
            }
        }
    }

    fn notify(&self, ev: &LifecycleEvent) {
        let observers: Vec<Arc<dyn Observe>> = self.observers.read().clone();
        for obs in observers {
            let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| {
                obs.on_lifecycle(&self.name, ev);
            }));
            if let Err(panic) = delivered {
                warn!(
                    component = %self.name,
                    info = %panic_message(panic.as_ref()),
                    "lifecycle observer panicked"
                );
            }
        }

        let mut event = Event::new(ev.kind()).with_component(Arc::clone(&self.name));
        if let LifecycleEvent::Error(err) = ev {
            event = event.with_reason(err.to_string());
        }
        self.bus.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::watch;

    struct Gadget {
        opens: AtomicUsize,
        closes: AtomicUsize,
        fail_open: AtomicBool,
        fail_close: AtomicBool,
        panic_open: AtomicBool,
        gate: watch::Sender<bool>,
    }

    impl Gadget {
        fn new() -> Arc<Self> {
            Self::with_gate(true)
        }

        fn gated() -> Arc<Self> {
            Self::with_gate(false)
        }

        fn with_gate(open: bool) -> Arc<Self> {
            let (gate, _) = watch::channel(open);
            Arc::new(Self {
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                fail_open: AtomicBool::new(false),
                fail_close: AtomicBool::new(false),
                panic_open: AtomicBool::new(false),
                gate,
            })
        }

        fn release(&self) {
            self.gate.send_replace(true);
        }

        fn hold(&self) {
            self.gate.send_replace(false);
        }

        async fn pass_gate(&self) {
            let mut rx = self.gate.subscribe();
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    #[async_trait]
    impl Component for Gadget {
        fn name(&self) -> &str {
            "gadget"
        }

        async fn on_open(&self) -> anyhow::Result<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.pass_gate().await;
            if self.panic_open.load(Ordering::SeqCst) {
                panic!("open exploded");
            }
            if self.fail_open.load(Ordering::SeqCst) {
                anyhow::bail!("db locked");
            }
            Ok(())
        }

        async fn on_close(&self) -> anyhow::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.pass_gate().await;
            if self.fail_close.load(Ordering::SeqCst) {
                anyhow::bail!("flush failed");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Observe for Recorder {
        fn on_lifecycle(&self, _component: &str, event: &LifecycleEvent) {
            let label = match event {
                LifecycleEvent::PreOpen => "preopen".to_string(),
                LifecycleEvent::Open => "open".to_string(),
                LifecycleEvent::PreClose => "preclose".to_string(),
                LifecycleEvent::Close => "close".to_string(),
                LifecycleEvent::Error(e) => format!("error:{}", e.as_label()),
            };
            self.seen.lock().push(label);
        }
    }

    async fn until(cond: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn controller(gadget: &Arc<Gadget>) -> LifecycleController<Gadget> {
        LifecycleController::new(Arc::clone(gadget), Bus::new(64))
    }

    #[tokio::test]
    async fn test_concurrent_open_runs_hook_once() {
        let gadget = Gadget::gated();
        let ctl = controller(&gadget);

        let a = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.open().await }
        });
        let b = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.open().await }
        });
        until(|| gadget.opens.load(Ordering::SeqCst) == 1).await;
        assert_eq!(ctl.state(), LifecycleState::Opening);
        gadget.release();

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(gadget.opens.load(Ordering::SeqCst), 1);
        assert!(ctl.is_open());

        ctl.open().await.unwrap();
        assert_eq!(gadget.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_open_failure_reaches_every_waiter() {
        let gadget = Gadget::gated();
        gadget.fail_open.store(true, Ordering::SeqCst);
        let ctl = controller(&gadget);

        let a = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.open().await }
        });
        until(|| gadget.opens.load(Ordering::SeqCst) == 1).await;
        let b = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.open().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        gadget.release();

        let ea = a.await.unwrap().unwrap_err();
        let eb = b.await.unwrap().unwrap_err();
        assert_eq!(ea.as_label(), "lifecycle_open_failed");
        assert_eq!(ea.to_string(), eb.to_string());
        assert!(ea.to_string().contains("db locked"));
        assert_eq!(gadget.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_before_open_is_noop() {
        let gadget = Gadget::new();
        let ctl = controller(&gadget);

        ctl.close().await.unwrap();
        ctl.destroy().await.unwrap();

        assert_eq!(gadget.closes.load(Ordering::SeqCst), 0);
        assert_eq!(ctl.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_open_during_close_is_usage_error() {
        let gadget = Gadget::new();
        let ctl = controller(&gadget);
        ctl.open().await.unwrap();

        gadget.hold();
        let closing = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.close().await }
        });
        until(|| gadget.closes.load(Ordering::SeqCst) == 1).await;

        let err = ctl.open().await.unwrap_err();
        assert!(err.is_usage());
        assert_eq!(ctl.state(), LifecycleState::Closing);

        gadget.release();
        closing.await.unwrap().unwrap();
        assert_eq!(ctl.state(), LifecycleState::Idle);
        assert_eq!(gadget.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_during_open_is_usage_error() {
        let gadget = Gadget::gated();
        let ctl = controller(&gadget);

        let opening = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.open().await }
        });
        until(|| gadget.opens.load(Ordering::SeqCst) == 1).await;

        let err = ctl.close().await.unwrap_err();
        assert_eq!(err.as_label(), "lifecycle_usage");

        gadget.release();
        opening.await.unwrap().unwrap();
        assert!(ctl.is_open());
        assert_eq!(gadget.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_open_is_not_cached() {
        let gadget = Gadget::new();
        gadget.fail_open.store(true, Ordering::SeqCst);
        let ctl = controller(&gadget);

        let err = ctl.open().await.unwrap_err();
        assert!(err.hook_error().is_some());
        assert_eq!(ctl.state(), LifecycleState::Idle);

        gadget.fail_open.store(false, Ordering::SeqCst);
        ctl.open().await.unwrap();
        assert_eq!(gadget.opens.load(Ordering::SeqCst), 2);
        assert!(ctl.is_open());
    }

    #[tokio::test]
    async fn test_failed_close_reverts_to_open() {
        let gadget = Gadget::new();
        gadget.fail_close.store(true, Ordering::SeqCst);
        let ctl = controller(&gadget);
        ctl.open().await.unwrap();

        let err = ctl.close().await.unwrap_err();
        assert_eq!(err.as_label(), "lifecycle_close_failed");
        assert!(ctl.is_open());

        gadget.fail_close.store(false, Ordering::SeqCst);
        ctl.close().await.unwrap();
        assert_eq!(ctl.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_panicking_hook_fails_transition() {
        let gadget = Gadget::new();
        gadget.panic_open.store(true, Ordering::SeqCst);
        let ctl = controller(&gadget);

        let err = ctl.open().await.unwrap_err();
        assert!(err.to_string().contains("open exploded"));
        assert_eq!(ctl.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_notifications_in_order() {
        let gadget = Gadget::new();
        let ctl = controller(&gadget);
        let rec = Arc::new(Recorder::default());
        ctl.observe(rec.clone());

        ctl.open().await.unwrap();
        ctl.close().await.unwrap();
        gadget.fail_open.store(true, Ordering::SeqCst);
        let _ = ctl.open().await;

        assert_eq!(
            *rec.seen.lock(),
            vec![
                "preopen",
                "open",
                "preclose",
                "close",
                "preopen",
                "error:lifecycle_open_failed"
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_is_broadcast_on_bus() {
        let gadget = Gadget::new();
        gadget.fail_open.store(true, Ordering::SeqCst);
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let ctl = LifecycleController::new(Arc::clone(&gadget), bus);

        assert!(ctl.open().await.is_err());

        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|ev| ev.kind)
            .collect();
        assert_eq!(kinds, vec![EventKind::PreOpen, EventKind::LifecycleFailed]);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_strand_transition() {
        let gadget = Gadget::gated();
        let ctl = controller(&gadget);

        let waited = tokio::time::timeout(Duration::from_millis(20), ctl.open()).await;
        assert!(waited.is_err());
        assert_eq!(ctl.state(), LifecycleState::Opening);

        gadget.release();
        ctl.open().await.unwrap();
        assert_eq!(gadget.opens.load(Ordering::SeqCst), 1);
    }

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Observe for Tagged {
        fn on_lifecycle(&self, _component: &str, event: &LifecycleEvent) {
            self.log.lock().push(format!("{}:{:?}", self.tag, event));
        }
    }

    #[tokio::test]
    async fn test_waiters_settle_in_registration_order() {
        let gadget = Gadget::gated();
        let ctl = controller(&gadget);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut calls = Vec::new();
        for i in 0..4usize {
            calls.push(tokio::spawn({
                let ctl = ctl.clone();
                let order = Arc::clone(&order);
                async move {
                    ctl.open().await.unwrap();
                    order.lock().push(i);
                }
            }));
            until(|| ctl.shared.machine.lock().waiters.len() == i + 1).await;
        }
        gadget.release();
        for call in calls {
            call.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
        assert_eq!(gadget.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_observers_called_in_registration_order() {
        let gadget = Gadget::new();
        let ctl = controller(&gadget);
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            ctl.observe(Arc::new(Tagged {
                tag,
                log: Arc::clone(&log),
            }));
        }

        ctl.open().await.unwrap();
        ctl.close().await.unwrap();

        let expected: Vec<String> = ["PreOpen", "Open", "PreClose", "Close"]
            .into_iter()
            .flat_map(|ev| ["first", "second", "third"].map(|tag| format!("{tag}:{ev}")))
            .collect();
        assert_eq!(*log.lock(), expected);
    }
}
