//! Process lifecycle coordination.
//!
//! [`Lifecycle`] owns the ordered cleanup registry, the one-shot readiness
//! signal and the shutdown pass. It is constructed once at process start
//! and passed by reference to whatever owns startup/shutdown, so shutdown
//! can be exercised programmatically in tests without OS signal delivery.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     bind attempt begins → readiness signalled → accept loop
//!
//! Shutdown:
//!     SIGINT/SIGTERM → remove unix socket file → run cleanups (FIFO)
//!         → stop worker pool → exit 0
//! ```

use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{fs, mem};

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::server::BindAddr;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Shared lifecycle state: cleanup registry, readiness channel, worker
/// hook and the shutdown-started flag.
pub struct Lifecycle {
    cleanups: Mutex<Vec<Cleanup>>,
    worker_hook: Mutex<Option<Cleanup>>,
    shutting_down: AtomicBool,
    ready_tx: mpsc::Sender<bool>,
    ready_rx: Mutex<Option<mpsc::Receiver<bool>>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (ready_tx, ready_rx) = mpsc::channel(1);
        Self {
            cleanups: Mutex::new(Vec::new()),
            worker_hook: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
            ready_tx,
            ready_rx: Mutex::new(Some(ready_rx)),
        }
    }

    /// Registers a cleanup callback, invoked in registration order during
    /// shutdown. There is no deregistration.
    ///
    /// Once shutdown has begun the registry is closed; late registrations
    /// are ignored rather than run out of order.
    pub fn on_exit(&self, cleanup: impl FnOnce() + Send + 'static) {
        if self.shutting_down.load(Ordering::SeqCst) {
            warn!("cleanup registered after shutdown began, ignoring");
            return;
        }
        self.cleanups.lock().unwrap().push(Box::new(cleanup));
    }

    /// Installs the hook that stops the background worker pool; invoked
    /// once, after all cleanup callbacks.
    pub fn set_worker_shutdown(&self, hook: impl FnOnce() + Send + 'static) {
        *self.worker_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Signals that the listener's bind attempt has begun.
    ///
    /// The readiness channel has capacity 1 and is written once for the
    /// process's single server instance; extra signals are dropped.
    pub fn signal_ready(&self) {
        let _ = self.ready_tx.try_send(true);
    }

    /// Hands out the readiness receiver for a collaborator that blocks on
    /// startup. Only the first caller gets it.
    pub fn take_ready(&self) -> Option<mpsc::Receiver<bool>> {
        self.ready_rx.lock().unwrap().take()
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Runs the ordered shutdown pass exactly once: unix socket file
    /// removal, cleanup callbacks in FIFO order, then the worker-pool
    /// hook. Later calls are no-ops.
    ///
    /// A failed socket-file removal is logged and cleanup continues: the
    /// stale file is recovered at the next startup, and skipping
    /// registered cleanups would be worse than leaving it behind.
    pub fn shutdown(&self, addr: &BindAddr) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let BindAddr::Unix(path) = addr {
            if let Err(e) = fs::remove_file(path) {
                error!(cause = %e, "can't remove socket file {}", path.display());
            }
        }

        let cleanups = mem::take(&mut *self.cleanups.lock().unwrap());
        if !cleanups.is_empty() {
            info!("performing {} cleanup routines", cleanups.len());
            for cleanup in cleanups {
                cleanup();
            }
        }

        if let Some(hook) = self.worker_hook.lock().unwrap().take() {
            hook();
        }
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle").field("shutting_down", &self.is_shutting_down()).finish_non_exhaustive()
    }
}

/// Spawns the dedicated task that waits for an interrupt or termination
/// signal, then drives the shutdown pass and terminates the process with
/// a success exit status.
pub fn spawn_signal_watcher(lifecycle: std::sync::Arc<Lifecycle>, addr: BindAddr) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let received = match wait_for_signal().await {
            Ok(received) => received,
            Err(e) => {
                error!(cause = %e, "can't install signal handlers, shutdown watcher disabled");
                return;
            }
        };

        info!("exiting program, got signal: {}", received);
        lifecycle.shutdown(&addr);
        std::process::exit(0);
    })
}

async fn wait_for_signal() -> io::Result<&'static str> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let received = tokio::select! {
        _ = interrupt.recv() => "interrupt",
        _ = terminate.recv() => "terminate",
    };
    Ok(received)
}
