//! Start/stop plumbing shared by every agent
//!
//! Each agent owns one `Lifecycle`: a liveness flag that only ever goes from
//! `true` to `false`, a stop signal its task races against every wait, and
//! the task handle the orchestrator joins on shutdown.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Acquire a std mutex, recovering the data if a panicking agent poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returned by waits that were cut short by a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

/// How an agent's task ended when it was joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// No task to join (never started, or already joined)
    NotRunning,
    Finished,
    /// The task panicked; only that agent was lost
    Panicked,
    /// The task did not exit within its join wait and was cancelled
    Aborted,
}

#[derive(Debug)]
pub struct Lifecycle {
    alive: AtomicBool,
    started: AtomicBool,
    stop_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            alive: AtomicBool::new(true),
            started: AtomicBool::new(false),
            stop_tx,
            worker: Mutex::new(None),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// A fresh handle on this agent's stop signal
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            rx: self.stop_tx.subscribe(),
        }
    }

    /// Spawn the agent's run loop. Returns false if it was already started.
    pub fn spawn<F>(&self, run: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let handle = tokio::spawn(run);
        *lock(&self.worker) = Some(handle);
        true
    }

    /// Flag the agent dead and wake every wait racing the stop signal
    pub fn request_stop(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.stop_tx.send_replace(true);
    }

    /// The agent ended on its own terms
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Wait for the task to end. With a `wait`, a task still running after
    /// it is aborted.
    pub async fn join(&self, wait: Option<Duration>) -> JoinOutcome {
        let handle = lock(&self.worker).take();
        let Some(mut handle) = handle else {
            return JoinOutcome::NotRunning;
        };

        let result = match wait {
            Some(wait) => match tokio::time::timeout(wait, &mut handle).await {
                Ok(result) => result,
                Err(_) => {
                    handle.abort();
                    let _ = handle.await;
                    self.mark_dead();
                    return JoinOutcome::Aborted;
                }
            },
            None => handle.await,
        };

        self.mark_dead();
        match result {
            Ok(()) => JoinOutcome::Finished,
            Err(err) if err.is_panic() => JoinOutcome::Panicked,
            Err(_) => JoinOutcome::Aborted,
        }
    }
}

/// Receiving side of an agent's stop request
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&mut self) {
        // A dropped sender means the agent is gone: treat it as stopped
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless a stop request arrives first
    pub async fn sleep(&mut self, duration: Duration) -> Result<(), Stopped> {
        if self.is_stopped() {
            return Err(Stopped);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.stopped() => Err(Stopped),
        }
    }

    /// Sleep until `deadline` unless a stop request arrives first
    pub async fn sleep_until(&mut self, deadline: tokio::time::Instant) -> Result<(), Stopped> {
        if self.is_stopped() {
            return Err(Stopped);
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => Ok(()),
            _ = self.stopped() => Err(Stopped),
        }
    }
}
