//! Long-lived polling workers sharing one cooperative stop signal.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

/// Cancellation token that sleeping workers can wait on.
///
/// Cloning shares the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter. Idempotent.
    pub fn stop(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`, returning early once stopped.
    ///
    /// Returns true if the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// One background duty, run once per interval.
pub trait Worker: Send + 'static {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    /// One unit of work. Errors are logged and the loop continues.
    fn tick(&mut self) -> Result<()>;
}

/// Drive `worker` until `stop` is set. A failing or panicking tick is logged
/// and does not end the loop.
pub fn run_worker(mut worker: impl Worker, stop: &StopSignal) {
    let name = worker.name().to_string();
    info!(worker = %name, "worker started");
    while !stop.is_stopped() {
        match catch_unwind(AssertUnwindSafe(|| worker.tick())) {
            Ok(Ok(())) => debug!(worker = %name, "tick finished"),
            Ok(Err(err)) => error!(worker = %name, error = %format!("{err:#}"), "tick failed"),
            Err(_) => error!(worker = %name, "tick panicked"),
        }
        if stop.wait_timeout(worker.interval()) {
            break;
        }
    }
    info!(worker = %name, "worker stopped");
}

/// Owns the worker threads started for one session.
#[derive(Debug)]
pub struct BackgroundSupervisor {
    stop: StopSignal,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl BackgroundSupervisor {
    pub fn new(stop: StopSignal) -> Self {
        Self {
            stop,
            handles: Vec::new(),
        }
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Start `worker` on its own named thread.
    pub fn spawn(&mut self, worker: impl Worker) -> Result<()> {
        let name = worker.name().to_string();
        let stop = self.stop.clone();
        let handle = thread::Builder::new()
            .name(format!("foundry-{name}"))
            .spawn(move || run_worker(worker, &stop))
            .with_context(|| format!("spawn worker {name}"))?;
        self.handles.push((name, handle));
        Ok(())
    }

    /// Signal stop and wait at most `timeout` for every worker.
    ///
    /// Returns the names of workers still running at the deadline; their
    /// threads are detached.
    pub fn shutdown(self, timeout: Duration) -> Vec<String> {
        self.stop.stop();
        let deadline = Instant::now() + timeout;
        let mut pending = self.handles;
        loop {
            let (finished, running): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|(_, handle)| handle.is_finished());
            for (name, handle) in finished {
                if handle.join().is_err() {
                    warn!(worker = %name, "worker thread panicked");
                }
            }
            pending = running;
            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let stragglers: Vec<String> = pending.into_iter().map(|(name, _)| name).collect();
        if stragglers.is_empty() {
            info!("all workers stopped");
        } else {
            warn!(workers = ?stragglers, "workers still running after shutdown timeout");
        }
        stragglers
    }
}
