//! Advance loop
//!
//! A cooperative loop that repeatedly drives one engine tick and
//! suspends for the interval the engine recommends. Exactly one loop
//! may run per session. Stopping is a signal observed between ticks,
//! never a forced termination mid-tick; a mid-tick abort could leave
//! the engine handle in an undefined state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

// ----------------------------------------------------------------------------
// Loop State
// ----------------------------------------------------------------------------

/// Lifecycle of the advance loop. There is no pause state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    Stopping,
}

struct LoopCtl {
    state: LoopState,
    stop: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

// ----------------------------------------------------------------------------
// Advance Loop
// ----------------------------------------------------------------------------

/// Drives a tick function until stopped or until the tick reports the
/// session is gone.
///
/// `start` must be called from within a tokio runtime; the loop runs
/// as a spawned task. The tick function returns the interval to sleep
/// before the next tick, or `None` when the loop should exit on its
/// own (the session was closed underneath it).
pub struct AdvanceLoop {
    ctl: Arc<Mutex<LoopCtl>>,
}

impl Default for AdvanceLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvanceLoop {
    pub fn new() -> Self {
        Self {
            ctl: Arc::new(Mutex::new(LoopCtl {
                state: LoopState::Stopped,
                stop: None,
                handle: None,
            })),
        }
    }

    pub fn state(&self) -> LoopState {
        self.ctl.lock().state
    }

    /// Transition `Stopped -> Running` and spawn the loop task.
    /// A no-op (returning false) in any other state.
    pub fn start<F>(&self, mut tick: F) -> bool
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        let mut ctl = self.ctl.lock();
        if ctl.state != LoopState::Stopped {
            return false;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let ctl_handle = Arc::clone(&self.ctl);

        let handle = tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                let Some(interval) = tick() else {
                    debug!("advance loop exiting: session closed");
                    break;
                };
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_rx.changed() => break,
                }
            }
            // Natural exit: nobody is joining us, so record Stopped
            // ourselves. On a requested stop, stop() finalizes state
            // after the join.
            let mut ctl = ctl_handle.lock();
            if ctl.state == LoopState::Running {
                ctl.state = LoopState::Stopped;
                ctl.stop = None;
            }
        });

        ctl.state = LoopState::Running;
        ctl.stop = Some(stop_tx);
        ctl.handle = Some(handle);
        true
    }

    /// Transition `Running -> Stopping`, wait for the loop to observe
    /// the signal and finish its current tick, then record `Stopped`.
    /// A no-op (returning false) unless currently `Running`.
    pub async fn stop(&self) -> bool {
        let handle = {
            let mut ctl = self.ctl.lock();
            if ctl.state != LoopState::Running {
                return false;
            }
            ctl.state = LoopState::Stopping;
            if let Some(stop) = ctl.stop.take() {
                let _ = stop.send(true);
            }
            ctl.handle.take()
        };

        if let Some(handle) = handle {
            // The task never panics; a join error only occurs if it
            // was aborted, which also means it is finished.
            let _ = handle.await;
        }

        self.ctl.lock().state = LoopState::Stopped;
        true
    }

    /// Last-resort teardown for drop-without-close: abort the task.
    /// Cancellation lands on the sleep between ticks, never inside a
    /// tick, so the engine is not interrupted mid-call.
    pub(crate) fn abort(&self) {
        let mut ctl = self.ctl.lock();
        if let Some(handle) = ctl.handle.take() {
            handle.abort();
        }
        ctl.stop = None;
        ctl.state = LoopState::Stopped;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
