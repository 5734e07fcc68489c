// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle management for long-running loops
//!
//! The compositing engine and the hotkey listener each run on a dedicated OS
//! thread. This module gives both the same start / stop / bounded-join
//! handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Poll interval of [`LoopController::join_timeout`]
const JOIN_POLL: Duration = Duration::from_millis(5);

/// Controller for a loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let controller = LoopController::start("hotkeys", || {
///     match poll_key() {
///         Some(key) => dispatch(key),
///         None => {}
///     }
///     LoopAction::Continue
/// });
///
/// // Later, stop the loop
/// controller.stop();
/// ```
pub struct LoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl LoopController {
    /// Start a new loop in a separate thread
    ///
    /// The provided closure is called repeatedly until it returns `LoopAction::Stop`
    /// or the controller's `stop()` method is called.
    pub fn start<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::start_with_state(name, (), move |_| loop_fn(), |_| {})
    }

    /// Start a loop that owns `state`
    ///
    /// `loop_fn` runs once per iteration with the state; `on_exit` receives
    /// the state after the loop ends, whichever way it ended.
    pub fn start_with_state<S, F, E>(name: &str, mut state: S, mut loop_fn: F, on_exit: E) -> Self
    where
        S: Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
        E: FnOnce(S) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting loop thread");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Loop thread started");

                loop {
                    // Check stop signal first
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    match loop_fn(&mut state) {
                        LoopAction::Continue => {}
                        LoopAction::Stop => {
                            debug!(name = %name_clone, "Loop requested stop");
                            break;
                        }
                    }
                }

                on_exit(state);
                info!(name = %name_clone, "Loop thread exiting");
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn loop thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Get a clone of the stop signal for external use
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Loop thread finished");
            }
        }
    }

    /// Wait at most `timeout` for the thread to finish
    ///
    /// Returns `false` if the thread is still running; it is then detached
    /// and left to exit on its own.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                warn!(
                    name = %self.name,
                    ?timeout,
                    "Loop thread did not stop in time, abandoning it"
                );
                self.thread_handle = None;
                return false;
            }
            thread::sleep(JOIN_POLL);
        }
        self.join();
        true
    }

    /// Stop and wait at most `timeout`; see [`join_timeout`](Self::join_timeout)
    pub fn stop_timeout(&mut self, timeout: Duration) -> bool {
        self.request_stop();
        self.join_timeout(timeout)
    }
}

impl Drop for LoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "LoopController dropped, stopping loop");
            self.stop();
        }
    }
}
