// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for timed loops
//!
//! Synthetic cameras emit frames and the display link fires draws from a
//! dedicated thread that ticks at a fixed rate. [`FrameLoop`] owns that thread:
//! it paces the ticks, wakes promptly on stop and joins on drop.

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

/// Controller for a loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let mut ticker = FrameLoop::start_paced("display-link", Duration::from_millis(33), |tick| {
///     renderer.draw();
///     LoopAction::Continue
/// })?;
///
/// // Later, stop the loop
/// ticker.stop();
/// ```
pub struct FrameLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl FrameLoop {
    /// Call `tick` once per `interval`, passing the tick index
    ///
    /// Ticks are scheduled against absolute deadlines so they do not drift. A
    /// tick that overruns by more than one interval skips the missed deadlines
    /// instead of firing a burst to catch up.
    pub fn start_paced<F>(name: &str, interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut(u64) -> LoopAction + Send + 'static,
    {
        let interval = interval.max(Duration::from_micros(100));

        Self::spawn(name, move |stop_signal, name| {
            let mut index: u64 = 0;
            let mut deadline = Instant::now();

            loop {
                // Sleep until the deadline; `stop()` unparks us early
                loop {
                    if stop_signal.load(Ordering::SeqCst) {
                        debug!(loop_name = name, "Stop signal received");
                        return;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    thread::park_timeout(deadline - now);
                }

                if tick(index) == LoopAction::Stop {
                    debug!(loop_name = name, tick = index, "Loop requested stop");
                    return;
                }
                index += 1;

                deadline += interval;
                let now = Instant::now();
                if now > deadline + interval {
                    let behind = now - deadline;
                    let skipped = (behind.as_nanos() / interval.as_nanos()) as u32;
                    debug!(loop_name = name, skipped, "Loop fell behind, skipping ticks");
                    deadline += interval * skipped;
                }
            }
        })
    }

    fn spawn<B>(name: &str, body: B) -> std::io::Result<Self>
    where
        B: FnOnce(&AtomicBool, &str) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Loop thread started");
                body(stop_signal_clone.as_ref(), name_clone.as_str());
                info!(name = %name_clone, "Loop thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop without waiting for it
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = &self.thread_handle {
            handle.thread().unpark();
        }
    }

    /// Stop the loop and wait for the thread to finish
    ///
    /// A tick already in progress runs to completion first.
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Stopped from inside its own tick; the loop exits when the tick returns
                return;
            }
            debug!(name = %self.name, "Waiting for loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Loop thread finished");
            }
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "FrameLoop dropped, stopping loop");
            self.stop();
        }
    }
}

impl std::fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLoop")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}
