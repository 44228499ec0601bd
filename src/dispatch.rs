// SPDX-License-Identifier: GPL-3.0-only

//! Serial task queues
//!
//! A [`SerialQueue`] owns one worker thread that runs submitted jobs one at a
//! time, in submission order. The capture session runs both its configuration
//! transactions and its frame deliveries on such a queue, which gives the
//! "at most one capture callback in flight" guarantee.

use crossbeam_channel::{Receiver, Sender};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

/// Cloneable submission handle for a [`SerialQueue`]
///
/// Handles do not keep the worker alive: once the owning queue is dropped,
/// `dispatch` returns `false`.
#[derive(Clone)]
pub struct QueueHandle {
    label: Arc<str>,
    sender: Sender<Message>,
}

impl QueueHandle {
    /// Submit a job; returns `false` if the queue has shut down
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Message::Run(Box::new(job))).is_ok()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("label", &self.label)
            .finish()
    }
}

/// Single-worker FIFO task queue
pub struct SerialQueue {
    handle: QueueHandle,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl SerialQueue {
    /// Spawn the worker thread; the label doubles as the thread name
    pub fn new(label: &str) -> std::io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker_label = label.to_string();

        let thread = thread::Builder::new()
            .name(label.to_string())
            .spawn(move || run_worker(&worker_label, receiver))?;
        let thread_id = thread.thread().id();

        debug!(label, "Serial queue started");

        Ok(Self {
            handle: QueueHandle {
                label: Arc::from(label),
                sender,
            },
            thread: Some(thread),
            thread_id,
        })
    }

    /// Submit a job to run after every previously submitted job
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.dispatch(job)
    }

    /// Run `f` on the queue and wait for its result
    ///
    /// Called from the queue's own thread, `f` runs inline instead of deadlocking.
    /// Returns `None` if the queue shut down before the job ran.
    pub fn sync<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return Some(f());
        }

        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let submitted = self.dispatch(move || {
            let _ = result_tx.send(f());
        });
        if !submitted {
            return None;
        }
        result_rx.recv().ok()
    }

    /// Whether the caller is running on this queue's worker thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// A cloneable handle for submitting from other threads
    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn label(&self) -> &str {
        self.handle.label()
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        // Jobs queued before shutdown still run
        let _ = self.handle.sender.send(Message::Shutdown);

        if let Some(thread) = self.thread.take() {
            if self.is_current() {
                // Dropped from one of its own jobs; the loop exits after this job returns
                return;
            }
            if thread.join().is_err() {
                error!(label = %self.handle.label, "Serial queue worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.handle.label)
            .finish()
    }
}

fn run_worker(label: &str, receiver: Receiver<Message>) {
    for message in receiver.iter() {
        match message {
            Message::Run(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!(label, "Job panicked on serial queue");
                }
            }
            Message::Shutdown => break,
        }
    }
    debug!(label, "Serial queue exiting");
}
