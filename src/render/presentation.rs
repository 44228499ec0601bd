// SPDX-License-Identifier: GPL-3.0-only

//! In-order delivery of presented frames
//!
//! Draws are enqueued in submission order and completed by the GPU from
//! whatever thread it reports on. A completion only marks its entry done; the
//! listener is notified as the front of the queue becomes done, so
//! notifications always follow submission order.

use super::RenderedFrame;
use super::texture_cache::CachedTexture;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Receives every frame the GPU finished presenting
pub trait RenderListener<T>: Send + Sync {
    /// Called once per rendered frame, after the GPU completed its draw
    fn did_render(&self, frame: &RenderedFrame<T>);
}

struct Pending<T> {
    ticket: u64,
    /// `None` for redraws of an already notified frame
    frame: Option<RenderedFrame<T>>,
    /// Keeps the source texture's cache slot busy until completion
    hold: Option<Arc<CachedTexture<T>>>,
    done: bool,
}

struct QueueState<T> {
    next_ticket: u64,
    pending: VecDeque<Pending<T>>,
    presented: u64,
}

pub(crate) struct PresentationQueue<T> {
    state: Mutex<QueueState<T>>,
    // Serializes notification so two completing threads cannot reorder
    delivery: ReentrantMutex<()>,
    listener: RwLock<Option<Weak<dyn RenderListener<T>>>>,
}

impl<T: Send + Sync + 'static> PresentationQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                next_ticket: 0,
                pending: VecDeque::new(),
                presented: 0,
            }),
            delivery: ReentrantMutex::new(()),
            listener: RwLock::new(None),
        }
    }

    pub(crate) fn set_listener(&self, listener: Option<Weak<dyn RenderListener<T>>>) {
        *self.listener.write() = listener;
    }

    /// Register a submitted draw; returns the ticket its completion reports
    pub(crate) fn enqueue(
        &self,
        frame: Option<RenderedFrame<T>>,
        hold: Arc<CachedTexture<T>>,
    ) -> u64 {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.pending.push_back(Pending {
            ticket,
            frame,
            hold: Some(hold),
            done: false,
        });
        ticket
    }

    /// The GPU finished the draw for `ticket`
    pub(crate) fn complete(&self, ticket: u64) {
        self.finish(ticket, true);
    }

    /// The draw for `ticket` was never submitted; release it without notifying
    pub(crate) fn abandon(&self, ticket: u64) {
        self.finish(ticket, false);
    }

    fn finish(&self, ticket: u64, presented: bool) {
        let _delivery = self.delivery.lock();

        let ready: Vec<Pending<T>> = {
            let mut state = self.state.lock();
            if let Some(entry) = state.pending.iter_mut().find(|entry| entry.ticket == ticket) {
                entry.done = true;
                if !presented {
                    entry.frame = None;
                }
            }

            let mut ready = Vec::new();
            while state.pending.front().is_some_and(|entry| entry.done) {
                if let Some(entry) = state.pending.pop_front() {
                    ready.push(entry);
                }
            }
            state.presented += ready.iter().filter(|entry| entry.frame.is_some()).count() as u64;
            ready
        };

        if ready.is_empty() {
            trace!(ticket, "Completion waiting on earlier draws");
            return;
        }

        // Listener upgraded per batch; a dropped listener just misses frames
        let listener = self.listener.read().as_ref().and_then(Weak::upgrade);
        for mut entry in ready {
            // Release the source slot before the listener runs
            entry.hold = None;
            if let (Some(frame), Some(listener)) = (&entry.frame, &listener) {
                trace!(sequence = frame.sequence, "Frame presented");
                listener.did_render(frame);
            }
        }
    }

    /// Draws submitted but not yet delivered
    pub(crate) fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Frames handed to the listener path so far
    pub(crate) fn presented(&self) -> u64 {
        self.state.lock().presented
    }
}
