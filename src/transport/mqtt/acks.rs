//! Correlates requests with broker acknowledgments
//!
//! rumqttc assigns packet ids inside the event loop, so a caller does not
//! know its id when it queues a request. Waiters are therefore queued per
//! request kind in send order and bound to a packet id when the matching
//! outgoing event is observed. Callers must enqueue and send under one lock
//! so queue order equals send order.

use super::super::SessionError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;

/// Request kinds that wait for an acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckKind {
    Publish,
    Subscribe,
    Unsubscribe,
}

type Waiter = oneshot::Sender<Result<(), SessionError>>;

#[derive(Default)]
struct AckState {
    unbound: HashMap<AckKind, VecDeque<Waiter>>,
    bound: HashMap<(AckKind, u16), Waiter>,
}

/// Pending acknowledgment waiters
#[derive(Default)]
pub struct AckTracker {
    state: Mutex<AckState>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AckState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a waiter for the next request of `kind`
    pub fn enqueue(&self, kind: AckKind) -> oneshot::Receiver<Result<(), SessionError>> {
        let (tx, rx) = oneshot::channel();
        self.lock().unbound.entry(kind).or_default().push_back(tx);
        rx
    }

    /// Drop the most recently queued waiter of `kind` after a failed send
    pub fn cancel_last(&self, kind: AckKind) {
        if let Some(queue) = self.lock().unbound.get_mut(&kind) {
            queue.pop_back();
        }
    }

    /// A request of `kind` left the client with `pkid`
    ///
    /// Packet id 0 marks a QoS 0 publish, which completes immediately. A
    /// packet id that is already bound is a retransmission and is ignored.
    pub fn on_sent(&self, kind: AckKind, pkid: u16) {
        let mut state = self.lock();
        if state.bound.contains_key(&(kind, pkid)) {
            return;
        }
        let Some(waiter) = state.unbound.get_mut(&kind).and_then(VecDeque::pop_front) else {
            return;
        };
        if pkid == 0 {
            drop(state);
            let _ = waiter.send(Ok(()));
        } else {
            state.bound.insert((kind, pkid), waiter);
        }
    }

    /// Resolve the waiter bound to `(kind, pkid)`
    pub fn complete(&self, kind: AckKind, pkid: u16, result: Result<(), SessionError>) {
        let waiter = self.lock().bound.remove(&(kind, pkid));
        if let Some(waiter) = waiter {
            let _ = waiter.send(result);
        }
    }

    /// Fail every pending waiter
    pub fn fail_all(&self, error: impl Fn() -> SessionError) {
        let waiters: Vec<Waiter> = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let unbound = state.unbound.drain().flat_map(|(_, queue)| queue);
            let bound = state.bound.drain().map(|(_, waiter)| waiter);
            unbound.chain(bound).collect()
        };
        for waiter in waiters {
            let _ = waiter.send(Err(error()));
        }
    }

    /// Number of waiters still pending
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.unbound.values().map(VecDeque::len).sum::<usize>() + state.bound.len()
    }
}
