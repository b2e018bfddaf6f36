//! Event dispatcher
//!
//! Multi-subscriber publication of typed session events. The engine's
//! single-slot callback mechanism is owned by the session controller;
//! this dispatcher is the fan-out layer on top of it, so independent
//! observers coexist without overwriting each other's registration.
//!
//! Publication goes through a pluggable [`Invoker`]: the default runs
//! observers synchronously on the advance context, the channel-backed
//! one marshals each invocation to whatever context drains the
//! channel (e.g. a UI thread). Per-session delivery order is always
//! the order notifications were raised.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::notification::{EventKind, SessionEvent};

// ----------------------------------------------------------------------------
// Invocation Strategy
// ----------------------------------------------------------------------------

/// A deferred observer invocation.
pub type Invocation = Box<dyn FnOnce() + Send>;

/// How observer callbacks are invoked when an event is published.
pub trait Invoker: Send + Sync {
    fn invoke(&self, invocation: Invocation);
}

/// Runs each observer synchronously on the publishing context. This is
/// the default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectInvoker;

impl Invoker for DirectInvoker {
    fn invoke(&self, invocation: Invocation) {
        invocation();
    }
}

/// Marshals each observer invocation over a channel to a designated
/// execution context. The consumer drains the receiver and runs each
/// invocation; a single consumer preserves publication order.
pub struct ChannelInvoker {
    sender: mpsc::UnboundedSender<Invocation>,
}

impl ChannelInvoker {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Invocation>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Invoker for ChannelInvoker {
    fn invoke(&self, invocation: Invocation) {
        // A closed receiver means the consumer is gone; the event is
        // dropped, matching an unsubscribed observer.
        if self.sender.send(invocation).is_err() {
            debug!("event invocation dropped: channel consumer is gone");
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

/// Handle identifying one observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct DispatchState {
    observers: HashMap<EventKind, Vec<(ObserverId, Observer)>>,
    invoker: Arc<dyn Invoker>,
    next_id: u64,
}

/// Fan-out of session events to registered observers.
pub struct EventDispatcher {
    state: Mutex<DispatchState>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DispatchState {
                observers: HashMap::new(),
                invoker: Arc::new(DirectInvoker),
                next_id: 0,
            }),
        }
    }

    /// Register an observer for one event kind. Observers for the same
    /// kind are invoked in registration order.
    pub fn subscribe<F>(&self, kind: EventKind, observer: F) -> ObserverId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        let id = ObserverId(state.next_id);
        state.next_id += 1;
        state
            .observers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(observer)));
        id
    }

    /// Remove one observer registration. Returns false if it was
    /// already gone.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut state = self.state.lock();
        for observers in state.observers.values_mut() {
            let before = observers.len();
            observers.retain(|(observer_id, _)| *observer_id != id);
            if observers.len() != before {
                return true;
            }
        }
        false
    }

    /// Replace the invocation strategy. Applies to subsequent
    /// publications.
    pub fn set_invoker(&self, invoker: Arc<dyn Invoker>) {
        self.state.lock().invoker = invoker;
    }

    /// Publish one event to every observer of its kind. A kind with no
    /// observers is a no-op.
    pub fn publish(&self, event: &SessionEvent) {
        // Snapshot under the lock, invoke outside it: an observer may
        // re-enter the dispatcher (or the session) without deadlocking.
        let (observers, invoker) = {
            let state = self.state.lock();
            let observers: Vec<Observer> = state
                .observers
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, observer)| observer.clone()).collect())
                .unwrap_or_default();
            (observers, state.invoker.clone())
        };

        for observer in observers {
            let event = event.clone();
            invoker.invoke(Box::new(move || observer(&event)));
        }
    }

    #[cfg(test)]
    fn observer_count(&self, kind: EventKind) -> usize {
        self.state
            .lock()
            .observers
            .get(&kind)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
