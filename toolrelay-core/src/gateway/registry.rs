//! Registry of in-flight invocations waiting for an out-of-band result.
//!
//! A call registers before it submits and receives a ticket plus a oneshot
//! receiver. Once the broker acknowledges with a correlation id, the ticket
//! is bound to that id. The single dispatcher feeds every notification
//! through [`PendingRegistry::dispatch`], which resolves the bound ticket.
//!
//! Two edge cases are handled here rather than by callers:
//! - a result that arrives before its acknowledgment is held briefly in an
//!   unclaimed buffer and handed over when the id gets bound
//! - ids of finished or abandoned calls are remembered for a while so late or
//!   duplicate notifications are dropped instead of buffered

use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::connection::ToolNotification;

const UNCLAIMED_TTL: Duration = Duration::from_secs(60);
const UNCLAIMED_CAPACITY: usize = 256;
const RETIRED_CAPACITY: usize = 256;

pub type Ticket = u64;

/// What [`PendingRegistry::dispatch`] did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a tool result, or no correlation id.
    Ignored,
    Delivered,
    /// The id belongs to a call that already finished or gave up.
    Late,
    /// No call has claimed the id yet; held for a later bind.
    Stashed,
}

#[derive(Default)]
struct RegistryState {
    next_ticket: Ticket,
    waiters: FxHashMap<Ticket, oneshot::Sender<Value>>,
    bindings: FxHashMap<String, Ticket>,
    unclaimed: IndexMap<String, (Value, Instant)>,
    retired: VecDeque<String>,
}

impl RegistryState {
    fn retire(&mut self, correlation_id: String) {
        if self.retired.len() >= RETIRED_CAPACITY {
            self.retired.pop_front();
        }
        self.retired.push_back(correlation_id);
    }

    fn is_retired(&self, correlation_id: &str) -> bool {
        self.retired.iter().any(|id| id == correlation_id)
    }

    fn prune_unclaimed(&mut self, now: Instant) {
        self.unclaimed
            .retain(|_, (_, stashed_at)| now.saturating_duration_since(*stashed_at) < UNCLAIMED_TTL);
        while self.unclaimed.len() >= UNCLAIMED_CAPACITY {
            if let Some((id, _)) = self.unclaimed.shift_remove_index(0) {
                debug!(correlation_id = %id, "evicting unclaimed tool result");
            }
        }
    }

    /// Hand `payload` to `ticket`'s waiter. Returns false when the waiter
    /// is already gone.
    fn deliver(&mut self, ticket: Ticket, correlation_id: &str, payload: Value) -> bool {
        let delivered = self
            .waiters
            .remove(&ticket)
            .is_some_and(|waiter| waiter.send(payload).is_ok());
        self.retire(correlation_id.to_string());
        delivered
    }
}

pub struct PendingRegistry {
    result_method: String,
    state: Mutex<RegistryState>,
}

impl PendingRegistry {
    pub fn new(result_method: impl Into<String>) -> Self {
        Self {
            result_method: result_method.into(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn result_method(&self) -> &str {
        &self.result_method
    }

    /// Register a call that is about to submit. The returned guard removes
    /// the registration when dropped, whatever the outcome.
    pub fn register(&self) -> (PendingGuard<'_>, oneshot::Receiver<Value>) {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.waiters.insert(ticket, sender);
        trace!(ticket, "registered pending invocation");

        (
            PendingGuard {
                registry: self,
                ticket,
                correlation_id: None,
            },
            receiver,
        )
    }

    /// Route one notification from the shared stream.
    pub fn dispatch(&self, notification: ToolNotification) -> DispatchOutcome {
        if notification.method != self.result_method {
            trace!(method = %notification.method, "ignoring non-result notification");
            return DispatchOutcome::Ignored;
        }
        let Some(correlation_id) = notification.correlation_id else {
            debug!("tool result notification without correlation id");
            return DispatchOutcome::Ignored;
        };

        let mut state = self.state.lock();
        if let Some(ticket) = state.bindings.remove(&correlation_id) {
            return if state.deliver(ticket, &correlation_id, notification.payload) {
                debug!(correlation_id = %correlation_id, ticket, "resolved pending invocation");
                DispatchOutcome::Delivered
            } else {
                debug!(correlation_id = %correlation_id, "caller gone; dropping tool result");
                DispatchOutcome::Late
            };
        }

        if state.is_retired(&correlation_id) {
            debug!(correlation_id = %correlation_id, "discarding late tool result");
            return DispatchOutcome::Late;
        }

        let now = Instant::now();
        state.prune_unclaimed(now);
        if state.unclaimed.contains_key(&correlation_id) {
            debug!(correlation_id = %correlation_id, "duplicate tool result for unclaimed id");
            return DispatchOutcome::Late;
        }
        debug!(correlation_id = %correlation_id, "holding tool result until its call is acknowledged");
        state
            .unclaimed
            .insert(correlation_id, (notification.payload, now));
        DispatchOutcome::Stashed
    }

    /// Calls currently registered and not yet resolved.
    pub fn outstanding(&self) -> usize {
        self.state.lock().waiters.len()
    }

    pub fn unclaimed(&self) -> usize {
        self.state.lock().unclaimed.len()
    }
}

/// Registration handle for one call.
pub struct PendingGuard<'a> {
    registry: &'a PendingRegistry,
    ticket: Ticket,
    correlation_id: Option<String>,
}

impl PendingGuard<'_> {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Make the call addressable by `correlation_id`. A result that already
    /// arrived for this id is delivered immediately.
    pub fn bind(&mut self, correlation_id: &str) {
        let mut state = self.registry.state.lock();
        self.correlation_id = Some(correlation_id.to_string());

        if let Some((payload, stashed_at)) = state.unclaimed.shift_remove(correlation_id)
            && Instant::now().saturating_duration_since(stashed_at) < UNCLAIMED_TTL
        {
            debug!(correlation_id, ticket = self.ticket, "claimed early tool result");
            state.deliver(self.ticket, correlation_id, payload);
            return;
        }

        state.bindings.insert(correlation_id.to_string(), self.ticket);
        trace!(correlation_id, ticket = self.ticket, "bound pending invocation");
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.registry.state.lock();
        let abandoned = state.waiters.remove(&self.ticket).is_some();
        if let Some(id) = self.correlation_id.take()
            && state.bindings.get(&id) == Some(&self.ticket)
        {
            state.bindings.remove(&id);
            state.retire(id);
        }
        if abandoned {
            trace!(ticket = self.ticket, "released pending invocation");
        }
    }
}
