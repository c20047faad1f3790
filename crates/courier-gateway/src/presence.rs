use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use courier_types::push::PushSubscription;

use crate::handle::ConnectionHandle;

/// Tracks which users are reachable right now and where to push when they
/// are not.
///
/// Both maps are last-writer-wins keyed by user: a second `bind` replaces
/// the first connection (no multi-device fan-out) and a second
/// `register_subscription` replaces the stored endpoint. The two lifecycles
/// are independent, so a disconnected user can still hold a subscription.
///
/// Every operation takes one short critical section and never awaits, so
/// the registry is safe to call from connection tasks and routing tasks
/// concurrently. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct Presence {
    inner: Arc<Mutex<PresenceState>>,
}

#[derive(Default)]
struct PresenceState {
    connections: HashMap<Uuid, ConnectionHandle>,
    subscriptions: HashMap<Uuid, PushSubscription>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PresenceState> {
        // No operation can leave the maps half-updated, so a poisoned lock
        // still guards consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `user` to `connection`, returning the handle it superseded.
    pub fn bind(&self, user: Uuid, connection: ConnectionHandle) -> Option<ConnectionHandle> {
        self.state().connections.insert(user, connection)
    }

    /// Remove the binding only if it still points at `connection_id`.
    /// A late disconnect from a replaced connection is a no-op.
    pub fn unbind(&self, user: Uuid, connection_id: Uuid) -> bool {
        let mut state = self.state();
        match state.connections.get(&user) {
            Some(current) if current.id() == connection_id => {
                state.connections.remove(&user);
                true
            }
            _ => false,
        }
    }

    pub fn connection(&self, user: Uuid) -> Option<ConnectionHandle> {
        self.state().connections.get(&user).cloned()
    }

    pub fn register_subscription(&self, user: Uuid, subscription: PushSubscription) {
        self.state().subscriptions.insert(user, subscription);
    }

    pub fn subscription(&self, user: Uuid) -> Option<PushSubscription> {
        self.state().subscriptions.get(&user).cloned()
    }

    pub fn online_count(&self) -> usize {
        self.state().connections.len()
    }

    /// Drop every binding and subscription. Live connections see their
    /// outbound queue close and shut down.
    pub fn shutdown(&self) {
        let mut state = self.state();
        state.connections.clear();
        state.subscriptions.clear();
    }
}
