//! Listener registry for dispatching mutations to subscribers.

use crate::mutation::MutationDescriptor;
use crate::runtime::Runtime;
use crate::state::ReactiveTree;
use crate::types::{State, StoreId};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::scheduler::{FlushScheduler, SyncStateView};
use super::types::{Listener, SubscribeOptions, SubscriptionId, Unsubscribe};

/// Ordered subscribers of one store.
pub struct ListenerRegistry {
    store_id: StoreId,
    runtime: Runtime,
    /// Active listeners in insertion order.
    listeners: RwLock<Vec<Arc<Listener>>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Set by `close`; later subscriptions start inactive.
    closed: AtomicBool,
    scheduler: FlushScheduler,
}

impl ListenerRegistry {
    pub fn new(store_id: StoreId, runtime: Runtime) -> Arc<Self> {
        Arc::new(Self {
            store_id,
            scheduler: FlushScheduler::new(runtime.clone()),
            runtime,
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    pub fn store_id(&self) -> &StoreId {
        &self.store_id
    }

    /// Register a subscriber.
    ///
    /// If an effect scope is running on this thread and `options.detached`
    /// is false, the returned handle also runs when that scope stops.
    ///
    /// On a closed registry the handle comes back already inactive.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&MutationDescriptor, &State) + Send + Sync + 'static,
        options: SubscribeOptions,
    ) -> Unsubscribe {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let listener = Arc::new(Listener::new(id, options.flush, Arc::new(callback)));
        let handle = Unsubscribe {
            listener: Arc::clone(&listener),
            registry: Arc::downgrade(self),
        };

        {
            let mut listeners = self.listeners.write();
            if self.closed.load(Ordering::Acquire) {
                listener.deactivate();
                tracing::debug!(store = %self.store_id, subscription = id.0, "subscribe on closed registry");
                return handle;
            }
            listeners.push(listener);
        }

        let bound = !options.detached && {
            let hook = handle.clone();
            let watched = handle.clone();
            self.runtime.bind_to_scope(
                Box::new(move || hook.unsubscribe()),
                Some(Box::new(move || watched.is_active())),
            )
        };

        tracing::debug!(
            store = %self.store_id,
            subscription = id.0,
            flush = ?options.flush,
            bound,
            "subscribed"
        );
        handle
    }

    /// Drop a listener from the list. Returns false if it was not present.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        let removed = listeners.len() != before;
        if removed {
            tracing::debug!(store = %self.store_id, subscription = id.0, "unsubscribed");
        }
        removed
    }

    /// Deliver `descriptor` to every listener registered right now.
    ///
    /// The list is snapshotted first: listeners added during delivery wait
    /// for the next mutation, listeners removed during delivery are skipped.
    /// Returns the number of listeners in the snapshot.
    pub fn dispatch(&self, descriptor: MutationDescriptor, tree: &Arc<ReactiveTree>) -> usize {
        let snapshot: Vec<Arc<Listener>> = self.listeners.read().clone();
        tracing::trace!(
            store = %self.store_id,
            mutation = %descriptor.mutation_type(),
            listeners = snapshot.len(),
            "dispatching mutation"
        );
        if snapshot.is_empty() {
            return 0;
        }

        let descriptor = Arc::new(descriptor);
        let mut sync_state = SyncStateView::new(tree);
        for listener in &snapshot {
            self.scheduler
                .deliver(Arc::clone(listener), &descriptor, &mut sync_state);
        }
        tracing::trace!(store = %self.store_id, state_clones = sync_state.clones(), "dispatch done");
        snapshot.len()
    }

    /// Deactivate and remove every listener, and refuse new ones from now
    /// on. Returns how many were removed.
    pub fn close(&self) -> usize {
        let removed = {
            let mut listeners = self.listeners.write();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *listeners)
        };
        for listener in &removed {
            listener.deactivate();
        }
        removed.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

}
