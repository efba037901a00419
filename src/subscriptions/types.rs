//! Subscription types.

use crate::mutation::MutationDescriptor;
use crate::types::{FlushMode, State};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::manager::ListenerRegistry;

/// Subscriber callback: the mutation and the state at delivery time.
pub type SubscriberFn = dyn Fn(&MutationDescriptor, &State) + Send + Sync;

/// Options for [`Store::subscribe`](crate::Store::subscribe).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Delivery timing.
    /// Default: `FlushMode::Post`
    pub flush: FlushMode,

    /// Keep the subscription alive when the scope it was created in stops.
    /// Default: false
    pub detached: bool,
}

impl SubscribeOptions {
    pub fn sync() -> Self {
        Self {
            flush: FlushMode::Sync,
            ..Default::default()
        }
    }

    pub fn post() -> Self {
        Self {
            flush: FlushMode::Post,
            ..Default::default()
        }
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }
}

/// Unique identifier for a subscription within a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A registered subscriber.
pub(crate) struct Listener {
    pub(crate) id: SubscriptionId,
    pub(crate) flush: FlushMode,
    pub(crate) callback: Arc<SubscriberFn>,
    active: AtomicBool,
}

impl Listener {
    pub(crate) fn new(id: SubscriptionId, flush: FlushMode, callback: Arc<SubscriberFn>) -> Self {
        Self {
            id,
            flush,
            callback,
            active: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns true only for the call that moved it to inactive.
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }
}

/// Handle that removes a subscription.
///
/// Cloneable and callable any number of times; only the first call has an
/// effect. Dropping the handle does not unsubscribe.
#[derive(Clone)]
pub struct Unsubscribe {
    pub(crate) listener: Arc<Listener>,
    pub(crate) registry: Weak<ListenerRegistry>,
}

impl Unsubscribe {
    pub fn id(&self) -> SubscriptionId {
        self.listener.id
    }

    pub fn unsubscribe(&self) {
        if !self.listener.deactivate() {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.listener.id);
        }
    }

    /// Whether the subscription can still fire.
    pub fn is_active(&self) -> bool {
        self.listener.is_active()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.listener.id)
            .field("active", &self.is_active())
            .finish()
    }
}
