//! Per-subscription delivery timing.

use crate::error::StoreError;
use crate::mutation::MutationDescriptor;
use crate::runtime::Runtime;
use crate::state::ReactiveTree;
use crate::types::{FlushMode, State};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::types::Listener;

/// Delivers descriptors now (`Sync`) or on the next drain (`Post`).
///
/// Post deliveries are never merged: each call to `deliver` queues its own
/// job, so N mutations before a drain give N callback invocations.
pub(crate) struct FlushScheduler {
    runtime: Runtime,
}

impl FlushScheduler {
    pub(crate) fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    pub(crate) fn deliver(
        &self,
        listener: Arc<Listener>,
        descriptor: &Arc<MutationDescriptor>,
        sync_state: &mut SyncStateView<'_>,
    ) {
        match listener.flush {
            FlushMode::Sync => {
                if listener.is_active() {
                    invoke(&self.runtime, &listener, descriptor, sync_state.get());
                }
            }
            FlushMode::Post => {
                let runtime = self.runtime.clone();
                let descriptor = Arc::clone(descriptor);
                let tree = Arc::clone(sync_state.tree);
                self.runtime.queue_post_flush(Box::new(move || {
                    if listener.is_active() {
                        // Post listeners see the state as of the drain
                        let state = tree.snapshot();
                        invoke(&runtime, &listener, &descriptor, &state);
                    }
                }));
            }
        }
    }
}

/// State handed to the sync listeners of one dispatch.
///
/// Cloned on first use and shared until a listener writes to the tree.
pub(crate) struct SyncStateView<'a> {
    tree: &'a Arc<ReactiveTree>,
    cached: Option<(u64, State)>,
    clones: usize,
}

impl<'a> SyncStateView<'a> {
    pub(crate) fn new(tree: &'a Arc<ReactiveTree>) -> Self {
        Self {
            tree,
            cached: None,
            clones: 0,
        }
    }

    pub(crate) fn get(&mut self) -> &State {
        let version = self.tree.version();
        if self.cached.as_ref().is_some_and(|(v, _)| *v != version) {
            self.cached = None;
        }
        let tree = self.tree;
        let clones = &mut self.clones;
        let (_, state) = self.cached.get_or_insert_with(|| {
            *clones += 1;
            tree.versioned_snapshot()
        });
        state
    }

    /// How many times the state was cloned.
    pub(crate) fn clones(&self) -> usize {
        self.clones
    }
}

/// Call the listener, isolating panics.
fn invoke(runtime: &Runtime, listener: &Listener, descriptor: &MutationDescriptor, state: &State) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        (listener.callback)(descriptor, state);
    }));

    if let Err(panic) = result {
        tracing::debug!(
            store = %descriptor.store_id,
            subscription = listener.id.0,
            "subscriber panicked"
        );
        runtime.report_error(StoreError::SubscriberCallback {
            store_id: descriptor.store_id.clone(),
            message: panic_message(panic.as_ref()),
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
