//! Reactive state tree with change watchers.

use crate::runtime::Runtime;
use crate::types::{FlushMode, State, StateChange};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use super::operations::diff;

/// Callback invoked with the changes of one write.
pub type WatchCallback = dyn Fn(&[StateChange]) + Send + Sync;

struct Watcher {
    id: u64,
    flush: FlushMode,
    callback: Arc<WatchCallback>,
    active: AtomicBool,
}

impl Watcher {
    fn fire(&self, changes: &[StateChange]) {
        if self.active.load(Ordering::Acquire) {
            (self.callback)(changes);
        }
    }
}

/// A JSON object tree that notifies watchers after each write.
///
/// Every call to [`write`](Self::write) that changes the tree produces one
/// notification, however many fields it touched. Writes that leave the
/// tree equal produce none. While a [`PauseGuard`] is alive, writes still
/// apply but notify nobody.
///
/// The write closure runs under the tree lock: it must not call back into
/// the same tree.
pub struct ReactiveTree {
    runtime: Runtime,
    state: Mutex<State>,
    watchers: Mutex<Vec<Arc<Watcher>>>,
    next_watcher_id: AtomicU64,
    paused: AtomicUsize,
    /// Bumped under the state lock by every write that changes the tree.
    version: AtomicU64,
}

impl ReactiveTree {
    pub fn new(runtime: Runtime, initial: State) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            state: Mutex::new(initial),
            watchers: Mutex::new(Vec::new()),
            next_watcher_id: AtomicU64::new(1),
            paused: AtomicUsize::new(0),
            version: AtomicU64::new(0),
        })
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> State {
        self.state.lock().clone()
    }

    /// Clone of the current state with the version it was taken at.
    pub fn versioned_snapshot(&self) -> (u64, State) {
        let state = self.state.lock();
        (self.version.load(Ordering::Acquire), state.clone())
    }

    /// Changes on every write that alters the tree.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    /// Watch the tree. `Sync` watchers run inside `write`; `Post` watchers
    /// are queued on the runtime, one job per write.
    pub fn watch(
        self: &Arc<Self>,
        flush: FlushMode,
        callback: impl Fn(&[StateChange]) + Send + Sync + 'static,
    ) -> WatchHandle {
        let watcher = Arc::new(Watcher {
            id: self.next_watcher_id.fetch_add(1, Ordering::Relaxed),
            flush,
            callback: Arc::new(callback),
            active: AtomicBool::new(true),
        });
        self.watchers.lock().push(Arc::clone(&watcher));

        WatchHandle {
            watcher,
            tree: Arc::downgrade(self),
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Apply `f` to the tree and notify watchers once if anything changed.
    ///
    /// Returns `f`'s result and the changes it made.
    pub fn write<R>(&self, f: impl FnOnce(&mut State) -> R) -> (R, Vec<StateChange>) {
        let (result, changes) = {
            let mut state = self.state.lock();
            let before = state.clone();
            let result = f(&mut *state);
            let changes = diff(&before, &state);
            if !changes.is_empty() {
                self.version.fetch_add(1, Ordering::AcqRel);
            }
            (result, changes)
        };

        if !changes.is_empty() && !self.is_paused() {
            self.notify(&changes);
        }
        (result, changes)
    }

    /// Suspend notifications until the guard drops. Nests.
    pub fn pause(&self) -> PauseGuard<'_> {
        self.paused.fetch_add(1, Ordering::AcqRel);
        PauseGuard { tree: self }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire) > 0
    }

    fn notify(&self, changes: &[StateChange]) {
        let watchers: Vec<Arc<Watcher>> = self.watchers.lock().iter().cloned().collect();
        let mut shared: Option<Arc<Vec<StateChange>>> = None;

        for watcher in watchers {
            match watcher.flush {
                FlushMode::Sync => watcher.fire(changes),
                FlushMode::Post => {
                    let changes = Arc::clone(shared.get_or_insert_with(|| Arc::new(changes.to_vec())));
                    self.runtime
                        .queue_post_flush(Box::new(move || watcher.fire(&changes)));
                }
            }
        }
    }

    fn unwatch(&self, id: u64) {
        self.watchers.lock().retain(|w| w.id != id);
    }
}

/// Resumes notifications on drop.
pub struct PauseGuard<'a> {
    tree: &'a ReactiveTree,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.tree.paused.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Stops a watcher. Stopping twice is a no-op.
pub struct WatchHandle {
    watcher: Arc<Watcher>,
    tree: Weak<ReactiveTree>,
}

impl WatchHandle {
    pub fn stop(&self) {
        if !self.watcher.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(tree) = self.tree.upgrade() {
            tree.unwatch(self.watcher.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.watcher.active.load(Ordering::Acquire)
    }
}
