//! Effect scopes: construction contexts with teardown hooks.
//!
//! A scope is "current" while [`EffectScope::run`] executes. Anything that
//! wants to be cleaned up with the scope registers a hook through
//! [`Runtime::on_scope_dispose`] during that window; [`EffectScope::stop`]
//! runs every hook exactly once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use super::Runtime;

pub(crate) type HookFn = Box<dyn FnOnce() + Send>;
pub(crate) type Liveness = Box<dyn Fn() -> bool + Send>;

struct Hook {
    run: HookFn,
    /// Reports false once running the hook would do nothing.
    live: Option<Liveness>,
}

impl Hook {
    fn is_live(&self) -> bool {
        self.live.as_ref().map_or(true, |live| live())
    }
}

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

struct ScopeInner {
    id: u64,
    active: AtomicBool,
    hooks: Mutex<Vec<Hook>>,
}

/// A component or effect construction scope.
#[derive(Clone)]
pub struct EffectScope {
    inner: Arc<ScopeInner>,
    runtime: Runtime,
}

impl EffectScope {
    pub(super) fn new(runtime: Runtime) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                active: AtomicBool::new(true),
                hooks: Mutex::new(Vec::new()),
            }),
            runtime,
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Number of teardown hooks waiting for `stop`.
    pub fn hook_count(&self) -> usize {
        self.inner.hooks.lock().len()
    }

    /// Run `f` with this scope as the current scope.
    ///
    /// Returns `None` without calling `f` if the scope was already stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            tracing::debug!(scope = self.id(), "run on stopped scope ignored");
            return None;
        }
        let _frame = self.runtime.scopes().enter(self.clone());
        Some(f())
    }

    /// Stop the scope, running all teardown hooks once. Idempotent.
    pub fn stop(&self) {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }
        // Hooks run without the lock so they can touch other scopes.
        let hooks = std::mem::take(&mut *self.inner.hooks.lock());
        tracing::debug!(scope = self.id(), hooks = hooks.len(), "stopping effect scope");
        for hook in hooks {
            (hook.run)();
        }
    }

    /// Returns false if the scope is stopped; the hook is dropped unrun.
    ///
    /// Hooks whose `live` check has gone false are pruned here, so a
    /// long-lived scope only retains hooks that still have work to do.
    pub(super) fn add_hook(&self, run: HookFn, live: Option<Liveness>) -> bool {
        let mut hooks = self.inner.hooks.lock();
        // Checked under the lock so a concurrent stop cannot miss the hook.
        if !self.is_active() {
            return false;
        }
        hooks.retain(Hook::is_live);
        hooks.push(Hook { run, live });
        true
    }
}

impl PartialEq for EffectScope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("hooks", &self.hook_count())
            .finish()
    }
}

/// Currently running scopes per thread, innermost last.
///
/// A scope entered on one thread is never current on another.
pub(crate) struct ScopeStack {
    frames: Mutex<HashMap<ThreadId, Vec<EffectScope>>>,
}

/// Removes the entered scope when dropped, including on unwind.
pub(crate) struct ScopeFrame<'a> {
    stack: &'a ScopeStack,
    thread: ThreadId,
    scope: u64,
}

impl Drop for ScopeFrame<'_> {
    fn drop(&mut self) {
        let mut frames = self.stack.frames.lock();
        if let Some(entries) = frames.get_mut(&self.thread) {
            if let Some(pos) = entries.iter().rposition(|s| s.id() == self.scope) {
                entries.remove(pos);
            }
            if entries.is_empty() {
                frames.remove(&self.thread);
            }
        }
    }
}

impl ScopeStack {
    pub(crate) fn new() -> Self {
        Self {
            frames: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn enter(&self, scope: EffectScope) -> ScopeFrame<'_> {
        let thread = thread::current().id();
        let id = scope.id();
        self.frames.lock().entry(thread).or_default().push(scope);
        ScopeFrame {
            stack: self,
            thread,
            scope: id,
        }
    }

    /// Innermost scope running on the calling thread.
    pub(crate) fn current(&self) -> Option<EffectScope> {
        let thread = thread::current().id();
        self.frames.lock().get(&thread).and_then(|s| s.last().cloned())
    }

    /// Scope depth on the calling thread.
    pub(crate) fn depth(&self) -> usize {
        let thread = thread::current().id();
        self.frames.lock().get(&thread).map_or(0, Vec::len)
    }
}
