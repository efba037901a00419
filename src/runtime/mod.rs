//! Minimal host runtime for reactive stores.
//!
//! Provides the three capabilities stores consume from their host:
//! - a FIFO post-flush queue, drained by [`Runtime::next_tick`]
//! - a stack of effect scopes with teardown hooks ([`EffectScope`])
//! - an error channel for failures that must not reach the mutation call site
//!
//! A `Runtime` is a cheap handle (`Arc` inside). A registry and all of its
//! stores share one runtime; independent runtimes never observe each
//! other's queues or scopes.
//!
//! # Example
//!
//! ```ignore
//! let runtime = Runtime::new();
//! let scope = runtime.effect_scope();
//! scope.run(|| {
//!     store.subscribe(|mutation, state| println!("{mutation:?}"), SubscribeOptions::default());
//! });
//! store.set("user", json!("Cleiton"));
//! runtime.next_tick()?; // post subscribers run here
//! scope.stop();         // and are removed here
//! ```

mod queue;
mod scope;

pub use scope::EffectScope;

use crate::error::{Result, StoreError};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use queue::PostFlushQueue;
use scope::{HookFn, Liveness, ScopeStack};

/// A unit of deferred work on the post-flush queue.
pub type Job = Box<dyn FnOnce() + Send>;

/// Receives errors that are isolated from the mutation call site.
pub type ErrorHandler = dyn Fn(&StoreError) + Send + Sync;

/// Runtime configuration.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Max jobs run by a single drain of the post-flush queue.
    /// Guards against callbacks that keep re-queueing work.
    /// Default: 10_000
    pub flush_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_limit: 10_000,
        }
    }
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    queue: PostFlushQueue,
    scopes: ScopeStack,
    error_handler: RwLock<Option<Arc<ErrorHandler>>>,
}

/// Handle to the host runtime shared by a registry and its stores.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with custom configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                queue: PostFlushQueue::new(),
                scopes: ScopeStack::new(),
                error_handler: RwLock::new(None),
            }),
        }
    }

    // --- Post-flush queue ---

    /// Queue a job to run on the next drain.
    pub fn queue_post_flush(&self, job: Job) {
        self.inner.queue.push(job);
    }

    /// Drain the post-flush queue, running jobs in FIFO order.
    ///
    /// Jobs queued while draining run in the same drain. Calling this from
    /// inside a job is a no-op returning `Ok(0)`. Returns the number of jobs
    /// run, or `FlushLimitExceeded` if the configured limit was reached
    /// with work still pending.
    pub fn next_tick(&self) -> Result<usize> {
        self.inner.queue.drain(self.inner.config.flush_limit)
    }

    /// Number of jobs waiting for the next drain.
    pub fn pending_jobs(&self) -> usize {
        self.inner.queue.len()
    }

    // --- Effect scopes ---

    /// Create a scope. If another scope is active, the new one stops with it.
    pub fn effect_scope(&self) -> EffectScope {
        let scope = EffectScope::new(self.clone());
        if let Some(parent) = self.current_scope() {
            let child = scope.clone();
            let watched = scope.clone();
            parent.add_hook(
                Box::new(move || child.stop()),
                Some(Box::new(move || watched.is_active())),
            );
        }
        scope
    }

    /// Create a scope that is never stopped by an enclosing scope.
    pub fn detached_effect_scope(&self) -> EffectScope {
        EffectScope::new(self.clone())
    }

    /// The innermost scope running on the calling thread, if still active.
    pub fn current_scope(&self) -> Option<EffectScope> {
        self.inner.scopes.current().filter(|s| s.is_active())
    }

    /// Register `hook` to run when the current scope stops.
    ///
    /// Returns false (and drops the hook) if no scope is active.
    pub fn on_scope_dispose(&self, hook: Box<dyn FnOnce() + Send>) -> bool {
        self.bind_to_scope(hook, None)
    }

    /// Like `on_scope_dispose`, but the scope may drop the hook early once
    /// `live` reports false.
    pub(crate) fn bind_to_scope(&self, hook: HookFn, live: Option<Liveness>) -> bool {
        match self.current_scope() {
            Some(scope) => scope.add_hook(hook, live),
            None => false,
        }
    }

    pub(crate) fn scopes(&self) -> &ScopeStack {
        &self.inner.scopes
    }

    // --- Errors ---

    /// Install the handler that receives isolated errors.
    pub fn set_error_handler(&self, handler: impl Fn(&StoreError) + Send + Sync + 'static) {
        *self.inner.error_handler.write() = Some(Arc::new(handler));
    }

    /// Remove the error handler. Errors are still logged.
    pub fn clear_error_handler(&self) {
        *self.inner.error_handler.write() = None;
    }

    /// Log an isolated error and forward it to the error handler.
    pub fn report_error(&self, error: StoreError) {
        tracing::error!(error = %error, "isolated store error");
        let handler = self.inner.error_handler.read().clone();
        if let Some(handler) = handler {
            handler(&error);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("pending_jobs", &self.inner.queue.len())
            .field("scope_depth", &self.inner.scopes.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_jobs_run_in_fifo_order() {
        let runtime = Runtime::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            runtime.queue_post_flush(Box::new(move || log.lock().push(i)));
        }
        assert_eq!(runtime.pending_jobs(), 3);
        assert!(log.lock().is_empty());

        assert_eq!(runtime.next_tick().unwrap(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert_eq!(runtime.pending_jobs(), 0);
    }

    #[test]
    fn test_jobs_queued_during_drain_run_in_same_drain() {
        let runtime = Runtime::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_runtime = runtime.clone();
        let inner_log = Arc::clone(&log);
        runtime.queue_post_flush(Box::new(move || {
            inner_log.lock().push("outer");
            let nested_log = Arc::clone(&inner_log);
            inner_runtime.queue_post_flush(Box::new(move || nested_log.lock().push("nested")));
        }));

        assert_eq!(runtime.next_tick().unwrap(), 2);
        assert_eq!(*log.lock(), vec!["outer", "nested"]);
    }

    #[test]
    fn test_reentrant_next_tick_is_noop() {
        let runtime = Runtime::new();
        let nested_result = Arc::new(Mutex::new(None));

        let inner_runtime = runtime.clone();
        let slot = Arc::clone(&nested_result);
        runtime.queue_post_flush(Box::new(move || {
            *slot.lock() = Some(inner_runtime.next_tick());
        }));

        assert_eq!(runtime.next_tick().unwrap(), 1);
        assert_eq!(nested_result.lock().clone(), Some(Ok(0)));
    }

    #[test]
    fn test_flush_limit() {
        let runtime = Runtime::with_config(RuntimeConfig { flush_limit: 2 });
        for _ in 0..5 {
            runtime.queue_post_flush(Box::new(|| {}));
        }

        let result = runtime.next_tick();
        assert_eq!(result, Err(StoreError::FlushLimitExceeded { limit: 2 }));
        assert_eq!(runtime.pending_jobs(), 3);

        // Limit is per drain
        assert!(runtime.next_tick().is_err());
        assert_eq!(runtime.next_tick().unwrap(), 1);
    }

    #[test]
    fn test_error_handler_receives_reported_errors() {
        let runtime = Runtime::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        runtime.set_error_handler(move |e| sink.lock().push(e.clone()));

        runtime.report_error(StoreError::RegistryDisposed);
        runtime.clear_error_handler();
        runtime.report_error(StoreError::RegistryDisposed);

        assert_eq!(*seen.lock(), vec![StoreError::RegistryDisposed]);
    }

    #[test]
    fn test_on_scope_dispose_outside_scope() {
        let runtime = Runtime::new();
        assert!(runtime.current_scope().is_none());
        assert!(!runtime.on_scope_dispose(Box::new(|| {})));
    }
}
