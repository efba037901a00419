//! Stores, store definitions and the registry tying them together.

use crate::error::{Result, StoreError};
use crate::mutation::{MutationDescriptor, MutationKind};
use crate::runtime::Runtime;
use crate::state::{apply_patch, into_state, validate_patch, Patch, ReactiveTree, WatchHandle};
use crate::subscriptions::{ListenerRegistry, SubscribeOptions, Unsubscribe};
use crate::types::{FlushMode, State, StateChange, StoreId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Produces a store's initial state. Must return a JSON object.
pub type StateFactory = dyn Fn() -> Value + Send + Sync;

/// How to build a store: its id and initial state.
#[derive(Clone)]
pub struct StoreDefinition {
    id: StoreId,
    state: Arc<StateFactory>,
}

impl StoreDefinition {
    pub fn new(id: impl Into<StoreId>, state: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(state),
        }
    }

    pub fn id(&self) -> &StoreId {
        &self.id
    }

    /// Get this store from `registry`, creating it on first use.
    pub fn use_store(&self, registry: &Registry) -> Result<Store> {
        registry.use_store(self)
    }

    fn initial_state(&self) -> Result<State> {
        into_state(&self.id, (self.state)())
    }
}

impl fmt::Debug for StoreDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDefinition").field("id", &self.id).finish()
    }
}

struct StoreInner {
    definition: StoreDefinition,
    runtime: Runtime,
    tree: Arc<ReactiveTree>,
    listeners: Arc<ListenerRegistry>,
    /// Sync watcher turning direct writes into `direct` mutations.
    direct_watch: WatchHandle,
    registry: Weak<RegistryInner>,
    disposed: AtomicBool,
}

/// A reactive store.
///
/// Cloning is cheap and yields a handle to the same store.
///
/// Writes come in three flavours, each producing one mutation:
/// - [`set`](Self::set) / [`mutate`](Self::mutate): `direct`, only if the
///   state actually changed
/// - [`patch`](Self::patch) with an object: `patch object`
/// - [`patch_with`](Self::patch_with), [`replace_state`](Self::replace_state),
///   [`reset`](Self::reset): `patch function`
///
/// Closures given to `mutate` and `patch_with` run under the state lock and
/// must not call back into the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    fn create(
        definition: &StoreDefinition,
        runtime: Runtime,
        registry: Weak<RegistryInner>,
    ) -> Result<Self> {
        let initial = definition.initial_state()?;
        let tree = ReactiveTree::new(runtime.clone(), initial);
        let listeners = ListenerRegistry::new(definition.id.clone(), runtime.clone());

        let direct_watch = {
            let id = definition.id.clone();
            let listeners = Arc::clone(&listeners);
            let weak_tree = Arc::downgrade(&tree);
            tree.watch(FlushMode::Sync, move |changes: &[StateChange]| {
                if let Some(tree) = weak_tree.upgrade() {
                    let descriptor =
                        MutationDescriptor::direct(id.clone()).with_events(changes.to_vec());
                    listeners.dispatch(descriptor, &tree);
                }
            })
        };

        tracing::debug!(store = %definition.id, "store created");

        Ok(Self {
            inner: Arc::new(StoreInner {
                definition: definition.clone(),
                runtime,
                tree,
                listeners,
                direct_watch,
                registry,
                disposed: AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> &StoreId {
        &self.inner.definition.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> State {
        self.inner.tree.snapshot()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.tree.get(key)
    }

    // --- Direct writes ---

    /// Assign one top-level field.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.mutate(move |state| {
            state.insert(key, value);
        });
    }

    /// Write directly to the state. All writes inside `f` form one mutation.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let (result, _) = self.inner.tree.write(f);
        result
    }

    // --- Patches ---

    /// Apply an object or function patch as a single mutation.
    ///
    /// Fails with `InvalidPatchArgument` (leaving the state untouched and
    /// notifying nobody) if an object patch is not a JSON object.
    pub fn patch<'a>(&self, patch: impl Into<Patch<'a>>) -> Result<()> {
        let patch = patch.into();
        validate_patch(&patch)?;

        let (kind, changes) = {
            let _pause = self.inner.tree.pause();
            self.inner.tree.write(|state| apply_patch(state, patch))
        };
        self.commit(kind?, changes);
        Ok(())
    }

    /// Apply a function patch as a single `patch function` mutation.
    pub fn patch_with(&self, f: impl FnOnce(&mut State)) {
        let (_, changes) = {
            let _pause = self.inner.tree.pause();
            self.inner.tree.write(f)
        };
        self.commit(MutationKind::PatchFunction, changes);
    }

    /// Replace the whole state.
    pub fn replace_state(&self, value: Value) -> Result<()> {
        let state = into_state(self.id(), value)?;
        self.patch_with(move |current| *current = state);
        Ok(())
    }

    /// Restore the state produced by the store definition.
    pub fn reset(&self) -> Result<()> {
        let initial = self.inner.definition.initial_state()?;
        self.patch_with(move |current| *current = initial);
        Ok(())
    }

    fn commit(&self, kind: MutationKind, changes: Vec<StateChange>) {
        let descriptor = MutationDescriptor::new(self.id().clone(), kind).with_events(changes);
        self.inner.listeners.dispatch(descriptor, &self.inner.tree);
    }

    // --- Subscriptions ---

    /// Subscribe to mutations of this store.
    ///
    /// See [`ListenerRegistry::subscribe`] for scope binding.
    pub fn subscribe(
        &self,
        callback: impl Fn(&MutationDescriptor, &State) + Send + Sync + 'static,
        options: SubscribeOptions,
    ) -> Unsubscribe {
        self.inner.listeners.subscribe(callback, options)
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.listeners.len()
    }

    // --- Lifecycle ---

    /// Stop watching, drop every subscription and leave the registry.
    ///
    /// The state stays readable and writable but nothing is notified.
    /// Subscribing afterwards returns an inactive handle.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.direct_watch.stop();
        let removed = self.inner.listeners.close();
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.remove(self.id(), self);
        }
        tracing::debug!(store = %self.id(), subscriptions = removed, "store disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Whether two handles point at the same store instance.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", self.id())
            .field("subscriptions", &self.subscription_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct RegistryInner {
    runtime: Runtime,
    stores: Mutex<HashMap<StoreId, Store>>,
    disposed: AtomicBool,
}

impl RegistryInner {
    /// Forget `store` if it is still the instance registered under `id`.
    fn remove(&self, id: &StoreId, store: &Store) {
        let mut stores = self.stores.lock();
        if stores.get(id).is_some_and(|s| s.ptr_eq(store)) {
            stores.remove(id);
        }
    }
}

/// Owns one store instance per id and the runtime they share.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Create a registry with its own runtime.
    pub fn new() -> Self {
        Self::with_runtime(Runtime::new())
    }

    pub fn with_runtime(runtime: Runtime) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                runtime,
                stores: Mutex::new(HashMap::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Get the store for `definition`, creating it on first access.
    pub fn use_store(&self, definition: &StoreDefinition) -> Result<Store> {
        if self.is_disposed() {
            return Err(StoreError::RegistryDisposed);
        }
        if let Some(store) = self.inner.stores.lock().get(&definition.id) {
            return Ok(store.clone());
        }

        // Built outside the lock: the state factory is user code.
        let store = Store::create(
            definition,
            self.inner.runtime.clone(),
            Arc::downgrade(&self.inner),
        )?;

        let mut stores = self.inner.stores.lock();
        Ok(stores
            .entry(definition.id.clone())
            .or_insert(store)
            .clone())
    }

    pub fn get(&self, id: &str) -> Option<Store> {
        self.inner.stores.lock().get(&StoreId::from(id)).cloned()
    }

    pub fn store_ids(&self) -> Vec<StoreId> {
        let mut ids: Vec<StoreId> = self.inner.stores.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.stores.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.stores.lock().is_empty()
    }

    /// Dispose every store. Later `use_store` calls fail.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let stores = std::mem::take(&mut *self.inner.stores.lock());
        tracing::debug!(stores = stores.len(), "disposing registry");
        for store in stores.into_values() {
            store.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("stores", &self.store_ids())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationType;
    use serde_json::json;

    fn main_store() -> StoreDefinition {
        StoreDefinition::new("main", || json!({"user": "Eduardo"}))
    }

    #[test]
    fn test_use_store_returns_same_instance() {
        let registry = Registry::new();
        let a = main_store().use_store(&registry).unwrap();
        let b = main_store().use_store(&registry).unwrap();

        assert!(a.ptr_eq(&b));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.store_ids(), vec![StoreId::from("main")]);
    }

    #[test]
    fn test_registries_are_independent() {
        let first = Registry::new();
        let second = Registry::new();
        let a = main_store().use_store(&first).unwrap();
        let b = main_store().use_store(&second).unwrap();

        a.set("user", json!("Cleiton"));
        assert!(!a.ptr_eq(&b));
        assert_eq!(b.get("user"), Some(json!("Eduardo")));
    }

    #[test]
    fn test_non_object_initial_state() {
        let registry = Registry::new();
        let result = StoreDefinition::new("broken", || json!(42)).use_store(&registry);
        assert!(matches!(result, Err(StoreError::InvalidState { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mutate_is_one_direct_mutation() {
        let registry = Registry::new();
        let store = main_store().use_store(&registry).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(
            move |m, _| sink.lock().push(m.clone()),
            SubscribeOptions::sync(),
        );

        store.mutate(|state| {
            state.insert("user".into(), json!("a"));
            state.insert("age".into(), json!(3));
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].mutation_type(), MutationType::Direct);
        assert_eq!(seen[0].events.len(), 2);
    }

    #[test]
    fn test_dispose_leaves_registry() {
        let registry = Registry::new();
        let store = main_store().use_store(&registry).unwrap();
        store.subscribe(|_, _| {}, SubscribeOptions::sync());

        store.dispose();
        assert!(store.is_disposed());
        assert_eq!(store.subscription_count(), 0);
        assert!(registry.get("main").is_none());

        // A fresh instance is created on next access
        let fresh = main_store().use_store(&registry).unwrap();
        assert!(!fresh.ptr_eq(&store));
    }

    #[test]
    fn test_registry_dispose() {
        let registry = Registry::new();
        let store = main_store().use_store(&registry).unwrap();

        registry.dispose();
        assert!(store.is_disposed());
        assert!(registry.is_empty());
        assert_eq!(
            main_store().use_store(&registry).unwrap_err(),
            StoreError::RegistryDisposed
        );
    }
}
