//! # Reactive Store
//!
//! Reactive state stores whose mutations can be observed by subscribers,
//! with per-subscription delivery timing and scope-bound cleanup.
//!
//! ## Core Concepts
//!
//! - **Stores**: A JSON state tree identified by a store id, one instance per registry
//! - **Mutations**: Every write yields one descriptor: `direct`, `patch object` or `patch function`
//! - **Flush modes**: `Sync` subscribers run inside the write, `Post` ones on the next tick
//! - **Scopes**: Subscriptions made while a scope runs are removed when it stops
//!
//! ## Example
//!
//! ```ignore
//! use reactive_store::{Registry, StoreDefinition, SubscribeOptions};
//! use serde_json::json;
//!
//! let registry = Registry::new();
//! let main = StoreDefinition::new("main", || json!({ "user": "Eduardo" }));
//! let store = main.use_store(&registry)?;
//!
//! store.subscribe(
//!     |mutation, state| println!("{} on {}: {:?}", mutation.mutation_type(), mutation.store_id, state),
//!     SubscribeOptions::default(),
//! );
//!
//! store.set("user", json!("Cleiton"));          // direct
//! store.patch(json!({ "user": "Ana" }))?;        // patch object
//! store.patch_with(|state| { state.clear(); }); // patch function
//!
//! registry.runtime().next_tick()?; // post subscribers fire here, three times
//! ```

pub mod error;
pub mod mutation;
pub mod runtime;
pub mod state;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use mutation::{MutationDescriptor, MutationKind, MutationType};
pub use runtime::{EffectScope, Runtime, RuntimeConfig};
pub use state::{apply_patch, merge_patch, Patch, ReactiveTree, WatchHandle};
pub use store::{Registry, Store, StoreDefinition};
pub use subscriptions::{ListenerRegistry, SubscribeOptions, SubscriptionId, Unsubscribe};
pub use types::*;
