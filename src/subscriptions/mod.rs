//! Mutation subscriptions for stores.
//!
//! Each store owns a [`ListenerRegistry`]. Subscribers receive a
//! [`MutationDescriptor`](crate::MutationDescriptor) and the store state:
//! - `FlushMode::Sync`: before the mutating call returns
//! - `FlushMode::Post` (default): when the runtime's post-flush queue drains,
//!   once per mutation, never merged
//!
//! Subscriptions created while an effect scope runs are removed when that
//! scope stops, unless created with `detached`.
//!
//! # Example
//!
//! ```ignore
//! let unsubscribe = store.subscribe(
//!     |mutation, state| println!("{} -> {:?}", mutation.mutation_type(), state),
//!     SubscribeOptions::sync(),
//! );
//!
//! store.set("user", json!("Cleiton")); // prints "direct -> ..."
//! unsubscribe.unsubscribe();
//! unsubscribe.unsubscribe(); // no-op
//! ```

mod manager;
mod scheduler;
mod types;

pub use manager::ListenerRegistry;
pub use types::{SubscribeOptions, SubscriberFn, SubscriptionId, Unsubscribe};
