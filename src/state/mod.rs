//! Reactive state trees and patch application.
//!
//! [`ReactiveTree`] holds a store's JSON state and notifies watchers after
//! writes; [`apply_patch`] merges object patches or runs function patches
//! against a tree.

mod operations;
mod tree;

pub use operations::{apply_patch, diff, into_state, merge_patch, validate_patch, Patch};
pub use tree::{PauseGuard, ReactiveTree, WatchCallback, WatchHandle};
