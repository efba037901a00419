//! Mutation descriptors: one immutable record per state-change event.

use crate::types::{StateChange, StoreId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a mutation came from, without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationType {
    /// A write outside the patch API.
    #[serde(rename = "direct")]
    Direct,
    #[serde(rename = "patch object")]
    PatchObject,
    #[serde(rename = "patch function")]
    PatchFunction,
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationType::Direct => "direct",
            MutationType::PatchObject => "patch object",
            MutationType::PatchFunction => "patch function",
        };
        f.write_str(name)
    }
}

/// Mutation origin, with the object patch's payload when there is one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MutationKind {
    #[serde(rename = "direct")]
    Direct,
    /// `payload` is the partial object the caller passed, not the merged result.
    #[serde(rename = "patch object")]
    PatchObject { payload: Value },
    #[serde(rename = "patch function")]
    PatchFunction,
}

impl MutationKind {
    pub fn mutation_type(&self) -> MutationType {
        match self {
            MutationKind::Direct => MutationType::Direct,
            MutationKind::PatchObject { .. } => MutationType::PatchObject,
            MutationKind::PatchFunction => MutationType::PatchFunction,
        }
    }
}

/// Describes one mutation event delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationDescriptor {
    pub store_id: StoreId,
    #[serde(flatten)]
    pub kind: MutationKind,
    /// Leaf changes made by the mutation.
    #[serde(default)]
    pub events: Vec<StateChange>,
}

impl MutationDescriptor {
    pub fn new(store_id: StoreId, kind: MutationKind) -> Self {
        Self {
            store_id,
            kind,
            events: Vec::new(),
        }
    }

    pub fn direct(store_id: StoreId) -> Self {
        Self::new(store_id, MutationKind::Direct)
    }

    pub fn patch_object(store_id: StoreId, payload: Value) -> Self {
        Self::new(store_id, MutationKind::PatchObject { payload })
    }

    pub fn patch_function(store_id: StoreId) -> Self {
        Self::new(store_id, MutationKind::PatchFunction)
    }

    pub fn with_events(mut self, events: Vec<StateChange>) -> Self {
        self.events = events;
        self
    }

    pub fn mutation_type(&self) -> MutationType {
        self.kind.mutation_type()
    }

    /// The object patch payload, if this is a `PatchObject` mutation.
    pub fn payload(&self) -> Option<&Value> {
        match &self.kind {
            MutationKind::PatchObject { payload } => Some(payload),
            _ => None,
        }
    }
}
