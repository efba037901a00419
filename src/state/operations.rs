//! Patch application and state diffing.

use crate::error::{kind_name, Result, StoreError};
use crate::mutation::MutationKind;
use crate::types::{State, StateChange, StoreId};
use serde_json::Value;
use std::fmt;

/// A batched state update: a partial object to merge, or a transform.
pub enum Patch<'a> {
    /// Partial state, deep-merged into the tree. Must be a JSON object.
    Object(Value),
    /// Arbitrary writes against the mutable tree.
    Function(Box<dyn FnOnce(&mut State) + 'a>),
}

impl<'a> Patch<'a> {
    pub fn function(f: impl FnOnce(&mut State) + 'a) -> Self {
        Patch::Function(Box::new(f))
    }
}

impl From<Value> for Patch<'_> {
    fn from(value: Value) -> Self {
        Patch::Object(value)
    }
}

impl From<State> for Patch<'_> {
    fn from(state: State) -> Self {
        Patch::Object(Value::Object(state))
    }
}

impl fmt::Debug for Patch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::Object(value) => f.debug_tuple("Object").field(value).finish(),
            Patch::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Reject anything but an object patch payload.
pub fn validate_patch(patch: &Patch<'_>) -> Result<()> {
    match patch {
        Patch::Object(Value::Object(_)) | Patch::Function(_) => Ok(()),
        Patch::Object(other) => Err(StoreError::InvalidPatchArgument(format!(
            "expected an object or a function, got {}",
            kind_name(other)
        ))),
    }
}

/// Apply a patch to a state tree and classify the mutation.
///
/// Object patches return `PatchObject` carrying the caller's object as-is,
/// not the merged result. The state is untouched on error.
pub fn apply_patch(state: &mut State, patch: Patch<'_>) -> Result<MutationKind> {
    validate_patch(&patch)?;
    match patch {
        Patch::Object(payload) => {
            if let Value::Object(partial) = &payload {
                merge_patch(state, partial);
            }
            Ok(MutationKind::PatchObject { payload })
        }
        Patch::Function(f) => {
            f(state);
            Ok(MutationKind::PatchFunction)
        }
    }
}

/// Deep-merge `patch` into `target`.
///
/// Objects on both sides merge key by key; anything else (arrays,
/// primitives, null, keys missing from the target) replaces wholesale.
pub fn merge_patch(target: &mut State, patch: &State) {
    for (key, patch_value) in patch {
        match (target.get_mut(key), patch_value) {
            (Some(Value::Object(target_obj)), Value::Object(patch_obj)) => {
                merge_patch(target_obj, patch_obj);
            }
            _ => {
                target.insert(key.clone(), patch_value.clone());
            }
        }
    }
}

/// Leaf-level differences from `before` to `after`.
pub fn diff(before: &State, after: &State) -> Vec<StateChange> {
    let mut changes = Vec::new();
    let mut path = Vec::new();
    diff_into(&mut path, before, after, &mut changes);
    changes
}

fn diff_into(path: &mut Vec<String>, before: &State, after: &State, out: &mut Vec<StateChange>) {
    for (key, old) in before {
        path.push(key.clone());
        match (old, after.get(key)) {
            (_, None) => out.push(StateChange {
                path: path.clone(),
                old_value: Some(old.clone()),
                new_value: None,
            }),
            (Value::Object(old_obj), Some(Value::Object(new_obj))) => {
                diff_into(path, old_obj, new_obj, out);
            }
            (_, Some(new)) if old != new => out.push(StateChange {
                path: path.clone(),
                old_value: Some(old.clone()),
                new_value: Some(new.clone()),
            }),
            _ => {}
        }
        path.pop();
    }

    for (key, new) in after {
        if !before.contains_key(key) {
            let mut added = path.clone();
            added.push(key.clone());
            out.push(StateChange {
                path: added,
                old_value: None,
                new_value: Some(new.clone()),
            });
        }
    }
}

/// Convert a JSON value into a state tree.
pub fn into_state(store_id: &StoreId, value: Value) -> Result<State> {
    match value {
        Value::Object(state) => Ok(state),
        other => Err(StoreError::InvalidState {
            store_id: store_id.clone(),
            found: kind_name(&other).to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;
    use serde_json::json;

    fn state(value: Value) -> State {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_object_patch_keeps_payload_verbatim() {
        let mut s = state(json!({"user": "Eduardo", "age": 30}));
        let kind = apply_patch(&mut s, json!({"user": "Cleiton"}).into()).unwrap();

        assert_eq!(
            kind,
            MutationKind::PatchObject {
                payload: json!({"user": "Cleiton"})
            }
        );
        assert_eq!(Value::Object(s), json!({"user": "Cleiton", "age": 30}));
    }

    #[test]
    fn test_nested_objects_merge() {
        let mut s = state(json!({
            "profile": {"name": "Eduardo", "address": {"city": "Paris", "zip": "75001"}},
            "tags": ["a", "b"]
        }));
        merge_patch(
            &mut s,
            &state(json!({
                "profile": {"address": {"city": "Lyon"}},
                "tags": ["c"]
            })),
        );

        assert_eq!(
            Value::Object(s),
            json!({
                "profile": {"name": "Eduardo", "address": {"city": "Lyon", "zip": "75001"}},
                "tags": ["c"]
            })
        );
    }

    #[test]
    fn test_object_replaces_primitive_and_null_assigns() {
        let mut s = state(json!({"a": 1, "b": {"x": 1}}));
        merge_patch(&mut s, &state(json!({"a": {"nested": true}, "b": null, "c": 3})));

        assert_eq!(
            Value::Object(s),
            json!({"a": {"nested": true}, "b": null, "c": 3})
        );
    }

    #[test]
    fn test_function_patch() {
        let mut s = state(json!({"user": "Eduardo", "count": 0}));
        let kind = apply_patch(
            &mut s,
            Patch::function(|state| {
                state.insert("user".into(), json!("other"));
                state.insert("count".into(), json!(2));
            }),
        )
        .unwrap();

        assert_eq!(kind, MutationKind::PatchFunction);
        assert_eq!(s["count"], 2);
    }

    #[test]
    fn test_invalid_patch_leaves_state_untouched() {
        let mut s = state(json!({"user": "Eduardo"}));
        for bad in [json!(null), json!(1), json!("user"), json!([{"user": "x"}])] {
            let result = apply_patch(&mut s, bad.into());
            assert!(matches!(result, Err(StoreError::InvalidPatchArgument(_))));
        }
        assert_eq!(s["user"], "Eduardo");
    }

    #[test]
    fn test_diff_reports_leaves() {
        let before = state(json!({"user": "Eduardo", "profile": {"age": 30, "city": "Paris"}, "gone": 1}));
        let after = state(json!({"user": "Eduardo", "profile": {"age": 31, "city": "Paris"}, "new": true}));

        let changes = diff(&before, &after);
        assert_eq!(changes.len(), 3);

        let age = changes.iter().find(|c| c.dotted_path() == "profile.age").unwrap();
        assert_eq!(age.kind(), ChangeKind::Set);
        assert_eq!(age.new_value, Some(json!(31)));

        let gone = changes.iter().find(|c| c.dotted_path() == "gone").unwrap();
        assert_eq!(gone.kind(), ChangeKind::Delete);

        let added = changes.iter().find(|c| c.dotted_path() == "new").unwrap();
        assert_eq!(added.kind(), ChangeKind::Add);
    }

    #[test]
    fn test_diff_of_equal_trees_is_empty() {
        let s = state(json!({"a": [1, 2], "b": {"c": null}}));
        assert!(diff(&s, &s.clone()).is_empty());
    }

    #[test]
    fn test_into_state_rejects_non_objects() {
        let id = StoreId::from("main");
        assert!(into_state(&id, json!({"user": "x"})).is_ok());
        assert_eq!(
            into_state(&id, json!([1])),
            Err(StoreError::InvalidState {
                store_id: id.clone(),
                found: "array".to_string()
            })
        );
    }
}
