//! Delivery count and ordering properties across flush modes.

use parking_lot::Mutex;
use proptest::prelude::*;
use reactive_store::{MutationType, Registry, StoreDefinition, SubscribeOptions};
use serde_json::json;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Op {
    Set(i64),
    PatchObject(i64),
    PatchFunction(i64),
}

impl Op {
    fn mutation_type(&self) -> MutationType {
        match self {
            Op::Set(_) => MutationType::Direct,
            Op::PatchObject(_) => MutationType::PatchObject,
            Op::PatchFunction(_) => MutationType::PatchFunction,
        }
    }
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<i64>().prop_map(Op::Set),
        any::<i64>().prop_map(Op::PatchObject),
        any::<i64>().prop_map(Op::PatchFunction),
    ]
}

/// Apply ops to a fresh store with one sync and one post subscriber.
/// Returns sync deliveries, post delivery count before the tick, post
/// deliveries after it, and the expected mutation sequence.
fn run(ops: &[Op]) -> (Vec<MutationType>, usize, Vec<MutationType>, Vec<MutationType>) {
    let registry = Registry::new();
    // Start from a value no generated op writes, so each Set is a real change
    let store = StoreDefinition::new("main", || json!({"value": "initial"}))
        .use_store(&registry)
        .unwrap();

    let sync_seen = Arc::new(Mutex::new(Vec::new()));
    let post_seen = Arc::new(Mutex::new(Vec::new()));
    {
        let sink = Arc::clone(&sync_seen);
        store.subscribe(move |m, _| sink.lock().push(m.mutation_type()), SubscribeOptions::sync());
        let sink = Arc::clone(&post_seen);
        store.subscribe(move |m, _| sink.lock().push(m.mutation_type()), SubscribeOptions::post());
    }

    let mut expected = Vec::new();
    let mut last: Option<i64> = None;
    for op in ops {
        match op {
            Op::Set(v) => {
                store.set("value", json!(v));
                // Writing the current value again is not a mutation
                if last != Some(*v) {
                    expected.push(op.mutation_type());
                }
                last = Some(*v);
            }
            Op::PatchObject(v) => {
                store.patch(json!({ "value": v })).unwrap();
                expected.push(op.mutation_type());
                last = Some(*v);
            }
            Op::PatchFunction(v) => {
                let v = *v;
                store.patch_with(move |state| {
                    state.insert("value".into(), json!(v));
                });
                expected.push(op.mutation_type());
                last = Some(v);
            }
        }
    }

    let before_tick = post_seen.lock().len();
    registry.runtime().next_tick().unwrap();

    let sync_seen = sync_seen.lock().clone();
    let post_seen = post_seen.lock().clone();
    (sync_seen, before_tick, post_seen, expected)
}

proptest! {
    #[test]
    fn prop_every_mutation_delivered_once_in_order(ops in prop::collection::vec(op(), 0..40)) {
        let (sync_seen, before_tick, post_seen, expected) = run(&ops);

        prop_assert_eq!(&sync_seen, &expected);
        prop_assert_eq!(before_tick, 0);
        prop_assert_eq!(&post_seen, &expected);
    }

    #[test]
    fn prop_n_direct_writes_give_n_post_calls(n in 1usize..60) {
        let registry = Registry::new();
        let store = StoreDefinition::new("main", || json!({"count": -1}))
            .use_store(&registry)
            .unwrap();
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        store.subscribe(move |_, _| *counter.lock() += 1, SubscribeOptions::default());

        for i in 0..n {
            store.set("count", json!(i));
        }
        prop_assert_eq!(*calls.lock(), 0);

        prop_assert_eq!(registry.runtime().next_tick().unwrap(), n);
        prop_assert_eq!(*calls.lock(), n);
    }
}
