//! Property-based invariant tests for the state registry.
//!
//! 1. Last write wins: after `record(k, v1..vn)` the entry holds `vn`, and a
//!    tracker flags it initial iff `vn` structurally equals `v1`.
//! 2. `remove(k)` always leaves `k` absent.
//! 3. Removing a never-present key leaves the snapshot unchanged.
//! 4. Every `record`/`remove` notifies each subscriber exactly once, before
//!    returning, with the state right after the call.
//! 5. Unsubscribed callbacks receive nothing further.
//! 6. Snapshots are independent of later mutation.
//! 7. Recording distinct keys yields the same key set in any order.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::{Value, json};
use statelog_core::value::structurally_equal;
use statelog_core::{Attribution, ObservationInput, Registry, Snapshot, StateTracker};

// ── Strategies ────────────────────────────────────────────────────────────

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (0i64..4).prop_map(|n| json!(n)),
        "[ab]{0,2}".prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
            proptest::collection::btree_map("[xy]", inner, 0..3)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

#[derive(Debug, Clone)]
enum Op {
    Record(String, Value),
    Remove(String),
}

fn key() -> impl Strategy<Value = String> {
    prop_oneof![Just("a".to_string()), Just("b".to_string()), Just("c".to_string())]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (key(), value()).prop_map(|(k, v)| Op::Record(k, v)),
        1 => key().prop_map(Op::Remove),
    ]
}

fn input(value: Value, is_initial: bool) -> ObservationInput {
    ObservationInput::new(value, Attribution::new("Prop", "/tests/prop"), is_initial)
}

fn values_of(snapshot: &Snapshot) -> BTreeMap<String, Value> {
    snapshot
        .iter()
        .map(|(k, o)| (k.to_string(), o.value.clone()))
        .collect()
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn last_write_wins_with_reconvergence(values in proptest::collection::vec(value(), 1..8)) {
        let registry = Registry::new();
        let mut tracker = StateTracker::on_create(&registry, "k", Attribution::unknown(), values[0].clone());
        for v in &values[1..] {
            tracker.on_change(v.clone());
        }

        let snap = registry.snapshot();
        prop_assert_eq!(snap.len(), 1);
        let obs = snap.get("k").unwrap();
        let last = values.last().unwrap();
        prop_assert_eq!(&obs.value, last);
        prop_assert_eq!(obs.is_initial, structurally_equal(last, &values[0]));
    }

    #[test]
    fn remove_always_clears_key(ops in proptest::collection::vec(op(), 0..20), victim in key()) {
        let registry = Registry::new();
        for op in ops {
            match op {
                Op::Record(k, v) => registry.record(k, input(v, false)),
                Op::Remove(k) => registry.remove(&k),
            }
        }
        registry.remove(&victim);
        prop_assert!(!registry.snapshot().contains_key(&victim));
    }

    #[test]
    fn removing_unknown_key_is_noop(ops in proptest::collection::vec(op(), 0..12)) {
        let registry = Registry::new();
        for op in ops {
            if let Op::Record(k, v) = op {
                registry.record(k, input(v, true));
            }
        }
        let before = registry.snapshot();
        registry.remove("never-recorded");
        prop_assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn one_notification_per_call_matching_model(ops in proptest::collection::vec(op(), 1..25)) {
        let registry = Registry::new();
        let log: Rc<RefCell<Vec<BTreeMap<String, Value>>>> = Rc::new(RefCell::new(Vec::new()));
        let log_a = Rc::clone(&log);
        let _a = registry.subscribe(move |snap| log_a.borrow_mut().push(values_of(snap)));
        let count_b = Rc::new(RefCell::new(0usize));
        let count_b_clone = Rc::clone(&count_b);
        let _b = registry.subscribe(move |_| *count_b_clone.borrow_mut() += 1);

        let mut model: BTreeMap<String, Value> = BTreeMap::new();
        for (i, op) in ops.iter().enumerate() {
            match op {
                Op::Record(k, v) => {
                    registry.record(k.clone(), input(v.clone(), false));
                    model.insert(k.clone(), v.clone());
                }
                Op::Remove(k) => {
                    registry.remove(k);
                    model.remove(k);
                }
            }
            // Delivered before the call returned.
            let logged = log.borrow();
            prop_assert_eq!(logged.len(), i + 1);
            prop_assert_eq!(&logged[i], &model);
        }
        prop_assert_eq!(*count_b.borrow(), ops.len());
    }

    #[test]
    fn unsubscribed_callback_gets_nothing(ops in proptest::collection::vec(op(), 0..10)) {
        let registry = Registry::new();
        let calls = Rc::new(RefCell::new(0usize));
        let calls_clone = Rc::clone(&calls);
        let sub = registry.subscribe(move |_| *calls_clone.borrow_mut() += 1);
        sub.unsubscribe();
        sub.unsubscribe();
        for op in ops {
            match op {
                Op::Record(k, v) => registry.record(k, input(v, false)),
                Op::Remove(k) => registry.remove(&k),
            }
        }
        prop_assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn snapshots_are_copies(first in proptest::collection::vec(op(), 0..10), later in proptest::collection::vec(op(), 1..10)) {
        let registry = Registry::new();
        for op in first {
            if let Op::Record(k, v) = op {
                registry.record(k, input(v, false));
            }
        }
        let held = registry.snapshot();
        let expected = values_of(&held);

        let mut owned = registry.snapshot().into_map();
        owned.clear();
        prop_assert_eq!(registry.snapshot().len(), expected.len());

        for op in later {
            match op {
                Op::Record(k, v) => registry.record(k, input(v, false)),
                Op::Remove(k) => registry.remove(&k),
            }
        }
        prop_assert_eq!(values_of(&held), expected);
    }

    #[test]
    fn distinct_keys_are_order_independent(va in value(), vb in value(), a_first in any::<bool>()) {
        let registry = Registry::new();
        if a_first {
            registry.record("a", input(va.clone(), true));
            registry.record("b", input(vb.clone(), true));
        } else {
            registry.record("b", input(vb.clone(), true));
            registry.record("a", input(va.clone(), true));
        }
        let snap = registry.snapshot();
        prop_assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        prop_assert_eq!(&snap.get("a").unwrap().value, &va);
        prop_assert_eq!(&snap.get("b").unwrap().value, &vb);
    }
}
