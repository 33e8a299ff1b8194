// Property-based tests for map and interpreter invariants.
//
// Three categories:
// 1. Map layout: sorted shared names first, then sorted pin states, dense
//    indices, independent of operation order
// 2. Generated source: control store and pinMode lines match the model
// 3. Interpreter: S then G round-trips any 32-bit value; junk never replies
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use pinwire::codegen::CodegenOptions;
use pinwire::comm_map::{CommMap, VarKind};
use pinwire::model::{Model, ModelOp};
use pinwire::protocol::Command;
use pinwire::sim::SimulatedDevice;
use proptest::prelude::*;
use std::collections::BTreeSet;

// ── Graph generator ─────────────────────────────────────────────────────────

fn arb_op() -> impl Strategy<Value = ModelOp> {
    prop_oneof![
        "[a-z][a-z0-9_]{0,8}".prop_map(|name| ModelOp::CreateVariable { name }),
        (0u32..64, any::<bool>()).prop_map(|(pin, high)| ModelOp::DigitalWrite {
            pin,
            value: if high {
                pinwire::model::Level::High
            } else {
                pinwire::model::Level::Low
            },
        }),
        (0u32..64, any::<u8>()).prop_map(|(pin, value)| ModelOp::AnalogWrite { pin, value }),
        (0u32..5000).prop_map(|delay_ms| ModelOp::Delay { delay_ms }),
    ]
}

/// Operations touching each pin at most once, so any order yields the same
/// final model.
fn arb_commuting_ops() -> impl Strategy<Value = Vec<ModelOp>> {
    prop::collection::vec(arb_op(), 0..16).prop_map(|ops| {
        let mut seen = BTreeSet::new();
        ops.into_iter()
            .filter(|op| match op {
                ModelOp::CreateVariable { .. } | ModelOp::Delay { .. } => true,
                ModelOp::DigitalWrite { pin, .. } | ModelOp::AnalogWrite { pin, .. } => {
                    seen.insert(*pin)
                }
            })
            .collect()
    })
}

fn model_of(ops: &[ModelOp]) -> Model {
    Model::from_ops(ops).unwrap()
}

// ── Map layout ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn map_independent_of_operation_order(
        (ops, shuffled) in arb_commuting_ops()
            .prop_flat_map(|ops| (Just(ops.clone()), Just(ops).prop_shuffle()))
    ) {
        let a = CommMap::build(&model_of(&ops));
        let b = CommMap::build(&model_of(&shuffled));
        prop_assert_eq!(a.canonical_json(), b.canonical_json());
    }

    #[test]
    fn map_layout_is_sorted_and_dense(ops in prop::collection::vec(arb_op(), 0..24)) {
        let model = model_of(&ops);
        let map = CommMap::build(&model);

        let shared: BTreeSet<&String> = model.shared_variable_names().iter().collect();
        let pins: Vec<&String> = model.pin_states().keys().collect();
        prop_assert_eq!(map.len(), shared.len() + pins.len());

        let expected: Vec<&String> = shared.into_iter().chain(pins).collect();
        for (position, (entry, name)) in map.iter().zip(expected).enumerate() {
            prop_assert_eq!(entry.index, position);
            prop_assert_eq!(&entry.name, name);
            prop_assert_eq!(entry.pin_number.is_some(), entry.kind != VarKind::Shared);
        }
    }

    #[test]
    fn map_building_is_deterministic(ops in prop::collection::vec(arb_op(), 0..24)) {
        let model = model_of(&ops);
        prop_assert_eq!(CommMap::build(&model), CommMap::build(&model));
    }
}

// ── Generated source ────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn control_store_and_pin_modes_match_model(ops in prop::collection::vec(arb_op(), 0..24)) {
        let model = model_of(&ops);
        let compiled = pinwire::pipeline::compile(&model, &CodegenOptions::default());
        let src = &compiled.firmware.source;

        if compiled.map.is_empty() {
            prop_assert!(!src.contains("controlValues"));
        } else {
            let define = format!("#define CONTROL_COUNT {}\n", compiled.map.len());
            prop_assert_eq!(src.matches(define.as_str()).count(), 1);
        }

        prop_assert_eq!(src.matches("pinMode(").count(), model.pins_to_configure().len());
        for pin in model.pins_to_configure() {
            let line = format!("  pinMode({}, OUTPUT);\n", pin);
            prop_assert!(src.contains(&line));
        }
    }

    #[test]
    fn output_is_independent_of_cadence(
        ops in prop::collection::vec(arb_op(), 0..12),
        cadence in any::<u32>(),
    ) {
        let model = model_of(&ops);
        let base = pinwire::pipeline::compile(&model, &CodegenOptions::default());
        let other = pinwire::pipeline::compile(&model, &CodegenOptions { cadence_ms: cadence });
        prop_assert_eq!(base.firmware, other.firmware);
    }
}

// ── Interpreter ─────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn set_then_get_round_trips(
        ops in prop::collection::vec(arb_op(), 1..12),
        pick in any::<prop::sample::Index>(),
        value in any::<i32>(),
    ) {
        let model = model_of(&ops);
        let mut device = SimulatedDevice::flash(&model);
        prop_assume!(!device.map().is_empty());
        let index = pick.index(device.map().len());

        device.feed(Command::Set { index, value: i64::from(value) }.encode().as_bytes());
        let ack = String::from_utf8(device.take_output()).unwrap();
        prop_assert_eq!(ack, format!("OK:S:{}\r\n", index));

        device.feed(Command::Get { index }.encode().as_bytes());
        let reply = String::from_utf8(device.take_output()).unwrap();
        prop_assert_eq!(reply, format!("R:{}:{}\r\n", index, value));
    }

    #[test]
    fn out_of_range_and_junk_never_reply(
        extra in 0usize..1000,
        junk in "[A-Za-z:]{1,12}",
    ) {
        let model = Model::new().create_variable("speed").unwrap();
        let mut device = SimulatedDevice::flash(&model);
        let size = device.map().len();

        device.feed(format!("G:{}\n", size + extra).as_bytes());
        device.feed(format!("S:{}:1\n", size + extra).as_bytes());
        device.feed(format!("{}\n", junk).as_bytes());
        prop_assert!(device.take_output().is_empty());
        prop_assert_eq!(device.slot(0), Some(0));
    }
}
