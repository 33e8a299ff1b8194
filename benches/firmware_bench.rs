use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use pinwire::codegen::{generate_firmware, CodegenOptions};
use pinwire::comm_map::CommMap;
use pinwire::model::{model_from_json, Level, Model};
use pinwire::protocol::Command;
use pinwire::sim::SimulatedDevice;

const BLINK_GRAPH: &str = r#"[
  { "op": "create_variable", "name": "speed" },
  { "op": "digital_write", "pin": 13, "value": "HIGH" }
]"#;

/// A model with `n_pins` alternating digital/analog outputs and `n_pins / 2`
/// shared variables.
fn scaling_model(n_pins: u32) -> Model {
    let mut model = Model::new();
    for pin in 0..n_pins {
        model = if pin % 2 == 0 {
            model.digital_write(pin, Level::High)
        } else {
            model.analog_write(pin, (pin % 256) as u8)
        };
    }
    for i in 0..n_pins / 2 {
        model = model
            .create_variable(&format!("var_{}", i))
            .expect("generated names are valid");
    }
    model
}

fn bench_graph_load(c: &mut Criterion) {
    c.bench_function("graph/load_blink", |b| {
        b.iter(|| black_box(model_from_json(black_box(BLINK_GRAPH)).unwrap()));
    });
}

fn bench_map_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("map/build");
    for n in [4u32, 32, 128] {
        let model = scaling_model(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &model, |b, model| {
            b.iter(|| black_box(CommMap::build(black_box(model))));
        });
    }
    group.finish();
}

fn bench_codegen(c: &mut Criterion) {
    let mut group = c.benchmark_group("codegen/firmware");
    let opts = CodegenOptions::default();
    for n in [4u32, 32, 128] {
        let model = scaling_model(n);
        let map = CommMap::build(&model);
        group.bench_with_input(BenchmarkId::from_parameter(n), &model, |b, model| {
            b.iter(|| black_box(generate_firmware(black_box(model), &opts, &map)));
        });
    }
    group.finish();
}

fn bench_interpreter(c: &mut Criterion) {
    let model = scaling_model(32);
    let set = Command::Set { index: 7, value: 1234 }.encode();
    let get = Command::Get { index: 7 }.encode();
    c.bench_function("sim/set_get_exchange", |b| {
        b.iter_batched(
            || SimulatedDevice::flash(&model),
            |mut device| {
                device.feed(set.as_bytes());
                device.feed(get.as_bytes());
                black_box(device.take_output())
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_graph_load,
    bench_map_build,
    bench_codegen,
    bench_interpreter
);
criterion_main!(benches);
