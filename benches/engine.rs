use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;

use namhost::amp::params::{GATE_OFF_DB, ParamTable};
use namhost::amp::{EngineHandle, NeuralAmp, Reclaimed};

const SAMPLE_RATE: u32 = 48_000;
const BUFFER_SIZE: usize = 256;

fn build_engine(
    buffer_size: usize,
) -> (
    NeuralAmp,
    EngineHandle,
    crossbeam::channel::Receiver<Reclaimed>,
) {
    let params = Arc::new(ParamTable::new());
    params.set_gate_threshold_db(GATE_OFF_DB);

    let (mut engine, handle, rx_reclaim) = NeuralAmp::new(params);
    engine.prepare(SAMPLE_RATE, buffer_size);
    (engine, handle, rx_reclaim)
}

fn write_linear_model(receptive_field: usize, model_rate: u32) -> NamedTempFile {
    let weight = 1.0 / receptive_field as f32;
    let weights: Vec<String> = (0..receptive_field).map(|_| weight.to_string()).collect();
    let json = format!(
        r#"{{
            "architecture": "Linear",
            "config": {{"receptive_field": {receptive_field}, "bias": false}},
            "weights": [{}],
            "sample_rate": {model_rate}
        }}"#,
        weights.join(", ")
    );

    let mut file = NamedTempFile::with_suffix(".nam").unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

fn write_noise_ir(length: usize) -> NamedTempFile {
    let file = NamedTempFile::with_suffix(".wav").unwrap();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
    let mut value = 0.7f32;
    for _ in 0..length {
        // Cheap deterministic noise, no rng dependency needed.
        value = (value * 997.0).fract() * 2.0 - 1.0;
        writer.write_sample(value * 0.5).unwrap();
    }
    writer.finalize().unwrap();
    file
}

fn run_block(engine: &mut NeuralAmp, input: &[f32], scratch: &mut [f32]) {
    scratch.copy_from_slice(input);
    let mut channels: [&mut [f32]; 1] = [scratch];
    engine.process_block(&mut channels);
}

fn bench_passthrough(c: &mut Criterion) {
    let mut group = c.benchmark_group("Engine Passthrough");

    group.bench_function("no model, no IR", |b| {
        let (mut engine, _, _rx) = build_engine(BUFFER_SIZE);

        let input = vec![0.5f32; BUFFER_SIZE];
        let mut scratch = vec![0.0f32; BUFFER_SIZE];

        b.iter(|| run_block(&mut engine, black_box(&input), black_box(&mut scratch)));
    });

    group.finish();
}

fn bench_model_receptive_fields(c: &mut Criterion) {
    let mut group = c.benchmark_group("Engine Model Receptive Fields");

    for &receptive_field in &[16, 64, 256, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{receptive_field} taps")),
            &receptive_field,
            |b, &receptive_field| {
                let (mut engine, handle, _rx) = build_engine(BUFFER_SIZE);

                let file = write_linear_model(receptive_field, SAMPLE_RATE);
                handle.load_model(file.path()).unwrap();

                let input = vec![0.5f32; BUFFER_SIZE];
                let mut scratch = vec![0.0f32; BUFFER_SIZE];

                // One warmup block applies the staged model.
                run_block(&mut engine, &input, &mut scratch);

                b.iter(|| run_block(&mut engine, black_box(&input), black_box(&mut scratch)));
            },
        );
    }

    group.finish();
}

fn bench_model_with_resampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("Engine Model Rates");

    for &model_rate in &[48_000u32, 24_000, 96_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{model_rate} Hz")),
            &model_rate,
            |b, &model_rate| {
                let (mut engine, handle, _rx) = build_engine(BUFFER_SIZE);

                let file = write_linear_model(64, model_rate);
                handle.load_model(file.path()).unwrap();

                let input = vec![0.5f32; BUFFER_SIZE];
                let mut scratch = vec![0.0f32; BUFFER_SIZE];

                run_block(&mut engine, &input, &mut scratch);

                b.iter(|| run_block(&mut engine, black_box(&input), black_box(&mut scratch)));
            },
        );
    }

    group.finish();
}

fn bench_ir_lengths(c: &mut Criterion) {
    let mut group = c.benchmark_group("Engine IR Lengths");

    for &ir_length in &[512, 4_096, 24_000, 96_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{ir_length} samples")),
            &ir_length,
            |b, &ir_length| {
                let (mut engine, handle, _rx) = build_engine(BUFFER_SIZE);

                let file = write_noise_ir(ir_length);
                handle.load_ir(file.path()).unwrap();

                let input = vec![0.5f32; BUFFER_SIZE];
                let mut scratch = vec![0.0f32; BUFFER_SIZE];

                run_block(&mut engine, &input, &mut scratch);

                b.iter(|| run_block(&mut engine, black_box(&input), black_box(&mut scratch)));
            },
        );
    }

    group.finish();
}

fn bench_buffer_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("Engine Buffer Sizes");

    for &buffer_size in &[64, 128, 256, 512] {
        group.bench_with_input(
            BenchmarkId::from_parameter(buffer_size),
            &buffer_size,
            |b, &buffer_size| {
                let (mut engine, handle, _rx) = build_engine(buffer_size);

                let file = write_linear_model(64, SAMPLE_RATE);
                handle.load_model(file.path()).unwrap();

                let input = vec![0.5f32; buffer_size];
                let mut scratch = vec![0.0f32; buffer_size];

                run_block(&mut engine, &input, &mut scratch);

                b.iter(|| run_block(&mut engine, black_box(&input), black_box(&mut scratch)));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_passthrough,
    bench_model_receptive_fields,
    bench_model_with_resampling,
    bench_ir_lengths,
    bench_buffer_sizes,
);
criterion_main!(benches);
