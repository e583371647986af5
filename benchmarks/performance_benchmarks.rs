//! Criterion-based performance benchmarks
//!
//! Per-frame costs of the stages that run on the CPU regardless of the
//! inference backend.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use framesafe::inference::{DetectionDecoder, RawOutput};
use framesafe::mitigation::MitigationPolicy;
use framesafe::preprocessing::{FrameTransformer, Letterbox, TargetSize};
use framesafe::{BoundingBox, ChannelOrder, Detection, Frame, Label};
use ndarray::Array3;
use std::time::Duration;

fn test_frame(width: u32, height: u32) -> Frame {
    let bytes: Vec<u8> = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
    Frame::from_bytes(width, height, ChannelOrder::Bgr, &bytes).unwrap()
}

/// Benchmark full frame transform (color order, letterbox, CHW tensor)
fn bench_frame_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_transform");
    let transformer = FrameTransformer::new(TargetSize::square(320), ChannelOrder::Rgb);

    let test_cases = vec![
        ("VGA", 640, 480),
        ("HD", 1280, 720),
        ("FullHD", 1920, 1080),
    ];

    for (name, width, height) in test_cases {
        let frame = test_frame(width, height);

        group.throughput(Throughput::Elements((width * height) as u64));
        group.bench_with_input(BenchmarkId::new("transform", name), &frame, |b, frame| {
            b.iter(|| {
                let _result = transformer.transform(black_box(frame)).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark letterbox geometry alone
fn bench_letterbox_geometry(c: &mut Criterion) {
    c.bench_function("letterbox_geometry", |b| {
        b.iter(|| Letterbox::compute(black_box(1920), black_box(1080), TargetSize::square(320)))
    });
}

/// Benchmark decoding a YOLOv8-shaped output with scattered candidates
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.measurement_time(Duration::from_secs(5));
    let decoder = DetectionDecoder::standard();
    let context = Letterbox::compute(1280, 720, TargetSize::square(320)).context();

    for candidates in [0usize, 10, 100] {
        let anchors = 2100;
        let mut data = Array3::<f32>::zeros((1, 22, anchors));
        for i in 0..candidates {
            let anchor = i * (anchors / candidates.max(1));
            data[[0, 0, anchor]] = 20.0 + (i % 10) as f32 * 28.0;
            data[[0, 1, anchor]] = 90.0 + (i / 10) as f32 * 14.0;
            data[[0, 2, anchor]] = 30.0;
            data[[0, 3, anchor]] = 30.0;
            data[[0, 4 + i % 18, anchor]] = 0.3 + (i % 7) as f32 * 0.1;
        }
        let output = RawOutput::new(data.into_dyn());

        group.bench_with_input(
            BenchmarkId::new("candidates", candidates),
            &output,
            |b, output| {
                b.iter(|| decoder.decode(black_box(output), &context).unwrap());
            },
        );
    }
    group.finish();
}

/// Benchmark blurring one region of a HD frame
fn bench_mitigation(c: &mut Criterion) {
    let policy = MitigationPolicy::default();
    let frame = test_frame(1280, 720);
    let detections = [Detection::new(
        Label::BellyExposed,
        0.9,
        BoundingBox::new(400, 200, 240, 240),
    )];

    c.bench_function("blur_region_240", |b| {
        b.iter(|| {
            let mut target = frame.try_clone().unwrap();
            policy.mitigate(&mut target, black_box(&detections)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_frame_transform,
    bench_letterbox_geometry,
    bench_decode,
    bench_mitigation
);
criterion_main!(benches);
