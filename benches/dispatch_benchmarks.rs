use bgremove_batch::{
    build_zip, BatchConfig, Dispatcher, IdentitySegmenterFactory, ModelKind,
    NoOpProgressReporter, ProcessedItem, UploadedImage,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn bench_build_zip(c: &mut Criterion) {
    let data = png_bytes(256, 256);
    let mut group = c.benchmark_group("build_zip");

    for count in [1usize, 16, 64] {
        let items: Vec<ProcessedItem> = (0..count)
            .map(|i| ProcessedItem {
                name: format!("image_{}_no_bg.png", i),
                original: RgbaImage::new(1, 1),
                processed: RgbaImage::new(1, 1),
                data: data.clone(),
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &items, |b, items| {
            b.iter(|| build_zip(black_box(items)).unwrap());
        });
    }

    group.finish();
}

fn bench_identity_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let uploads: Vec<UploadedImage> = (0..16)
        .map(|i| UploadedImage::new(format!("image_{}.png", i), png_bytes(128, 128)))
        .collect();

    let mut group = c.benchmark_group("identity_dispatch");
    group.sample_size(20);

    for workers in [1usize, 4] {
        let dispatcher = Dispatcher::new(
            Arc::new(IdentitySegmenterFactory),
            BatchConfig::builder().max_concurrency(workers).build().unwrap(),
        );

        group.bench_function(BenchmarkId::new("workers", workers), |b| {
            b.iter(|| {
                rt.block_on(dispatcher.dispatch(
                    uploads.clone(),
                    ModelKind::U2Net,
                    &NoOpProgressReporter,
                ))
                .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_zip, bench_identity_dispatch);
criterion_main!(benches);
