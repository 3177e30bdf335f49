//! End-to-end session workflow with stub segmenters
//!
//! Covers the scenario a user goes through: upload, process, inspect the
//! store, change the model, export the archive.

mod common;

use bgremove_batch::{
    build_zip, output_name, process_image, BatchConfig, Dispatcher, IdentitySegmenterFactory,
    ImageIOService, ModelKind, NoOpProgressReporter, RemovalError, Session, UploadedImage,
    ARCHIVE_FILE_NAME,
};
use common::{jpeg_bytes, png_bytes, png_upload, Behaviour, RecordingReporter, ScriptedFactory};
use image::ImageFormat;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tempfile::TempDir;

fn identity_dispatcher() -> Dispatcher {
    Dispatcher::new(
        Arc::new(IdentitySegmenterFactory),
        BatchConfig::builder().max_concurrency(2).build().unwrap(),
    )
}

fn archive_entries(bytes: Vec<u8>) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        entries.insert(file.name().to_string(), data);
    }
    entries
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_uploads_end_up_in_the_store() {
    let uploads = vec![
        UploadedImage::new("a.png", png_bytes(6, 4, [255, 0, 0, 255])),
        UploadedImage::new("b.jpg", jpeg_bytes(5, 7, [0, 128, 255])),
    ];
    let mut session = Session::new();

    let outcome = session
        .process(&identity_dispatcher(), &uploads, ModelKind::U2Net, &NoOpProgressReporter)
        .await
        .unwrap();
    assert!(outcome.all_succeeded());
    assert_eq!(session.len(), 2);

    let mut names: Vec<&str> = session.results().iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["a_no_bg.png", "b_no_bg.png"]);

    for item in session.results() {
        let decoded = image::load_from_memory_with_format(&item.data, ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded, item.processed);
        assert_eq!(item.processed, item.original);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_model_change_clears_the_store() {
    let uploads = vec![png_upload("a.png", 3), png_upload("b.png", 4)];
    let dispatcher = identity_dispatcher();
    let mut session = Session::new();

    session
        .process(&dispatcher, &uploads, ModelKind::U2Net, &NoOpProgressReporter)
        .await
        .unwrap();
    assert_eq!(session.len(), 2);

    assert!(session.sync_inputs(&uploads, ModelKind::BiRefNetGeneral));
    assert!(session.is_empty());
    assert_eq!(session.run_state().model, Some(ModelKind::BiRefNetGeneral));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_repeated_run_appends_results() {
    let uploads = vec![png_upload("a.png", 3)];
    let dispatcher = identity_dispatcher();
    let mut session = Session::new();

    for _ in 0..2 {
        session
            .process(&dispatcher, &uploads, ModelKind::U2Net, &NoOpProgressReporter)
            .await
            .unwrap();
    }
    assert_eq!(session.len(), 2);

    // The archive keeps both copies under distinct names
    let entries = archive_entries(build_zip(session.results()).unwrap());
    let names: Vec<&String> = entries.keys().collect();
    assert_eq!(names, vec!["a_no_bg.png", "a_no_bg_2.png"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failures_stay_out_of_the_store() {
    let dispatcher = Dispatcher::new(
        Arc::new(ScriptedFactory {
            pick: |width| match width {
                1 => Behaviour::Fail,
                2 => Behaviour::Panic,
                _ => Behaviour::Pass,
            },
        }),
        BatchConfig::default(),
    );
    let uploads = vec![
        png_upload("fails.png", 1),
        png_upload("panics.png", 2),
        png_upload("works.png", 3),
        UploadedImage::new("broken.jpg", b"\xFF\xD8 truncated".to_vec()),
    ];
    let reporter = RecordingReporter::default();
    let mut session = Session::new();

    let outcome = session
        .process(&dispatcher, &uploads, ModelKind::U2Net, &reporter)
        .await
        .unwrap();

    assert_eq!(outcome.total, 4);
    assert_eq!(outcome.failed.len(), 3);
    assert_eq!(session.len(), 1);
    assert_eq!(session.results()[0].name, "works_no_bg.png");

    let mut failures = reporter.failures();
    failures.sort();
    assert_eq!(failures, vec!["broken.jpg", "fails.png", "panics.png"]);

    for failed in &outcome.failed {
        match failed.name.as_str() {
            "broken.jpg" => assert!(matches!(failed.error, RemovalError::Decode { .. })),
            _ => assert!(matches!(failed.error, RemovalError::Segmentation(_))),
        }
    }

    let updates = reporter.updates();
    assert_eq!(updates.len(), 4);
    let last = updates.last().unwrap();
    assert_eq!(last.completed, 4);
    assert_eq!(last.failed, 3);
    assert!((last.fraction() - 1.0).abs() < f64::EPSILON);

    let finished = reporter.finished();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].processed, 1);
    assert_eq!(finished[0].failed_items.len(), 3);
}

#[test]
fn test_process_image_output_is_the_segmented_png() {
    let factory = ScriptedFactory {
        pick: |_| Behaviour::Pass,
    };
    let item = UploadedImage::new("sample.jpg", jpeg_bytes(8, 8, [10, 200, 30]));

    let processed =
        process_image(&item, ModelKind::U2Net, &factory, &BatchConfig::default()).unwrap();
    assert_eq!(processed.name, "sample_no_bg.png");
    assert_eq!(output_name("sample.jpg"), "sample_no_bg.png");

    let decoded = image::load_from_memory_with_format(&processed.data, ImageFormat::Png)
        .unwrap()
        .to_rgba8();
    assert_eq!(decoded, processed.processed);
    assert!(decoded.pixels().all(|p| p.0[3] == 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export_to_disk_and_archive() {
    let uploads = vec![png_upload("x.png", 2), png_upload("y.png", 3)];
    let mut session = Session::new();
    session
        .process(&identity_dispatcher(), &uploads, ModelKind::IsNetGeneralUse, &NoOpProgressReporter)
        .await
        .unwrap();

    let out = TempDir::new().unwrap();
    let written = ImageIOService::save_results(session.results(), out.path()).unwrap();
    assert_eq!(written.len(), 2);
    assert!(out.path().join("x_no_bg.png").exists());
    assert!(out.path().join("y_no_bg.png").exists());

    let archive_path = out.path().join(ARCHIVE_FILE_NAME);
    ImageIOService::write_archive(session.results(), &archive_path).unwrap();
    let entries = archive_entries(std::fs::read(&archive_path).unwrap());
    assert_eq!(entries.len(), 2);
    for item in session.results() {
        assert_eq!(entries[&item.name], item.data);
    }
}
