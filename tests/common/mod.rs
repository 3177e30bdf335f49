//! Shared helpers for the integration tests: image builders, scripted
//! segmenters and a reporter that records every call.

#![allow(dead_code)]

use bgremove_batch::{
    BatchConfig, BatchProgress, BatchSummary, ModelKind, ProgressReporter, RemovalError, Result,
    Segmenter, SegmenterFactory, UploadedImage,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// PNG bytes of a solid `width` x `height` image
pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// JPEG bytes of a solid `width` x `height` image
pub fn jpeg_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .unwrap();
    bytes
}

pub fn png_upload(name: &str, width: u32) -> UploadedImage {
    UploadedImage::new(name, png_bytes(width, 4, [200, 100, 50, 255]))
}

/// Tracks how many segmentations run at the same time
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    sessions: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

/// Identity segmenter that holds each image for `delay`
pub struct CountingFactory {
    pub gauge: Arc<ConcurrencyGauge>,
    pub delay: Duration,
}

impl CountingFactory {
    pub fn new(delay: Duration) -> Self {
        Self {
            gauge: Arc::new(ConcurrencyGauge::default()),
            delay,
        }
    }
}

struct CountingSegmenter {
    gauge: Arc<ConcurrencyGauge>,
    delay: Duration,
}

impl Segmenter for CountingSegmenter {
    fn remove(&mut self, image: &RgbaImage) -> Result<RgbaImage> {
        let now = self.gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(image.clone())
    }
}

impl SegmenterFactory for CountingFactory {
    fn create_session(&self, _model: ModelKind, _config: &BatchConfig) -> Result<Box<dyn Segmenter>> {
        self.gauge.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSegmenter {
            gauge: Arc::clone(&self.gauge),
            delay: self.delay,
        }))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// What a scripted segmenter does with an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Pass,
    Fail,
    Panic,
}

/// Segmenter whose behaviour is picked from the image width
pub struct ScriptedFactory {
    pub pick: fn(u32) -> Behaviour,
}

struct ScriptedSegmenter {
    pick: fn(u32) -> Behaviour,
}

impl Segmenter for ScriptedSegmenter {
    fn remove(&mut self, image: &RgbaImage) -> Result<RgbaImage> {
        match (self.pick)(image.width()) {
            Behaviour::Pass => {
                // Make the output distinguishable from the input
                let mut output = image.clone();
                for pixel in output.pixels_mut() {
                    pixel.0[3] = 0;
                }
                Ok(output)
            },
            Behaviour::Fail => Err(RemovalError::segmentation("scripted failure")),
            Behaviour::Panic => panic!("scripted panic"),
        }
    }
}

impl SegmenterFactory for ScriptedFactory {
    fn create_session(&self, _model: ModelKind, _config: &BatchConfig) -> Result<Box<dyn Segmenter>> {
        Ok(Box::new(ScriptedSegmenter { pick: self.pick }))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Factory that cannot create sessions
pub struct BrokenFactory;

impl SegmenterFactory for BrokenFactory {
    fn create_session(&self, model: ModelKind, _config: &BatchConfig) -> Result<Box<dyn Segmenter>> {
        Err(RemovalError::model(format!("no weights for {}", model)))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Reporter that remembers every call
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub started: Mutex<Vec<(usize, ModelKind)>>,
    pub updates: Mutex<Vec<BatchProgress>>,
    pub failures: Mutex<Vec<String>>,
    pub finished: Mutex<Vec<BatchSummary>>,
}

impl RecordingReporter {
    pub fn updates(&self) -> Vec<BatchProgress> {
        self.updates.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<BatchSummary> {
        self.finished.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report_batch_started(&self, total: usize, model: ModelKind) {
        self.started.lock().unwrap().push((total, model));
    }

    fn report_progress(&self, update: &BatchProgress) {
        self.updates.lock().unwrap().push(update.clone());
    }

    fn report_item_failed(&self, name: &str, _error: &RemovalError) {
        self.failures.lock().unwrap().push(name.to_string());
    }

    fn report_batch_finished(&self, summary: &BatchSummary) {
        self.finished.lock().unwrap().push(summary.clone());
    }
}
