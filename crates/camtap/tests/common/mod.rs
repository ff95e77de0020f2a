#![allow(dead_code)]

use camtap::*;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

/// Knobs shared between a test and the mock device it opened.
#[derive(Default)]
pub struct MockControl {
    pub streaming: AtomicBool,
    pub refuse_start: AtomicBool,
    pub fail_capture: AtomicBool,
    pub starts: AtomicU32,
    pub stops: AtomicU32,
    pub acquisitions: AtomicU32,
    pub releases: AtomicU32,
}

impl MockControl {
    /// True while some source holds the device.
    pub fn held(&self) -> bool {
        self.acquisitions.load(Ordering::SeqCst) > self.releases.load(Ordering::SeqCst)
    }
}

pub struct MockCatalog {
    pub devices: Vec<DeviceInfo>,
    pub control: Arc<MockControl>,
    pub interval: Duration,
}

impl MockCatalog {
    /// One back camera producing a tiny frame every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            devices: vec![DeviceInfo {
                id: "mock:0".to_string(),
                name: "Mock camera".to_string(),
                position: CameraPosition::Back,
                sizes: vec![FrameSize::new(1280, 720)],
            }],
            control: Arc::new(MockControl::default()),
            interval,
        }
    }
}

impl DeviceCatalog for MockCatalog {
    fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }

    fn acquire(&self, info: &DeviceInfo) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        self.control.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDevice {
            info: info.clone(),
            control: Arc::clone(&self.control),
            interval: self.interval,
        }))
    }
}

pub struct MockDevice {
    info: DeviceInfo,
    control: Arc<MockControl>,
    interval: Duration,
}

impl CaptureDevice for MockDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn configure(&mut self, config: &CaptureConfig) -> Result<StreamFormat, CaptureError> {
        let size = config.preset().size();
        if !self.info.sizes.contains(&size) {
            return Err(CaptureError::ConfigurationUnsupported(size.to_string()));
        }
        Ok(StreamFormat {
            size,
            format: PixelFormat::Rgb8,
            frame_rate: 1.0 / self.interval.as_secs_f32(),
        })
    }

    fn start_streaming(&mut self) -> Result<(), CaptureError> {
        if self.control.refuse_start.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceBusy("held by another client".to_string()));
        }
        self.control.starts.fetch_add(1, Ordering::SeqCst);
        self.control.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_streaming(&mut self) {
        self.control.stops.fetch_add(1, Ordering::SeqCst);
        self.control.streaming.store(false, Ordering::SeqCst);
    }

    fn blocking_capture(&mut self) -> Result<Frame, CaptureError> {
        thread::sleep(self.interval);
        if self.control.fail_capture.load(Ordering::SeqCst) {
            return Err(CaptureError::AcquisitionFailure("sensor timeout".to_string()));
        }
        Ok(Frame::new(
            FrameSize::new(2, 2),
            PixelFormat::Rgb8,
            vec![0u8; 12],
            Duration::ZERO,
        ))
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.control.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
