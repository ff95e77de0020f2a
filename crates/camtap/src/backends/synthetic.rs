//! Test-pattern camera.
//!
//! Produces a moving RGB gradient at the configured frame rate. Useful for
//! running the pipeline on machines without a camera and for tests that need
//! device arbitration (`DeviceBusy`) without hardware.

use {
    crate::*,
    std::{
        collections::HashSet,
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    },
};

const DEFAULT_FRAME_RATE: f32 = 30.0;
const MAX_FRAME_RATE: f32 = 240.0;

type HeldSet = Arc<Mutex<HashSet<String>>>;

fn lock_held(held: &HeldSet) -> std::sync::MutexGuard<'_, HashSet<String>> {
    held.lock().unwrap_or_else(|e| e.into_inner())
}

/// Catalog of synthetic cameras. Acquisition is exclusive per device id.
#[derive(Clone)]
pub struct SyntheticCatalog {
    devices: Vec<DeviceInfo>,
    held: HeldSet,
}

impl Default for SyntheticCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticCatalog {
    /// A back and a front camera supporting VGA and 720p.
    pub fn new() -> Self {
        let sizes = vec![
            ResolutionPreset::Vga640x480.size(),
            ResolutionPreset::Hd1280x720.size(),
        ];
        Self {
            devices: vec![
                DeviceInfo {
                    id: "synthetic:back".to_string(),
                    name: "Synthetic back camera".to_string(),
                    position: CameraPosition::Back,
                    sizes: sizes.clone(),
                },
                DeviceInfo {
                    id: "synthetic:front".to_string(),
                    name: "Synthetic front camera".to_string(),
                    position: CameraPosition::Front,
                    sizes,
                },
            ],
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// A catalog with no devices.
    pub fn empty() -> Self {
        Self {
            devices: Vec::new(),
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_device(mut self, info: DeviceInfo) -> Self {
        self.devices.push(info);
        self
    }

    /// Mark a device as held by someone else (or release that hold).
    pub fn set_busy(&self, id: &str, busy: bool) {
        let mut held = lock_held(&self.held);
        if busy {
            held.insert(id.to_string());
        } else {
            held.remove(id);
        }
    }

    pub fn is_held(&self, id: &str) -> bool {
        lock_held(&self.held).contains(id)
    }
}

impl DeviceCatalog for SyntheticCatalog {
    fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }

    fn acquire(&self, info: &DeviceInfo) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        if !self.devices.iter().any(|device| device.id == info.id) {
            return Err(CaptureError::DeviceNotFound(info.id.clone()));
        }
        if !lock_held(&self.held).insert(info.id.clone()) {
            return Err(CaptureError::DeviceBusy(format!("{} is in use", info.id)));
        }
        Ok(Box::new(SyntheticCamera::new(info.clone(), Arc::clone(&self.held))))
    }
}

/// A synthetic device; releases its catalog hold when dropped.
pub struct SyntheticCamera {
    info: DeviceInfo,
    held: HeldSet,
    format: Option<StreamFormat>,
    streaming: bool,
    started: Instant,
    next_due: Instant,
    frame_index: u64,
}

impl SyntheticCamera {
    fn new(info: DeviceInfo, held: HeldSet) -> Self {
        let now = Instant::now();
        Self {
            info,
            held,
            format: None,
            streaming: false,
            started: now,
            next_due: now,
            frame_index: 0,
        }
    }

    fn render(&self, size: FrameSize) -> Vec<u8> {
        let shift = self.frame_index as usize;
        let width = size.width as usize;
        let mut data = Vec::with_capacity(size.pixel_count() * 3);
        for y in 0..size.height as usize {
            for x in 0..width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift) % 256) as u8);
                data.push(((x + y) % 256) as u8);
            }
        }
        data
    }
}

impl CaptureDevice for SyntheticCamera {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn configure(&mut self, config: &CaptureConfig) -> Result<StreamFormat, CaptureError> {
        let size = config.preset().size();
        if !self.info.sizes.is_empty() && !self.info.sizes.contains(&size) {
            return Err(CaptureError::ConfigurationUnsupported(format!(
                "{} does not support {}",
                self.info.id, size
            )));
        }

        let frame_rate = config.frame_rate().unwrap_or(DEFAULT_FRAME_RATE);
        if !(frame_rate > 0.0 && frame_rate <= MAX_FRAME_RATE) {
            return Err(CaptureError::ConfigurationUnsupported(format!(
                "frame rate {} outside (0, {}]",
                frame_rate, MAX_FRAME_RATE
            )));
        }

        let format = StreamFormat {
            size,
            format: PixelFormat::Rgb8,
            frame_rate,
        };
        self.format = Some(format.clone());
        Ok(format)
    }

    fn start_streaming(&mut self) -> Result<(), CaptureError> {
        if self.format.is_none() {
            return Err(CaptureError::ConfigurationUnsupported(
                "device not configured".to_string(),
            ));
        }
        let now = Instant::now();
        self.started = now;
        self.next_due = now;
        self.streaming = true;
        Ok(())
    }

    fn stop_streaming(&mut self) {
        self.streaming = false;
    }

    fn blocking_capture(&mut self) -> Result<Frame, CaptureError> {
        let format = match (&self.format, self.streaming) {
            (Some(format), true) => format.clone(),
            _ => return Err(CaptureError::AcquisitionFailure("not streaming".to_string())),
        };

        let now = Instant::now();
        if self.next_due > now {
            std::thread::sleep(self.next_due - now);
        }
        self.next_due += Duration::from_secs_f32(1.0 / format.frame_rate);

        let data = self.render(format.size);
        self.frame_index += 1;
        Ok(Frame::new(
            format.size,
            PixelFormat::Rgb8,
            data,
            self.started.elapsed(),
        ))
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        lock_held(&self.held).remove(&self.info.id);
    }
}
