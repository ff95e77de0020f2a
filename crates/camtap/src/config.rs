use crate::FrameSize;

// consecutive capture failures tolerated before the worker gives up
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPosition {
    Front,
    Back,
    External,
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// First device the catalog reports.
    Default,
    /// First device mounted at the given position.
    Position(CameraPosition),
    /// Exact device id (e.g. "/dev/video0").
    Id(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPreset {
    Vga640x480,
    Hd1280x720,
    FullHd1920x1080,
    Custom(FrameSize),
}

impl ResolutionPreset {
    pub fn size(&self) -> FrameSize {
        match self {
            ResolutionPreset::Vga640x480 => FrameSize::new(640, 480),
            ResolutionPreset::Hd1280x720 => FrameSize::new(1280, 720),
            ResolutionPreset::FullHd1920x1080 => FrameSize::new(1920, 1080),
            ResolutionPreset::Custom(size) => *size,
        }
    }
}

/// Configuration for a `FrameSource`.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    device: DeviceSelector,
    preset: ResolutionPreset,
    frame_rate: Option<f32>,
    max_consecutive_failures: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: DeviceSelector::Default,
            preset: ResolutionPreset::Hd1280x720,
            frame_rate: None,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl CaptureConfig {
    pub fn with_device(mut self, device: DeviceSelector) -> Self {
        self.device = device;
        self
    }

    /// Shorthand for `with_device(DeviceSelector::Position(position))`.
    pub fn with_position(self, position: CameraPosition) -> Self {
        self.with_device(DeviceSelector::Position(position))
    }

    pub fn with_preset(mut self, preset: ResolutionPreset) -> Self {
        self.preset = preset;
        self
    }

    /// Request a frame rate. Without one the device keeps its native rate.
    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    /// Number of capture failures in a row after which the worker stops.
    /// Zero is treated as one.
    pub fn with_max_consecutive_failures(mut self, count: u32) -> Self {
        self.max_consecutive_failures = count.max(1);
        self
    }

    // Getters
    pub fn device(&self) -> &DeviceSelector {
        &self.device
    }

    pub fn preset(&self) -> ResolutionPreset {
        self.preset
    }

    pub fn frame_rate(&self) -> Option<f32> {
        self.frame_rate
    }

    pub fn max_consecutive_failures(&self) -> u32 {
        self.max_consecutive_failures
    }
}
