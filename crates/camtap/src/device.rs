use std::sync::Arc;

use crate::{CameraPosition, CaptureConfig, CaptureError, DeviceSelector, Frame, FrameSize, PixelFormat};

/// Description of a physical device as reported by discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub position: CameraPosition,
    /// Sizes the device is known to support. Empty when the backend cannot tell.
    pub sizes: Vec<FrameSize>,
}

/// The format a device actually settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFormat {
    pub size: FrameSize,
    pub format: PixelFormat,
    pub frame_rate: f32,
}

/// Platform capture device.
///
/// `start_streaming`, `blocking_capture` and `stop_streaming` are always called
/// from the acquisition worker thread; `configure` runs on the thread that
/// opened the source.
pub trait CaptureDevice: Send {
    fn info(&self) -> &DeviceInfo;

    /// Negotiate the preset and frame rate, returning what the device accepted.
    fn configure(&mut self, config: &CaptureConfig) -> Result<StreamFormat, CaptureError>;

    fn start_streaming(&mut self) -> Result<(), CaptureError>;

    /// Stop streaming and release the hardware. Must be safe to call twice.
    fn stop_streaming(&mut self);

    /// Block until the next frame is available.
    fn blocking_capture(&mut self) -> Result<Frame, CaptureError>;
}

/// Device discovery and acquisition.
pub trait DeviceCatalog {
    fn devices(&self) -> Vec<DeviceInfo>;

    /// Take exclusive ownership of a discovered device.
    fn acquire(&self, info: &DeviceInfo) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// Catalog handle kept by a `FrameSource` so it can reacquire its device after `stop`.
pub type SharedCatalog = Arc<dyn DeviceCatalog + Send + Sync>;

/// Pick the first device matching `selector`.
pub fn select_device<'a>(devices: &'a [DeviceInfo], selector: &DeviceSelector) -> Option<&'a DeviceInfo> {
    match selector {
        DeviceSelector::Default => devices.first(),
        DeviceSelector::Position(position) => devices.iter().find(|info| info.position == *position),
        DeviceSelector::Id(id) => devices.iter().find(|info| info.id == *id),
    }
}
