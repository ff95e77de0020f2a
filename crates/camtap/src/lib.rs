//! Camera capture adapter for the camtap workspace.
//!
//! A `FrameSource` opens a device through a `DeviceCatalog`, runs the
//! acquisition loop on its own worker thread and hands every frame to a
//! callback on an injected `DeliveryContext`. Frames the consumer cannot
//! keep up with are dropped and counted, never queued.

pub mod backends;
pub mod config;
pub mod delivery;
pub mod device;
pub mod error;
pub mod frame;
pub mod source;

pub use backends::synthetic::{SyntheticCamera, SyntheticCatalog};
#[cfg(feature = "v4l2")]
pub use backends::v4l2::{V4l2Camera, V4l2Catalog};
pub use config::{CameraPosition, CaptureConfig, DeviceSelector, ResolutionPreset};
pub use delivery::{DeliveryContext, InlineDelivery, Job, MainQueue, MainQueueHandle, ThreadDelivery, TokioDelivery};
pub use device::{CaptureDevice, DeviceCatalog, DeviceInfo, SharedCatalog, StreamFormat, select_device};
pub use error::CaptureError;
pub use frame::{Frame, FrameSize, PixelFormat};
pub use source::{CaptureStats, DropEvent, DropReason, FrameSource};
