use std::{fmt, io};

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// No device matched the requested selector.
    DeviceNotFound(String),
    /// The device exists but cannot be acquired right now.
    DeviceBusy(String),
    /// The requested preset or frame rate cannot be negotiated.
    ConfigurationUnsupported(String),
    /// `start` was called while a session is active.
    AlreadyRunning,
    /// A single capture attempt failed. Non-fatal inside the acquisition loop.
    AcquisitionFailure(String),
    /// The capture worker could not be spawned or died unexpectedly.
    Worker(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceNotFound(msg) => write!(f, "device not found: {msg}"),
            CaptureError::DeviceBusy(msg) => write!(f, "device busy: {msg}"),
            CaptureError::ConfigurationUnsupported(msg) => {
                write!(f, "configuration unsupported: {msg}")
            }
            CaptureError::AlreadyRunning => write!(f, "capture already running"),
            CaptureError::AcquisitionFailure(msg) => write!(f, "acquisition failure: {msg}"),
            CaptureError::Worker(msg) => write!(f, "capture worker error: {msg}"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<io::Error> for CaptureError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => CaptureError::DeviceNotFound(err.to_string()),
            io::ErrorKind::ResourceBusy | io::ErrorKind::PermissionDenied => {
                CaptureError::DeviceBusy(err.to_string())
            }
            io::ErrorKind::InvalidInput => CaptureError::ConfigurationUnsupported(err.to_string()),
            _ => CaptureError::AcquisitionFailure(err.to_string()),
        }
    }
}
