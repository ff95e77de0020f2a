use std::{fmt, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Jpeg,
    Rgb8,
    Bgra8,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats, `None` for compressed ones.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Yuyv => Some(2),
            PixelFormat::Rgb8 => Some(3),
            PixelFormat::Bgra8 => Some(4),
            PixelFormat::Jpeg => None,
        }
    }
}

/// A decoded frame as produced by a `CaptureDevice`.
///
/// Callbacks receive `&Frame`; the borrow ends when the callback returns, so
/// anything that must outlive it has to be cloned out.
#[derive(Debug, Clone)]
pub struct Frame {
    size: FrameSize,
    format: PixelFormat,
    data: Vec<u8>,
    timestamp: Duration,
    sequence: u64,
}

impl Frame {
    /// Create a frame. `timestamp` is the capture time relative to the start of streaming.
    pub fn new(size: FrameSize, format: PixelFormat, data: Vec<u8>, timestamp: Duration) -> Self {
        Self {
            size,
            format,
            data,
            timestamp,
            sequence: 0,
        }
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Acquisition sequence number, starting at 1 and increasing across restarts.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
