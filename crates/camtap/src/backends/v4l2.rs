use {
    crate::*,
    std::time::Instant,
    v4l::{
        Device, Format, FourCC, buffer::Type, io::mmap::Stream as MmapStream,
        io::traits::CaptureStream, video::Capture,
    },
};

// number of mmap buffers handed to the driver
const BUFFER_COUNT: u32 = 4;

// V4L2 takes whole frames per second; anything that rounds below 1 is rejected
fn requested_fps(frame_rate: f32) -> Result<u32, CaptureError> {
    let fps = frame_rate.round();
    if fps.is_nan() || fps < 1.0 {
        return Err(CaptureError::ConfigurationUnsupported(format!(
            "frame rate {} is below 1 fps",
            frame_rate
        )));
    }
    Ok(fps as u32)
}

// frame interval numerator/denominator as reported by the driver, in frames per second
fn interval_rate(numerator: u32, denominator: u32) -> Result<f32, CaptureError> {
    if numerator == 0 {
        return Err(CaptureError::ConfigurationUnsupported(format!(
            "driver reported an empty frame interval ({}/{})",
            numerator, denominator
        )));
    }
    Ok(denominator as f32 / numerator as f32)
}

/// Enumerates `/dev/video*` nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Catalog;

impl V4l2Catalog {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceCatalog for V4l2Catalog {
    fn devices(&self) -> Vec<DeviceInfo> {
        v4l::context::enum_devices()
            .into_iter()
            .map(|node| {
                let id = node.path().to_string_lossy().into_owned();
                DeviceInfo {
                    name: node.name().unwrap_or_else(|| id.clone()),
                    id,
                    position: CameraPosition::External,
                    sizes: Vec::new(),
                }
            })
            .collect()
    }

    fn acquire(&self, info: &DeviceInfo) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let device = Device::with_path(&info.id)?;
        Ok(Box::new(V4l2Camera {
            info: info.clone(),
            device,
            stream: None,
            format: None,
            started: Instant::now(),
        }))
    }
}

/// V4L2 capture device delivering YUYV or MJPEG frames.
pub struct V4l2Camera {
    info: DeviceInfo,
    device: Device,
    stream: Option<MmapStream<'static>>,
    format: Option<StreamFormat>,
    started: Instant,
}

impl V4l2Camera {
    fn negotiate(&self, size: FrameSize, fourcc: FourCC) -> Result<Format, CaptureError> {
        let actual = Capture::set_format(&self.device, &Format::new(size.width, size.height, fourcc))?;
        if actual.width != size.width || actual.height != size.height {
            return Err(CaptureError::ConfigurationUnsupported(format!(
                "{} offered {}x{} instead of {}",
                self.info.id, actual.width, actual.height, size
            )));
        }
        Ok(actual)
    }
}

impl CaptureDevice for V4l2Camera {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn configure(&mut self, config: &CaptureConfig) -> Result<StreamFormat, CaptureError> {
        let size = config.preset().size();

        // prefer uncompressed, fall back to MJPEG
        let actual = self.negotiate(size, FourCC::new(b"YUYV"))?;
        let actual = if &actual.fourcc.repr == b"YUYV" {
            actual
        } else {
            self.negotiate(size, FourCC::new(b"MJPG"))?
        };
        let format = match &actual.fourcc.repr {
            b"YUYV" => PixelFormat::Yuyv,
            b"MJPG" => PixelFormat::Jpeg,
            _ => {
                return Err(CaptureError::ConfigurationUnsupported(format!(
                    "unsupported pixel format: {}",
                    actual.fourcc
                )));
            }
        };

        let params = match config.frame_rate() {
            Some(frame_rate) => Capture::set_params(
                &self.device,
                &v4l::video::capture::Parameters::with_fps(requested_fps(frame_rate)?),
            )?,
            None => Capture::params(&self.device)?,
        };
        let frame_rate = interval_rate(params.interval.numerator, params.interval.denominator)?;

        let format = StreamFormat {
            size,
            format,
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
        self.stream = Some(MmapStream::with_buffers(
            &self.device,
            Type::VideoCapture,
            BUFFER_COUNT,
        )?);
        self.started = Instant::now();
        Ok(())
    }

    fn stop_streaming(&mut self) {
        // dropping the stream issues STREAMOFF and unmaps the buffers
        self.stream.take();
    }

    fn blocking_capture(&mut self) -> Result<Frame, CaptureError> {
        let (Some(stream), Some(format)) = (self.stream.as_mut(), self.format.as_ref()) else {
            return Err(CaptureError::AcquisitionFailure("no stream".to_string()));
        };
        let (data, _metadata) = CaptureStream::next(stream)
            .map_err(|e| CaptureError::AcquisitionFailure(e.to_string()))?;
        // the mmap buffer is only valid until the next call
        Ok(Frame::new(
            format.size,
            format.format,
            data.to_vec(),
            self.started.elapsed(),
        ))
    }
}
