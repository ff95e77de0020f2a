use {
    camtap::*,
    camtap_base::init_stdout_logger,
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
};

const DEFAULT_SECONDS: u64 = 5;

struct Args {
    seconds: u64,
    position: Option<CameraPosition>,
    v4l2: bool,
}

fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let mut args = Args {
        seconds: DEFAULT_SECONDS,
        position: None,
        v4l2: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--front" => args.position = Some(CameraPosition::Front),
            "--back" => args.position = Some(CameraPosition::Back),
            "--v4l2" => args.v4l2 = true,
            other => args.seconds = other.parse()?,
        }
    }
    Ok(args)
}

fn catalog(v4l2: bool) -> Result<SharedCatalog, Box<dyn std::error::Error>> {
    if v4l2 {
        #[cfg(feature = "v4l2")]
        return Ok(Arc::new(V4l2Catalog::new()));
        #[cfg(not(feature = "v4l2"))]
        return Err("built without the v4l2 feature".into());
    }
    Ok(Arc::new(SyntheticCatalog::new()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_stdout_logger();
    let args = parse_args()?;

    let mut config = CaptureConfig::default();
    if let Some(position) = args.position {
        config = config.with_position(position);
    }

    // frames are handed to this thread, like a UI main loop would receive them
    let queue = MainQueue::new();
    let catalog = catalog(args.v4l2)?;
    let mut source = FrameSource::open(catalog, config, queue.handle())?;
    let format = source.format().clone();
    log::info!(
        "previewing {} at {} {:?} {:.1} fps for {}s",
        source.device_info().name,
        format.size,
        format.format,
        format.frame_rate,
        args.seconds
    );

    source.set_drop_handler(|event| log::debug!("dropped: {:?}", event));
    source.start(|frame| {
        log::debug!(
            "frame {} {} {} bytes at {:?}",
            frame.sequence(),
            frame.size(),
            frame.data().len(),
            frame.timestamp()
        );
    })?;

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < deadline && source.is_running() {
        queue.run_for(Duration::from_millis(50));
    }
    source.stop();

    let stats = source.stats();
    log::info!(
        "captured {}, delivered {}, dropped {}, acquisition failures {}",
        stats.captured,
        stats.delivered,
        stats.dropped,
        stats.acquisition_failures
    );
    Ok(())
}
