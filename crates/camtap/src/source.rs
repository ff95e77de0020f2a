use {
    crate::*,
    std::{
        sync::{
            Arc, Mutex, MutexGuard,
            atomic::{AtomicBool, AtomicU64, Ordering},
            mpsc,
        },
        thread::{self, JoinHandle},
        time::Duration,
    },
};

// pause after a failed capture before trying again
const WAIT_AFTER_FAILURE_MS: u64 = 20;

const WORKER_THREAD_NAME: &str = "camtap-capture";

// in-flight slot value when no frame is claimed; sequences start at 1
const NO_FRAME: u64 = 0;

pub type FrameCallback = Box<dyn FnMut(&Frame) + Send + 'static>;
pub type DropHandler = Box<dyn FnMut(&DropEvent) + Send + 'static>;

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// The previous frame was still being delivered.
    ConsumerBusy,
    /// The frame was handed off but never reached the callback: the source
    /// stopped, the delivery context discarded it, or the callback panicked.
    Discarded,
    /// The device failed to produce a frame.
    AcquisitionFailure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropEvent {
    /// Sequence number of the discarded frame, `None` if no frame was produced.
    pub sequence: Option<u64>,
    pub reason: DropReason,
}

/// Counter snapshot. Once `stop` returns, `delivered + dropped == captured`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub acquisition_failures: u64,
}

#[derive(Default)]
struct Counters {
    captured: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    acquisition_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            captured: self.captured.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            acquisition_failures: self.acquisition_failures.load(Ordering::Relaxed),
        }
    }
}

// state living as long as the source, shared with workers and pending frames
#[derive(Default)]
struct Shared {
    counters: Counters,
    drop_handler: Mutex<Option<DropHandler>>,
}

impl Shared {
    fn report_drop(&self, event: DropEvent) {
        log::debug!("frame dropped: {:?}", event);
        let mut handler = self.drop_handler.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handler) = handler.as_mut() {
            handler(&event);
        }
    }

    fn discard(&self, sequence: u64, reason: DropReason) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        self.report_drop(DropEvent {
            sequence: Some(sequence),
            reason,
        });
    }
}

// state belonging to one start..stop span
struct Session {
    callback: Mutex<Option<FrameCallback>>,
    in_flight: AtomicU64,
}

impl Session {
    fn new(callback: FrameCallback) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
            in_flight: AtomicU64::new(NO_FRAME),
        }
    }

    fn lock_callback(&self) -> MutexGuard<'_, Option<FrameCallback>> {
        self.callback.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_claim(&self, sequence: u64) -> bool {
        self.in_flight
            .compare_exchange(NO_FRAME, sequence, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // true if the slot still held `sequence`; callers hold the callback lock
    fn release(&self, sequence: u64) -> bool {
        self.in_flight
            .compare_exchange(sequence, NO_FRAME, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // waits for a running callback, drops it and settles a frame still in flight
    fn disarm(&self, shared: &Shared) {
        let mut callback = self.lock_callback();
        drop(callback.take());
        let sequence = self.in_flight.swap(NO_FRAME, Ordering::AcqRel);
        if sequence != NO_FRAME {
            shared.discard(sequence, DropReason::Discarded);
        }
    }
}

/// A claimed frame travelling through the delivery context.
///
/// Every claimed frame is settled exactly once: counted as delivered when the
/// callback returns, or as dropped when the job is discarded, the callback
/// panics, or `stop` settles it first.
struct PendingFrame {
    frame: Frame,
    session: Arc<Session>,
    shared: Arc<Shared>,
    settled: bool,
}

impl PendingFrame {
    fn deliver(mut self) {
        let sequence = self.frame.sequence();
        let mut callback = self.session.lock_callback();
        // a mismatch means stop already settled this frame
        if self.session.in_flight.load(Ordering::Acquire) == sequence {
            match callback.as_mut() {
                Some(callback) => {
                    callback(&self.frame);
                    self.shared.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                None => self.shared.discard(sequence, DropReason::Discarded),
            }
            self.session.release(sequence);
        }
        self.settled = true;
    }
}

impl Drop for PendingFrame {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let sequence = self.frame.sequence();
        let _callback = self.session.lock_callback();
        if self.session.release(sequence) {
            self.shared.discard(sequence, DropReason::Discarded);
        }
    }
}

struct Worker {
    device: Box<dyn CaptureDevice>,
    session: Arc<Session>,
    delivery: Arc<dyn DeliveryContext>,
    shared: Arc<Shared>,
    cancel: Arc<AtomicBool>,
    max_consecutive_failures: u32,
}

impl Worker {
    fn run(mut self, init: mpsc::SyncSender<Result<(), CaptureError>>) -> Box<dyn CaptureDevice> {
        // streaming starts on this thread; some backends are bound to the thread that started them
        if let Err(e) = self.device.start_streaming() {
            let _ = init.send(Err(e));
            return self.device;
        }
        let _ = init.send(Ok(()));
        log::info!("capture worker: streaming from {}", self.device.info().id);

        let mut consecutive_failures = 0u32;
        while !self.cancel.load(Ordering::Acquire) {
            match self.device.blocking_capture() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    let sequence = self.shared.counters.captured.fetch_add(1, Ordering::Relaxed) + 1;
                    self.forward(frame.with_sequence(sequence));
                }
                Err(e) => {
                    consecutive_failures += 1;
                    self.shared
                        .counters
                        .acquisition_failures
                        .fetch_add(1, Ordering::Relaxed);
                    log::warn!("capture worker: capture failed: {}", e);
                    self.shared.report_drop(DropEvent {
                        sequence: None,
                        reason: DropReason::AcquisitionFailure(e.to_string()),
                    });
                    if consecutive_failures >= self.max_consecutive_failures {
                        log::error!(
                            "capture worker: giving up after {} consecutive failures",
                            consecutive_failures
                        );
                        break;
                    }
                    thread::sleep(Duration::from_millis(WAIT_AFTER_FAILURE_MS));
                }
            }
        }

        self.device.stop_streaming();
        log::info!("capture worker: stopped");
        self.device
    }

    fn forward(&self, frame: Frame) {
        let sequence = frame.sequence();
        if !self.session.try_claim(sequence) {
            self.shared.discard(sequence, DropReason::ConsumerBusy);
            return;
        }

        let pending = PendingFrame {
            frame,
            session: Arc::clone(&self.session),
            shared: Arc::clone(&self.shared),
            settled: false,
        };
        self.delivery.dispatch(Box::new(move || pending.deliver()));
    }
}

/// Capture adapter: one device, one acquisition worker, one callback.
///
/// The device is held from `open` until `stop` and reacquired by the next
/// `start`, so other clients can use it while the source is stopped.
pub struct FrameSource {
    catalog: SharedCatalog,
    config: CaptureConfig,
    info: DeviceInfo,
    format: StreamFormat,
    device: Option<Box<dyn CaptureDevice>>,
    delivery: Arc<dyn DeliveryContext>,
    shared: Arc<Shared>,
    session: Option<Arc<Session>>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<Box<dyn CaptureDevice>>>,
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("config", &self.config)
            .field("info", &self.info)
            .field("format", &self.format)
            .field("acquired", &self.device.is_some())
            .field("running", &self.is_running())
            .finish()
    }
}

impl FrameSource {
    /// Select, acquire and configure a device.
    ///
    /// # Errors
    ///
    /// - `DeviceNotFound` if no device in `catalog` matches the selector
    /// - `DeviceBusy` if the matching device cannot be acquired
    /// - `ConfigurationUnsupported` if the preset or frame rate is rejected
    pub fn open<D>(catalog: SharedCatalog, config: CaptureConfig, delivery: D) -> Result<Self, CaptureError>
    where
        D: DeliveryContext + 'static,
    {
        let devices = catalog.devices();
        let info = select_device(&devices, config.device())
            .cloned()
            .ok_or_else(|| {
                CaptureError::DeviceNotFound(format!(
                    "no device matches {:?} ({} available)",
                    config.device(),
                    devices.len()
                ))
            })?;

        let mut device = catalog.acquire(&info)?;
        let format = device.configure(&config)?;
        log::info!(
            "opened {} ({}) at {} {:?} {:.1} fps",
            info.id,
            info.name,
            format.size,
            format.format,
            format.frame_rate
        );

        Ok(Self {
            catalog,
            config,
            info,
            format,
            device: Some(device),
            delivery: Arc::new(delivery),
            shared: Arc::new(Shared::default()),
            session: None,
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    // acquire the device again after a stop released it
    fn reacquire(&mut self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let mut device = self.catalog.acquire(&self.info)?;
        self.format = device.configure(&self.config)?;
        log::info!("reacquired {}", self.info.id);
        Ok(device)
    }

    /// Start acquisition, invoking `callback` once per delivered frame.
    ///
    /// Reacquires the device if a previous `stop` released it, which fails with
    /// `DeviceBusy` when another client holds it meanwhile. The device starts
    /// streaming on the worker thread; its outcome is known before this
    /// returns. A worker that stopped on its own (too many capture failures)
    /// is reaped and restarted.
    pub fn start<F>(&mut self, callback: F) -> Result<(), CaptureError>
    where
        F: FnMut(&Frame) + Send + 'static,
    {
        if self.session.is_some() {
            if self.is_running() {
                return Err(CaptureError::AlreadyRunning);
            }
            self.stop();
        }

        let device = match self.device.take() {
            Some(device) => device,
            None => self.reacquire()?,
        };

        let session = Arc::new(Session::new(Box::new(callback)));
        let cancel = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            device,
            session: Arc::clone(&session),
            delivery: Arc::clone(&self.delivery),
            shared: Arc::clone(&self.shared),
            cancel: Arc::clone(&cancel),
            max_consecutive_failures: self.config.max_consecutive_failures(),
        };

        let (init_tx, init_rx) = mpsc::sync_channel(1);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run(init_tx))
            .map_err(|e| CaptureError::Worker(e.to_string()))?;

        match init_rx.recv() {
            Ok(Ok(())) => {
                self.session = Some(session);
                self.cancel = cancel;
                self.worker = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                // worker returns the device right after reporting
                match handle.join() {
                    Ok(device) => self.device = Some(device),
                    Err(_) => log::error!("capture worker panicked during start"),
                }
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::Worker(
                    "capture worker died during start".to_string(),
                ))
            }
        }
    }

    /// Stop acquisition and release the device.
    ///
    /// Blocks until the worker has exited and any running callback has returned.
    /// No callback is invoked after this returns, and a frame still waiting in
    /// the delivery context is counted as dropped. Releases the device even if
    /// the source was never started. Idempotent.
    pub fn stop(&mut self) {
        let mut released = self.device.take().is_some();

        if let Some(session) = self.session.take() {
            self.cancel.store(true, Ordering::Release);
            if let Some(worker) = self.worker.take() {
                match worker.join() {
                    Ok(device) => {
                        drop(device);
                        released = true;
                    }
                    Err(_) => log::error!("capture worker panicked"),
                }
            }
            session.disarm(&self.shared);

            let stats = self.stats();
            log::info!(
                "capture stopped: {} captured, {} delivered, {} dropped, {} failures",
                stats.captured,
                stats.delivered,
                stats.dropped,
                stats.acquisition_failures
            );
        }

        if released {
            log::info!("released {}", self.info.id);
        }
    }

    /// Register a listener for dropped frames, replacing any previous one.
    ///
    /// The handler runs on the acquisition worker for busy and failed frames,
    /// and on the delivery context or the caller of `stop` for discarded ones.
    /// It should return quickly.
    pub fn set_drop_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&DropEvent) + Send + 'static,
    {
        let mut slot = self.shared.drop_handler.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Box::new(handler));
    }

    pub fn clear_drop_handler(&mut self) {
        let mut slot = self.shared.drop_handler.lock().unwrap_or_else(|e| e.into_inner());
        slot.take();
    }

    /// True while a session is active and its worker is still acquiring.
    pub fn is_running(&self) -> bool {
        self.session.is_some()
            && self
                .worker
                .as_ref()
                .is_some_and(|worker| !worker.is_finished())
    }

    /// True while the source holds its device.
    pub fn is_acquired(&self) -> bool {
        self.device.is_some() || self.worker.is_some()
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.counters.snapshot()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}
