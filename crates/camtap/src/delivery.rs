//! Execution contexts that frame callbacks run on.
//!
//! The acquisition worker never calls the consumer directly; it hands a job to
//! a `DeliveryContext`. Contexts only need to run each job once. Ordering is
//! kept by the source, which never has more than one job outstanding.

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::mpsc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait DeliveryContext: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs the callback directly on the acquisition worker.
///
/// A slow callback then slows acquisition itself instead of causing drops.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDelivery;

impl DeliveryContext for InlineDelivery {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// A job queue drained by the thread that owns it, typically the main/UI thread.
pub struct MainQueue {
    sender: mpsc::Sender<Job>,
    receiver: mpsc::Receiver<Job>,
}

/// Sending half of a `MainQueue`, passed to `FrameSource::open`.
#[derive(Clone)]
pub struct MainQueueHandle {
    sender: mpsc::Sender<Job>,
}

impl Default for MainQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MainQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    pub fn handle(&self) -> MainQueueHandle {
        MainQueueHandle {
            sender: self.sender.clone(),
        }
    }

    /// Run every job queued so far without blocking. Returns the number run.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            count += 1;
        }
        count
    }

    /// Run jobs as they arrive until `timeout` has elapsed. Returns the number run.
    pub fn run_for(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut count = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(job) => {
                    job();
                    count += 1;
                }
                Err(_) => break,
            }
        }
        count
    }
}

impl DeliveryContext for MainQueueHandle {
    fn dispatch(&self, job: Job) {
        // receiver gone means the owning thread is shutting down
        if self.sender.send(job).is_err() {
            log::debug!("main queue closed, discarding frame delivery");
        }
    }
}

/// A dedicated consumer thread.
///
/// A panicking job is logged and the thread keeps serving later jobs.
pub struct ThreadDelivery {
    sender: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadDelivery {
    pub fn new(name: &str) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        log::error!("frame delivery panicked");
                    }
                }
            })?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }
}

impl DeliveryContext for ThreadDelivery {
    fn dispatch(&self, job: Job) {
        if let Some(sender) = &self.sender {
            if sender.send(job).is_err() {
                log::warn!("delivery thread exited, discarding frame delivery");
            }
        }
    }
}

impl Drop for ThreadDelivery {
    fn drop(&mut self) {
        // closing the channel lets the thread drain and exit
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("delivery thread panicked");
            }
        }
    }
}

/// Runs callbacks on a tokio runtime's blocking pool.
#[derive(Clone)]
pub struct TokioDelivery {
    handle: tokio::runtime::Handle,
}

impl TokioDelivery {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on, if any.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl DeliveryContext for TokioDelivery {
    fn dispatch(&self, job: Job) {
        drop(self.handle.spawn_blocking(job));
    }
}
