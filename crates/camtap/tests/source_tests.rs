mod common;

use camtap::*;
use common::{MockCatalog, wait_until};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

const FAST: Duration = Duration::from_millis(1);
const WAIT: Duration = Duration::from_secs(5);

fn recorder() -> (Arc<Mutex<Vec<u64>>>, impl FnMut(&Frame) + Send + 'static) {
    let sequences = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sequences);
    (sequences, move |frame: &Frame| {
        sink.lock().unwrap().push(frame.sequence())
    })
}

#[test]
fn test_open_unknown_device_is_not_found() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let config = CaptureConfig::default().with_device(DeviceSelector::Id("mock:7".to_string()));

    match FrameSource::open(catalog.clone(), config, InlineDelivery) {
        Err(CaptureError::DeviceNotFound(msg)) => assert!(msg.contains("mock:7")),
        other => panic!("Expected DeviceNotFound, got {:?}", other),
    }
}

#[test]
fn test_open_missing_position_is_not_found() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let config = CaptureConfig::default().with_position(CameraPosition::Front);

    let result = FrameSource::open(catalog.clone(), config, InlineDelivery);
    assert!(matches!(result, Err(CaptureError::DeviceNotFound(_))));
}

#[test]
fn test_open_unsupported_preset() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let config = CaptureConfig::default().with_preset(ResolutionPreset::FullHd1920x1080);

    let result = FrameSource::open(catalog.clone(), config, InlineDelivery);
    assert!(matches!(
        result,
        Err(CaptureError::ConfigurationUnsupported(_))
    ));
}

#[test]
fn test_open_reports_negotiated_format() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let source = FrameSource::open(catalog.clone(), CaptureConfig::default(), InlineDelivery).unwrap();

    assert_eq!(source.device_info().id, "mock:0");
    assert_eq!(source.format().size, FrameSize::new(1280, 720));
    assert!(!source.is_running());
}

#[test]
fn test_start_twice_is_already_running() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let mut source = FrameSource::open(catalog.clone(), CaptureConfig::default(), InlineDelivery).unwrap();

    source.start(|_| {}).unwrap();
    assert_eq!(source.start(|_| {}), Err(CaptureError::AlreadyRunning));
    assert!(source.is_running());

    source.stop();
    assert!(!source.is_running());
}

#[test]
fn test_inline_delivery_accounts_for_every_frame() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let mut source = FrameSource::open(catalog.clone(), CaptureConfig::default(), InlineDelivery).unwrap();
    let (sequences, callback) = recorder();

    source.start(callback).unwrap();
    assert!(wait_until(WAIT, || sequences.lock().unwrap().len() >= 20));
    source.stop();

    let stats = source.stats();
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.delivered + stats.dropped, stats.captured);
    assert_eq!(stats.delivered, stats.captured);
    assert_eq!(sequences.lock().unwrap().len() as u64, stats.delivered);
}

#[test]
fn test_no_callbacks_after_stop() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let delivery = ThreadDelivery::new("consumer").unwrap();
    let mut source = FrameSource::open(catalog.clone(), CaptureConfig::default(), delivery).unwrap();

    let stopped = Arc::new(AtomicBool::new(false));
    let late_calls = Arc::new(AtomicU64::new(0));
    let calls = Arc::new(AtomicU64::new(0));
    source
        .start({
            let stopped = Arc::clone(&stopped);
            let late_calls = Arc::clone(&late_calls);
            let calls = Arc::clone(&calls);
            move |_frame: &Frame| {
                if stopped.load(Ordering::SeqCst) {
                    late_calls.fetch_add(1, Ordering::SeqCst);
                }
                calls.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(2));
            }
        })
        .unwrap();

    assert!(wait_until(WAIT, || calls.load(Ordering::SeqCst) >= 10));
    source.stop();
    stopped.store(true, Ordering::SeqCst);
    let calls_at_stop = calls.load(Ordering::SeqCst);

    thread::sleep(Duration::from_millis(100));
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    assert_eq!(calls.load(Ordering::SeqCst), calls_at_stop);
    assert!(!catalog.control.streaming.load(Ordering::SeqCst));
}

#[test]
fn test_slow_consumer_drops_but_keeps_order() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let delivery = ThreadDelivery::new("slow-consumer").unwrap();
    let mut source = FrameSource::open(catalog.clone(), CaptureConfig::default(), delivery).unwrap();

    let busy_drops = Arc::new(AtomicU64::new(0));
    source.set_drop_handler({
        let busy_drops = Arc::clone(&busy_drops);
        move |event: &DropEvent| {
            if event.reason == DropReason::ConsumerBusy {
                assert!(event.sequence.is_some());
                busy_drops.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    let sequences = Arc::new(Mutex::new(Vec::new()));
    source
        .start({
            let sequences = Arc::clone(&sequences);
            move |frame: &Frame| {
                sequences.lock().unwrap().push(frame.sequence());
                thread::sleep(Duration::from_millis(10));
            }
        })
        .unwrap();

    assert!(wait_until(WAIT, || sequences.lock().unwrap().len() >= 10));
    source.stop();

    let sequences = sequences.lock().unwrap().clone();
    assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));

    let stats = source.stats();
    assert!(stats.dropped > 0);
    assert_eq!(stats.delivered, sequences.len() as u64);
    assert_eq!(stats.delivered + stats.dropped, stats.captured);
    assert!(busy_drops.load(Ordering::SeqCst) > 0);
    assert!(busy_drops.load(Ordering::SeqCst) <= stats.dropped);
}

#[test]
fn test_restart_resumes_delivery() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let mut source = FrameSource::open(catalog.clone(), CaptureConfig::default(), InlineDelivery).unwrap();

    let (first, callback) = recorder();
    source.start(callback).unwrap();
    assert!(wait_until(WAIT, || first.lock().unwrap().len() >= 5));
    source.stop();
    source.stop();

    let (second, callback) = recorder();
    source.start(callback).unwrap();
    assert!(wait_until(WAIT, || second.lock().unwrap().len() >= 5));
    source.stop();

    let last_first = *first.lock().unwrap().last().unwrap();
    let first_second = second.lock().unwrap()[0];
    assert!(first_second > last_first);
    assert_eq!(catalog.control.starts.load(Ordering::SeqCst), 2);
    assert_eq!(catalog.control.stops.load(Ordering::SeqCst), 2);
    assert_eq!(catalog.control.acquisitions.load(Ordering::SeqCst), 2);
    assert!(!catalog.control.held());
}

#[test]
fn test_stop_releases_device_and_start_reacquires() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let mut source = FrameSource::open(catalog.clone(), CaptureConfig::default(), InlineDelivery).unwrap();
    assert!(catalog.control.held());

    source.start(|_| {}).unwrap();
    source.stop();
    assert!(!catalog.control.held());
    assert!(!source.is_acquired());

    // a second source can open the released device
    let other = FrameSource::open(catalog.clone(), CaptureConfig::default(), InlineDelivery).unwrap();
    assert!(other.is_acquired());
    drop(other);

    let (sequences, callback) = recorder();
    source.start(callback).unwrap();
    assert!(source.is_acquired());
    assert!(wait_until(WAIT, || !sequences.lock().unwrap().is_empty()));
    source.stop();
    assert_eq!(catalog.control.acquisitions.load(Ordering::SeqCst), 3);
    assert!(!catalog.control.held());
}

#[test]
fn test_panicking_callback_is_counted_as_dropped() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let delivery = ThreadDelivery::new("panicky-consumer").unwrap();
    let mut source = FrameSource::open(catalog.clone(), CaptureConfig::default(), delivery).unwrap();

    let discarded = Arc::new(Mutex::new(Vec::new()));
    source.set_drop_handler({
        let discarded = Arc::clone(&discarded);
        move |event: &DropEvent| {
            if event.reason == DropReason::Discarded {
                discarded.lock().unwrap().push(event.sequence);
            }
        }
    });

    let calls = Arc::new(AtomicU64::new(0));
    let first = Arc::new(Mutex::new(None));
    source
        .start({
            let calls = Arc::clone(&calls);
            let first = Arc::clone(&first);
            move |frame: &Frame| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    *first.lock().unwrap() = Some(frame.sequence());
                    panic!("consumer failed on first frame");
                }
            }
        })
        .unwrap();

    // delivery continues after the panic instead of wedging the slot
    assert!(wait_until(WAIT, || calls.load(Ordering::SeqCst) >= 5));
    assert!(source.is_running());
    source.stop();

    let stats = source.stats();
    assert_eq!(stats.delivered, calls.load(Ordering::SeqCst) - 1);
    assert_eq!(stats.delivered + stats.dropped, stats.captured);

    let first = first.lock().unwrap().expect("first frame seen");
    assert!(discarded.lock().unwrap().contains(&Some(first)));
}

#[test]
fn test_refused_start_leaves_source_stopped() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let mut source = FrameSource::open(catalog.clone(), CaptureConfig::default(), InlineDelivery).unwrap();

    catalog.control.refuse_start.store(true, Ordering::SeqCst);
    let result = source.start(|_| {});
    assert!(matches!(result, Err(CaptureError::DeviceBusy(_))));
    assert!(!source.is_running());

    catalog.control.refuse_start.store(false, Ordering::SeqCst);
    let (sequences, callback) = recorder();
    source.start(callback).unwrap();
    assert!(wait_until(WAIT, || !sequences.lock().unwrap().is_empty()));
}

#[test]
fn test_acquisition_failures_are_reported_and_stop_worker() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let config = CaptureConfig::default().with_max_consecutive_failures(3);
    let mut source = FrameSource::open(catalog.clone(), config, InlineDelivery).unwrap();

    let failures = Arc::new(Mutex::new(Vec::new()));
    source.set_drop_handler({
        let failures = Arc::clone(&failures);
        move |event: &DropEvent| failures.lock().unwrap().push(event.clone())
    });

    catalog.control.fail_capture.store(true, Ordering::SeqCst);
    source.start(|_| panic!("no frame should be delivered")).unwrap();

    assert!(wait_until(WAIT, || !source.is_running()));
    assert!(!catalog.control.streaming.load(Ordering::SeqCst));

    let stats = source.stats();
    assert_eq!(stats.acquisition_failures, 3);
    assert_eq!(stats.captured, 0);

    let failures = failures.lock().unwrap().clone();
    assert_eq!(failures.len(), 3);
    for event in &failures {
        assert_eq!(event.sequence, None);
        assert!(matches!(&event.reason, DropReason::AcquisitionFailure(msg) if msg.contains("sensor timeout")));
    }

    // a worker that gave up can be started again without an explicit stop
    catalog.control.fail_capture.store(false, Ordering::SeqCst);
    let (sequences, callback) = recorder();
    source.start(callback).unwrap();
    assert!(wait_until(WAIT, || !sequences.lock().unwrap().is_empty()));
}

#[test]
fn test_drop_stops_streaming() {
    let catalog = Arc::new(MockCatalog::new(FAST));
    let mut source = FrameSource::open(catalog.clone(), CaptureConfig::default(), InlineDelivery).unwrap();
    source.start(|_| {}).unwrap();
    assert!(catalog.control.streaming.load(Ordering::SeqCst));

    drop(source);
    assert!(!catalog.control.streaming.load(Ordering::SeqCst));
}
