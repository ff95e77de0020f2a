use camtap::{CameraPosition, CaptureConfig, DeviceSelector, FrameSize, ResolutionPreset};

#[test]
fn test_config_defaults() {
    let config = CaptureConfig::default();

    assert_eq!(config.device(), &DeviceSelector::Default);
    assert_eq!(config.preset(), ResolutionPreset::Hd1280x720);
    assert_eq!(config.frame_rate(), None);
    assert_eq!(config.max_consecutive_failures(), 10);
}

#[test]
fn test_config_builder() {
    let config = CaptureConfig::default()
        .with_position(CameraPosition::Front)
        .with_preset(ResolutionPreset::Vga640x480)
        .with_frame_rate(15.0)
        .with_max_consecutive_failures(2);

    assert_eq!(config.device(), &DeviceSelector::Position(CameraPosition::Front));
    assert_eq!(config.preset().size(), FrameSize::new(640, 480));
    assert_eq!(config.frame_rate(), Some(15.0));
    assert_eq!(config.max_consecutive_failures(), 2);
}

#[test]
fn test_zero_failure_limit_is_clamped() {
    let config = CaptureConfig::default().with_max_consecutive_failures(0);
    assert_eq!(config.max_consecutive_failures(), 1);
}

#[test]
fn test_preset_sizes() {
    assert_eq!(ResolutionPreset::Hd1280x720.size(), FrameSize::new(1280, 720));
    assert_eq!(ResolutionPreset::FullHd1920x1080.size(), FrameSize::new(1920, 1080));
    assert_eq!(
        ResolutionPreset::Custom(FrameSize::new(320, 240)).size(),
        FrameSize::new(320, 240)
    );
}
