pub mod synthetic;

#[cfg(feature = "v4l2")]
pub mod v4l2;
