pub mod logging;

pub use logging::{
    FileLogger, LOG_ENV_VAR, StdoutLogger, init_file_logger, init_stdout_logger, level_from_env,
};

// Re-export log crate so downstream crates can use camtap_base::log::*
pub use log;
