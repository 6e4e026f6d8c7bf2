pub mod log_file;
pub mod logging;
pub mod paths;
