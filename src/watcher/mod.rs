mod controller;
mod loop_worker;
mod oracle;
mod stability;

pub use controller::WatchController;
pub use loop_worker::watch_loop;
pub use oracle::{DirectoryOracle, SizeOracle};
pub use stability::{PendingFile, StabilityTracker};
