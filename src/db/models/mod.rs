pub mod daily_stat;
pub mod move_record;

pub use daily_stat::DailyStat;
pub use move_record::{HistoryFilter, MoveOutcome, MoveRecord};
