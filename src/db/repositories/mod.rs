mod daily_stats;
mod move_records;
