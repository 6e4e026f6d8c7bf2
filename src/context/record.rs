use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Local-time stamp written by the capturer.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomContext {
    pub room_name: String,
    pub captured_at: DateTime<Utc>,
}

/// Why a context record could not be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not valid UTF-8")]
    NotUtf8,
    #[error("no separator in {0:?}")]
    MissingSeparator(String),
    #[error("empty room name")]
    EmptyRoom,
    #[error("{0} does not exist in local time")]
    NonexistentLocalTime(String),
    #[error("bad timestamp {0:?}")]
    BadTimestamp(String),
}

/// Decodes raw file contents, then parses them like [`parse_record`].
pub fn parse_record_bytes(bytes: Vec<u8>) -> Result<RoomContext, RecordError> {
    let text = String::from_utf8(bytes).map_err(|_| RecordError::NotUtf8)?;
    parse_record(&text)
}

/// Parses `<room>|<timestamp>`. Anything else, including a record cut short
/// by a concurrent rewrite, is an error.
pub fn parse_record(raw: &str) -> Result<RoomContext, RecordError> {
    let line = raw.trim_matches(|c: char| c == '\u{feff}' || c.is_whitespace());
    let (room, stamp) = line
        .rsplit_once('|')
        .ok_or_else(|| RecordError::MissingSeparator(line.to_string()))?;

    let room_name = room.trim();
    if room_name.is_empty() {
        return Err(RecordError::EmptyRoom);
    }

    Ok(RoomContext {
        room_name: room_name.to_string(),
        captured_at: parse_timestamp(stamp.trim())?,
    })
}

fn parse_timestamp(stamp: &str) -> Result<DateTime<Utc>, RecordError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT) {
        return Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| RecordError::NonexistentLocalTime(stamp.to_string()));
    }
    DateTime::parse_from_rfc3339(stamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RecordError::BadTimestamp(stamp.to_string()))
}
