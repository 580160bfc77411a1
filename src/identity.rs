use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{CREATION_DATE_FIELD, Document, ID_FIELD, UPDATE_DATE_FIELD};

/// Source of "now" for audit timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Gives `document` a fresh id and sets both audit dates to `timestamp`.
pub fn stamp_new(document: &mut Document, timestamp: &str) -> String {
    let id = new_id();
    document.insert(ID_FIELD.to_string(), json!(id));
    document.insert(CREATION_DATE_FIELD.to_string(), json!(timestamp));
    document.insert(UPDATE_DATE_FIELD.to_string(), json!(timestamp));
    id
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn timestamps_are_utc_rfc3339() {
        let instant = Utc.with_ymd_and_hms(2022, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format_timestamp(instant), "2022-03-01T12:30:00.000000Z");
    }

    #[test]
    fn stamp_sets_matching_dates() {
        let mut document = Document::new();
        let id = stamp_new(&mut document, "2022-03-01T12:30:00.000000Z");
        assert_eq!(document[ID_FIELD], id);
        assert_eq!(document[CREATION_DATE_FIELD], document[UPDATE_DATE_FIELD]);
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
