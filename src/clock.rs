//! ==============================================================================
//! clock.rs - wall clock in the dashboard's display zone
//! ==============================================================================
//!
//! readings are stamped with the local time of a single configured zone
//! (default UTC+05:30). the stamp is kept twice: as display text and as unix
//! milliseconds for ordering.
//!
//! ==============================================================================

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

/// format of the `date` column and of `/get_data` dates
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// format of dates in push events
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// a moment captured for a new reading
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stamp {
    pub display: String,
    pub epoch_ms: i64,
}

#[derive(Clone, Copy, Debug)]
pub struct Clock {
    offset: FixedOffset,
}

impl Clock {
    /// Build a clock for a fixed UTC offset in minutes.
    ///
    /// Offsets outside +/-24h fall back to UTC.
    pub fn with_offset_minutes(minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| {
            tracing::warn!(minutes, "utc offset out of range, using UTC");
            Utc.fix()
        });
        Self { offset }
    }

    pub fn now(&self) -> Stamp {
        self.stamp(Utc::now())
    }

    pub fn stamp(&self, at: DateTime<Utc>) -> Stamp {
        let local = at.with_timezone(&self.offset);
        Stamp {
            display: local.format(DISPLAY_FORMAT).to_string(),
            epoch_ms: at.timestamp_millis(),
        }
    }

    /// Unix milliseconds of a naive local time in this clock's zone.
    pub fn local_to_epoch_ms(&self, local: NaiveDateTime) -> i64 {
        // a fixed offset never yields an ambiguous or missing local time
        self.offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|| local.and_utc().timestamp_millis())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::with_offset_minutes(330)
    }
}

/// Reformat a stored display stamp as ISO-8601.
pub fn display_to_iso(display: &str) -> Result<String, chrono::ParseError> {
    let parsed = NaiveDateTime::parse_from_str(display, DISPLAY_FORMAT)?;
    Ok(parsed.format(ISO_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn stamps_in_configured_zone() {
        let clock = Clock::with_offset_minutes(330);
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 5).unwrap();
        let stamp = clock.stamp(at);
        assert_eq!(stamp.display, "02/03/2024 01:30:05");
        assert_eq!(stamp.epoch_ms, at.timestamp_millis());
    }

    #[test]
    fn local_bounds_round_trip_through_offset() {
        let clock = Clock::with_offset_minutes(330);
        let local = NaiveDate::from_ymd_opt(2024, 3, 2)
            .unwrap()
            .and_hms_opt(1, 30, 5)
            .unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 5).unwrap();
        assert_eq!(clock.local_to_epoch_ms(local), expected.timestamp_millis());
    }

    #[test]
    fn out_of_range_offset_is_utc() {
        let clock = Clock::with_offset_minutes(100_000);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(clock.stamp(at).display, "01/01/2024 00:00:00");
    }

    #[test]
    fn display_converts_to_iso() {
        assert_eq!(
            display_to_iso("31/12/2023 23:59:58").unwrap(),
            "2023-12-31T23:59:58"
        );
        assert!(display_to_iso("2023-12-31").is_err());
    }
}
