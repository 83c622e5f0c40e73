//! Field conversion grammars
//!
//! Pure functions turning the free-text columns of an export row into the
//! typed fields of `RmsCdr`. Nothing here logs; failures come back as
//! `ConversionError` and the parser decides what they mean for the file.

use crate::constants::{MIN_COLUMNS, TIMESTAMP_FORMAT, TIMESTAMP_MIN_LEN};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use rms_core::models::{RmsCdr, FILE_NAME_MAX_LEN};
use rms_core::ConversionError;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

static DURATION_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s*(hour|hr|h|minute|min|m|second|sec|s)")
        .expect("duration pattern is a valid regex")
});

/// The twelve export columns of one row, by name
#[derive(Debug, Clone, Copy)]
pub struct RawRow<'a> {
    pub direction: &'a str,
    pub timestamp: &'a str,
    pub flagged: &'a str,
    pub source: &'a str,
    pub destination: &'a str,
    pub duration: &'a str,
    pub size: &'a str,
    pub exists: &'a str,
    pub local_copy: &'a str,
    pub authentic: &'a str,
    pub sip_call_id: &'a str,
    pub file_name: &'a str,
}

impl<'a> RawRow<'a> {
    /// Map positional fields; `None` when the row is too short
    ///
    /// Columns past the twelfth are ignored.
    pub fn from_fields(fields: &[&'a str]) -> Option<Self> {
        if fields.len() < MIN_COLUMNS {
            return None;
        }

        Some(Self {
            direction: fields[0],
            timestamp: fields[1],
            flagged: fields[2],
            source: fields[3],
            destination: fields[4],
            duration: fields[5],
            size: fields[6],
            exists: fields[7],
            local_copy: fields[8],
            authentic: fields[9],
            sip_call_id: fields[10],
            file_name: fields[11],
        })
    }
}

/// Converts raw rows into normalized records for one time zone
#[derive(Debug, Clone)]
pub struct CdrNormalizer {
    zone: Tz,
}

impl CdrNormalizer {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    /// Build a record from one row, assigning a fresh uid
    pub fn normalize(&self, row: &RawRow<'_>) -> Result<RmsCdr, ConversionError> {
        let occurred_at = self.parse_timestamp(row.timestamp)?;
        let talk_duration = parse_duration(row.duration)?;
        let size_bytes = parse_size(row.size)?;

        Ok(RmsCdr {
            id: None,
            uid: Uuid::new_v4().to_string(),
            direction: row.direction.to_string(),
            occurred_at,
            flagged: parse_flag(row.flagged),
            source: row.source.to_string(),
            destination: row.destination.to_string(),
            talk_duration,
            size_bytes,
            exists_in_store: parse_flag(row.exists),
            local_copy: parse_flag(row.local_copy),
            authentic: row.authentic.to_string(),
            sip_call_id: row.sip_call_id.to_string(),
            file_name: bound_file_name(row.file_name),
        })
    }

    /// Parse `YYYY-MM-DD HH:MM:SS` as civil time in the configured zone
    pub fn parse_timestamp(&self, text: &str) -> Result<DateTime<FixedOffset>, ConversionError> {
        let trimmed = text.trim();
        if trimmed.chars().count() < TIMESTAMP_MIN_LEN {
            return Err(ConversionError::new(
                "timestamp",
                text,
                format!("shorter than {} characters", TIMESTAMP_MIN_LEN),
            ));
        }

        let naive = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
            .map_err(|e| ConversionError::new("timestamp", text, e.to_string()))?;

        // A gap at a DST switch has no instant; a fold takes the first one
        let local = self
            .zone
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| {
                ConversionError::new(
                    "timestamp",
                    text,
                    format!("does not exist in {}", self.zone.name()),
                )
            })?;

        Ok(local.fixed_offset())
    }
}

/// Two-state flag: exactly `No` is false, anything else is true
#[inline]
pub fn parse_flag(text: &str) -> bool {
    text != "No"
}

/// Total seconds of a phrase such as `1 hour 34 min 22 sec`
///
/// Text without unit tokens contributes nothing; only a number too large
/// to represent is an error.
pub fn parse_duration(text: &str) -> Result<i64, ConversionError> {
    let lowered = text.to_lowercase();
    let mut total: i64 = 0;

    for caps in DURATION_TOKEN.captures_iter(&lowered) {
        let value: i64 = caps[1]
            .parse()
            .map_err(|e| ConversionError::new("duration", text, format!("invalid number: {}", e)))?;

        let unit_seconds = match &caps[2] {
            "hour" | "hr" | "h" => 3600,
            "minute" | "min" | "m" => 60,
            _ => 1,
        };

        total = value
            .checked_mul(unit_seconds)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| ConversionError::new("duration", text, "value out of range"))?;
    }

    Ok(total)
}

/// Leading number of a `<number> <unit>` string; the unit is discarded
///
/// The number ends at the first space. Leading blanks or other separators
/// leave no valid number.
pub fn parse_size(text: &str) -> Result<Decimal, ConversionError> {
    let token = text.split(' ').next().unwrap_or_default();
    if token.is_empty() {
        return Err(ConversionError::new("size", text, "missing number"));
    }

    Decimal::from_str(token)
        .or_else(|_| Decimal::from_scientific(token))
        .map_err(|e| ConversionError::new("size", text, e.to_string()))
}

/// Cut a recording name down to the persisted column width
pub fn bound_file_name(text: &str) -> String {
    text.chars().take(FILE_NAME_MAX_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn normalizer() -> CdrNormalizer {
        CdrNormalizer::new(chrono_tz::Africa::Johannesburg)
    }

    fn fields() -> Vec<&'static str> {
        vec![
            "Outgoing",
            "2023-08-22 08:09:30",
            "No",
            "2001",
            "0215550100",
            "2 min 50 sec",
            "1.25 MB",
            "Yes",
            "No",
            "Yes",
            "a84b4c76e66710@pbx",
            "rec_2001_20230822080930.wav",
        ]
    }

    #[test]
    fn test_raw_row_requires_twelve_columns() {
        let all = fields();
        assert!(RawRow::from_fields(&all).is_some());
        assert!(RawRow::from_fields(&all[..11]).is_none());
    }

    #[test]
    fn test_normalize_row() {
        let all = fields();
        let row = RawRow::from_fields(&all).unwrap();
        let cdr = normalizer().normalize(&row).unwrap();

        assert_eq!(cdr.direction, "Outgoing");
        assert!(!cdr.flagged);
        assert_eq!(cdr.talk_duration, 170);
        assert_eq!(cdr.size_bytes, dec!(1.25));
        assert!(cdr.exists_in_store);
        assert!(!cdr.local_copy);
        assert_eq!(cdr.sip_call_id, "a84b4c76e66710@pbx");
        assert_eq!(cdr.uid.len(), 36);
        assert!(cdr.id.is_none());
    }

    #[test]
    fn test_fresh_uid_per_normalize() {
        let all = fields();
        let row = RawRow::from_fields(&all).unwrap();
        let a = normalizer().normalize(&row).unwrap();
        let b = normalizer().normalize(&row).unwrap();
        assert_ne!(a.uid, b.uid);
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn test_timestamp_in_zone() {
        let ts = normalizer().parse_timestamp("2023-08-22 08:09:30").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 2 * 3600);
        assert_eq!(ts.timestamp(), 1_692_684_570);
    }

    #[test]
    fn test_timestamp_short_rejected() {
        let err = normalizer().parse_timestamp("2023-08-22 08:09").unwrap_err();
        assert_eq!(err.field, "timestamp");
        assert!(err.reason.contains("shorter"));
    }

    #[test]
    fn test_timestamp_garbage_rejected() {
        assert!(normalizer().parse_timestamp("22/08/2023 08:09:30 PM").is_err());
        assert!(normalizer().parse_timestamp("2023-13-22 08:09:30").is_err());
    }

    #[test]
    fn test_timestamp_dst_gap() {
        let normalizer = CdrNormalizer::new(chrono_tz::Europe::Berlin);
        assert!(normalizer.parse_timestamp("2023-03-26 02:30:00").is_err());
        assert!(normalizer.parse_timestamp("2023-10-29 02:30:00").is_ok());
    }

    #[test]
    fn test_flags() {
        assert!(!parse_flag("No"));
        assert!(parse_flag("Yes"));
        assert!(parse_flag("no"));
        assert!(parse_flag(""));
        assert!(parse_flag(" No"));
    }

    #[test]
    fn test_duration_phrase() {
        assert_eq!(parse_duration("1 hour 34 min 22 sec").unwrap(), 5662);
        assert_eq!(parse_duration("2 min 50 sec").unwrap(), 170);
        assert_eq!(parse_duration("3h 5m 1s").unwrap(), 3 * 3600 + 5 * 60 + 1);
        assert_eq!(parse_duration("1 HR 2 Minute 3 Second").unwrap(), 3723);
        assert_eq!(parse_duration("45 sec").unwrap(), 45);
    }

    #[test]
    fn test_duration_without_units_is_zero() {
        assert_eq!(parse_duration("").unwrap(), 0);
        assert_eq!(parse_duration("unknown").unwrap(), 0);
        assert_eq!(parse_duration("42").unwrap(), 0);
    }

    #[test]
    fn test_duration_overflow() {
        let err = parse_duration("99999999999999999999 hours").unwrap_err();
        assert_eq!(err.field, "duration");
    }

    #[test]
    fn test_size() {
        assert_eq!(parse_size("1.25 MB").unwrap(), dec!(1.25));
        assert_eq!(parse_size("512 KB").unwrap(), dec!(512));
        assert_eq!(parse_size("300").unwrap(), dec!(300));
        assert_eq!(parse_size("1e3 B").unwrap(), dec!(1000));
        assert!(parse_size("").is_err());
        assert!(parse_size("big MB").is_err());
    }

    #[test]
    fn test_size_token_ends_at_first_space() {
        assert_eq!(parse_size("12 MB extra").unwrap(), dec!(12));
        assert!(parse_size(" 12 MB").is_err());
        assert!(parse_size("12\tMB").is_err());
    }

    #[test]
    fn test_bound_file_name() {
        let long = "x".repeat(150);
        assert_eq!(bound_file_name(&long).chars().count(), FILE_NAME_MAX_LEN);
        assert_eq!(bound_file_name("short.wav"), "short.wav");
    }

    proptest! {
        #[test]
        fn prop_duration_sums_units(h in 0i64..1000, m in 0i64..1000, s in 0i64..1000) {
            let phrase = format!("{} hour {} min {} sec", h, m, s);
            prop_assert_eq!(parse_duration(&phrase).unwrap(), h * 3600 + m * 60 + s);
        }

        #[test]
        fn prop_duration_ignores_text_without_digits(text in "[a-zA-Z ,.:-]{0,40}") {
            prop_assert_eq!(parse_duration(&text).unwrap(), 0);
        }

        #[test]
        fn prop_flag_false_only_for_no(text in ".{0,8}") {
            prop_assert_eq!(parse_flag(&text), text != "No");
        }

        #[test]
        fn prop_unix_timestamp_matches(secs in 946_684_800i64..4_102_444_800i64) {
            let utc = chrono::DateTime::from_timestamp(secs, 0).unwrap();
            let local = utc.with_timezone(&chrono_tz::Africa::Johannesburg);
            let text = local.format("%Y-%m-%d %H:%M:%S").to_string();
            let parsed = normalizer().parse_timestamp(&text).unwrap();
            prop_assert_eq!(parsed.timestamp(), secs);
        }
    }
}
