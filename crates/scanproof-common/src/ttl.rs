//! Time-to-live evaluation for verification payloads.
//!
//! A payload carries its generation timestamp and a TTL in minutes. A missing
//! or unparseable timestamp, or a missing or non-positive TTL, makes the
//! verdict indeterminate; it is never guessed as valid or expired.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::status::Language;

/// Outcome of a TTL check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlVerdict {
    /// Missing or unparseable inputs
    Indeterminate,
    Valid {
        remaining_seconds: i64,
        expires_at: DateTime<Utc>,
    },
    Expired {
        expires_at: DateTime<Utc>,
    },
}

impl TtlVerdict {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    /// Seconds left, rounded up; 0 once expired, `None` when indeterminate
    pub fn remaining_seconds(&self) -> Option<i64> {
        match self {
            Self::Indeterminate => None,
            Self::Valid {
                remaining_seconds, ..
            } => Some(*remaining_seconds),
            Self::Expired { .. } => Some(0),
        }
    }

    pub fn state(&self) -> &'static str {
        match self {
            Self::Indeterminate => "indeterminate",
            Self::Valid { .. } => "valid",
            Self::Expired { .. } => "expired",
        }
    }

    /// Human-readable remaining time
    pub fn display(&self, lang: Language) -> String {
        match (self, lang) {
            (Self::Indeterminate, _) => "-".to_string(),
            (Self::Expired { .. }, Language::En) => "Expired".to_string(),
            (Self::Expired { .. }, Language::Th) => "หมดอายุแล้ว".to_string(),
            (
                Self::Valid {
                    remaining_seconds, ..
                },
                lang,
            ) => {
                let minutes = remaining_seconds / 60;
                let seconds = remaining_seconds % 60;
                match lang {
                    Language::En => format!("{minutes} min {seconds} sec"),
                    Language::Th => format!("{minutes} นาที {seconds} วินาที"),
                }
            }
        }
    }

    /// Serializable summary for view models
    pub fn summary(&self, lang: Language) -> TtlSummary {
        TtlSummary {
            state: self.state(),
            remaining_seconds: self.remaining_seconds(),
            display: self.display(lang),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlSummary {
    pub state: &'static str,
    pub remaining_seconds: Option<i64>,
    pub display: String,
}

/// Decide whether a payload generated at `generated_at` is still valid at `now`
///
/// Expired once `now` reaches the expiry instant.
pub fn evaluate(
    generated_at: Option<&str>,
    ttl_minutes: Option<i64>,
    now: DateTime<Utc>,
) -> TtlVerdict {
    let (Some(raw), Some(ttl)) = (generated_at, ttl_minutes) else {
        return TtlVerdict::Indeterminate;
    };
    if ttl <= 0 {
        return TtlVerdict::Indeterminate;
    }
    let Some(created) = parse_timestamp(raw) else {
        return TtlVerdict::Indeterminate;
    };
    let Some(expires_at) = chrono::Duration::try_minutes(ttl)
        .and_then(|ttl| created.checked_add_signed(ttl))
    else {
        return TtlVerdict::Indeterminate;
    };

    if now >= expires_at {
        return TtlVerdict::Expired { expires_at };
    }

    // Round a partial second up so a valid verdict never shows zero
    let remaining_ms = (expires_at - now).num_milliseconds();
    TtlVerdict::Valid {
        remaining_seconds: (remaining_ms + 999) / 1000,
        expires_at,
    }
}

/// Parse RFC 3339 or an offset-less ISO-8601 timestamp (taken as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Read a TTL given as a number or a numeric string
pub fn ttl_minutes_from(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_valid_with_remaining_time() {
        let verdict = evaluate(Some("2024-05-01T10:00:00Z"), Some(60), at(10, 30, 0));
        assert_eq!(verdict.remaining_seconds(), Some(1800));
        assert!(!verdict.is_expired());
        assert_eq!(verdict.display(Language::En), "30 min 0 sec");
        assert_eq!(verdict.display(Language::Th), "30 นาที 0 วินาที");
    }

    #[test]
    fn test_expired() {
        let verdict = evaluate(Some("2024-05-01T10:00:00Z"), Some(60), at(12, 0, 0));
        assert!(verdict.is_expired());
        assert_eq!(verdict.remaining_seconds(), Some(0));
        assert_eq!(verdict.display(Language::En), "Expired");
        assert_eq!(verdict.state(), "expired");
    }

    #[test]
    fn test_exact_expiry_is_expired() {
        let verdict = evaluate(Some("2024-05-01T10:00:00Z"), Some(60), at(11, 0, 0));
        assert!(verdict.is_expired());
    }

    #[test]
    fn test_last_partial_second_is_still_valid() {
        let now = at(10, 59, 59) + chrono::Duration::milliseconds(500);
        let verdict = evaluate(Some("2024-05-01T10:00:00Z"), Some(60), now);
        assert!(!verdict.is_expired());
        assert_eq!(verdict.remaining_seconds(), Some(1));
        assert_eq!(verdict.display(Language::En), "0 min 1 sec");

        let now = at(10, 59, 59) + chrono::Duration::milliseconds(999);
        let verdict = evaluate(Some("2024-05-01T10:00:00Z"), Some(60), now);
        assert_eq!(verdict.state(), "valid");
        assert_eq!(verdict.remaining_seconds(), Some(1));
    }

    #[test]
    fn test_missing_inputs_are_indeterminate() {
        assert_eq!(evaluate(None, Some(60), at(10, 0, 0)), TtlVerdict::Indeterminate);
        assert_eq!(
            evaluate(Some("2024-05-01T10:00:00Z"), None, at(10, 0, 0)),
            TtlVerdict::Indeterminate
        );
        assert_eq!(
            evaluate(Some("not a date"), Some(60), at(10, 0, 0)),
            TtlVerdict::Indeterminate
        );
        assert_eq!(
            evaluate(Some("2024-05-01T10:00:00Z"), Some(0), at(10, 0, 0)),
            TtlVerdict::Indeterminate
        );
        assert_eq!(
            evaluate(Some("2024-05-01T10:00:00Z"), Some(-5), at(10, 0, 0)),
            TtlVerdict::Indeterminate
        );
        assert_eq!(TtlVerdict::Indeterminate.display(Language::En), "-");
    }

    #[test]
    fn test_offsetless_timestamps_are_utc() {
        let expected = at(10, 0, 0);
        assert_eq!(parse_timestamp("2024-05-01T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T10:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T17:00:00+07:00"), Some(expected));
    }

    #[test]
    fn test_ttl_minutes_forms() {
        assert_eq!(ttl_minutes_from(&json!(15)), Some(15));
        assert_eq!(ttl_minutes_from(&json!("15")), Some(15));
        assert_eq!(ttl_minutes_from(&json!(" 20 ")), Some(20));
        assert_eq!(ttl_minutes_from(&json!("abc")), None);
        assert_eq!(ttl_minutes_from(&json!(null)), None);
    }
}
