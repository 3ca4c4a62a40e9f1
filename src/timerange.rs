use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::error::ValidationError;
use crate::model::{BackendRange, TimeRange, TimeUnit};

fn relative_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)([mhdw])$").expect("static regex"))
}

impl FromStr for TimeRange {
    type Err = ValidationError;

    /// 接受 `<int><m|h|d|w>`、单个 ISO-8601 时间戳，或以 `/`、`,` 分隔的两个时间戳。
    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let input = raw.trim();
        let invalid = || ValidationError::InvalidTimeRange(raw.to_string());

        if let Some(caps) = relative_pattern().captures(input) {
            let amount: u64 = caps[1].parse().map_err(|_| invalid())?;
            let unit = caps[2]
                .chars()
                .next()
                .and_then(TimeUnit::from_suffix)
                .ok_or_else(invalid)?;
            // 0 would mean "all time" to the backend
            if amount == 0 || amount.checked_mul(unit.seconds()).is_none() {
                return Err(invalid());
            }
            return Ok(TimeRange::Relative { amount, unit });
        }

        let (from, to) = match input.split_once(['/', ',']) {
            Some((from, to)) => (from.trim(), Some(to.trim())),
            None => (input, None),
        };
        if !is_iso8601(from) {
            return Err(invalid());
        }
        if let Some(to) = to {
            if !is_iso8601(to) {
                return Err(invalid());
            }
        }
        Ok(TimeRange::Absolute {
            from: from.to_string(),
            to: to.map(str::to_string),
        })
    }
}

fn is_iso8601(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if DateTime::parse_from_rfc3339(s).is_ok() {
        return true;
    }
    let normalized = s.replacen(' ', "T", 1);
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// 相对范围换算为秒数。调用方保证已通过校验，溢出时饱和。
pub fn relative_seconds(amount: u64, unit: TimeUnit) -> u64 {
    amount.saturating_mul(unit.seconds())
}

/// 将已校验的时间范围转换为后端表示；绝对时间戳原样透传。
pub fn translate(range: &TimeRange) -> BackendRange {
    match range {
        TimeRange::Relative { amount, unit } => BackendRange::Relative {
            seconds: relative_seconds(*amount, *unit),
        },
        TimeRange::Absolute { from, to } => BackendRange::Absolute {
            from: from.clone(),
            to: to.clone(),
        },
    }
}
