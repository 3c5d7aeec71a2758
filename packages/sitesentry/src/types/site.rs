use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScheduleError;

/// Unique identifier for a monitored site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteId(pub Uuid);

impl SiteId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SiteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Relative check priority; maps onto job ordering when more checks are due
/// than the concurrency cap allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckPriority {
    High,
    #[default]
    Normal,
    Low,
}

/// When a site is checked: either a fixed interval or a five-field cron
/// expression. Parsed once at registration into an immutable representation;
/// the next fire time is a pure function of `(now, schedule)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Schedule {
    /// Fixed interval, e.g. `"5m"`, `"30s"`, `"2h"`, `"1d"`
    Interval(Duration),
    /// Five-field cron expression with the usual semantics
    Cron(Box<cron::Schedule>, String),
}

impl Schedule {
    /// Parse an interval (`<n><s|m|h|d>`) or a five-field cron expression.
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let input = input.trim();
        if let Some(interval) = parse_interval(input) {
            if interval.is_zero() {
                return Err(ScheduleError::InvalidInterval { input: input.to_string() });
            }
            return Ok(Schedule::Interval(interval));
        }

        if input.split_whitespace().count() == 5 {
            // The cron crate wants a seconds field; five-field expressions
            // fire at second zero.
            let with_seconds = format!("0 {input}");
            let schedule = cron::Schedule::from_str(&with_seconds).map_err(|e| {
                ScheduleError::InvalidCron { input: input.to_string(), reason: e.to_string() }
            })?;
            return Ok(Schedule::Cron(Box::new(schedule), input.to_string()));
        }

        Err(ScheduleError::InvalidInterval { input: input.to_string() })
    }

    /// Next fire time strictly after `now`.
    pub fn next_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval(interval) => {
                let delta = chrono::Duration::from_std(*interval).ok()?;
                now.checked_add_signed(delta)
            }
            Schedule::Cron(schedule, _) => schedule.after(&now).next(),
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Interval(d) => write!(f, "{}", format_interval(*d)),
            Schedule::Cron(_, expr) => write!(f, "{expr}"),
        }
    }
}

impl TryFrom<String> for Schedule {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Schedule::parse(&value)
    }
}

impl From<Schedule> for String {
    fn from(value: Schedule) -> Self {
        value.to_string()
    }
}

fn parse_interval(input: &str) -> Option<Duration> {
    let suffix = input.chars().last()?;
    let digits = &input[..input.len() - suffix.len_utf8()];
    let value: u64 = digits.parse().ok()?;
    let secs = match suffix {
        's' => value,
        'm' => value * 60,
        'h' => value * 3600,
        'd' => value * 86_400,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

fn format_interval(d: Duration) -> String {
    let secs = d.as_secs();
    if secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Per-site overrides for the change detector thresholds. `None` inherits
/// the global configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorOverrides {
    pub similarity_threshold: Option<f64>,
    pub structural_threshold: Option<f64>,
    pub critical_change_threshold: Option<f64>,
}

/// A monitored website.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub url: String,
    pub display_name: String,
    pub schedule: Schedule,
    pub active: bool,
    /// Crawl fanout, typically 1-2
    pub max_depth: u8,
    pub priority: CheckPriority,
    pub detector_overrides: DetectorOverrides,
    /// Per-site snapshot retention; `None` inherits the global default
    pub keep_scans: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Site {
    pub fn new(url: impl Into<String>, display_name: impl Into<String>, schedule: Schedule) -> Self {
        let now = Utc::now();
        Self {
            id: SiteId::new(),
            url: url.into(),
            display_name: display_name.into(),
            schedule,
            active: true,
            max_depth: 1,
            priority: CheckPriority::Normal,
            detector_overrides: DetectorOverrides::default(),
            keep_scans: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: CheckPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_depth(mut self, depth: u8) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_detector_overrides(mut self, overrides: DetectorOverrides) -> Self {
        self.detector_overrides = overrides;
        self
    }

    pub fn with_keep_scans(mut self, keep: u32) -> Self {
        self.keep_scans = Some(keep);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_interval_suffixes() {
        assert!(matches!(
            Schedule::parse("30s"),
            Ok(Schedule::Interval(d)) if d == Duration::from_secs(30)
        ));
        assert!(matches!(
            Schedule::parse("5m"),
            Ok(Schedule::Interval(d)) if d == Duration::from_secs(300)
        ));
        assert!(matches!(
            Schedule::parse("1d"),
            Ok(Schedule::Interval(d)) if d == Duration::from_secs(86_400)
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Schedule::parse("soon").is_err());
        assert!(Schedule::parse("5x").is_err());
        assert!(Schedule::parse("0m").is_err());
        assert!(Schedule::parse("* * *").is_err());
    }

    #[test]
    fn parses_five_field_cron() {
        let schedule = Schedule::parse("*/15 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 10, 7, 30).unwrap();
        let next = schedule.next_fire(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 10, 15, 0).unwrap());
    }

    #[test]
    fn interval_next_fire_is_now_plus_interval() {
        let schedule = Schedule::parse("5m").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            schedule.next_fire(now).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap()
        );
    }

    #[test]
    fn schedule_round_trips_through_serde() {
        let site = Site::new("https://example.com", "Example", Schedule::parse("5m").unwrap());
        let json = serde_json::to_string(&site).unwrap();
        let back: Site = serde_json::from_str(&json).unwrap();
        assert_eq!(back.schedule.to_string(), "5m");
    }
}
