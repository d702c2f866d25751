// Trigger specifications, modeled as a tagged-union sum type.
//
// The Scheduler matches every variant exhaustively; an "unsupported
// trigger type" is a programmer error, never reached at runtime.

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// Units accepted by the `interval` trigger's `every` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalUnit {
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "d")]
    Days,
    #[serde(rename = "w")]
    Weeks,
}

impl IntervalUnit {
    fn from_char(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Seconds),
            'm' => Some(Self::Minutes),
            'h' => Some(Self::Hours),
            'd' => Some(Self::Days),
            'w' => Some(Self::Weeks),
            _ => None,
        }
    }
}

/// A parsed `every: "<N><unit>"` interval value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub value: u32,
    pub unit: IntervalUnit,
}

impl Interval {
    /// Parse e.g. `"5m"`, `"15m"`, `"2h"`. Rejects sub-unit values ≥ 60 for
    /// minute/hour/day/week units ("use the next unit up"), and coerces
    /// sub-minute second intervals to 1 minute at the cron-conversion step
    /// rather than here (parsing always succeeds for a syntactically valid
    /// value; the coercion is the Scheduler's job).
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let unit_char = raw
            .chars()
            .last()
            .ok_or_else(|| CoreError::InvalidInput(format!("empty interval: {:?}", raw)))?;
        let unit = IntervalUnit::from_char(unit_char)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown interval unit in {:?}", raw)))?;
        let digits = &raw[..raw.len() - unit_char.len_utf8()];
        let value: u32 = digits
            .parse()
            .map_err(|_| CoreError::InvalidInput(format!("invalid interval value in {:?}", raw)))?;
        if value == 0 {
            return Err(CoreError::InvalidInput(format!(
                "interval value must be positive: {:?}",
                raw
            )));
        }
        // 59m schedules, 60m is rejected at activation ("use the next unit
        // up"). Seconds are exempt since they're coerced, not rejected.
        if !matches!(unit, IntervalUnit::Seconds) && value >= 60 {
            return Err(CoreError::InvalidInput(format!(
                "interval value {} too large for its unit in {:?}; use the next unit up",
                value, raw
            )));
        }
        Ok(Self { value, unit })
    }

    /// The interval as a wall-clock duration, for callers (e.g. the RSS
    /// poll loop) that need to check elapsed time rather than build a cron
    /// expression.
    pub fn as_duration(&self) -> chrono::Duration {
        let value = self.value as i64;
        match self.unit {
            IntervalUnit::Seconds => chrono::Duration::seconds(value),
            IntervalUnit::Minutes => chrono::Duration::minutes(value),
            IntervalUnit::Hours => chrono::Duration::hours(value),
            IntervalUnit::Days => chrono::Duration::days(value),
            IntervalUnit::Weeks => chrono::Duration::weeks(value),
        }
    }
}

/// A local `HH:MM` time-of-day, as used by the `daily` trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub fn parse(raw: &str) -> Result<Self> {
        let (h, m) = raw
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidInput(format!("invalid time format: {:?}", raw)))?;
        if h.len() != 2 || m.len() != 2 {
            return Err(CoreError::InvalidInput(format!(
                "time must be HH:MM: {:?}",
                raw
            )));
        }
        let hour: u8 = h
            .parse()
            .map_err(|_| CoreError::InvalidInput(format!("invalid hour in {:?}", raw)))?;
        let minute: u8 = m
            .parse()
            .map_err(|_| CoreError::InvalidInput(format!("invalid minute in {:?}", raw)))?;
        if hour > 23 || minute > 59 {
            return Err(CoreError::InvalidInput(format!(
                "time out of range (24:00 style values rejected): {:?}",
                raw
            )));
        }
        Ok(Self { hour, minute })
    }
}

/// The trigger tagged union.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Trigger {
    /// Runs only on explicit user invocation. Never scheduled.
    #[serde(rename = "manual")]
    Manual,

    /// Periodic invocation on a fixed cadence.
    #[serde(rename = "interval")]
    Interval { every: String },

    /// Invocation once per day at a local time.
    #[serde(rename = "daily")]
    Daily { at: String },

    /// Event-driven; no schedule.
    #[serde(rename = "webhook")]
    Webhook {
        #[serde(skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
    },

    /// Periodic feed poll; invocation only on new items.
    #[serde(rename = "rss")]
    Rss {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        interval: Option<String>,
    },

    /// Reserved for integration-specific event sources.
    #[serde(rename = "event")]
    Event {
        #[serde(flatten)]
        fields: serde_json::Value,
    },
}

impl Trigger {
    pub fn rss_interval(&self) -> Result<Interval> {
        match self {
            Trigger::Rss { interval, .. } => Interval::parse(interval.as_deref().unwrap_or("15m")),
            _ => Err(CoreError::Internal(
                "rss_interval() called on a non-rss trigger".into(),
            )),
        }
    }

    pub fn is_schedulable(&self) -> bool {
        matches!(self, Trigger::Interval { .. } | Trigger::Daily { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minute_interval() {
        let i = Interval::parse("5m").unwrap();
        assert_eq!(i.value, 5);
        assert_eq!(i.unit, IntervalUnit::Minutes);
    }

    #[test]
    fn boundary_59m_ok_60m_rejected() {
        assert!(Interval::parse("59m").is_ok());
        assert!(Interval::parse("60m").is_err());
    }

    #[test]
    fn daily_boundary_2359_ok_2400_rejected() {
        assert!(TimeOfDay::parse("23:59").is_ok());
        assert!(TimeOfDay::parse("24:00").is_err());
        assert!(TimeOfDay::parse("9:5").is_err());
    }

    #[test]
    fn trigger_json_round_trips() {
        let t: Trigger = serde_json::from_str(r#"{"type":"interval","every":"5m"}"#).unwrap();
        matches!(t, Trigger::Interval { .. });
        let t: Trigger =
            serde_json::from_str(r#"{"type":"webhook","secret":"deadbeef"}"#).unwrap();
        matches!(t, Trigger::Webhook { secret: Some(_) });
    }
}
