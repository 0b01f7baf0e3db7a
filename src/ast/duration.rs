//! Durations used by `wait`, `timeout.after` and `metadata.heartbeat`
//!
//! Two accepted forms:
//! - ISO 8601: `PT30S`, `PT1M30.5S`, `P1DT2H` (years and months are ambiguous and rejected)
//! - inline: `{ days, hours, minutes, seconds, milliseconds }`

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BraidError, Result};

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("valid ISO 8601 duration regex")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    Iso(String),
    Inline(InlineDuration),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineDuration {
    #[serde(default)]
    pub days: u64,
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub milliseconds: u64,
}

impl InlineDuration {
    pub fn to_duration(&self) -> Duration {
        let secs = self
            .seconds
            .saturating_add(self.minutes.saturating_mul(60))
            .saturating_add(self.hours.saturating_mul(3_600))
            .saturating_add(self.days.saturating_mul(86_400));
        Duration::from_secs(secs).saturating_add(Duration::from_millis(self.milliseconds))
    }
}

impl DurationSpec {
    pub fn to_duration(&self) -> Result<Duration> {
        match self {
            Self::Inline(inline) => Ok(inline.to_duration()),
            Self::Iso(raw) => parse_iso_duration(raw),
        }
    }
}

/// Parse an ISO 8601 duration without calendar units
pub fn parse_iso_duration(raw: &str) -> Result<Duration> {
    let invalid = |reason: &str| BraidError::InvalidDuration {
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    let caps = ISO_DURATION
        .captures(trimmed)
        .ok_or_else(|| invalid("expected ISO 8601 duration such as PT30S"))?;

    if trimmed == "P" || trimmed.ends_with('T') {
        return Err(invalid("duration has no components"));
    }
    if caps.get(1).is_some() || caps.get(2).is_some() {
        return Err(invalid("years and months are not supported"));
    }

    let whole = |i: usize| -> Result<u64> {
        caps.get(i)
            .map(|m| m.as_str().parse::<u64>().map_err(|e| invalid(&e.to_string())))
            .transpose()
            .map(|v| v.unwrap_or(0))
    };

    let days = whole(3)?;
    let hours = whole(4)?;
    let minutes = whole(5)?;
    let seconds = caps
        .get(6)
        .map(|m| m.as_str().parse::<f64>().map_err(|e| invalid(&e.to_string())))
        .transpose()?
        .unwrap_or(0.0);

    let fractional =
        Duration::try_from_secs_f64(seconds).map_err(|e| invalid(&e.to_string()))?;
    let whole_secs = days
        .checked_mul(86_400)
        .and_then(|d| d.checked_add(hours.checked_mul(3_600)?))
        .and_then(|s| s.checked_add(minutes.checked_mul(60)?))
        .ok_or_else(|| invalid("duration is too large"))?;

    Duration::from_secs(whole_secs)
        .checked_add(fractional)
        .ok_or_else(|| invalid("duration is too large"))
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════
