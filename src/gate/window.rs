//! Named window granularities for a rate gate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::GateError;

/// Time window for rate limiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TimeWindow {
    /// Per-second rate limiting
    #[default]
    Second,
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl TimeWindow {
    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Second => Duration::from_secs(1),
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
            TimeWindow::Day => Duration::from_secs(86400),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Second => "second",
            TimeWindow::Minute => "minute",
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
        }
    }
}

impl From<TimeWindow> for Duration {
    fn from(window: TimeWindow) -> Self {
        window.duration()
    }
}

impl FromStr for TimeWindow {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" | "s" => Ok(TimeWindow::Second),
            "minute" | "minutes" | "m" => Ok(TimeWindow::Minute),
            "hour" | "hours" | "h" => Ok(TimeWindow::Hour),
            "day" | "days" | "d" => Ok(TimeWindow::Day),
            other => Err(GateError::Config(format!("unknown time window: {}", other))),
        }
    }
}

impl TryFrom<String> for TimeWindow {
    type Error = GateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_window_duration() {
        assert_eq!(TimeWindow::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeWindow::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeWindow::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeWindow::Day.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_time_window_into_duration() {
        let duration: Duration = TimeWindow::Minute.into();
        assert_eq!(duration, Duration::from_secs(60));
    }

    #[test]
    fn test_time_window_parse() {
        assert_eq!("second".parse::<TimeWindow>().unwrap(), TimeWindow::Second);
        assert_eq!("Minute".parse::<TimeWindow>().unwrap(), TimeWindow::Minute);
        assert_eq!(" hours ".parse::<TimeWindow>().unwrap(), TimeWindow::Hour);
        assert_eq!("d".parse::<TimeWindow>().unwrap(), TimeWindow::Day);

        let err = "fortnight".parse::<TimeWindow>().unwrap_err();
        assert!(matches!(err, GateError::Config(_)));
    }

    #[test]
    fn test_time_window_display_round_trips() {
        for window in [TimeWindow::Second, TimeWindow::Minute, TimeWindow::Hour, TimeWindow::Day] {
            assert_eq!(window.to_string().parse::<TimeWindow>().unwrap(), window);
        }
    }

    #[test]
    fn test_time_window_deserialize_any_case() {
        let window: TimeWindow = serde_yaml::from_str("hour").unwrap();
        assert_eq!(window, TimeWindow::Hour);

        let window: TimeWindow = serde_yaml::from_str("Minute").unwrap();
        assert_eq!(window, TimeWindow::Minute);

        assert!(serde_yaml::from_str::<TimeWindow>("fortnight").is_err());
        assert_eq!(serde_yaml::to_string(&TimeWindow::Day).unwrap().trim(), "day");
    }
}
