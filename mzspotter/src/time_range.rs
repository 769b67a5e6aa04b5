use std::{error::Error, str::FromStr, fmt::Display, num::ParseFloatError, ops::Range};

use serde::{Deserialize, Serialize};

use mzspot::interval::{SimpleInterval, Span1D};


/// A retention time window in minutes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self { Self { start, end } }
}

impl Span1D for TimeRange {
    type DimType = f64;

    fn start(&self) -> Self::DimType {
        self.start
    }

    fn end(&self) -> Self::DimType {
        self.end
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: f64::INFINITY,
        }
    }
}

#[derive(Debug)]
pub enum TimeRangeParseError {
    MalformedStart(ParseFloatError),
    MalformedEnd(ParseFloatError),
}

impl Display for TimeRangeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeRangeParseError::MalformedStart(e) => {
                write!(f, "Failed to parse time range start {e}")
            }
            TimeRangeParseError::MalformedEnd(e) => {
                write!(f, "Failed to parse time range end {e}")
            }
        }
    }
}

impl Error for TimeRangeParseError {}

impl FromStr for TimeRange {
    type Err = TimeRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = if s.contains(' ') {
            s.split(' ')
        } else if s.contains(':') {
            s.split(':')
        } else if s.contains('-') {
            s.split('-')
        } else {
            s.split(' ')
        };
        let start_s = tokens.next().unwrap_or_default();
        let start_t = if start_s.is_empty() {
            0.0
        } else {
            match start_s.parse() {
                Ok(val) => val,
                Err(e) => return Err(TimeRangeParseError::MalformedStart(e)),
            }
        };
        let end_s = tokens.next().unwrap_or_default();
        let end_t = if end_s.is_empty() {
            f64::INFINITY
        } else {
            match end_s.parse() {
                Ok(val) => val,
                Err(e) => return Err(TimeRangeParseError::MalformedEnd(e)),
            }
        };
        Ok(TimeRange {
            start: start_t,
            end: end_t,
        })
    }
}

impl From<TimeRange> for SimpleInterval<f64> {
    fn from(value: TimeRange) -> Self {
        SimpleInterval::new(value.start, value.end)
    }
}

impl From<Range<f64>> for TimeRange {
    fn from(value: Range<f64>) -> Self {
        Self::new(value.start, value.end)
    }
}

impl From<(f64, f64)> for TimeRange {
    fn from(value: (f64, f64)) -> Self {
        Self::new(value.0, value.1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_time_fromstr() -> Result<(), TimeRangeParseError> {
        let cases = [
            ("52.0-", 52.0, f64::INFINITY),
            ("-52.0", 0.0, 52.0),
            ("32-52.0", 32.0, 52.0),
            ("1.5:3", 1.5, 3.0),
            ("-", 0.0, f64::INFINITY),
        ];
        for (text, start, end) in cases {
            let t: TimeRange = text.parse()?;
            assert_eq!(t.start(), start, "{text}");
            assert_eq!(t.end(), end, "{text}");
        }
        let window: SimpleInterval<f64> = TimeRange::new(2.0, 4.5).into();
        assert_eq!(window.width(), 2.5);
        Ok(())
    }

    #[test]
    fn test_time_fromstr_malformed() {
        assert!(matches!(
            "a-".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedStart(_))
        ));
        assert!(matches!(
            "-b".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedEnd(_))
        ));
        // the start is reported first
        assert!(matches!(
            "a-b".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedStart(_))
        ));
    }
}
