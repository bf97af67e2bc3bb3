//! The `type-Time` payload: 24-hour wall-clock time, optional seconds,
//! fractional seconds, and UTC marker.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use serde_json::{Map, Value};

use crate::Diagnostics;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{1,2}):([0-9]{2})(?::([0-9]{2})(?:\.([0-9]+))?)?(Z)?$")
        .expect("time grammar")
});

/// A time of day. Fractional seconds keep their digits verbatim so the
/// canonical form round-trips exactly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Time {
    pub hour: u32,
    pub minute: u32,
    pub second: Option<u32>,
    /// Digits after the decimal point, without the point.
    pub fraction: Option<String>,
    /// True when the payload carried the `Z` UTC marker.
    pub utc: bool,
}

impl Time {
    /// True when every field is at its default (midnight, local).
    pub fn is_empty(&self) -> bool {
        self.hour == 0
            && self.minute == 0
            && self.second.is_none()
            && self.fraction.is_none()
            && !self.utc
    }

    /// Parses a time payload. Unparseable input is reported and yields
    /// midnight.
    pub fn parse(payload: &str, diag: &mut Diagnostics) -> Time {
        match Time::try_parse(payload) {
            Some(time) => time,
            None => {
                diag.error(format!("invalid time {:?}", payload));
                Time::default()
            }
        }
    }

    fn try_parse(payload: &str) -> Option<Time> {
        let caps = TIME_RE.captures(payload)?;
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        let second: Option<u32> = match caps.get(3) {
            Some(m) => Some(m.as_str().parse().ok()?),
            None => None,
        };
        if hour > 23 || minute > 59 || second.is_some_and(|s| s > 59) {
            return None;
        }
        Some(Time {
            hour,
            minute,
            second,
            fraction: caps.get(4).map(|m| m.as_str().to_string()),
            utc: caps.get(5).is_some(),
        })
    }

    /// Structured JSON form: `{hour, minute, second?, fraction?, utc?}`.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("hour".to_string(), Value::from(self.hour));
        obj.insert("minute".to_string(), Value::from(self.minute));
        if let Some(s) = self.second {
            obj.insert("second".to_string(), Value::from(s));
        }
        if let Some(f) = &self.fraction {
            obj.insert("fraction".to_string(), Value::String(f.clone()));
        }
        if self.utc {
            obj.insert("utc".to_string(), Value::Bool(true));
        }
        Value::Object(obj)
    }

    /// Reads the structured JSON form back.
    pub fn from_json(value: &Value) -> Option<Time> {
        let obj = value.as_object()?;
        Some(Time {
            hour: obj.get("hour")?.as_u64()? as u32,
            minute: obj.get("minute")?.as_u64()? as u32,
            second: obj.get("second").and_then(Value::as_u64).map(|s| s as u32),
            fraction: obj
                .get("fraction")
                .and_then(Value::as_str)
                .map(str::to_string),
            utc: obj.get("utc").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)?;
        if let Some(s) = self.second {
            write!(f, ":{:02}", s)?;
            if let Some(frac) = &self.fraction {
                write!(f, ".{}", frac)?;
            }
        }
        if self.utc {
            f.write_str("Z")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let mut diag = Diagnostics::new();
        for text in [
            "00:00",
            "14:30",
            "14:30:05",
            "14:30:05.5",
            "23:59:59.999Z",
            "02:03Z",
        ] {
            let time = Time::parse(text, &mut diag);
            assert_eq!(time.to_string(), text);
            assert_eq!(Time::parse(&time.to_string(), &mut diag), time);
        }
        assert!(diag.errors().is_empty(), "{:?}", diag.errors());
    }

    #[test]
    fn test_single_digit_hour_canonicalizes() {
        let mut diag = Diagnostics::new();
        let time = Time::parse("2:30", &mut diag);
        assert!(diag.errors().is_empty());
        assert_eq!(time.to_string(), "02:30");
    }

    #[test]
    fn test_invalid_yields_midnight() {
        for text in ["24:00", "14:60", "14:30:60", "14", "noon", "14:30:05.Z"] {
            let mut diag = Diagnostics::new();
            let time = Time::parse(text, &mut diag);
            assert_eq!(diag.errors().len(), 1, "{:?} should be invalid", text);
            assert_eq!(time, Time::default());
        }
    }

    #[test]
    fn test_emptiness() {
        let mut diag = Diagnostics::new();
        assert!(Time::parse("00:00", &mut diag).is_empty());
        assert!(!Time::parse("00:00Z", &mut diag).is_empty());
        assert!(!Time::parse("00:01", &mut diag).is_empty());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut diag = Diagnostics::new();
        let time = Time::parse("14:30:05.25Z", &mut diag);
        assert_eq!(Time::from_json(&time.to_json()), Some(time));
    }
}
