//! The `type-Age` payload: an optional bound modifier and an ordered
//! subset of year/month/week/day counts.

use std::fmt;

use serde_json::{Map, Value};

use crate::Diagnostics;

/// Whether an age is an upper or lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeModifier {
    /// `<`: younger than the stated age.
    Less,
    /// `>`: older than the stated age.
    Greater,
}

impl AgeModifier {
    fn as_str(self) -> &'static str {
        match self {
            AgeModifier::Less => "<",
            AgeModifier::Greater => ">",
        }
    }
}

/// An age: `[< or >] [Ny] [Nm] [Nw] [Nd]`, units in that order, separated
/// by single spaces, at least one unit unless the payload is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Age {
    pub modifier: Option<AgeModifier>,
    pub years: Option<u64>,
    pub months: Option<u64>,
    pub weeks: Option<u64>,
    pub days: Option<u64>,
}

impl Age {
    /// True when no informative field is set.
    pub fn is_empty(&self) -> bool {
        self.modifier.is_none()
            && self.years.is_none()
            && self.months.is_none()
            && self.weeks.is_none()
            && self.days.is_none()
    }

    /// Parses an age payload. An empty payload is the empty age; anything
    /// unparseable is reported and yields the `> 0y` sentinel.
    pub fn parse(payload: &str, diag: &mut Diagnostics) -> Age {
        if payload.is_empty() {
            return Age::default();
        }
        match Age::try_parse(payload) {
            Some(age) => age,
            None => {
                diag.error(format!("invalid age {:?}", payload));
                Age {
                    modifier: Some(AgeModifier::Greater),
                    years: Some(0),
                    ..Age::default()
                }
            }
        }
    }

    fn try_parse(payload: &str) -> Option<Age> {
        let tokens: Vec<&str> = payload.split(' ').collect();
        let mut age = Age::default();
        let mut i = 0;
        match tokens[0] {
            "<" => {
                age.modifier = Some(AgeModifier::Less);
                i = 1;
            }
            ">" => {
                age.modifier = Some(AgeModifier::Greater);
                i = 1;
            }
            _ => {}
        }

        const ORDER: [char; 4] = ['y', 'm', 'w', 'd'];
        let mut next_unit = 0;
        let mut any = false;
        for token in &tokens[i..] {
            let (digits, unit) = token.split_at(token.len().checked_sub(1)?);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let unit = unit.chars().next()?;
            let position = ORDER.iter().position(|&u| u == unit)?;
            if position < next_unit {
                return None;
            }
            next_unit = position + 1;
            let value = digits.parse().ok()?;
            match unit {
                'y' => age.years = Some(value),
                'm' => age.months = Some(value),
                'w' => age.weeks = Some(value),
                'd' => age.days = Some(value),
                _ => return None,
            }
            any = true;
        }
        any.then_some(age)
    }

    /// Structured JSON form: `{mod?, years?, months?, weeks?, days?}`.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if let Some(m) = self.modifier {
            obj.insert("mod".to_string(), Value::String(m.as_str().to_string()));
        }
        for (key, value) in [
            ("years", self.years),
            ("months", self.months),
            ("weeks", self.weeks),
            ("days", self.days),
        ] {
            if let Some(v) = value {
                obj.insert(key.to_string(), Value::from(v));
            }
        }
        Value::Object(obj)
    }

    /// Reads the structured JSON form back.
    pub fn from_json(value: &Value) -> Option<Age> {
        let obj = value.as_object()?;
        let modifier = match obj.get("mod").and_then(Value::as_str) {
            None => None,
            Some("<") => Some(AgeModifier::Less),
            Some(">") => Some(AgeModifier::Greater),
            Some(_) => return None,
        };
        Some(Age {
            modifier,
            years: obj.get("years").and_then(Value::as_u64),
            months: obj.get("months").and_then(Value::as_u64),
            weeks: obj.get("weeks").and_then(Value::as_u64),
            days: obj.get("days").and_then(Value::as_u64),
        })
    }
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if let Some(m) = self.modifier {
            f.write_str(m.as_str())?;
            first = false;
        }
        for (value, unit) in [
            (self.years, 'y'),
            (self.months, 'm'),
            (self.weeks, 'w'),
            (self.days, 'd'),
        ] {
            if let Some(v) = value {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{}{}", v, unit)?;
                first = false;
            }
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
        for text in ["8y", "> 8y 3m", "< 1y 2m 3w 4d", "3w 4d", "0d", ""] {
            let age = Age::parse(text, &mut diag);
            assert_eq!(age.to_string(), text, "canonical form of {:?}", text);
            assert_eq!(Age::parse(&age.to_string(), &mut diag), age);
        }
        assert!(diag.errors().is_empty(), "{:?}", diag.errors());
    }

    #[test]
    fn test_invalid_yields_sentinel() {
        for text in ["8", "y8", "8d 3y", "8y  3m", "< ", "eight years", ">0y"] {
            let mut diag = Diagnostics::new();
            let age = Age::parse(text, &mut diag);
            assert_eq!(diag.errors().len(), 1, "{:?} should be invalid", text);
            assert_eq!(age.modifier, Some(AgeModifier::Greater));
            assert_eq!(age.years, Some(0));
            assert_eq!(age.to_string(), "> 0y");
        }
    }

    #[test]
    fn test_empty_age() {
        let mut diag = Diagnostics::new();
        let age = Age::parse("", &mut diag);
        assert!(age.is_empty());
        assert!(!Age::parse("8y", &mut diag).is_empty());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut diag = Diagnostics::new();
        let age = Age::parse("> 8y 3m", &mut diag);
        assert_eq!(Age::from_json(&age.to_json()), Some(age));
    }
}
