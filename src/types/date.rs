//! The `type-Date` payloads: calendared dates and the date-value union
//! (approximations, ranges, periods).
//!
//! A [`Date`] stores its calendar and month as URIs resolved through the
//! schema lookup; an undocumented extension calendar keeps its bare tag,
//! and its months pass through unresolved. [`DateValue`] is the disjoint
//! union the `DATE` payload grammar denotes, with a `#period`-restricted
//! parse for payload types that admit only periods.

use serde_json::{Map, Value};

use crate::schema::Lookup;

/// The default calendar.
pub const CAL_GREGORIAN: &str = "https://gedcom.io/terms/v7/cal-GREGORIAN";

/// A single calendared date: `[calendar] [[day] month] year [epoch]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Date {
    /// Calendar URI, or bare tag for an undocumented calendar.
    pub calendar: String,
    pub year: i64,
    /// Month URI, or bare tag under an undocumented calendar.
    pub month: Option<String>,
    pub day: Option<u64>,
    pub epoch: Option<String>,
}

impl Default for Date {
    fn default() -> Self {
        Date {
            calendar: CAL_GREGORIAN.to_string(),
            year: 0,
            month: None,
            day: None,
            epoch: None,
        }
    }
}

impl Date {
    /// True for the all-default date.
    pub fn is_empty(&self) -> bool {
        *self == Date::default()
    }

    /// Parses a date payload. Unparseable input is reported and yields
    /// the default date.
    pub fn parse(payload: &str, lookup: &mut Lookup) -> Date {
        match Date::try_parse(payload, lookup) {
            Some(date) => date,
            None => {
                lookup.diag.error(format!("invalid date {:?}", payload));
                Date::default()
            }
        }
    }

    fn try_parse(payload: &str, lookup: &mut Lookup) -> Option<Date> {
        let tokens: Vec<&str> = payload.split_whitespace().collect();
        if tokens.is_empty() {
            return None;
        }
        let mut rest = &tokens[..];
        let calendar = if tokens[0].starts_with('_') || lookup.knows_calendar(tokens[0]) {
            rest = &tokens[1..];
            lookup.calendar(tokens[0])
        } else {
            CAL_GREGORIAN.to_string()
        };
        if rest.is_empty() {
            return None;
        }

        // An epoch is a non-numeric token after the year.
        let (body, epoch_token) = match rest {
            [.., year, epoch] if is_digits(year) && !is_digits(epoch) => {
                (&rest[..rest.len() - 1], Some(*epoch))
            }
            _ => (rest, None),
        };
        let (&year_token, prefix) = body.split_last()?;
        if !is_digits(year_token) {
            return None;
        }
        let year: i64 = year_token.parse().ok()?;

        let (day, month) = match prefix {
            [] => (None, None),
            [month] if !is_digits(month) => (None, Some(lookup.month(&calendar, month))),
            [day, month] if is_digits(day) && !is_digits(month) => (
                Some(day.parse().ok()?),
                Some(lookup.month(&calendar, month)),
            ),
            _ => return None,
        };

        let epoch = match epoch_token {
            None => None,
            Some(token) => {
                let admitted = lookup
                    .epochs(&calendar)
                    .map(|epochs| epochs.iter().any(|e| e == token));
                if admitted == Some(false) {
                    lookup.diag.error(format!(
                        "invalid epoch {:?} for calendar {}",
                        token, calendar
                    ));
                    None
                } else {
                    Some(token.to_string())
                }
            }
        };

        Some(Date {
            calendar,
            year,
            month,
            day,
            epoch,
        })
    }

    /// Canonical text. The calendar keyword is omitted for Gregorian.
    pub fn format(&self, lookup: &Lookup) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.calendar != CAL_GREGORIAN {
            parts.push(lookup.calendar_tag(&self.calendar));
        }
        if let Some(day) = self.day {
            parts.push(day.to_string());
        }
        if let Some(month) = &self.month {
            parts.push(lookup.month_tag(month));
        }
        parts.push(self.year.to_string());
        if let Some(epoch) = &self.epoch {
            parts.push(epoch.clone());
        }
        parts.join(" ")
    }

    /// Structured JSON form: `{calendar, year, month?, day?, epoch?}`.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "calendar".to_string(),
            Value::String(self.calendar.clone()),
        );
        obj.insert("year".to_string(), Value::from(self.year));
        if let Some(month) = &self.month {
            obj.insert("month".to_string(), Value::String(month.clone()));
        }
        if let Some(day) = self.day {
            obj.insert("day".to_string(), Value::from(day));
        }
        if let Some(epoch) = &self.epoch {
            obj.insert("epoch".to_string(), Value::String(epoch.clone()));
        }
        Value::Object(obj)
    }

    /// Reads the structured JSON form back.
    pub fn from_json(value: &Value) -> Option<Date> {
        let obj = value.as_object()?;
        Some(Date {
            calendar: obj.get("calendar")?.as_str()?.to_string(),
            year: obj.get("year")?.as_i64()?,
            month: obj.get("month").and_then(Value::as_str).map(str::to_string),
            day: obj.get("day").and_then(Value::as_u64),
            epoch: obj.get("epoch").and_then(Value::as_str).map(str::to_string),
        })
    }
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// The `DATE` payload union.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateValue {
    /// No payload.
    #[default]
    Empty,
    /// A bare date.
    Single(Date),
    /// `ABT` — approximate.
    About(Date),
    /// `CAL` — calculated.
    Calculated(Date),
    /// `EST` — estimated.
    Estimated(Date),
    /// `BET x AND y`, `AFT x` (start only), `BEF x` (end only).
    Range {
        start: Option<Date>,
        end: Option<Date>,
    },
    /// `FROM x TO y`, `FROM x`, `TO x`.
    Period {
        from: Option<Date>,
        to: Option<Date>,
    },
}

impl DateValue {
    /// The union member name, as used in diagnostics and JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            DateValue::Empty => "empty",
            DateValue::Single(_) => "date",
            DateValue::About(_) => "ABT",
            DateValue::Calculated(_) => "CAL",
            DateValue::Estimated(_) => "EST",
            DateValue::Range { .. } => "dateRange",
            DateValue::Period { .. } => "DatePeriod",
        }
    }

    /// True for the empty member.
    pub fn is_empty(&self) -> bool {
        matches!(self, DateValue::Empty)
    }

    /// Parses a date-value payload. With `period_only` (the
    /// `type-Date#period` payload type), members other than periods are
    /// reported and downgraded to empty.
    pub fn parse(payload: &str, period_only: bool, lookup: &mut Lookup) -> DateValue {
        let value = DateValue::parse_any(payload, lookup);
        if period_only && !matches!(value, DateValue::Empty | DateValue::Period { .. }) {
            lookup
                .diag
                .error(format!("Expected DatePeriod, not {}", value.kind()));
            return DateValue::Empty;
        }
        value
    }

    fn parse_any(payload: &str, lookup: &mut Lookup) -> DateValue {
        if payload.is_empty() {
            return DateValue::Empty;
        }
        if let Some(rest) = payload.strip_prefix("ABT ") {
            return DateValue::About(Date::parse(rest, lookup));
        }
        if let Some(rest) = payload.strip_prefix("CAL ") {
            return DateValue::Calculated(Date::parse(rest, lookup));
        }
        if let Some(rest) = payload.strip_prefix("EST ") {
            return DateValue::Estimated(Date::parse(rest, lookup));
        }
        if let Some(rest) = payload.strip_prefix("BET ") {
            if let Some((start, end)) = rest.split_once(" AND ") {
                return DateValue::Range {
                    start: Some(Date::parse(start, lookup)),
                    end: Some(Date::parse(end, lookup)),
                };
            }
            lookup
                .diag
                .error(format!("invalid date range {:?}", payload));
            return DateValue::Empty;
        }
        if let Some(rest) = payload.strip_prefix("AFT ") {
            return DateValue::Range {
                start: Some(Date::parse(rest, lookup)),
                end: None,
            };
        }
        if let Some(rest) = payload.strip_prefix("BEF ") {
            return DateValue::Range {
                start: None,
                end: Some(Date::parse(rest, lookup)),
            };
        }
        if let Some(rest) = payload.strip_prefix("FROM ") {
            if let Some((from, to)) = rest.split_once(" TO ") {
                return DateValue::Period {
                    from: Some(Date::parse(from, lookup)),
                    to: Some(Date::parse(to, lookup)),
                };
            }
            return DateValue::Period {
                from: Some(Date::parse(rest, lookup)),
                to: None,
            };
        }
        if let Some(rest) = payload.strip_prefix("TO ") {
            return DateValue::Period {
                from: None,
                to: Some(Date::parse(rest, lookup)),
            };
        }
        DateValue::Single(Date::parse(payload, lookup))
    }

    /// Canonical text.
    pub fn format(&self, lookup: &Lookup) -> String {
        match self {
            DateValue::Empty => String::new(),
            DateValue::Single(date) => date.format(lookup),
            DateValue::About(date) => format!("ABT {}", date.format(lookup)),
            DateValue::Calculated(date) => format!("CAL {}", date.format(lookup)),
            DateValue::Estimated(date) => format!("EST {}", date.format(lookup)),
            DateValue::Range {
                start: Some(start),
                end: Some(end),
            } => format!("BET {} AND {}", start.format(lookup), end.format(lookup)),
            DateValue::Range {
                start: Some(start),
                end: None,
            } => format!("AFT {}", start.format(lookup)),
            DateValue::Range {
                start: None,
                end: Some(end),
            } => format!("BEF {}", end.format(lookup)),
            DateValue::Range {
                start: None,
                end: None,
            } => String::new(),
            DateValue::Period {
                from: Some(from),
                to: Some(to),
            } => format!("FROM {} TO {}", from.format(lookup), to.format(lookup)),
            DateValue::Period {
                from: Some(from),
                to: None,
            } => format!("FROM {}", from.format(lookup)),
            DateValue::Period {
                from: None,
                to: Some(to),
            } => format!("TO {}", to.format(lookup)),
            DateValue::Period {
                from: None,
                to: None,
            } => String::new(),
        }
    }

    /// Structured JSON form, discriminated by `type`.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), Value::String(self.kind().to_string()));
        match self {
            DateValue::Empty => {}
            DateValue::Single(date)
            | DateValue::About(date)
            | DateValue::Calculated(date)
            | DateValue::Estimated(date) => {
                obj.insert("date".to_string(), date.to_json());
            }
            DateValue::Range { start, end } => {
                if let Some(start) = start {
                    obj.insert("start".to_string(), start.to_json());
                }
                if let Some(end) = end {
                    obj.insert("end".to_string(), end.to_json());
                }
            }
            DateValue::Period { from, to } => {
                if let Some(from) = from {
                    obj.insert("from".to_string(), from.to_json());
                }
                if let Some(to) = to {
                    obj.insert("to".to_string(), to.to_json());
                }
            }
        }
        Value::Object(obj)
    }

    /// Reads the structured JSON form back.
    pub fn from_json(value: &Value) -> Option<DateValue> {
        let obj = value.as_object()?;
        let date = |key: &str| obj.get(key).and_then(Date::from_json);
        match obj.get("type")?.as_str()? {
            "empty" => Some(DateValue::Empty),
            "date" => Some(DateValue::Single(date("date")?)),
            "ABT" => Some(DateValue::About(date("date")?)),
            "CAL" => Some(DateValue::Calculated(date("date")?)),
            "EST" => Some(DateValue::Estimated(date("date")?)),
            "dateRange" => Some(DateValue::Range {
                start: date("start"),
                end: date("end"),
            }),
            "DatePeriod" => Some(DateValue::Period {
                from: date("from"),
                to: date("to"),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Lookup;
    use crate::testutil;

    fn lookup() -> Lookup {
        Lookup::new(testutil::schema())
    }

    fn g7(name: &str) -> String {
        format!("https://gedcom.io/terms/v7/{}", name)
    }

    #[test]
    fn test_date_parse_forms() {
        let mut lk = lookup();
        let date = Date::parse("1990", &mut lk);
        assert_eq!(date.year, 1990);
        assert_eq!(date.calendar, CAL_GREGORIAN);
        assert_eq!(date.month, None);

        let date = Date::parse("JAN 1990", &mut lk);
        assert_eq!(date.month.as_deref(), Some(g7("month-JAN").as_str()));

        let date = Date::parse("1 JAN 1990", &mut lk);
        assert_eq!(date.day, Some(1));

        let date = Date::parse("JULIAN 1 JAN 1990", &mut lk);
        assert_eq!(date.calendar, g7("cal-JULIAN"));

        let date = Date::parse("100 BCE", &mut lk);
        assert_eq!(date.epoch.as_deref(), Some("BCE"));
        assert!(lk.diag.errors().is_empty(), "{:?}", lk.diag.errors());
    }

    #[test]
    fn test_date_roundtrip() {
        let mut lk = lookup();
        for text in [
            "1990",
            "JAN 1990",
            "1 JAN 1990",
            "JULIAN 1 JAN 1990",
            "100 BCE",
            "JULIAN 100 BCE",
        ] {
            let date = Date::parse(text, &mut lk);
            assert_eq!(date.format(&lk), text);
        }
        assert!(lk.diag.errors().is_empty(), "{:?}", lk.diag.errors());
    }

    #[test]
    fn test_date_invalid() {
        for text in ["", "JAN", "1 1990", "1 2 3 4 1990", "JAN FEB 1990"] {
            let mut lk = lookup();
            let date = Date::parse(text, &mut lk);
            assert_eq!(date, Date::default(), "{:?}", text);
            assert_eq!(lk.diag.errors().len(), 1, "{:?}", text);
        }
    }

    #[test]
    fn test_bad_epoch_dropped() {
        let mut lk = lookup();
        let date = Date::parse("100 CE", &mut lk);
        assert_eq!(date.epoch, None);
        assert!(lk.diag.errors()[0].contains("invalid epoch"));
    }

    #[test]
    fn test_extension_calendar_months_pass_through() {
        let mut lk = lookup();
        let date = Date::parse("_MAYAN 4 BAKTUN 4000", &mut lk);
        assert_eq!(date.calendar, "_MAYAN");
        assert_eq!(date.month.as_deref(), Some("BAKTUN"));
        // Undocumented calendar warns once; months pass silently.
        assert_eq!(lk.diag.warnings(), ["Undocumented extension _MAYAN"]);
    }

    #[test]
    fn test_date_value_members() {
        let mut lk = lookup();
        assert_eq!(DateValue::parse("", false, &mut lk), DateValue::Empty);
        assert!(matches!(
            DateValue::parse("1990", false, &mut lk),
            DateValue::Single(_)
        ));
        assert!(matches!(
            DateValue::parse("ABT 1990", false, &mut lk),
            DateValue::About(_)
        ));
        assert!(matches!(
            DateValue::parse("BET 1990 AND 1995", false, &mut lk),
            DateValue::Range {
                start: Some(_),
                end: Some(_)
            }
        ));
        assert!(matches!(
            DateValue::parse("AFT 1990", false, &mut lk),
            DateValue::Range {
                start: Some(_),
                end: None
            }
        ));
        assert!(matches!(
            DateValue::parse("FROM 1990 TO 1995", false, &mut lk),
            DateValue::Period { .. }
        ));
        assert!(lk.diag.errors().is_empty(), "{:?}", lk.diag.errors());
    }

    #[test]
    fn test_date_value_roundtrip() {
        let mut lk = lookup();
        for text in [
            "",
            "1990",
            "ABT 1 JAN 1990",
            "CAL 1990",
            "EST 1990",
            "BET 1990 AND 1995",
            "AFT 1990",
            "BEF 1995",
            "FROM 1990 TO 1995",
            "FROM 1990",
            "TO 1995",
        ] {
            let value = DateValue::parse(text, false, &mut lk);
            assert_eq!(value.format(&lk), text);
            assert_eq!(DateValue::from_json(&value.to_json()), Some(value));
        }
        assert!(lk.diag.errors().is_empty(), "{:?}", lk.diag.errors());
    }

    #[test]
    fn test_period_downgrade() {
        let mut lk = lookup();
        let value = DateValue::parse("ABT 1 JAN 2020", true, &mut lk);
        assert_eq!(value, DateValue::Empty);
        assert_eq!(lk.diag.errors(), ["Expected DatePeriod, not ABT"]);

        let value = DateValue::parse("FROM 1990 TO 1995", true, &mut lk);
        assert!(matches!(value, DateValue::Period { .. }));
        assert_eq!(lk.diag.errors().len(), 1);
    }
}
