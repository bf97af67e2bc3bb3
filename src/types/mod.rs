//! Typed payload values for the GEDCOM 7 layer.
//!
//! Every datatype parses from and serializes to its canonical text form,
//! carries an emptiness predicate, and has a structured JSON form used by
//! the typed-layer codec. Parse failures are recoverable: the value is
//! normalized to a safe sentinel and the failure is reported through the
//! diagnostics.

pub mod age;
pub mod date;
pub mod scalars;
pub mod time;

pub use age::{Age, AgeModifier};
pub use date::{Date, DateValue};
pub use time::Time;

/// Splits a `List#Text` payload: comma-separated items with surrounding
/// whitespace trimmed.
pub fn parse_list_text(payload: &str) -> Vec<String> {
    if payload.trim().is_empty() {
        return Vec::new();
    }
    payload.split(',').map(|item| item.trim().to_string()).collect()
}

/// Joins list items back into canonical comma-separated text.
pub fn format_list(items: &[String]) -> String {
    items.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_text_split_and_trim() {
        assert_eq!(parse_list_text("a, b ,c"), ["a", "b", "c"]);
        assert_eq!(parse_list_text(""), Vec::<String>::new());
        assert_eq!(parse_list_text("solo"), ["solo"]);
    }

    #[test]
    fn test_list_roundtrip() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(parse_list_text(&format_list(&items)), items);
    }
}
