//! Validated scalar payload grammars.
//!
//! Each parser normalizes invalid input to the substitute the format
//! prescribes (0, `und`, `application/octet-stream`, fraction-slash
//! names) and reports through the diagnostics.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::Diagnostics;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\x00-\x1F/]*(?:/[^\x00-\x1F/]*/[^\x00-\x1F/]*)?$").expect("name grammar")
});

// BCP-47 langtag subset: a 2-8 letter primary subtag (or an x- private
// tag) followed by 1-8 character alphanumeric subtags.
static LANGUAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z]{2,8}(?:-[A-Za-z0-9]{1,8})*|[Xx](?:-[A-Za-z0-9]{1,8})+)$")
        .expect("language grammar")
});

static MEDIA_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    let token = r"[-!#$%&'*+.^_`|~0-9A-Za-z]+";
    Regex::new(&format!(
        r#"^{token}/{token}(?:[ \t]*;[ \t]*{token}=(?:{token}|"(?:[^"\\]|\\.)*"))*$"#,
        token = token
    ))
    .expect("media type grammar")
});

/// Parses `[0-9]+` to an integer; anything else reports and yields 0.
pub fn parse_nonnegative_integer(payload: &str, diag: &mut Diagnostics) -> u64 {
    if !payload.is_empty() && payload.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = payload.parse() {
            return n;
        }
    }
    diag.error(format!(
        "expected a non-negative integer, found {:?}",
        payload
    ));
    0
}

/// Validates a personal name: free text with at most one `/surname/`
/// span. On mismatch the slashes are replaced by `⁄` (U+2044) and the
/// payload is reported.
pub fn parse_name(payload: &str, diag: &mut Diagnostics) -> String {
    if NAME_RE.is_match(payload) {
        payload.to_string()
    } else {
        diag.error(format!("invalid personal name {:?}", payload));
        payload.replace('/', "\u{2044}")
    }
}

/// Validates a BCP-47 language tag; `und` is substituted on mismatch.
pub fn parse_language(payload: &str, diag: &mut Diagnostics) -> String {
    if LANGUAGE_RE.is_match(payload) {
        payload.to_string()
    } else {
        diag.error(format!("invalid language tag {:?}", payload));
        "und".to_string()
    }
}

/// Validates an RFC media type; `application/octet-stream` is substituted
/// on mismatch.
pub fn parse_media_type(payload: &str, diag: &mut Diagnostics) -> String {
    if MEDIA_TYPE_RE.is_match(payload) {
        payload.to_string()
    } else {
        diag.error(format!("invalid media type {:?}", payload));
        "application/octet-stream".to_string()
    }
}

/// The `Y|<NULL>` payload: only empty or `"Y"` is acceptable.
pub fn parse_y_null(payload: &str, diag: &mut Diagnostics) -> bool {
    match payload {
        "" => false,
        "Y" => true,
        other => {
            diag.error(format!("expected \"Y\" or no payload, found {:?}", other));
            false
        }
    }
}
