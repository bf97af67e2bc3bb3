//! Dialect configuration for the GEDC line grammar.
//!
//! The tag layer is parameterized by a [`GedcDialect`]: line-length policy,
//! token alphabets, leading-zero tolerance, and `@#` escape handling. Two
//! presets cover the formats in the wild — [`GEDCOM5`] for the 5.x family
//! and [`GEDCOM7`] for FamilySearch GEDCOM 7.
//!
//! Scanning always enforces the universal minima below; a dialect's `tag`,
//! `xref`, and `payload` expressions further constrain the captured tokens
//! and are checked token-by-token so that violations produce a diagnostic
//! naming the offending token rather than an opaque unparseable region.

use once_cell::sync::Lazy;
use regex::Regex;

/// Universal tag alphabet: anything but `@`, controls, and separators
/// leads; controls and separators stay excluded throughout.
pub const UNIVERSAL_TAG: &str = r"[^@\p{Cc}\p{Z}][^\p{Cc}\p{Z}]*";

/// Universal cross-reference identifier alphabet.
pub const UNIVERSAL_XREF: &str = r"(?:[^@#\p{Cc}]|\t)(?:[^@\p{Cc}]|\t)*";

/// Universal inter-token delimiter.
pub const UNIVERSAL_DELIM: &str = r"[ \t\p{Zs}]+";

/// Universal line separator: one line break plus any following whitespace.
pub const UNIVERSAL_LINESEP: &str = r"[\n\r]\p{White_Space}*";

/// Universal payload: any run free of control characters (tab allowed).
pub const UNIVERSAL_PAYLOAD: &str = r"(?:[^\p{Cc}]|\t)*";

/// Raw dialect parameters. Token members are regular-expression fragments;
/// they are compiled (anchored) by [`GedcDialect::new`].
#[derive(Debug, Clone)]
pub struct DialectConfig {
    /// Line length policy: positive wraps long lines with CONC to this
    /// width, `0` means unlimited, negative means unlimited *and* CONC is
    /// forbidden on input.
    pub len: i64,
    /// Tag alphabet fragment.
    pub tag: String,
    /// Cross-reference identifier alphabet fragment.
    pub xref: String,
    /// Delimiter fragment (between tokens on a line).
    pub delim: String,
    /// Line separator fragment.
    pub linesep: String,
    /// Payload alphabet fragment.
    pub payload: String,
    /// Whether leading zeros on level numbers are tolerated silently.
    pub zeros: bool,
    /// Whether payloads beginning `@#` keep their single `@` on output.
    /// Both `@#…` and `@@#…` decode to the same text either way.
    pub escapes: bool,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            len: 0,
            tag: UNIVERSAL_TAG.to_string(),
            xref: UNIVERSAL_XREF.to_string(),
            delim: UNIVERSAL_DELIM.to_string(),
            linesep: UNIVERSAL_LINESEP.to_string(),
            payload: UNIVERSAL_PAYLOAD.to_string(),
            zeros: true,
            escapes: true,
        }
    }
}

/// A compiled dialect, ready for parsing and serialization.
#[derive(Debug, Clone)]
pub struct GedcDialect {
    len: i64,
    zeros: bool,
    escapes: bool,
    tag_re: Regex,
    xref_re: Regex,
    payload_re: Regex,
    line_re: Regex,
}

impl GedcDialect {
    /// Compiles a dialect from raw parameters.
    ///
    /// Fails only when a supplied fragment is not a valid regular
    /// expression.
    pub fn new(config: DialectConfig) -> Result<GedcDialect, regex::Error> {
        let anchored = |frag: &str| Regex::new(&format!("^(?:{})$", frag));
        let line = format!(
            r"(?P<level>[0-9]+)(?:{delim})(?:@(?P<xref>{xref})@(?:{delim}))?(?P<tag>{tag})(?:(?:{delim})(?:@(?P<ptr>{xref})@|(?P<payload>{payload})))?(?:{linesep}|\z)",
            delim = config.delim,
            linesep = config.linesep,
            xref = UNIVERSAL_XREF,
            tag = UNIVERSAL_TAG,
            payload = UNIVERSAL_PAYLOAD,
        );
        Ok(GedcDialect {
            len: config.len,
            zeros: config.zeros,
            escapes: config.escapes,
            tag_re: anchored(&config.tag)?,
            xref_re: anchored(&config.xref)?,
            payload_re: anchored(&config.payload)?,
            line_re: Regex::new(&line)?,
        })
    }

    /// The line length policy (see [`DialectConfig::len`]).
    pub fn len(&self) -> i64 {
        self.len
    }

    /// Whether CONC splices are acceptable on input.
    pub fn conc_allowed(&self) -> bool {
        self.len >= 0
    }

    /// Whether leading zeros on level numbers pass silently.
    pub fn zeros(&self) -> bool {
        self.zeros
    }

    /// Whether `@#…` payloads serialize without doubling the `@`.
    pub fn escapes(&self) -> bool {
        self.escapes
    }

    pub(crate) fn line_re(&self) -> &Regex {
        &self.line_re
    }

    pub(crate) fn valid_tag(&self, tag: &str) -> bool {
        self.tag_re.is_match(tag)
    }

    pub(crate) fn valid_xref(&self, xref: &str) -> bool {
        self.xref_re.is_match(xref)
    }

    pub(crate) fn valid_payload(&self, payload: &str) -> bool {
        self.payload_re.is_match(payload)
    }
}

/// GEDCOM 5.x: 255-character lines wrapped with CONC, alphanumeric tags and
/// identifiers, `@#…@` escapes, leading zeros tolerated.
pub static GEDCOM5: Lazy<GedcDialect> = Lazy::new(|| {
    GedcDialect::new(DialectConfig {
        len: 255,
        tag: "[0-9A-Za-z_]+".to_string(),
        xref: "[0-9A-Za-z_][^@#\\p{Cc}]*".to_string(),
        delim: "[ \\t]+".to_string(),
        payload: "(?:[^\\p{Cc}]|\\t)*".to_string(),
        zeros: true,
        escapes: true,
        ..DialectConfig::default()
    })
    .expect("GEDCOM 5.x preset compiles")
});

/// GEDCOM 7: unlimited lines, CONC forbidden, uppercase tag and identifier
/// alphabets, no `@#` escapes, no leading zeros.
pub static GEDCOM7: Lazy<GedcDialect> = Lazy::new(|| {
    GedcDialect::new(DialectConfig {
        len: -1,
        tag: "(?:[A-Z]|_[A-Z0-9_])[A-Z0-9_]*".to_string(),
        xref: "[A-Z0-9_]+".to_string(),
        delim: " ".to_string(),
        payload: "[^\\p{Cc}]*".to_string(),
        zeros: false,
        escapes: false,
        ..DialectConfig::default()
    })
    .expect("GEDCOM 7 preset compiles")
});
