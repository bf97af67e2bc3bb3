//! Diagnostic collection for recoverable failures.
//!
//! The parser, the schema lookup, and the validator all report through a
//! [`Diagnostics`] value: errors for well-formedness and validity failures,
//! warnings for stylistic and compatibility issues. Messages are recorded
//! in document order and deduplicated by content, so a repeated incident
//! (say, the same undocumented extension tag on every line) surfaces once,
//! at its first occurrence.

use rustc_hash::FxHashSet;

/// Ordered error/warning collector with content dedup and scoped prefixes.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<String>,
    warnings: Vec<String>,
    seen: FxHashSet<String>,
    prefixes: Vec<String>,
}

impl Diagnostics {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error. The active prefixes are prepended; a message that
    /// was already recorded (as error or warning) is dropped.
    pub fn error(&mut self, msg: impl AsRef<str>) {
        let full = self.compose(msg.as_ref());
        if self.seen.insert(full.clone()) {
            self.errors.push(full);
        }
    }

    /// Records a warning, with the same prefixing and dedup as [`error`].
    ///
    /// [`error`]: Diagnostics::error
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        let full = self.compose(msg.as_ref());
        if self.seen.insert(full.clone()) {
            self.warnings.push(full);
        }
    }

    /// All recorded errors, in emission order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// All recorded warnings, in emission order.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Number of errors recorded so far. Validation passes report their
    /// result as the difference of this count across the pass.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// True if no errors have been recorded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Pushes a message prefix that applies to every subsequent report
    /// until the matching [`pop_prefix`].
    ///
    /// [`pop_prefix`]: Diagnostics::pop_prefix
    pub fn push_prefix(&mut self, prefix: impl Into<String>) {
        self.prefixes.push(prefix.into());
    }

    /// Removes the most recently pushed prefix.
    pub fn pop_prefix(&mut self) {
        self.prefixes.pop();
    }

    /// Forgets all recorded messages and dedup state. Prefixes survive.
    pub fn clear(&mut self) {
        self.errors.clear();
        self.warnings.clear();
        self.seen.clear();
    }

    fn compose(&self, msg: &str) -> String {
        if self.prefixes.is_empty() {
            return msg.to_string();
        }
        let mut full = String::with_capacity(msg.len() + 16);
        for p in &self.prefixes {
            full.push_str(p);
        }
        full.push_str(msg);
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_by_content() {
        let mut diag = Diagnostics::new();
        diag.error("bad tag");
        diag.error("bad tag");
        diag.warn("bad tag");
        assert_eq!(diag.errors(), ["bad tag"]);
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn test_prefix_scoping() {
        let mut diag = Diagnostics::new();
        diag.push_prefix("https://example.com/FOO: ");
        diag.error("invalid payload");
        diag.pop_prefix();
        diag.error("invalid payload");
        assert_eq!(
            diag.errors(),
            ["https://example.com/FOO: invalid payload", "invalid payload"]
        );
    }

    #[test]
    fn test_error_count_delta() {
        let mut diag = Diagnostics::new();
        diag.error("one");
        let before = diag.error_count();
        diag.error("two");
        diag.error("two");
        diag.warn("three");
        assert_eq!(diag.error_count() - before, 1);
    }
}
