//! Classify store errors as transient or fatal by signature pattern.

use regex::Regex;

use super::error::StoreError;
use crate::config::ConfigError;

/// Patterns matched against `"{signature}: {message}"` when no list is configured.
///
/// Covers connection failures, timeouts, read resets, and the server
/// terminating a pooled connection.
pub const DEFAULT_MATCH_PATTERNS: &[&str] = &[
    r"^DatabaseError: terminating connection",
    r"^ConnectionResetError",
    r"^ConnectionError",
    r"^ConnectionRefusedError",
    r"^HostNotFoundError",
    r"^HostNotReachableError",
    r"^InvalidConnectionError",
    r"^ConnectionTimedOutError",
];

/// Classification of a store error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Matched a configured signature; worth retrying.
    Transient,
    /// Anything else (constraint violation, malformed query, ...). Never retried.
    Fatal,
}

/// Ordered set of compiled error-signature matchers.
#[derive(Debug, Clone)]
pub struct SignatureMatchers {
    patterns: Vec<Regex>,
}

impl SignatureMatchers {
    /// Compile `patterns` in order. An unparseable pattern is a startup error.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| ConfigError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Classify an error: transient if any matcher hits, fatal otherwise.
    pub fn classify(&self, error: &StoreError) -> ErrorKind {
        let text = error.to_string();
        if self.patterns.iter().any(|re| re.is_match(&text)) {
            ErrorKind::Transient
        } else {
            ErrorKind::Fatal
        }
    }
}

impl Default for SignatureMatchers {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_MATCH_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patterns_all_compile() {
        assert_eq!(SignatureMatchers::default().len(), DEFAULT_MATCH_PATTERNS.len());
        assert!(SignatureMatchers::new(DEFAULT_MATCH_PATTERNS).is_ok());
    }

    #[test]
    fn connection_failures_are_transient() {
        let m = SignatureMatchers::default();
        for sig in [
            "ConnectionRefusedError",
            "ConnectionResetError",
            "ConnectionTimedOutError",
            "HostNotFoundError",
            "InvalidConnectionError",
            "ConnectionError",
        ] {
            assert_eq!(
                m.classify(&StoreError::new(sig, "boom")),
                ErrorKind::Transient,
                "{sig}"
            );
        }
    }

    #[test]
    fn terminating_connection_is_transient_but_other_database_errors_are_fatal() {
        let m = SignatureMatchers::default();
        let terminating = StoreError::new(
            "DatabaseError",
            "terminating connection due to administrator command",
        );
        assert_eq!(m.classify(&terminating), ErrorKind::Transient);

        let constraint = StoreError::new(
            "DatabaseError",
            "duplicate key value violates unique constraint",
        );
        assert_eq!(m.classify(&constraint), ErrorKind::Fatal);
        assert_eq!(
            m.classify(&StoreError::new("QueryError", "syntax error")),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn custom_patterns_replace_defaults() {
        let m = SignatureMatchers::new(&["timeout"]).unwrap();
        assert_eq!(
            m.classify(&StoreError::new("QueryError", "statement timeout")),
            ErrorKind::Transient
        );
        assert_eq!(
            m.classify(&StoreError::new("ConnectionRefusedError", "refused")),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = SignatureMatchers::new(&["(unclosed"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
