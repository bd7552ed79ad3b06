use super::node::TextRange;
use thiserror::Error;

/// Errors raised while turning filter expression text into a filter tree.
///
/// Every variant pinpoints the offending substring of the expression so a
/// caller can underline it. Nothing here is raised during matching: a
/// malformed expression is rejected before any record is scanned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
        range: TextRange,
    },

    #[error("unknown filter key '{key}'. Valid keys are: tag, package (app), message (msg), line, process, level, age, is, name")]
    UnknownKey { key: String, range: TextRange },

    #[error("unknown log level '{value}'. Valid levels are: VERBOSE, DEBUG, INFO, WARN, ERROR, ASSERT")]
    InvalidLevel { value: String, range: TextRange },

    #[error("invalid age '{value}'. Expected a number followed by s, m, h or d (e.g. 30s, 5m)")]
    InvalidAge { value: String, range: TextRange },

    #[error("unknown qualifier '{value}'. Valid qualifiers are: is:crash, is:stacktrace")]
    InvalidQualifier { value: String, range: TextRange },

    #[error("empty value for '{key}:'")]
    EmptyValue { key: String, range: TextRange },

    #[error("'{key}:' cannot be negated")]
    InvalidNegation { key: String, range: TextRange },

    #[error("unbalanced parenthesis")]
    UnbalancedParen { range: TextRange },

    #[error("expected a filter term")]
    MissingTerm { range: TextRange },
}

impl FilterParseError {
    /// The range of the expression text this error refers to.
    pub fn range(&self) -> TextRange {
        match self {
            FilterParseError::InvalidRegex { range, .. }
            | FilterParseError::UnknownKey { range, .. }
            | FilterParseError::InvalidLevel { range, .. }
            | FilterParseError::InvalidAge { range, .. }
            | FilterParseError::InvalidQualifier { range, .. }
            | FilterParseError::EmptyValue { range, .. }
            | FilterParseError::InvalidNegation { range, .. }
            | FilterParseError::UnbalancedParen { range }
            | FilterParseError::MissingTerm { range } => *range,
        }
    }
}
