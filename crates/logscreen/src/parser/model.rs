use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::serde_utils::{deserialize_duration_ms, serialize_duration_ms};
use crate::filter::TermId;

/// Terminal outcome of a parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    None,
    /// A banned term was found in the log.
    PolicyViolation,
    /// The byte ceiling was reached.
    SizeLimit,
    /// No source handler claimed the attachment.
    UnsupportedFormat,
    /// Cancelled by the caller or by the parse timeout.
    Cancelled,
    /// Producer failure, parser panic or anything else unexpected.
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::None => "none",
            ErrorCode::PolicyViolation => "policy_violation",
            ErrorCode::SizeLimit => "size_limit",
            ErrorCode::UnsupportedFormat => "unsupported_format",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::UnknownError => "unknown_error",
        }
    }

    pub fn is_error(&self) -> bool {
        *self != ErrorCode::None
    }

    /// Message suitable for showing to the uploader.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCode::None => "Log parsed successfully.",
            ErrorCode::PolicyViolation => {
                "This log contains content that is not allowed here. Please use a legally obtained copy and upload a fresh log."
            }
            ErrorCode::SizeLimit => {
                "This log is too large to analyze. Please reproduce the issue with a fresh start and upload the new, smaller log."
            }
            ErrorCode::UnsupportedFormat => "This attachment type is not supported.",
            ErrorCode::Cancelled => "Log analysis was cancelled.",
            ErrorCode::UnknownError => "Something went wrong while analyzing this log.",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Banned term hit recorded on `PolicyViolation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub term_id: TermId,
    pub term: String,
    /// Bounded excerpt of the offending line.
    pub context: String,
    /// 1-based line number.
    pub line: u64,
}

/// Structured outcome of analyzing one attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Name of the source handler that produced the bytes.
    pub handler: Option<String>,
    pub error: ErrorCode,
    /// Sections that reached their end trigger, in order.
    pub completed_sections: Vec<String>,
    /// Section that was open when the stream ended.
    pub incomplete_section: Option<String>,
    pub fields: BTreeMap<String, String>,
    pub multi_values: BTreeMap<String, Vec<String>>,
    pub hit_counts: BTreeMap<String, u64>,
    pub categories: BTreeMap<String, BTreeSet<String>>,
    pub bytes_read: u64,
    pub bytes_total: Option<u64>,
    pub lines_read: u64,
    #[serde(serialize_with = "serialize_duration_ms", deserialize_with = "deserialize_duration_ms")]
    pub elapsed: Duration,
    pub violation: Option<PolicyViolation>,
}

impl ParseResult {
    /// Empty result carrying only an error code.
    pub fn failed(error: ErrorCode) -> Self {
        Self { error, ..Default::default() }
    }

    pub fn is_success(&self) -> bool {
        !self.error.is_error()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn user_message(&self) -> String {
        match (&self.error, &self.violation) {
            (ErrorCode::PolicyViolation, Some(v)) => {
                format!("{} (matched term #{})", self.error.user_message(), v.term_id)
            }
            (ErrorCode::SizeLimit, _) => {
                format!("{} Stopped after {} bytes.", self.error.user_message(), self.bytes_read)
            }
            _ => self.error.user_message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&ErrorCode::PolicyViolation).unwrap(), "\"policy_violation\"");
        assert_eq!(ErrorCode::UnknownError.to_string(), "unknown_error");
    }

    #[test]
    fn test_default_result_is_success() {
        let r = ParseResult::default();
        assert!(r.is_success());
        assert_eq!(r.error, ErrorCode::None);
    }

    #[test]
    fn test_user_message_for_policy_violation_names_term_id_only() {
        let r = ParseResult {
            error: ErrorCode::PolicyViolation,
            violation: Some(PolicyViolation {
                term_id: 7,
                term: "secret".into(),
                context: "line with secret".into(),
                line: 3,
            }),
            ..Default::default()
        };
        let msg = r.user_message();
        assert!(msg.contains("#7"));
        assert!(!msg.contains("secret"));
    }

    #[test]
    fn test_user_message_generic_for_unknown_error() {
        let r = ParseResult::failed(ErrorCode::UnknownError);
        assert_eq!(r.user_message(), ErrorCode::UnknownError.user_message());
    }

    #[test]
    fn test_result_json_has_elapsed_millis() {
        let r = ParseResult { elapsed: Duration::from_millis(42), ..Default::default() };
        let json: serde_json::Value = serde_json::to_value(&r).unwrap();
        assert_eq!(json["elapsed"], 42);
        assert_eq!(json["error"], "none");
    }
}
