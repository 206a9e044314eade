//! The error taxonomy shared by the store and the GraphQL API.
//!
//! Business code does not need to know anything about GraphQL: it returns
//! `anyhow::Error`s like everything else. If such an error is (or wraps) a
//! [`StoreError`], its kind, severity, message and reasons are reported to the
//! client. Every other error is reported as a generic internal error and its
//! message never leaves the server. The single place where this happens is
//! [`classify`].

use juniper::{GraphQLEnum, GraphQLObject};
use serde::Serialize;


/// Coarse classification of an error. Exposed in the API as `ErrorType`.
///
/// The API names are spelled out: juniper's `camelCase` renaming keeps the
/// first letter of variants upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, GraphQLEnum)]
#[serde(rename_all = "camelCase")]
#[graphql(name = "ErrorType")]
pub(crate) enum ErrorKind {
    /// Something went wrong on our side. Details are only logged.
    #[graphql(name = "internal")]
    Internal,
    /// The caller could not be identified (or has to be).
    #[graphql(name = "authentication")]
    Authentication,
    /// The caller is known, but not allowed to do this.
    #[graphql(name = "authorization")]
    Authorization,
    #[graphql(name = "notFound")]
    NotFound,
    #[graphql(name = "notImplemented")]
    NotImplemented,
    /// The input is invalid. See `reasons` for details.
    #[graphql(name = "validation")]
    Validation,
}

impl ErrorKind {
    /// The severity an error of this kind gets unless specified otherwise.
    pub(crate) fn default_severity(self) -> Severity {
        match self {
            Self::Authentication | Self::Authorization | Self::Validation => Severity::Warning,
            Self::Internal | Self::NotFound | Self::NotImplemented => Severity::Failure,
        }
    }

    /// The message an error of this kind gets unless specified otherwise.
    pub(crate) fn default_message(self) -> &'static str {
        match self {
            Self::Internal => "Internal error",
            Self::Authentication => "Authentication error",
            Self::Authorization => "Authorization error",
            Self::NotFound => "Not found",
            Self::NotImplemented => "Not implemented",
            Self::Validation => "Validation error",
        }
    }

    /// Creates an error of this kind with the default message.
    pub(crate) fn error(self) -> StoreError {
        StoreError::new(self, self.default_message())
    }
}

/// Exposed in the API as `ErrorSeverity`, with the values `error` and
/// `warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, GraphQLEnum)]
#[graphql(name = "ErrorSeverity")]
pub(crate) enum Severity {
    // Not called `Error`: that name clashes with `FromInputValue::Error`
    // in the derived code.
    #[graphql(name = "error")]
    #[serde(rename = "error")]
    Failure,
    #[graphql(name = "warning")]
    #[serde(rename = "warning")]
    Warning,
}

/// One detail of a validation error, e.g. a single invalid input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, GraphQLObject)]
pub(crate) struct ErrorReason {
    /// Path of the offending input, e.g. `input.title`.
    pub(crate) path: String,
    pub(crate) message: String,
    /// Optional machine readable code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) reason: Option<String>,
}

/// The error as reported to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, GraphQLObject)]
#[graphql(name = "Error")]
pub(crate) struct ErrorRecord {
    #[graphql(name = "type")]
    #[serde(rename = "type")]
    pub(crate) kind: ErrorKind,
    pub(crate) severity: Severity,
    pub(crate) message: String,
    /// Only set for validation errors with at least one reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) reasons: Option<Vec<ErrorReason>>,
}

impl ErrorRecord {
    /// The record every unrecognized error turns into.
    pub(crate) fn internal() -> Self {
        Self::from(&ErrorKind::Internal.error())
    }
}

impl From<&StoreError> for ErrorRecord {
    fn from(src: &StoreError) -> Self {
        Self {
            kind: src.kind,
            severity: src.severity,
            message: src.message.clone(),
            reasons: Some(src.reasons.clone()).filter(|r| !r.is_empty()),
        }
    }
}


/// An error that is meant to be seen by the API client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub(crate) struct StoreError {
    kind: ErrorKind,
    severity: Severity,
    message: String,
    reasons: Vec<ErrorReason>,
}

impl StoreError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            reasons: vec![],
        }
    }

    pub(crate) fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub(crate) fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub(crate) fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub(crate) fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Appends a reason. Reasons keep the order in which they were added.
    pub(crate) fn add_reason(self, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.push_reason(path.into(), message.into(), None)
    }

    /// Like [`Self::add_reason`], but with a machine readable reason code.
    pub(crate) fn add_coded_reason(
        self,
        path: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        self.push_reason(path.into(), message.into(), Some(code.into()))
    }

    fn push_reason(mut self, path: String, message: String, reason: Option<String>) -> Self {
        self.reasons.push(ErrorReason { path, message, reason });
        self
    }
}

// Outside of tests, errors are only inspected through `classify`.
#[cfg(test)]
impl StoreError {
    pub(crate) fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub(crate) fn severity(&self) -> Severity {
        self.severity
    }

    pub(crate) fn message(&self) -> &str {
        &self.message
    }
}

impl From<ErrorKind> for StoreError {
    fn from(kind: ErrorKind) -> Self {
        kind.error()
    }
}


/// Maps any error to the record reported to the client.
///
/// The whole cause chain is searched for a [`StoreError`], so adding context
/// to a typed error does not change how it is reported.
pub(crate) fn classify(err: &anyhow::Error) -> ErrorRecord {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<StoreError>())
        .map(ErrorRecord::from)
        .unwrap_or_else(ErrorRecord::internal)
}
