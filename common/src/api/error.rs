// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for VIM driver plugins
//!
//! For HTTP-level error handling, see Dropshot.

use dropshot::HttpError;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// An error that can be generated while servicing an invocation
///
/// These may be produced by the dispatch layer itself (unknown operation
/// name, malformed argument list) or by the driver implementation servicing
/// the call.  At the dispatch boundary every `Error` is flattened into a
/// [`Fault`] and returned to the orchestrator inside the response envelope;
/// none of them crash a worker.
///
/// Where possible, reuse an existing variant rather than inventing a new one:
/// the orchestrator only distinguishes cases it can act on differently.
#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq, Serialize)]
pub enum Error {
    /// The operation name is not part of the driver contract.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },
    /// The argument list does not match the operation's declared parameters.
    #[error("invalid arguments for {operation}: {message}")]
    InvalidArguments { operation: String, message: String },
    /// The resource targeted by a lookup or update does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },
    /// The VIM (or the path to it) is temporarily unavailable.
    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },
    /// A wait-variant operation ran out of its polling deadline.
    #[error("deadline exceeded: {message}")]
    DeadlineExceeded { message: String },
    /// The caller abandoned the request before a response was produced.
    #[error("request cancelled by caller")]
    Cancelled,
    /// The VIM rejected the request permanently (validation, permissions,
    /// quota).
    #[error("backend rejected request: {message}")]
    BackendRejected { message: String },
}

impl Error {
    /// Returns whether the condition is likely transient and the orchestrator
    /// could reasonably retry the request as-is
    pub fn retryable(&self) -> bool {
        match self {
            Error::BackendUnavailable { .. }
            | Error::DeadlineExceeded { .. } => true,

            Error::UnsupportedOperation { .. }
            | Error::InvalidArguments { .. }
            | Error::NotFound { .. }
            | Error::Cancelled
            | Error::BackendRejected { .. } => false,
        }
    }

    /// Returns the wire discriminant for this error
    pub fn kind(&self) -> FaultKind {
        match self {
            Error::UnsupportedOperation { .. } => {
                FaultKind::UnsupportedOperation
            }
            Error::InvalidArguments { .. } => FaultKind::InvalidArguments,
            Error::NotFound { .. } => FaultKind::NotFound,
            Error::BackendUnavailable { .. } => FaultKind::BackendUnavailable,
            Error::DeadlineExceeded { .. } => FaultKind::DeadlineExceeded,
            Error::Cancelled => FaultKind::Cancelled,
            Error::BackendRejected { .. } => FaultKind::BackendRejected,
        }
    }

    /// Generates an [`Error::UnsupportedOperation`] for the named operation.
    pub fn unsupported_operation(operation: &str) -> Error {
        Error::UnsupportedOperation { operation: operation.to_owned() }
    }

    /// Generates an [`Error::InvalidArguments`] error naming the operation
    /// whose argument list could not be decoded and what was wrong with it.
    pub fn invalid_args(operation: &str, message: &str) -> Error {
        Error::InvalidArguments {
            operation: operation.to_owned(),
            message: message.to_owned(),
        }
    }

    /// Generates an [`Error::NotFound`] error describing the missing target.
    pub fn not_found(what: &str) -> Error {
        Error::NotFound { what: what.to_owned() }
    }

    /// Generates an [`Error::BackendUnavailable`] error with the specific
    /// message
    ///
    /// This should be used for transient failures where the orchestrator
    /// might be expected to retry.  Conditions that a retry cannot fix should
    /// be [`Error::BackendRejected`] instead.
    pub fn unavail(message: &str) -> Error {
        Error::BackendUnavailable { message: message.to_owned() }
    }

    /// Generates an [`Error::DeadlineExceeded`] error with the specific
    /// message.
    pub fn deadline_exceeded(message: &str) -> Error {
        Error::DeadlineExceeded { message: message.to_owned() }
    }

    /// Generates an [`Error::BackendRejected`] error with the specific
    /// message.
    pub fn rejected(message: &str) -> Error {
        Error::BackendRejected { message: message.to_owned() }
    }
}

/// Discriminant of an [`Error`], as it appears in a [`Fault`] descriptor
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "camelCase")]
pub enum FaultKind {
    UnsupportedOperation,
    InvalidArguments,
    NotFound,
    BackendUnavailable,
    DeadlineExceeded,
    Cancelled,
    BackendRejected,
}

impl FaultKind {
    pub fn label(&self) -> &'static str {
        match self {
            FaultKind::UnsupportedOperation => "unsupportedOperation",
            FaultKind::InvalidArguments => "invalidArguments",
            FaultKind::NotFound => "notFound",
            FaultKind::BackendUnavailable => "backendUnavailable",
            FaultKind::DeadlineExceeded => "deadlineExceeded",
            FaultKind::Cancelled => "cancelled",
            FaultKind::BackendRejected => "backendRejected",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The wire form of an [`Error`]: what the orchestrator sees
///
/// Only the kind, a human-readable message, and the retryable flag cross the
/// boundary.  Backend stack traces and other internal detail do not.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub retryable: bool,
}

impl From<Error> for Fault {
    fn from(error: Error) -> Fault {
        Fault {
            kind: error.kind(),
            message: error.to_string(),
            retryable: error.retryable(),
        }
    }
}

impl From<Error> for HttpError {
    /// Converts an `Error` into an `HttpError`.  This is only used on paths
    /// where no response envelope can be produced (e.g. the request never
    /// reached a worker); faults from the driver ride inside the envelope
    /// instead.
    fn from(error: Error) -> HttpError {
        let error_code = Some(error.kind().label().to_string());
        match &error {
            Error::BackendUnavailable { .. }
            | Error::DeadlineExceeded { .. }
            | Error::Cancelled => {
                HttpError::for_unavail(error_code, error.to_string())
            }

            Error::UnsupportedOperation { .. }
            | Error::InvalidArguments { .. }
            | Error::NotFound { .. }
            | Error::BackendRejected { .. } => {
                HttpError::for_bad_request(error_code, error.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        // Result marshalling is not something a retry will fix.
        Error::rejected(&format!("marshalling failed: {}", e))
    }
}

#[cfg(test)]
mod test {
    use super::Error;
    use super::Fault;
    use super::FaultKind;

    #[test]
    fn test_retryable_flags() {
        let cases = [
            (Error::unsupported_operation("frobnicate"), false),
            (Error::invalid_args("createNetwork", "missing network"), false),
            (Error::not_found("network \"net_id_1\""), false),
            (Error::unavail("connection refused"), true),
            (Error::deadline_exceeded("server never became ACTIVE"), true),
            (Error::Cancelled, false),
            (Error::rejected("quota exhausted"), false),
        ];
        for (error, retryable) in cases {
            assert_eq!(
                error.retryable(),
                retryable,
                "wrong retryable flag for {:?}",
                error
            );
        }
    }

    #[test]
    fn test_fault_flattening() {
        let fault = Fault::from(Error::unavail("connection refused"));
        assert_eq!(fault.kind, FaultKind::BackendUnavailable);
        assert!(fault.retryable);
        assert_eq!(fault.message, "backend unavailable: connection refused");
    }

    #[test]
    fn test_fault_wire_form() {
        let fault = Fault::from(Error::not_found("image \"img_id_3\""));
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "kind": "notFound",
                "message": "not found: image \"img_id_3\"",
                "retryable": false,
            })
        );
    }
}
