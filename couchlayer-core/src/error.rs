//! Error types and result types for driver operations.
//!
//! Every failure crossing the driver boundary is a [`DriverError`]. Each variant maps to
//! exactly one protocol [`Status`], and [`ErrorBody`] is the `{error, reason}` shape the
//! HTTP layer writes on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use std::fmt;
use thiserror::Error;

/// Protocol status attached to every driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The request was malformed.
    BadRequest,
    /// The caller is not authenticated.
    Unauthorized,
    /// The caller is authenticated but not allowed to perform the operation.
    Forbidden,
    /// The database, document, attachment or index does not exist.
    NotFound,
    /// A document update conflicted with the current revision.
    Conflict,
    /// A precondition, such as "database must not exist", did not hold.
    PreconditionFailed,
    /// The governing context was cancelled or its deadline expired.
    Cancelled,
    /// The backend failed unexpectedly.
    InternalServerError,
    /// The backend does not provide the operation and it cannot be emulated.
    NotImplemented,
}

impl Status {
    /// All statuses, in code order.
    pub const ALL: [Status; 9] = [
        Status::BadRequest,
        Status::Unauthorized,
        Status::Forbidden,
        Status::NotFound,
        Status::Conflict,
        Status::PreconditionFailed,
        Status::Cancelled,
        Status::InternalServerError,
        Status::NotImplemented,
    ];

    /// Returns the numeric protocol code.
    pub fn code(&self) -> u16 {
        match self {
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::Conflict => 409,
            Status::PreconditionFailed => 412,
            Status::Cancelled => 499,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
        }
    }

    /// Returns the short code written in the `error` field of a wire error body.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Status::BadRequest => "bad_request",
            Status::Unauthorized => "unauthorized",
            Status::Forbidden => "forbidden",
            Status::NotFound => "not_found",
            Status::Conflict => "conflict",
            Status::PreconditionFailed => "precondition_failed",
            Status::Cancelled => "cancelled",
            Status::InternalServerError => "internal_server_error",
            Status::NotImplemented => "not_implemented",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.wire_name())
    }
}

/// Returned when a numeric code has no [`Status`] counterpart.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unknown status code: {0}")]
pub struct UnknownStatus(pub u16);

impl TryFrom<u16> for Status {
    type Error = UnknownStatus;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Status::ALL
            .into_iter()
            .find(|status| status.code() == code)
            .ok_or(UnknownStatus(code))
    }
}

/// Represents all possible errors a driver or the emulation layer can report.
///
/// The wrapped string is the human-readable reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// A specialized `Result` type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    /// Builds an error from a status and a reason.
    pub fn new(status: Status, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match status {
            Status::BadRequest => DriverError::BadRequest(reason),
            Status::Unauthorized => DriverError::Unauthorized(reason),
            Status::Forbidden => DriverError::Forbidden(reason),
            Status::NotFound => DriverError::NotFound(reason),
            Status::Conflict => DriverError::Conflict(reason),
            Status::PreconditionFailed => DriverError::PreconditionFailed(reason),
            Status::Cancelled => DriverError::Cancelled(reason),
            Status::InternalServerError => DriverError::Internal(reason),
            Status::NotImplemented => DriverError::NotImplemented(reason),
        }
    }

    /// Returns the protocol status of this error.
    pub fn status(&self) -> Status {
        match self {
            DriverError::BadRequest(_) => Status::BadRequest,
            DriverError::Unauthorized(_) => Status::Unauthorized,
            DriverError::Forbidden(_) => Status::Forbidden,
            DriverError::NotFound(_) => Status::NotFound,
            DriverError::Conflict(_) => Status::Conflict,
            DriverError::PreconditionFailed(_) => Status::PreconditionFailed,
            DriverError::Cancelled(_) => Status::Cancelled,
            DriverError::Internal(_) => Status::InternalServerError,
            DriverError::NotImplemented(_) => Status::NotImplemented,
        }
    }

    /// Returns the human-readable reason.
    pub fn reason(&self) -> &str {
        match self {
            DriverError::BadRequest(reason)
            | DriverError::Unauthorized(reason)
            | DriverError::Forbidden(reason)
            | DriverError::NotFound(reason)
            | DriverError::Conflict(reason)
            | DriverError::PreconditionFailed(reason)
            | DriverError::Cancelled(reason)
            | DriverError::Internal(reason)
            | DriverError::NotImplemented(reason) => reason,
        }
    }

    pub fn is_not_implemented(&self) -> bool {
        self.status() == Status::NotImplemented
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == Status::Cancelled
    }

    /// Converts this error into the body written on the wire.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.status().wire_name().to_string(),
            reason: self.reason().to_string(),
        }
    }
}

impl From<SerdeJsonError> for DriverError {
    fn from(err: SerdeJsonError) -> Self {
        DriverError::BadRequest(err.to_string())
    }
}

/// CouchDB-formatted error body: `{"error": "not_found", "reason": "missing"}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub reason: String,
}

impl From<&DriverError> for ErrorBody {
    fn from(err: &DriverError) -> Self {
        err.to_body()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_code() {
        for status in Status::ALL {
            assert_eq!(Status::try_from(status.code()), Ok(status));
        }
    }

    #[test]
    fn test_unknown_code_is_rejected() {
        assert_eq!(Status::try_from(418), Err(UnknownStatus(418)));
        assert_eq!(Status::try_from(200), Err(UnknownStatus(200)));
    }

    #[test]
    fn test_new_preserves_status_and_reason() {
        for status in Status::ALL {
            let err = DriverError::new(status, "because");
            assert_eq!(err.status(), status);
            assert_eq!(err.reason(), "because");
        }
    }

    #[test]
    fn test_wire_body() {
        let err = DriverError::NotFound("missing".into());
        let body = serde_json::to_value(err.to_body()).unwrap();

        assert_eq!(
            body,
            serde_json::json!({ "error": "not_found", "reason": "missing" })
        );
    }

    #[test]
    fn test_json_errors_are_bad_requests() {
        let err: DriverError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.status(), Status::BadRequest);
    }
}
