//! Domain Errors
//!
//! A single error type with a closed set of kinds. Callers branch on
//! [`ServiceError::kind`] instead of comparing against sentinel values.

use std::fmt;
use std::time::Duration;

/// Classification of every failure the service can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input rejected before touching any collaborator
    InvalidArgument,
    /// Neither the cache nor the durable store holds the identity
    NotFound,
    /// The durable store already holds a row with this identity
    AlreadyExists,
    /// Renting a DVD that is already rented
    DvdNotAvailable,
    /// Returning a DVD that is not rented
    DvdNotRented,
    /// Rejected by the rate limiter; try later
    Throttled,
    /// Short-circuited by an open circuit breaker
    CircuitOpen,
    /// Error reported in-band by the remote service
    Remote,
    /// Durable store, cache or transport unreachable or failing
    Infra,
    /// The call ran past its deadline
    DeadlineExceeded,
    /// The caller cancelled the call
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::DvdNotAvailable => "dvd_not_available",
            ErrorKind::DvdNotRented => "dvd_not_rented",
            ErrorKind::Throttled => "throttled",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Remote => "remote",
            ErrorKind::Infra => "infra",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether a failure of this kind counts against a circuit breaker.
    pub fn trips_breaker(&self) -> bool {
        matches!(self, ErrorKind::Infra | ErrorKind::DeadlineExceeded)
    }

    /// Whether the caller may reasonably retry. Nothing retries internally.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Infra
                | ErrorKind::DeadlineExceeded
                | ErrorKind::Throttled
                | ErrorKind::CircuitOpen
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by repositories, proxies and services.
///
/// `Display` prints only the message; that string is what crosses the wire
/// to remote callers, so it is never empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = kind.as_str().to_string();
        }
        Self { kind, message }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("{} {} not found", collection, id))
    }

    pub fn already_exists(collection: &str, id: &str) -> Self {
        Self::new(
            ErrorKind::AlreadyExists,
            format!("{} {} already exists", collection, id),
        )
    }

    pub fn dvd_not_available(id: &str) -> Self {
        Self::new(ErrorKind::DvdNotAvailable, format!("dvd {} not available", id))
    }

    pub fn dvd_not_rented(id: &str) -> Self {
        Self::new(ErrorKind::DvdNotRented, format!("dvd {} is not rented", id))
    }

    pub fn throttled(operation: &str, retry_after: Duration) -> Self {
        Self::new(
            ErrorKind::Throttled,
            format!(
                "{} rate limit exceeded, retry after {}ms",
                operation,
                retry_after.as_millis()
            ),
        )
    }

    pub fn circuit_open(operation: &str) -> Self {
        Self::new(
            ErrorKind::CircuitOpen,
            format!("circuit breaker for {} is open", operation),
        )
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Remote, message)
    }

    pub fn infra(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Infra, message)
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(ErrorKind::DeadlineExceeded, "deadline exceeded")
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "call cancelled")
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            // Only key collisions; NOT NULL and CHECK failures are store faults
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                        | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                ) =>
            {
                Self::new(ErrorKind::AlreadyExists, format!("durable store: {}", err))
            }
            _ => Self::infra(format!("durable store: {}", err)),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::infra(format!("cache codec: {}", err))
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::deadline_exceeded()
        } else {
            Self::infra(format!("cache: {}", err))
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::deadline_exceeded()
        } else {
            Self::infra(format!("transport: {}", err))
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_message_only() {
        let err = ServiceError::dvd_not_available("d1");
        assert_eq!(err.to_string(), "dvd d1 not available");
        assert_eq!(err.kind(), ErrorKind::DvdNotAvailable);
    }

    #[test]
    fn test_empty_message_falls_back_to_kind() {
        let err = ServiceError::remote("");
        assert_eq!(err.message(), "remote");
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_breaker_accounting() {
        assert!(ErrorKind::Infra.trips_breaker());
        assert!(ErrorKind::DeadlineExceeded.trips_breaker());
        assert!(!ErrorKind::Throttled.trips_breaker());
        assert!(!ErrorKind::InvalidArgument.trips_breaker());
        assert!(!ErrorKind::NotFound.trips_breaker());
        assert!(!ErrorKind::DvdNotAvailable.trips_breaker());
        assert!(!ErrorKind::Remote.trips_breaker());
        assert!(!ErrorKind::Cancelled.trips_breaker());
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Throttled.is_retryable());
        assert!(ErrorKind::CircuitOpen.is_retryable());
        assert!(!ErrorKind::InvalidArgument.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let err = ServiceError::not_found("customers", "c1");
        assert!(err.is_not_found());
        assert_eq!(err.message(), "customers c1 not found");
    }

    #[test]
    fn test_throttled_mentions_retry() {
        let err = ServiceError::throttled("register", Duration::from_millis(250));
        assert_eq!(err.kind(), ErrorKind::Throttled);
        assert!(err.message().contains("250ms"));
    }

    #[test]
    fn test_from_serde_error_is_infra() {
        let err: ServiceError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Infra);
    }

    fn constraint_error(sql: &str) -> ServiceError {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id TEXT PRIMARY KEY, name TEXT NOT NULL, qty INTEGER CHECK (qty >= 0));
             INSERT INTO t VALUES ('a', 'x', 1);",
        )
        .unwrap();
        conn.execute(sql, []).unwrap_err().into()
    }

    #[test]
    fn test_duplicate_key_is_already_exists() {
        let err = constraint_error("INSERT INTO t VALUES ('a', 'y', 2)");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_other_constraints_are_infra() {
        let not_null = constraint_error("INSERT INTO t VALUES ('b', NULL, 1)");
        assert_eq!(not_null.kind(), ErrorKind::Infra);

        let check = constraint_error("INSERT INTO t VALUES ('c', 'z', -1)");
        assert_eq!(check.kind(), ErrorKind::Infra);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::CircuitOpen.to_string(), "circuit_open");
    }
}
