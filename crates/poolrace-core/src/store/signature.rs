//! Map sqlx errors to stable store-error signatures.

use std::io;

use crate::retry::StoreError;

/// Convert a sqlx error into a [`StoreError`] whose signature names the
/// failure class rather than the driver's wording.
pub fn from_sqlx(err: sqlx::Error) -> StoreError {
    let signature = match &err {
        sqlx::Error::Io(e) => io_signature(e),
        sqlx::Error::Tls(_) => "ConnectionError",
        sqlx::Error::PoolTimedOut => "ConnectionTimedOutError",
        sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => "InvalidConnectionError",
        sqlx::Error::Database(_) => "DatabaseError",
        sqlx::Error::Configuration(_) => "ConfigurationError",
        _ => "QueryError",
    };
    let message = match &err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    };
    StoreError::new(signature, message)
}

#[cfg(unix)]
fn is_unreachable(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(code) if code == libc::EHOSTUNREACH || code == libc::ENETUNREACH)
}

#[cfg(not(unix))]
fn is_unreachable(_e: &io::Error) -> bool {
    false
}

fn io_signature(e: &io::Error) -> &'static str {
    if is_unreachable(e) {
        return "HostNotReachableError";
    }
    match e.kind() {
        io::ErrorKind::ConnectionRefused => "ConnectionRefusedError",
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => "ConnectionResetError",
        io::ErrorKind::TimedOut => "ConnectionTimedOutError",
        // getaddrinfo failures surface as uncategorized errors.
        _ if e.to_string().contains("failed to lookup address") => "HostNotFoundError",
        _ => "ConnectionError",
    }
}
