//! Store error type used for retry classification.

/// Error returned by a single store invocation.
///
/// `signature` is a stable, machine-matchable name for the failure class
/// (e.g. `ConnectionRefusedError`); `message` is the driver's text. Matchers
/// run against the rendered `"{signature}: {message}"` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{signature}: {message}")]
pub struct StoreError {
    pub signature: String,
    pub message: String,
}

impl StoreError {
    pub fn new(signature: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            message: message.into(),
        }
    }
}
