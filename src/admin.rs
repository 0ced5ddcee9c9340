//! Shared-secret gate for mutating operations.
//!
//! Callers must pass the configured secret before any update, delete, or
//! resync runs. The failure modes are distinguishable: a wrong secret is not
//! the same signal as the gate being disabled entirely.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("wrong admin secret")]
    WrongSecret,
    #[error("no admin secret configured; mutating operations are disabled")]
    Disabled,
}

#[derive(Debug, Clone)]
pub struct AdminGate {
    secret: Option<String>,
}

impl AdminGate {
    #[must_use]
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Exact-match check of the caller-supplied secret.
    pub fn authorize(&self, provided: &str) -> Result<(), AdminError> {
        match &self.secret {
            None => Err(AdminError::Disabled),
            Some(secret) if secret == provided => Ok(()),
            Some(_) => Err(AdminError::WrongSecret),
        }
    }
}
