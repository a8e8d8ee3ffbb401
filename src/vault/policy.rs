//! Error policy for value encryption and decryption.

use tracing::warn;

use super::cipher::CryptoError;

/// What encrypt/decrypt do when the cryptography fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Return the input unchanged and log the failure.
    #[default]
    FailOpen,
    /// Return the error to the caller.
    FailClosed,
}

impl FailurePolicy {
    /// Parses a policy name, falling back to the default.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        Self::try_parse(s).unwrap_or_default()
    }

    /// Parses a policy name, returning `None` if it is not recognised.
    #[must_use]
    pub fn try_parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Some(Self::FailOpen),
            "fail_closed" | "closed" | "strict" => Some(Self::FailClosed),
            _ => None,
        }
    }

    /// Returns the config name for this policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailOpen => "fail_open",
            Self::FailClosed => "fail_closed",
        }
    }

    /// Applies the policy to the outcome of `operation` on `input`.
    pub fn apply(
        self,
        operation: &'static str,
        input: &str,
        outcome: Result<String, CryptoError>,
    ) -> Result<String, CryptoError> {
        match (self, outcome) {
            (_, Ok(value)) => Ok(value),
            (Self::FailOpen, Err(err)) => {
                warn!(operation, error = %err, "crypto failure, passing value through unchanged");
                Ok(input.to_string())
            }
            (Self::FailClosed, Err(err)) => Err(err),
        }
    }
}
