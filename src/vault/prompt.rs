//! Master password prompt contract.
//!
//! The vault never draws UI. Callers hand [`KeyStore`](super::KeyStore) a
//! [`PasswordPrompt`], which is asked for a password and told whether this is
//! first-time setup. Any closure `FnMut(PromptKind) -> PromptResponse` works.

use std::io::IsTerminal;

use zeroize::Zeroizing;

/// Environment variable that supplies the master password non-interactively.
pub const MASTER_PASSWORD_ENV_VAR: &str = "CREDVAULT_MASTER_PASSWORD";

/// Default number of attempts at a matching setup confirmation.
const DEFAULT_CONFIRM_ATTEMPTS: u32 = 3;

/// Why the password is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// No master password exists yet; the answer becomes the new one.
    Setup,
    /// A master password exists; the answer is checked against it.
    Unlock,
}

impl PromptKind {
    /// Returns true for first-time setup.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Setup)
    }
}

/// Answer from a prompt.
#[derive(Debug)]
pub enum PromptResponse {
    /// The entered password.
    Password(Zeroizing<String>),
    /// The user declined to enter a password.
    Cancelled,
}

impl PromptResponse {
    /// Wraps a password.
    #[must_use]
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password(Zeroizing::new(password.into()))
    }
}

/// Source of master passwords.
///
/// [`KeyStore`](super::KeyStore) calls `request` without holding its
/// internal lock, so an implementation may query the store it serves.
pub trait PasswordPrompt {
    /// Asks for a password.
    fn request(&mut self, kind: PromptKind) -> PromptResponse;
}

impl<F> PasswordPrompt for F
where
    F: FnMut(PromptKind) -> PromptResponse,
{
    fn request(&mut self, kind: PromptKind) -> PromptResponse {
        self(kind)
    }
}

/// Prompt backed by the environment or the controlling terminal.
///
/// `CREDVAULT_MASTER_PASSWORD` wins when set and non-empty. Otherwise the
/// password is read from the TTY without echo; setup asks twice. A non-TTY
/// stdin, a read error, an empty answer or repeated mismatches all cancel.
#[derive(Debug, Clone)]
pub struct TerminalPrompt {
    confirm_attempts: u32,
}

impl TerminalPrompt {
    /// Creates a terminal prompt.
    #[must_use]
    pub fn new() -> Self {
        Self {
            confirm_attempts: DEFAULT_CONFIRM_ATTEMPTS,
        }
    }

    fn from_env() -> Option<PromptResponse> {
        match std::env::var(MASTER_PASSWORD_ENV_VAR) {
            Ok(password) if !password.is_empty() => Some(PromptResponse::password(password)),
            _ => None,
        }
    }

    fn read(label: &str) -> Option<Zeroizing<String>> {
        match rpassword::prompt_password(label) {
            Ok(password) if !password.is_empty() => Some(Zeroizing::new(password)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Failed to read master password: {}", e);
                None
            }
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordPrompt for TerminalPrompt {
    fn request(&mut self, kind: PromptKind) -> PromptResponse {
        if let Some(response) = Self::from_env() {
            return response;
        }

        if !std::io::stdin().is_terminal() {
            return PromptResponse::Cancelled;
        }

        if !kind.is_setup() {
            return match Self::read("Master password: ") {
                Some(password) => PromptResponse::Password(password),
                None => PromptResponse::Cancelled,
            };
        }

        for _ in 0..self.confirm_attempts {
            let Some(first) = Self::read("New master password: ") else {
                return PromptResponse::Cancelled;
            };
            let Some(second) = Self::read("Confirm master password: ") else {
                return PromptResponse::Cancelled;
            };
            if *first == *second {
                return PromptResponse::Password(first);
            }
            eprintln!("Passwords do not match, try again.");
        }

        PromptResponse::Cancelled
    }
}
