//! CLI error handling

use std::fmt;

use sluice_errors::UserFacingError;
use sluice_transfer::ExitStatus;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration or argument validation error
    Input(sluice_errors::Error),
    /// Failure while setting up the transfer
    Setup(sluice_errors::Error),
}

impl CliError {
    /// Exit status for a failure that happened before the transfer started
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            CliError::Input(_) => ExitStatus::InputProcessingError,
            CliError::Setup(e) => ExitStatus::for_error(e),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (prefix, e) = match self {
            CliError::Input(e) => ("Invalid input", e),
            CliError::Setup(e) => ("Setup failed", e),
        };
        write!(f, "{prefix}: {}", e.user_message())?;
        if let Some(code) = e.user_code() {
            write!(f, "\n  Code: {code}")?;
        }
        if let Some(hint) = e.user_hint() {
            write!(f, "\n  Hint: {hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Input(e) | CliError::Setup(e) => Some(e),
        }
    }
}

impl From<sluice_errors::Error> for CliError {
    fn from(e: sluice_errors::Error) -> Self {
        CliError::Input(e)
    }
}
