//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use imagepipe::config::ConfigFileError;
use imagepipe::loader::{DataLoadError, NetworkUnavailableReason};
use imagepipe::PipelineError;
use std::fmt;
use std::path::PathBuf;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to build the data loader
    LoaderSetup(DataLoadError),
    /// A single load failed
    Load {
        locator: String,
        error: PipelineError,
    },
    /// Some loads in a batch failed
    Incomplete { failed: usize, total: usize },
    /// Failed to read a cache directory
    Inspect { path: PathBuf, error: std::io::Error },
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Load { .. } | CliError::Incomplete { .. } => 3,
            _ => 1,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        if let CliError::Load { error, .. } = self {
            let reason = error
                .data_loading_error()
                .and_then(DataLoadError::network_unavailable_reason);
            if let Some(NetworkUnavailableReason::Constrained) = reason {
                eprintln!();
                eprintln!("The network is in low data mode. Try a smaller variant of the image.");
            }
        }

        process::exit(self.exit_code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::LoaderSetup(e) => write!(f, "Failed to create data loader: {}", e),
            CliError::Load { locator, error } => {
                write!(f, "Failed to load '{}': {}", locator, error)
            }
            CliError::Incomplete { failed, total } => {
                write!(f, "{} of {} loads failed", failed, total)
            }
            CliError::Inspect { path, error } => {
                write!(f, "Failed to read '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoaderSetup(e) => Some(e),
            CliError::Load { error, .. } => Some(error),
            CliError::Inspect { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<DataLoadError> for CliError {
    fn from(e: DataLoadError) -> Self {
        CliError::LoaderSetup(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Config("bad".into()).exit_code(), 2);
        assert_eq!(
            CliError::Incomplete {
                failed: 1,
                total: 3
            }
            .exit_code(),
            3
        );
        assert_eq!(CliError::LoggingInit("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_load_error_message() {
        let err = CliError::Load {
            locator: "https://example.com/a.png".into(),
            error: PipelineError::DataIsEmpty,
        };
        let message = err.to_string();
        assert!(message.contains("https://example.com/a.png"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
