//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use geofix::config::ConfigFileError;
use geofix::store::StoreError;
use geofix::{LocationError, OperationStatus};

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Configuration file could not be read or written
    ConfigFile(ConfigFileError),
    /// State file could not be opened
    Store(StoreError),
    /// Invalid command-line input
    InvalidInput(String),
    /// An operation finished with a failure status
    Operation {
        status: OperationStatus,
        error: LocationError,
    },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Operation {
                error: LocationError::Network { .. },
                ..
            } => {
                eprintln!();
                eprintln!("If using the Google geocoding API, make sure:");
                eprintln!("  1. The Geocoding API is enabled for your project");
                eprintln!("  2. api_key is set in config.ini or passed with --api-key");
            }
            CliError::Operation {
                error: LocationError::GeocodeProvider(status),
                ..
            } if status == "REQUEST_DENIED" => {
                eprintln!();
                eprintln!("The provider rejected the request. Check your API key.");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }

    /// Process exit code: 2 for bad input, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidInput(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Store(e) => write!(f, "State file error: {}", e),
            CliError::InvalidInput(msg) => write!(f, "{}", msg),
            CliError::Operation { status, error } => write!(f, "{}: {}", status, error),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Store(e) => Some(e),
            CliError::Operation { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

impl From<LocationError> for CliError {
    fn from(error: LocationError) -> Self {
        CliError::Operation {
            status: error.status(),
            error,
        }
    }
}
