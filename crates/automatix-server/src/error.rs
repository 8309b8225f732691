// automatix-server/src/error.rs
// ============================================================================
// Module: Server Errors
// Description: The error boundary this crate owns, covering process
//              startup failures and their exit codes.
// Purpose: Give `main` one error type to match against for the platform's
//          exit-code contract.
// Dependencies: automatix_core, thiserror
// ============================================================================

use automatix_core::ErrorKind;
use thiserror::Error;

use crate::config::ConfigError;
use crate::graphs::GraphStoreError;

/// Errors raised while starting or running the server process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration failed to load or validate. Maps to exit code 1.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The connector registry loaded zero valid connectors. Maps to exit
    /// code 2.
    #[error("connector registry loaded zero valid connectors")]
    RegistryEmpty,
    /// The connector registry directory could not be read at all. Maps to
    /// exit code 2.
    #[error("connector registry unreadable: {0}")]
    RegistryUnreadable(String),
    /// The workflow graph directory could not be read. Maps to exit code 2.
    #[error("workflow graph directory error: {0}")]
    Graphs(#[from] GraphStoreError),
    /// The persistent run-log store could not be opened at start. Maps to
    /// exit code 3.
    #[error("run log store unreachable: {0}")]
    StoreUnreachable(String),
    /// The HTTP listener could not bind its configured address.
    #[error("bind failed: {0}")]
    Bind(String),
    /// The HTTP server failed while serving.
    #[error("server failed: {0}")]
    Serve(String),
}

impl ServerError {
    /// The process exit code this error maps to, per the platform's exit
    /// code contract: `1` configuration error, `2` registry load failure
    /// with zero valid connectors, `3` persistent store unreachable at
    /// start.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 1,
            Self::RegistryEmpty | Self::RegistryUnreadable(_) | Self::Graphs(_) => 2,
            Self::StoreUnreachable(_) => 3,
            Self::Bind(_) | Self::Serve(_) => 1,
        }
    }

    /// Classifies this error into the shared error taxonomy, for audit
    /// logging at startup failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Validation,
            Self::RegistryEmpty | Self::RegistryUnreadable(_) | Self::Graphs(_) => {
                ErrorKind::Validation
            }
            Self::StoreUnreachable(_) | Self::Bind(_) | Self::Serve(_) => {
                ErrorKind::TransientTransport
            }
        }
    }
}
