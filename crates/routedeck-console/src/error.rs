//! Error types for the routedeck-console crate.
//!
//! Only `ConsoleError` ever escapes the console loop, and only for terminal
//! or configuration failures. Provider, launch and provisioning errors are
//! caught where they happen and turned into operator-visible warnings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Core error: {0}")]
    Core(#[from] routedeck_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the route discovery collaborator.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to start route provider {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Route provider {program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to parse route list: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures starting an external program.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Program not found: {program}")]
    NotFound { program: String },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}")]
    Failed { program: String, code: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures fetching the remote-display helper binary.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Download returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Failed to extract archive: {0}")]
    Extract(String),

    #[error("{name} not found in downloaded archive")]
    ExecutableNotFound { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConsoleError>;
