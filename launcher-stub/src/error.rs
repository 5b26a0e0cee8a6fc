use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Exit status reported for every launcher-level failure.
pub const FAILURE_EXIT_CODE: i32 = 1;

/// Coarse grouping of failures so operators can tell a broken deployment
/// from a broken program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The launcher itself was not finalized correctly.
    Configuration,
    /// Library missing or not loadable.
    Load,
    /// Required export missing.
    Symbol,
    /// The runtime refused to start.
    RuntimeCreation,
    /// Launcher could not build argument or option structures.
    Marshal,
    /// Main class or method could not be found.
    Dispatch,
    /// The invoked program failed.
    Program,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unable to load library '{}': {message}", .path.display())]
    Load { path: PathBuf, message: String },

    #[error("unable to find symbol '{symbol}' in '{library}': {message}")]
    Symbol {
        symbol: String,
        library: String,
        message: String,
    },

    #[error("{0}")]
    RuntimeCreation(&'static str),

    #[error("{0}")]
    Marshal(String),

    #[error("runtime function table is missing {0}")]
    MissingRuntimeFunction(&'static str),

    #[error("failed to find main class: {0}")]
    ClassNotFound(String),

    #[error("failed to find main method in {0}. Ensure the signature matches public static void main(String[])")]
    MethodNotFound(String),

    #[error("exception occurred during main method execution")]
    UncaughtException,

    #[error("failed to start bootstrap thread: {0}")]
    Thread(#[source] io::Error),

    #[error("bootstrap thread panicked")]
    WorkerPanicked,
}

impl LaunchError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LaunchError::Config(_) => ErrorCategory::Configuration,
            LaunchError::Load { .. } => ErrorCategory::Load,
            LaunchError::Symbol { .. } => ErrorCategory::Symbol,
            LaunchError::RuntimeCreation(_) => ErrorCategory::RuntimeCreation,
            LaunchError::Marshal(_)
            | LaunchError::MissingRuntimeFunction(_)
            | LaunchError::Thread(_)
            | LaunchError::WorkerPanicked => ErrorCategory::Marshal,
            LaunchError::ClassNotFound(_) | LaunchError::MethodNotFound(_) => {
                ErrorCategory::Dispatch
            }
            LaunchError::UncaughtException => ErrorCategory::Program,
        }
    }

    pub fn exit_code(&self) -> i32 {
        FAILURE_EXIT_CODE
    }
}

/// Renders an error together with its `source()` chain on one line.
pub fn render_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
