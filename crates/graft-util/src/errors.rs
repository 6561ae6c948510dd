use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all graft operations.
#[derive(Debug, Error, Diagnostic)]
pub enum GraftError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed configuration file.
    #[error("Config error: {message}")]
    #[diagnostic(help("Check ~/.graft/config.toml for syntax errors"))]
    Config { message: String },

    /// A version string could not be parsed.
    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    /// A version range expression could not be parsed or is empty.
    #[error("Invalid version range '{input}': {reason}")]
    #[diagnostic(help("Use forms like `1.0`, `[1.0,2.0)`, `(,2.0]`, `1.*` or `*`"))]
    InvalidRange { input: String, reason: String },

    /// A target framework moniker could not be parsed.
    #[error("Invalid target framework '{input}'")]
    #[diagnostic(help("Use a short folder name such as `net8.0` or `netstandard2.0`"))]
    InvalidFramework { input: String },

    /// A library reference is malformed (e.g. an empty name).
    #[error("Invalid library: {message}")]
    InvalidLibrary { message: String },

    /// Dependency resolution failed under the caller's policy
    /// (unresolved ranges, downgrades treated as errors).
    #[error("Dependency resolution failed: {message}")]
    Resolution { message: String },

    /// The metadata provider failed to answer a lookup.
    #[error("Metadata provider error: {message}")]
    Provider { message: String },

    /// The resolution session was cancelled.
    #[error("Resolution cancelled")]
    Cancelled,

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}
