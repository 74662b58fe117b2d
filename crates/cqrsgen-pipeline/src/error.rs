use std::fmt;
use std::path::PathBuf;

use cqrsgen_core::RegistryError;
use thiserror::Error;

use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no {file} found under {}", .root.display())]
    ConfigNotFound { file: String, root: PathBuf },

    #[error("failed to parse config {}: {reason}", .path.display())]
    ConfigParse { path: PathBuf, reason: String },

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("template error for `{asset}`: {source}")]
    Template {
        asset: String,
        #[source]
        source: TemplateError,
    },

    #[error("build failed: `{command} {}` {cause}", .args.join(" "))]
    BuildFailure {
        command: String,
        args: Vec<String>,
        cause: BuildFailureCause,
    },

    #[error("archive failed for {}: {source}", .path.display())]
    ArchiveFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("publish failed for `{key}`: {reason}")]
    PublishFailure { key: String, reason: String },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Why a compiler invocation failed.
#[derive(Debug)]
pub enum BuildFailureCause {
    /// The process ran and exited unsuccessfully; `None` when killed by a signal.
    Exit(Option<i32>),
    /// The process could not be started.
    Spawn(std::io::Error),
    /// The process succeeded but the expected binary is missing.
    MissingOutput(PathBuf),
}

impl fmt::Display for BuildFailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit(Some(code)) => write!(f, "exited with code {code}"),
            Self::Exit(None) => f.write_str("was terminated by a signal"),
            Self::Spawn(err) => write!(f, "could not be started: {err}"),
            Self::MissingOutput(path) => write!(f, "produced no binary at {}", path.display()),
        }
    }
}
