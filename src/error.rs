use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ResolverError {
    #[error("invalid SNP identifier: {0:?}")]
    InvalidSnpId(String),

    #[error("invalid dataset id: {0:?}")]
    InvalidDatasetId(String),

    #[error("no file in the dataset listing ends with {suffix}")]
    #[diagnostic(help("the dataset may not have a genotype archive yet; try the query strategy"))]
    ArchiveNotFound { suffix: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned status {status}: {message}")]
    TransportStatus { status: u16, message: String },

    #[error("failed to extract archive {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("malformed record at {path}:{line}: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no access token (pass --token or set SNP_RESOLVER_TOKEN)")]
    MissingToken,

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("background task failed: {0}")]
    TaskFailed(String),
}
