use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VpkError>;

#[derive(Error, Debug)]
pub enum VpkError {
    /// Header marker or version did not match a supported directory file.
    #[error("invalid VPK directory header in {0}")]
    BadHeader(String),

    /// The directory data ended before a declared field could be read.
    #[error("truncated VPK directory while reading {0}")]
    Truncated(String),

    #[error("missing source file: {0}")]
    MissingSource(PathBuf),

    #[error("empty source file: {0}")]
    EmptySource(PathBuf),

    #[error("codec failure: {0}")]
    Codec(String),

    #[error("manifest parse error: {0}")]
    ManifestParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
