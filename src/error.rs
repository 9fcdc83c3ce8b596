//! Error categories shared by every stage of the pipeline.
//!
//! Per-record anomalies (ambiguous bases, sequences shorter than k) are not
//! represented here: they are handled by skipping windows or emitting an
//! all-zero row and never abort a run.

use needletail::errors::{ParseError, ParseErrorKind};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Source or sink could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Record boundaries cannot be trusted (e.g. residues before any header).
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Rejected before streaming begins.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Header/row field-count mismatch in the fingerprint table.
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Merge tool error: {0}")]
    MergeTool(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<ParseError> for PipelineError {
    fn from(err: ParseError) -> Self {
        match err.kind {
            ParseErrorKind::Io => PipelineError::Io(io::Error::new(
                io::ErrorKind::Other,
                err.to_string(),
            )),
            _ => PipelineError::MalformedRecord(err.to_string()),
        }
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        match err.into_kind() {
            csv::ErrorKind::Io(e) => PipelineError::Io(e),
            other => PipelineError::Encoding(format!("{:?}", other)),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Retrieval(err.to_string())
    }
}
