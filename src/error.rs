use std::path::PathBuf;
use thiserror::Error;

/// Malformed or dimensionally inconsistent archive/centroid input.
///
/// Raised before the adaptation loop starts; a run never begins on bad input.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}, column {column}: invalid number '{token}'")]
    InvalidNumber {
        line: usize,
        column: usize,
        token: String,
    },
    #[error("line {line}, column {column}: non-finite value '{token}'")]
    NonFinite {
        line: usize,
        column: usize,
        token: String,
    },
    #[error("line {line}: expected {expected} columns, found {found}")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("archive has {found} columns, layout d={descriptor_dim} k={controller_dim} requires {expected}")]
    ColumnMismatch {
        expected: usize,
        found: usize,
        descriptor_dim: usize,
        controller_dim: usize,
    },
    #[error("archive columns disagree: {fitness} fitness values, {descriptors} descriptors, {controllers} controllers")]
    LengthMismatch {
        fitness: usize,
        descriptors: usize,
        controllers: usize,
    },
    #[error("{what} contains no rows")]
    Empty { what: &'static str },
    #[error("centroids are {centroid_dim}-dimensional but the archive layout expects d={descriptor_dim}")]
    DimensionMismatch {
        centroid_dim: usize,
        descriptor_dim: usize,
    },
}

/// Numerical or shape failure while fitting/predicting the discrepancy model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("model has not been fitted")]
    NotFitted,
    #[error("fit requires matching inputs and targets, got {inputs} inputs and {targets} targets")]
    LengthMismatch { inputs: usize, targets: usize },
    #[error("fit requires at least one observation")]
    NoObservations,
    #[error("expected {expected}-dimensional points, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("model returned {found} predictions for {expected} points")]
    PredictionLength { expected: usize, found: usize },
    #[error("non-finite value in {what}")]
    NonFinite { what: &'static str },
    #[error("covariance matrix of {size} observations is not positive definite")]
    IllConditioned { size: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error("failed reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that stops an adaptation run from producing a result.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error(transparent)]
    Format(#[from] ArchiveError),
    #[error("discrepancy model failed: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
