//! Error type shared by every fallible operation in the crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoiseError {
    #[error("{context} shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        got: String,
    },
    #[error("degenerate weight for frequency {freq}, split {split}: {reason}")]
    DegenerateWeight {
        freq: usize,
        split: usize,
        reason: &'static str,
    },
    #[error("invalid weight value {value} at frequency {freq}, split {split}")]
    InvalidWeight {
        freq: usize,
        split: usize,
        value: f64,
    },
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("invalid seed: {0}")]
    SeedType(String),
    #[error("at least 2 splits are required, got {0}")]
    TooFewSplits(usize),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("missing map: {0}")]
    MissingMap(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl NoiseError {
    pub(crate) fn shape(
        context: &'static str,
        expected: impl std::fmt::Debug,
        got: impl std::fmt::Debug,
    ) -> Self {
        NoiseError::ShapeMismatch {
            context,
            expected: format!("{expected:?}"),
            got: format!("{got:?}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, NoiseError>;
