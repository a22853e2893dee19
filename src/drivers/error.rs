use thiserror::Error;

use crate::raster::variant::KernelVariant;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("{buffer} buffer length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("timescale must be greater than zero")]
    InvalidTimescale,
    #[error("unsupported kernel variant {0:?}: digital samples need a step or histogram style")]
    UnsupportedVariant(KernelVariant),
    #[error("kernel variant {variant:?} needs a {binding} binding")]
    MissingBinding {
        variant: KernelVariant,
        binding: &'static str,
    },
    #[error("sample kind does not match kernel variant {0:?}")]
    SampleKindMismatch(KernelVariant),
    #[error("invalid render request: {0}")]
    InvalidRequest(String),
    #[error("failed to parse configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ScopeError {
    fn from(value: serde_json::Error) -> Self {
        ScopeError::Config(value.to_string())
    }
}
