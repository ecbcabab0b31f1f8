use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReliabilityError {
    #[error("payload of {size} bytes exceeds the configured maximum of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
}
