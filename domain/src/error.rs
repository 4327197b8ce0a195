use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid mac address: {0}")]
    InvalidMac(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("malformed descriptor document: {0}")]
    Deserialization(String),
}
