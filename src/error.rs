use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Wallet payments are not available")]
    Unavailable,
    #[error("A payment is already in progress")]
    AlreadyProcessing,
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Platform error: {0}")]
    PlatformError(String),
    #[error("Gateway error: {0}")]
    GatewayError(String),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
