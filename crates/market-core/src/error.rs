use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
