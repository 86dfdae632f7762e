use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("Rate limit exceeded for {key}")]
    RateLimited { key: String },

    #[error("Invalid admission configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, AdmissionError>;
