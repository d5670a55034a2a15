use thiserror::Error;

#[derive(Error, Debug)]
pub enum StegoError {
    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Degenerate histogram: {0}")]
    DegenerateHistogram(String),

    #[error("Image too small for difference windows ({rows}x{cols} difference array, need at least 3 rows and 1 column)")]
    InsufficientSize { rows: usize, cols: usize },

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<image::ImageError> for StegoError {
    fn from(err: image::ImageError) -> Self {
        StegoError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StegoError>;
