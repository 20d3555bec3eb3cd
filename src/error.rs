//! Failures that can end a single question-answering request

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required multipart field was absent, or the file field was empty
    #[error("missing form field `{0}`")]
    MissingField(&'static str),

    /// The bytes could not be interpreted as an image
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The model could not produce a prediction for the inputs
    #[error("inference failed: {0}")]
    Inference(String),

    /// The demo image could not be retrieved
    #[error("failed to fetch image: {0}")]
    Network(String),

    #[error("inference did not finish within {0:?}")]
    Timeout(Duration),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<tch::TchError> for Error {
    fn from(err: tch::TchError) -> Self {
        Error::Inference(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}
