use thiserror::Error;

use crate::model::FieldStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Browser launch failed: {0}")]
    LaunchError(String),

    #[error("Navigation failed: {0}")]
    NavigationError(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript error: {0}")]
    JsError(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotError(String),

    #[error("Coordinate transform failed: {0}")]
    CoordinateTransform(String),

    #[error("Text recognition unavailable: {0}")]
    RecognitionUnavailable(String),

    #[error("Invalid field transition from {from:?} on {event}")]
    InvalidTransition { from: FieldStatus, event: &'static str },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Result sink error: {0}")]
    Sink(String),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
