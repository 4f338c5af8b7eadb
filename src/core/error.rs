use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnprError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Config(String),
    #[error("Worker error: {0}")]
    Worker(String),
    #[error("Frame source error: {0}")]
    FrameSource(String),
}
