use thiserror::Error;

#[derive(Error, Debug)]
pub enum InkmarkError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Unknown source document: {0}")]
    SourceMissing(String),

    #[error("Failed to copy page: {0}")]
    PageCopyError(String),

    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error("Font error: {0}")]
    FontError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, InkmarkError>;
