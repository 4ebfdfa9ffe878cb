//! Error types for ragdocs.

use thiserror::Error;

/// Main error type for ragdocs operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Content extraction failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractError),

    /// Chunking failed
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// Chunk store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Payload could not be decoded
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Caller supplied an unusable argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Content extraction errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Chunking errors.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Chunk store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("insert failed: {0}")]
    Insert(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("schema error: {0}")]
    Schema(String),
}

/// Payload decoding errors.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("zlib stream error: {0}")]
    Zlib(#[from] std::io::Error),

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type alias for ragdocs operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_unsupported_type_display() {
        let err = ExtractError::UnsupportedType("doc".to_string());
        assert_eq!(err.to_string(), "unsupported file type: doc");
    }

    #[test]
    fn test_extract_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: ExtractError = io_err.into();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[test]
    fn test_chunk_error_invalid_config_display() {
        let err = ChunkError::InvalidConfig("chunk_size must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: chunk_size must be > 0"
        );
    }

    #[test]
    fn test_embed_error_dimension_mismatch_display() {
        let err = EmbedError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 384, got 768");
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(
            StoreError::Init("database locked".to_string()).to_string(),
            "store initialization failed: database locked"
        );
        assert_eq!(
            StoreError::Insert("disk full".to_string()).to_string(),
            "insert failed: disk full"
        );
        assert_eq!(
            StoreError::Schema("missing vector column".to_string()).to_string(),
            "schema error: missing vector column"
        );
    }

    #[test]
    fn test_codec_error_from_utf8() {
        let bad = String::from_utf8(vec![0xff, 0xfe]).unwrap_err();
        let err: CodecError = bad.into();
        assert!(matches!(err, CodecError::Utf8(_)));
    }

    #[test]
    fn test_error_from_store_error() {
        let err: Error = StoreError::Query("timeout".to_string()).into();
        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_error_chain_io_to_extract_to_main() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "notes.txt not found");
        let extract_err: ExtractError = io_err.into();
        let main_err: Error = extract_err.into();

        assert!(matches!(main_err, Error::Extraction(ExtractError::Io(_))));
        assert!(main_err.to_string().contains("extraction error"));
    }

    #[test]
    fn test_error_invalid_input_display() {
        let err = Error::InvalidInput("prompt is empty".to_string());
        assert_eq!(err.to_string(), "invalid input: prompt is empty");
    }
}
