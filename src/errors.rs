use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for background removal.
///
/// Per-file variants (`FileSystem`, `ImageProcessing`, `Model`) are recovered at
/// the single-image boundary. `InputDirectoryMissing` and `NoImagesFound` end a
/// batch call, `MissingModel` ends the run before any file is touched.
#[derive(Error, Debug)]
pub enum RemBgError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}: {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path}): {source}")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed: {source}")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model `{model}` not found at {path:?}. Download it from {url}")]
    MissingModel {
        model: String,
        path: PathBuf,
        url: String,
    },

    #[error("Input directory does not exist: {path:?}")]
    InputDirectoryMissing { path: PathBuf },

    #[error("No images found in directory: {path:?}")]
    NoImagesFound { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, RemBgError>;

/// Convert I/O errors to filesystem errors.
///
/// Fallback for call sites without path context. Code that knows the path and
/// operation should build `RemBgError::FileSystem` directly.
impl From<std::io::Error> for RemBgError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert ONNX Runtime errors to model errors.
impl From<ort::Error> for RemBgError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors only happen while reshaping inference outputs, so they are
/// reported as model errors.
impl From<ndarray::ShapeError> for RemBgError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_message_names_path_and_url() {
        let err = RemBgError::MissingModel {
            model: "u2net".to_string(),
            path: PathBuf::from("/models/u2net.onnx"),
            url: "https://example.invalid/u2net.onnx".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("u2net"));
        assert!(message.contains("/models/u2net.onnx"));
        assert!(message.contains("https://example.invalid/u2net.onnx"));
    }

    #[test]
    fn test_io_error_conversion() {
        let err: RemBgError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, RemBgError::FileSystem { .. }));
        assert!(err.to_string().contains("gone"));
    }
}
