//! Error types for the ildump-core library.
//!
//! This module provides comprehensive error handling using the `thiserror` crate,
//! with detailed error variants for different failure modes.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ildump operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all ildump operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to create an output artifact
    #[error("failed to create file '{path}': {source}")]
    FileCreate {
        /// Path to the file that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create output directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An artifact name would escape the output directory
    #[error("path traversal detected: '{path}' would escape output directory")]
    PathTraversal {
        /// The suspicious path
        path: PathBuf,
    },

    /// Failed to decode the serialized metadata model
    #[error("failed to decode metadata model: {0}")]
    ModelDecode(#[from] prost::DecodeError),

    /// The metadata model references something that does not exist
    #[error("invalid metadata model in type {type_index} ('{type_name}'): {details}")]
    InvalidModel {
        /// TypeDefIndex of the offending type
        type_index: u32,
        /// Name of the offending type
        type_name: String,
        /// Detailed description of the issue
        details: String,
    },
}

impl Error {
    /// Creates a new file creation error
    pub fn file_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new path traversal error
    pub fn path_traversal(path: impl Into<PathBuf>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Creates a new model consistency error
    pub fn invalid_model(
        type_index: u32,
        type_name: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::InvalidModel {
            type_index,
            type_name: type_name.into(),
            details: details.into(),
        }
    }

    /// Returns true if this error only affects a single module's artifact
    /// and processing of the remaining modules should continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FileCreate { .. } | Self::FileWrite { .. } | Self::PathTraversal { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::path_traversal("../../etc/passwd.cs");
        assert!(err.to_string().contains("path traversal"));
        assert!(err.to_string().contains("passwd.cs"));
    }

    #[test]
    fn test_invalid_model_display() {
        let err = Error::invalid_model(42, "Player", "getter index 7 out of range");
        let msg = err.to_string();
        assert!(msg.contains("type 42"));
        assert!(msg.contains("'Player'"));
        assert!(msg.contains("getter index 7"));
    }

    #[test]
    fn test_is_recoverable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(Error::file_create("/out/a.cs", io).is_recoverable());
        assert!(Error::path_traversal("/test").is_recoverable());
        assert!(!Error::invalid_model(0, "T", "bad").is_recoverable());
        let decode = <crate::model::wire::MetadataProto as prost::Message>::decode(&[0xFFu8][..])
            .unwrap_err();
        assert!(!Error::from(decode).is_recoverable());
    }
}
