//! Error types for network construction, inference and diagnostics.
//!
//! Every fallible operation in the crate returns [`Result`], so shape
//! problems surface at the layer that noticed them instead of producing a
//! wrongly shaped tensor further down the pipeline.

use thiserror::Error;

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, ResNetError>;

/// Main error type for resnet-sparsity operations.
///
/// # Examples
///
/// ```
/// use resnet_sparsity::error::ResNetError;
///
/// let err = ResNetError::shape_mismatch("Conv2d", "3 input channels", "4");
/// assert!(err.to_string().contains("Shape mismatch"));
/// ```
#[derive(Error, Debug)]
pub enum ResNetError {
    /// A tensor did not have the shape an operation requires.
    #[error("Shape mismatch in {op}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Operation that rejected the tensor
        op: &'static str,
        /// Expected shape description
        expected: String,
        /// Actual shape found
        actual: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {param} = {value}, expected {constraint}")]
    InvalidConfig {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Diagnostic output could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ResNetError {
    /// Create a shape mismatch error with descriptive context.
    #[must_use]
    pub fn shape_mismatch(
        op: &'static str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ShapeMismatch {
            op,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(
        param: impl Into<String>,
        value: impl ToString,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            param: param.into(),
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_display() {
        let err = ResNetError::shape_mismatch("Conv2d", "[N, 3, H, W]", "[1, 4, 32, 32]");
        let msg = err.to_string();
        assert!(msg.contains("Shape mismatch in Conv2d"));
        assert!(msg.contains("[N, 3, H, W]"));
        assert!(msg.contains("[1, 4, 32, 32]"));
    }

    #[test]
    fn test_invalid_config_display() {
        let err = ResNetError::invalid_config("num_classes", 0, ">= 1");
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("num_classes = 0"));
        assert!(msg.contains(">= 1"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ResNetError = io_err.into();
        assert!(matches!(err, ResNetError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error as _;

        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = ResNetError::from(io_err);
        assert!(err.source().is_some());

        let err = ResNetError::invalid_config("stride", 0, ">= 1");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_from_serde_error() {
        let parse_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: ResNetError = parse_err.into();
        assert!(matches!(err, ResNetError::Serialization(_)));
    }
}
