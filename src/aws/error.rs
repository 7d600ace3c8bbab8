//! Error types for the AWS backend.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the AWS backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AwsBackendError {
    /// Raised when the configuration cannot produce SDK clients.
    #[error("configuration error: {0}")]
    Config(String),
    /// Wrapper for EC2 API failures.
    #[error("EC2 {operation} failed: {message}")]
    Ec2 {
        /// API operation that failed.
        operation: &'static str,
        /// Message rendered from the SDK error.
        message: String,
    },
    /// Wrapper for S3 API failures.
    #[error("S3 {operation} failed: {message}")]
    S3 {
        /// API operation that failed.
        operation: &'static str,
        /// Message rendered from the SDK error.
        message: String,
    },
    /// Raised when a response lacks a field the workflow depends on.
    #[error("EC2 {operation} response is missing {field}")]
    MissingField {
        /// API operation whose response was incomplete.
        operation: &'static str,
        /// Name of the absent field.
        field: &'static str,
    },
}

impl AwsBackendError {
    pub(crate) fn ec2(operation: &'static str, err: &impl std::error::Error) -> Self {
        Self::Ec2 {
            operation,
            message: aws_sdk_ec2::error::DisplayErrorContext(err).to_string(),
        }
    }

    pub(crate) fn s3(operation: &'static str, err: &impl std::error::Error) -> Self {
        Self::S3 {
            operation,
            message: aws_sdk_s3::error::DisplayErrorContext(err).to_string(),
        }
    }
}

impl From<ConfigError> for AwsBackendError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
