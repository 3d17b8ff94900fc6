//! Error types for the compute-vm resolver.
//!
//! This module provides the error hierarchy for every stage of a resolution
//! pass: loading and validating configuration, and resolving it into a
//! decision set.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the compute-vm resolver.
#[derive(Debug, Error)]
pub enum VmError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resolution errors.
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Errors raised while resolving a configuration into resource decisions.
///
/// Every variant is detected before anything is emitted; a failed resolution
/// never yields a partial decision set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Mutually exclusive fields were both set, or two settings cannot coexist.
    #[error("Invalid combination at '{field}': {message}")]
    InvalidCombination {
        /// Field path of the offending setting.
        field: String,
        /// Description of the conflict.
        message: String,
    },

    /// A feature was requested in a context that does not support it.
    #[error("Unsupported combination at '{field}': {message} (when resolving {context})")]
    UnsupportedCombination {
        /// Field path of the offending setting.
        field: String,
        /// Resource kind being resolved ("instance" or "template").
        context: String,
        /// Description of the unsupported feature.
        message: String,
    },

    /// A required input is absent or empty.
    #[error("Missing required field: {field}")]
    MissingRequiredField {
        /// Field path of the missing input.
        field: String,
    },
}

/// Result type alias for compute-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

impl VmError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the error comes from the input and is fixed by editing it.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Resolve(_))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ResolveError {
    /// Creates an invalid-combination error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCombination {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported-combination error.
    #[must_use]
    pub fn unsupported(
        field: impl Into<String>,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UnsupportedCombination {
            field: field.into(),
            context: context.into(),
            message: message.into(),
        }
    }

    /// Creates a missing-field error.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
        }
    }

    /// Returns the field path the error refers to.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::InvalidCombination { field, .. }
            | Self::UnsupportedCombination { field, .. }
            | Self::MissingRequiredField { field } => field,
        }
    }

    /// Returns the short kind name of the error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCombination { .. } => "InvalidCombination",
            Self::UnsupportedCombination { .. } => "UnsupportedCombination",
            Self::MissingRequiredField { .. } => "MissingRequiredField",
        }
    }
}
