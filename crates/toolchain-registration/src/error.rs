//! Registration service controller errors

use thiserror::Error;

use toolchain_common::template::TemplateError;

/// Errors from deploying the registration service
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The deployment template could not be processed
    #[error("failed to process registration service template: {0}")]
    Template(#[from] TemplateError),

    /// An object could not be applied
    #[error("failed to apply {object}: {source}")]
    Apply {
        /// `Kind/name` of the object
        object: String,
        /// Underlying failure
        source: toolchain_common::Error,
    },

    /// Any other failure
    #[error(transparent)]
    Common(#[from] toolchain_common::Error),
}

impl RegistrationError {
    /// Whether retrying the reconciliation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Template(_) => false,
            Self::Apply { source, .. } | Self::Common(source) => source.is_retryable(),
        }
    }
}
