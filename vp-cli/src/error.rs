//! CLI Error Types

use thiserror::Error;
use vp_core::ChainError;
use vp_service::VpError;
use vp_signer::SignerError;
use vp_store::StoreError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Chain error: {0}")]
    ChainError(#[from] ChainError),

    #[error("Storage error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Signer error: {0}")]
    SignerError(#[from] SignerError),

    /// Carries the service reason code
    #[error("{code}: {source}")]
    ServiceError {
        code: &'static str,
        #[source]
        source: VpError,
    },

    /// Audit or claim check completed but found problems
    #[error("Check failed: {message}")]
    CheckFailed { message: String },
}

pub type CliResult<T> = Result<T, CliError>;

impl From<VpError> for CliError {
    fn from(source: VpError) -> Self {
        CliError::ServiceError {
            code: source.reason_code(),
            source,
        }
    }
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        CliError::ConfigError {
            message: message.into(),
        }
    }

    pub fn invalid_arg(message: impl Into<String>) -> Self {
        CliError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn check_failed(message: impl Into<String>) -> Self {
        CliError::CheckFailed {
            message: message.into(),
        }
    }

    /// Get exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ConfigError { .. } => 1,
            CliError::InvalidArgument { .. } => 2,
            CliError::IoError(_) => 5,
            CliError::JsonError(_) => 6,
            CliError::ChainError(_) => 10,
            CliError::StoreError(_) => 11,
            CliError::SignerError(_) => 12,
            CliError::ServiceError { source, .. } => match source {
                VpError::Validation(_) => 2,
                VpError::IneligibleProposal { .. } => 20,
                VpError::InsufficientVp { .. } => 21,
                VpError::ChainRead(_) => 10,
                VpError::Storage(_) => 11,
                VpError::Signing(_) => 12,
            },
            CliError::CheckFailed { .. } => 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vp_core::U256;

    #[test]
    fn test_config_error() {
        let err = CliError::config("VP_SIGNER_KEY is not set");
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("VP_SIGNER_KEY"));
    }

    #[test]
    fn test_service_error_keeps_reason_code() {
        let err: CliError = VpError::InsufficientVp {
            requested: U256::from(1100u64),
            available: U256::from(400u64),
            existing: None,
        }
        .into();
        assert_eq!(err.exit_code(), 21);
        assert!(err.to_string().starts_with("INSUFFICIENT_VP"));
    }

    #[test]
    fn test_check_failed() {
        assert_eq!(CliError::check_failed("2 discrepancies").exit_code(), 30);
    }
}
