//! Domain error types.
//!
//! Only portfolio-level structural problems are errors. Per-asset data gaps and
//! degenerate math are recovered in place and reported as
//! [`Diagnostic`](crate::domain::analysis::Diagnostic) records instead.

/// Top-level error type for portopt.
#[derive(Debug, thiserror::Error)]
pub enum PortoptError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("portfolio {portfolio} has no assets")]
    EmptyPortfolio { portfolio: String },

    #[error("no benchmark data available since {since}")]
    NoMarketData { since: String },

    #[error("target return {target:.4} is outside the reachable range [{min:.4}, {max:.4}]")]
    TargetOutOfRange { target: f64, min: f64, max: f64 },

    #[error("infeasible weight constraints for {assets} assets: {reason}")]
    InfeasibleConstraints { assets: usize, reason: String },

    #[error("{source_name} unavailable: {reason}")]
    UpstreamUnavailable { source_name: String, reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortoptError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        PortoptError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// True for errors the caller caused (rejected request), as opposed to
    /// infrastructure or configuration failures.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PortoptError::InvalidInput { .. }
                | PortoptError::EmptyPortfolio { .. }
                | PortoptError::TargetOutOfRange { .. }
                | PortoptError::InfeasibleConstraints { .. }
        )
    }
}

impl From<&PortoptError> for std::process::ExitCode {
    fn from(err: &PortoptError) -> Self {
        let code: u8 = match err {
            PortoptError::Io(_) => 1,
            PortoptError::ConfigParse { .. }
            | PortoptError::ConfigMissing { .. }
            | PortoptError::ConfigInvalid { .. } => 2,
            PortoptError::Database { .. }
            | PortoptError::DatabaseQuery { .. }
            | PortoptError::UpstreamUnavailable { .. } => 3,
            PortoptError::InvalidInput { .. }
            | PortoptError::EmptyPortfolio { .. }
            | PortoptError::TargetOutOfRange { .. }
            | PortoptError::InfeasibleConstraints { .. } => 4,
            PortoptError::NoMarketData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_out_of_range_message() {
        let err = PortoptError::TargetOutOfRange {
            target: 0.5,
            min: 0.05,
            max: 0.15,
        };
        assert_eq!(
            err.to_string(),
            "target return 0.5000 is outside the reachable range [0.0500, 0.1500]"
        );
    }

    #[test]
    fn input_errors_are_classified() {
        assert!(PortoptError::invalid_input("bad").is_input_error());
        assert!(
            PortoptError::EmptyPortfolio {
                portfolio: "1".into()
            }
            .is_input_error()
        );
        assert!(
            !PortoptError::NoMarketData {
                since: "2024-01-01".into()
            }
            .is_input_error()
        );
        assert!(
            !PortoptError::UpstreamUnavailable {
                source_name: "price store".into(),
                reason: "down".into()
            }
            .is_input_error()
        );
    }

    #[test]
    fn io_error_converts() {
        let err: PortoptError = std::io::Error::other("boom").into();
        assert!(matches!(err, PortoptError::Io(_)));
    }
}
