//! Domain error types.

/// Top-level error type for ctatrader.
#[derive(Debug, thiserror::Error)]
pub enum CtaError {
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

    #[error("failed to load price data: {reason}")]
    DataLoad { reason: String },

    #[error("malformed price series at bar {index}: {reason}")]
    MalformedSeries { index: usize, reason: String },

    #[error("no price data in {source_name}")]
    NoData { source_name: String },

    #[error("length mismatch: {prices} prices but {positions} positions")]
    LengthMismatch { prices: usize, positions: usize },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("numerical fault: {reason}")]
    Numerical { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CtaError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        CtaError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&CtaError> for std::process::ExitCode {
    fn from(err: &CtaError) -> Self {
        let code: u8 = match err {
            CtaError::Io(_) | CtaError::Csv(_) => 1,
            CtaError::ConfigParse { .. }
            | CtaError::ConfigMissing { .. }
            | CtaError::ConfigInvalid { .. } => 2,
            CtaError::InvalidParameter { .. } => 4,
            CtaError::DataLoad { .. }
            | CtaError::MalformedSeries { .. }
            | CtaError::NoData { .. }
            | CtaError::LengthMismatch { .. } => 5,
            CtaError::Numerical { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
