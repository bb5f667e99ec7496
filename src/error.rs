use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Every failure the relay knows how to classify.
///
/// Only `MissingConfig` and `InvalidConfig` are fatal; the poll loop recovers
/// from everything else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    #[error("invalid value for {name}: {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("request to review API failed: {0}")]
    InterceptedRequest(String),

    #[error("API response is not valid JSON: {0}")]
    Serialization(String),

    #[error("API response has no key \"{0}\"")]
    MissingKey(String),

    #[error("unexpected API data shape: {0}")]
    TypeMismatch(String),

    #[error("unexpected homework status in API response: {0}")]
    UnknownStatus(String),

    #[error("failed to deliver message: {0}")]
    Delivery(String),
}

impl RelayError {
    /// Stable label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingConfig(_) => "missing_config",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::InterceptedRequest(_) => "intercepted_request",
            Self::Serialization(_) => "serialization",
            Self::MissingKey(_) => "missing_key",
            Self::TypeMismatch(_) => "type_mismatch",
            Self::UnknownStatus(_) => "unknown_status",
            Self::Delivery(_) => "delivery",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingConfig(_) | Self::InvalidConfig { .. })
    }
}
