/// Core error type.
///
/// Adapter crates map their failures into [`AdapterError`] or
/// [`QuotaStoreError`] so the core can decide between a user-facing message
/// and a degraded mode without inspecting raw error text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    QuotaStore(#[from] QuotaStoreError),

    #[error("unparseable payload: {0}")]
    Payload(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of one call through an external service adapter.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("request timed out")]
    Timeout,

    #[error("no data returned")]
    NoData,

    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("service is not configured")]
    ServiceMisconfigured,
}

impl AdapterError {
    /// Short category that is safe to show to users.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::TransportFailure(_) => "service_unreachable",
            AdapterError::Timeout => "timeout",
            AdapterError::NoData => "no_data",
            AdapterError::UpstreamStatus(_) => "upstream_error",
            AdapterError::InvalidResponse(_) => "invalid_response",
            AdapterError::ServiceMisconfigured => "service_misconfigured",
        }
    }

    /// Map a reqwest failure to a typed category (timeouts are kept apart).
    pub fn from_transport(is_timeout: bool, detail: impl std::fmt::Display) -> Self {
        if is_timeout {
            AdapterError::Timeout
        } else {
            AdapterError::TransportFailure(detail.to_string())
        }
    }
}

/// The quota/session persistence layer could not serve a request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QuotaStoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}
