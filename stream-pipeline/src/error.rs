use thiserror::Error;

/// A provider that failed to contribute results. Collected in the
/// pipeline's side channel; never aborts the other providers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("provider {provider} failed: {message}")]
    Upstream { provider: String, message: String },
    #[error("provider {provider} timed out")]
    Timeout { provider: String },
}

/// Request-fatal pipeline errors, surfaced to the caller as one aggregate
/// error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid sort rules: {0}")]
    InvalidSortRules(String),
    #[error("stream filter failed: {0}")]
    Filter(String),
    #[error("invalid proxy configuration: {0}")]
    ProxyConfig(String),
    #[error("proxy request failed: {0}")]
    Proxy(String),
}
