mod config;
mod dedupe;
mod error;
mod filter;
mod pipeline;
mod precompute;
mod proxify;
mod sort;
mod stream;

#[cfg(test)]
mod tests;

pub use config::{
    DedupeConfig, DedupeKeyComponent, DedupePolicy, NamedPattern, Order, PipelineConfig,
    ProxyConfig, SortKey, SortRule, StreamExpression,
};
pub use error::{PipelineError, ProviderError};
pub use filter::{NoopFilter, StreamFilter};
pub use pipeline::{PipelineOutcome, StreamPipeline};
pub use proxify::{BulkProxyClient, ProxyRequest, ProxyServer};
pub use stream::{ParsedStream, ProviderFetch, RegexMatch, SeadexTag};
