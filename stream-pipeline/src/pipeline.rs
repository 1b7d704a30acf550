use crate::config::PipelineConfig;
use crate::dedupe;
use crate::error::{PipelineError, ProviderError};
use crate::filter::{NoopFilter, StreamFilter};
use crate::precompute;
use crate::proxify::{self, ProxyServer};
use crate::sort;
use crate::stream::{ParsedStream, ProviderFetch};
use std::sync::Arc;

/// The final product of one request: the ordered, deduplicated (and
/// possibly proxied) stream list, plus the provider failures that occurred
/// along the way. A failing provider never fails the request.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub streams: Vec<ParsedStream>,
    pub errors: Vec<ProviderError>,
}

/// Runs the stages over every provider's contribution to one request, in
/// strict order: precompute, filter, dedupe, sort, proxify. Every stage is
/// total — it consumes the full stream set.
pub struct StreamPipeline {
    config: PipelineConfig,
    filter: Arc<dyn StreamFilter>,
    proxy: Option<Arc<dyn ProxyServer>>,
}

impl StreamPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            filter: Arc::new(NoopFilter),
            proxy: None,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn StreamFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_proxy(mut self, proxy: Arc<dyn ProxyServer>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(
        &self,
        fetches: Vec<ProviderFetch>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut streams: Vec<ParsedStream> = Vec::new();
        let mut errors: Vec<ProviderError> = Vec::new();

        for fetch in fetches {
            match fetch.result {
                Ok(contribution) => {
                    log::debug!(
                        "provider {} contributed {} streams",
                        fetch.provider,
                        contribution.len()
                    );
                    streams.extend(contribution);
                }
                Err(error) => {
                    log::warn!("provider {} failed: {}", fetch.provider, error);
                    errors.push(error);
                }
            }
        }

        precompute::apply(&mut streams, &self.config);

        let streams = self.filter.filter(streams).await?;

        let mut streams = dedupe::apply(streams, &self.config.dedupe);

        sort::apply(&mut streams, &self.config.sort_rules)?;

        let streams = match (&self.proxy, self.config.proxy.enabled) {
            (Some(proxy), true) => {
                proxify::apply(streams, &self.config.proxy, proxy.as_ref()).await
            }
            (None, true) => {
                log::warn!("proxy enabled but no proxy server wired; skipping proxify");
                streams
            }
            _ => streams,
        };

        Ok(PipelineOutcome { streams, errors })
    }
}
