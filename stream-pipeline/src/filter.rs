use crate::error::PipelineError;
use crate::stream::ParsedStream;
use async_trait::async_trait;

/// The hard-constraint filter stage, supplied by the embedding
/// application. Consumes the full stream set and returns the survivors; a
/// failure here is request-fatal.
#[async_trait]
pub trait StreamFilter: Send + Sync {
    async fn filter(&self, streams: Vec<ParsedStream>)
        -> Result<Vec<ParsedStream>, PipelineError>;
}

/// Default filter: keeps everything.
pub struct NoopFilter;

#[async_trait]
impl StreamFilter for NoopFilter {
    async fn filter(
        &self,
        streams: Vec<ParsedStream>,
    ) -> Result<Vec<ParsedStream>, PipelineError> {
        Ok(streams)
    }
}
