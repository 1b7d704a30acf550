use async_trait::async_trait;
use std::sync::Arc;
use stream_pipeline::{
    DedupeConfig, DedupeKeyComponent, DedupePolicy, Order, ParsedStream, PipelineConfig,
    PipelineError, ProviderError, ProviderFetch, ProxyConfig, ProxyRequest, ProxyServer, SortKey,
    SortRule, StreamPipeline,
};

/// Stands in for a real proxy service so the demo runs offline.
struct DemoProxy;

#[async_trait]
impl ProxyServer for DemoProxy {
    async fn generate_urls(
        &self,
        requests: &[ProxyRequest],
    ) -> Result<Vec<Option<String>>, PipelineError> {
        Ok(requests
            .iter()
            .map(|r| Some(format!("https://proxy.local/p?u={}", r.url)))
            .collect())
    }
}

fn stream(id: &str, hash: &str, resolution: u32, size: u64, cached: bool) -> ParsedStream {
    ParsedStream {
        hash: Some(hash.to_string()),
        filename: Some(format!("{}.mkv", id)),
        resolution: Some(resolution),
        size: Some(size),
        cached,
        url: Some(format!("https://files.example.com/{}", id)),
        ..ParsedStream::new(id)
    }
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    env_logger::init();

    let config = PipelineConfig {
        dedupe: DedupeConfig {
            enabled: true,
            key_components: vec![DedupeKeyComponent::InfoHash],
            policy: DedupePolicy::SingleResult,
        },
        sort_rules: vec![
            SortRule::new(SortKey::Cached, Order::Descending),
            SortRule::new(SortKey::Resolution, Order::Descending),
            SortRule::new(SortKey::Size, Order::Descending),
        ],
        proxy: ProxyConfig {
            enabled: true,
            url: "https://proxy.local/generate".to_string(),
            ..ProxyConfig::default()
        },
        ..PipelineConfig::default()
    };

    let pipeline = StreamPipeline::new(config).with_proxy(Arc::new(DemoProxy));

    let fetches = vec![
        ProviderFetch::ok(
            "torrent-indexer",
            vec![
                stream("release-a", "aaa111", 1080, 4_200_000_000, false),
                stream("release-b", "bbb222", 2160, 12_000_000_000, true),
            ],
        ),
        ProviderFetch::ok(
            "usenet-indexer",
            // same info hash as release-a, deduped away
            vec![stream("release-a-mirror", "aaa111", 1080, 4_200_000_000, false)],
        ),
        ProviderFetch::failed(
            "flaky-indexer",
            ProviderError::Timeout {
                provider: "flaky-indexer".to_string(),
            },
        ),
    ];

    let outcome = pipeline.run(fetches).await?;

    println!("streams ({}):", outcome.streams.len());
    for stream in &outcome.streams {
        println!(
            "  {} cached={} resolution={:?} url={:?}",
            stream.id, stream.cached, stream.resolution, stream.url
        );
    }

    println!("provider errors ({}):", outcome.errors.len());
    for error in &outcome.errors {
        println!("  {}", error);
    }

    Ok(())
}
