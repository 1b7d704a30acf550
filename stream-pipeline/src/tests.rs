use crate::config::{
    DedupeConfig, DedupeKeyComponent, DedupePolicy, Order, PipelineConfig, ProxyConfig, SortKey,
    SortRule,
};
use crate::error::{PipelineError, ProviderError};
use crate::filter::StreamFilter;
use crate::pipeline::StreamPipeline;
use crate::proxify::{ProxyRequest, ProxyServer};
use crate::stream::{ParsedStream, ProviderFetch};
use async_trait::async_trait;
use std::sync::Arc;

fn stream(id: &str, hash: &str, resolution: u32, size: u64) -> ParsedStream {
    ParsedStream {
        hash: Some(hash.to_string()),
        resolution: Some(resolution),
        size: Some(size),
        url: Some(format!("https://host.example.com/{}", id)),
        ..ParsedStream::new(id)
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        dedupe: DedupeConfig {
            enabled: true,
            key_components: vec![DedupeKeyComponent::InfoHash],
            policy: DedupePolicy::SingleResult,
        },
        sort_rules: vec![
            SortRule::new(SortKey::Resolution, Order::Descending),
            SortRule::new(SortKey::Size, Order::Descending),
        ],
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn full_pipeline_dedupes_and_sorts() {
    let pipeline = StreamPipeline::new(config());

    let outcome = pipeline
        .run(vec![
            ProviderFetch::ok(
                "indexer-a",
                vec![stream("a1", "h1", 720, 10), stream("a2", "h2", 1080, 5)],
            ),
            ProviderFetch::ok(
                "indexer-b",
                // h1 duplicates indexer-a's first stream
                vec![stream("b1", "h1", 720, 10), stream("b2", "h3", 1080, 20)],
            ),
        ])
        .await
        .unwrap();

    let ids: Vec<&str> = outcome.streams.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["b2", "a2", "a1"]);
    assert!(outcome.errors.is_empty());
}

#[tokio::test]
async fn provider_failure_is_isolated_in_side_channel() {
    let pipeline = StreamPipeline::new(config());

    let outcome = pipeline
        .run(vec![
            ProviderFetch::ok("healthy", vec![stream("a1", "h1", 1080, 10)]),
            ProviderFetch::failed(
                "broken",
                ProviderError::Upstream {
                    provider: "broken".to_string(),
                    message: "503".to_string(),
                },
            ),
            ProviderFetch::failed(
                "slow",
                ProviderError::Timeout {
                    provider: "slow".to_string(),
                },
            ),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.streams.len(), 1);
    assert_eq!(outcome.errors.len(), 2);
}

#[tokio::test]
async fn malformed_sort_rules_fail_the_request() {
    let pipeline = StreamPipeline::new(PipelineConfig {
        sort_rules: vec![],
        ..config()
    });

    let outcome = pipeline
        .run(vec![ProviderFetch::ok(
            "indexer-a",
            vec![stream("a1", "h1", 1080, 10)],
        )])
        .await;

    assert!(matches!(outcome, Err(PipelineError::InvalidSortRules(_))));
}

struct CachedOnlyFilter;

#[async_trait]
impl StreamFilter for CachedOnlyFilter {
    async fn filter(
        &self,
        streams: Vec<ParsedStream>,
    ) -> Result<Vec<ParsedStream>, PipelineError> {
        Ok(streams.into_iter().filter(|s| s.cached).collect())
    }
}

#[tokio::test]
async fn filter_stage_runs_between_precompute_and_dedupe() {
    let pipeline = StreamPipeline::new(config()).with_filter(Arc::new(CachedOnlyFilter));

    let cached = ParsedStream {
        cached: true,
        ..stream("kept", "h1", 1080, 10)
    };
    let outcome = pipeline
        .run(vec![ProviderFetch::ok(
            "indexer-a",
            vec![cached, stream("removed", "h2", 1080, 10)],
        )])
        .await
        .unwrap();

    let ids: Vec<&str> = outcome.streams.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["kept"]);
}

struct PrefixProxy;

#[async_trait]
impl ProxyServer for PrefixProxy {
    async fn generate_urls(
        &self,
        requests: &[ProxyRequest],
    ) -> Result<Vec<Option<String>>, PipelineError> {
        Ok(requests
            .iter()
            .map(|r| Some(format!("https://proxy.example.com/p?u={}", r.url)))
            .collect())
    }
}

#[tokio::test]
async fn proxify_runs_last_and_marks_streams() {
    let pipeline = StreamPipeline::new(PipelineConfig {
        proxy: ProxyConfig {
            enabled: true,
            url: "https://proxy.example.com/generate".to_string(),
            ..ProxyConfig::default()
        },
        ..config()
    })
    .with_proxy(Arc::new(PrefixProxy));

    let outcome = pipeline
        .run(vec![ProviderFetch::ok(
            "indexer-a",
            vec![stream("a1", "h1", 1080, 10)],
        )])
        .await
        .unwrap();

    assert_eq!(outcome.streams.len(), 1);
    assert!(outcome.streams[0].proxied);
    assert!(outcome.streams[0]
        .url
        .as_deref()
        .unwrap()
        .starts_with("https://proxy.example.com/p?u="));
}

#[tokio::test]
async fn dedup_runs_before_sort_so_first_seen_survives() {
    // the duplicate with the bigger size arrives second; survivor selection
    // happens in provider-fetch order, before sorting can reorder them
    let pipeline = StreamPipeline::new(config());

    let outcome = pipeline
        .run(vec![ProviderFetch::ok(
            "indexer-a",
            vec![stream("small-first", "h1", 720, 1), stream("big-second", "h1", 1080, 99)],
        )])
        .await
        .unwrap();

    assert_eq!(outcome.streams.len(), 1);
    assert_eq!(outcome.streams[0].id, "small-first");
}

#[tokio::test]
async fn serde_roundtrip_of_pipeline_config() {
    let raw = r#"{
        "dedupe": {
            "enabled": true,
            "key_components": ["info_hash", "filename"],
            "policy": "per_service"
        },
        "sort_rules": [
            { "key": "cached", "direction": "descending" },
            { "key": "size", "direction": "ascending" }
        ],
        "patterns": [
            { "name": "remux", "pattern": "(?i)remux" }
        ],
        "expressions": [
            { "name": "cached 4k", "filename": "2160p", "cached": true }
        ],
        "proxy": { "enabled": false, "url": "" }
    }"#;

    let config: PipelineConfig = serde_json::from_str(raw).unwrap();
    assert_eq!(config.dedupe.policy, DedupePolicy::PerService);
    assert_eq!(config.sort_rules[1].key, SortKey::Size);
    assert!(config.patterns[0].pattern.is_match("Show.REMUX.mkv"));
    assert!(config.expressions[0].filename.is_some());

    let encoded = serde_json::to_string(&config).unwrap();
    let decoded: PipelineConfig = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded.dedupe.policy, DedupePolicy::PerService);
}
