use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{Display, EnumString};

/// Which stream fields feed the composite dedup key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DedupeKeyComponent {
    Filename,
    InfoHash,
    Url,
}

/// How a group of duplicate streams collapses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DedupePolicy {
    /// Exactly one survivor per group.
    SingleResult,
    /// One survivor per originating service.
    PerService,
    /// One cached and one uncached survivor.
    PerCachedState,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DedupeConfig {
    pub enabled: bool,
    pub key_components: Vec<DedupeKeyComponent>,
    pub policy: DedupePolicy,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_components: vec![DedupeKeyComponent::Filename, DedupeKeyComponent::InfoHash],
            policy: DedupePolicy::SingleResult,
        }
    }
}

/// Stream attributes a sort rule can order by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Cached,
    Resolution,
    Size,
    Seeders,
    Service,
    Seadex,
    Keyword,
    /// Rank of the matched user regex; unmatched streams order last.
    RegexRank,
    /// Rank of the matched stream expression; unmatched streams order last.
    ExpressionRank,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Ascending,
    Descending,
}

/// One entry of the configured multi-key sort; the first non-equal
/// comparator wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRule {
    pub key: SortKey,
    pub direction: Order,
}

impl SortRule {
    pub fn new(key: SortKey, direction: Order) -> Self {
        Self { key, direction }
    }
}

/// A user regex with its position in the priority list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedPattern {
    pub name: String,
    #[serde(with = "serde_regex")]
    pub pattern: Regex,
}

/// One ranked stream expression: every specified condition must hold.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StreamExpression {
    pub name: String,
    #[serde(with = "serde_regex", default)]
    pub filename: Option<Regex>,
    #[serde(default)]
    pub cached: Option<bool>,
    /// Empty means any service.
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub min_size: Option<u64>,
    #[serde(default)]
    pub max_size: Option<u64>,
}

/// Proxy-rewrite settings for the proxify stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub enabled: bool,
    /// Base URL of the proxy's bulk URL-generation endpoint.
    pub url: String,
    /// Services whose streams may be proxied; empty allows all.
    #[serde(default)]
    pub allowed_services: Vec<String>,
    #[serde(default = "default_proxy_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_proxy_timeout_ms() -> u64 {
    15_000
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            allowed_services: Vec::new(),
            request_timeout_ms: default_proxy_timeout_ms(),
        }
    }
}

/// Immutable per-process pipeline configuration. Loading and validation
/// belong to the configuration layer; this crate only consumes it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub dedupe: DedupeConfig,
    pub sort_rules: Vec<SortRule>,
    /// Keywords flagged during precompute, matched case-insensitively
    /// against filename and folder name.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Ranked user regexes; a stream records the first one it matches.
    #[serde(default)]
    pub patterns: Vec<NamedPattern>,
    /// Ranked stream expressions; first match wins, matched streams leave
    /// the running for later expressions.
    #[serde(default)]
    pub expressions: Vec<StreamExpression>,
    /// Curated releases: info hash (lowercase) to "is the best release".
    #[serde(default)]
    pub curated: HashMap<String, bool>,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedupe: DedupeConfig::default(),
            sort_rules: vec![
                SortRule::new(SortKey::Cached, Order::Descending),
                SortRule::new(SortKey::Resolution, Order::Descending),
                SortRule::new(SortKey::Size, Order::Descending),
            ],
            keywords: Vec::new(),
            patterns: Vec::new(),
            expressions: Vec::new(),
            curated: HashMap::new(),
            proxy: ProxyConfig::default(),
        }
    }
}
