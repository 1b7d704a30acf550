use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Curated-release membership, tagged during precompute.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeadexTag {
    pub is_seadex: bool,
    pub is_best: bool,
}

/// Which user regex matched a stream, and its rank in the configured list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegexMatch {
    pub name: String,
    pub index: usize,
}

/// The normalized unit flowing through the pipeline.
///
/// Created once per request per provider result and mutated in place by
/// each stage; the stable identity is what dedup and sort bookkeeping rely
/// on. Providers must not touch records after handing them over.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedStream {
    pub id: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub folder_name: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Vertical resolution in lines (1080, 2160, ...).
    #[serde(default)]
    pub resolution: Option<u32>,
    #[serde(default)]
    pub seeders: Option<u32>,
    #[serde(default)]
    pub indexer: Option<String>,
    #[serde(default)]
    pub release_group: Option<String>,
    /// Instantly available on the debrid service.
    #[serde(default)]
    pub cached: bool,
    /// Originating debrid/usenet service, when any.
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub seadex: Option<SeadexTag>,
    /// `Some` once precompute ran with a configured keyword list.
    #[serde(default)]
    pub keyword_matched: Option<bool>,
    #[serde(default)]
    pub regex_matched: Option<RegexMatch>,
    /// Rank of the first matching stream expression, lower is better.
    #[serde(default)]
    pub stream_expression_matched: Option<usize>,
    #[serde(default)]
    pub proxied: bool,
    /// Headers the player must send upstream; cleared once a proxy takes
    /// over that responsibility.
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
}

impl ParsedStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hash: None,
            url: None,
            filename: None,
            folder_name: None,
            size: None,
            resolution: None,
            seeders: None,
            indexer: None,
            release_group: None,
            cached: false,
            service: None,
            seadex: None,
            keyword_matched: None,
            regex_matched: None,
            stream_expression_matched: None,
            proxied: false,
            request_headers: HashMap::new(),
        }
    }
}

/// One provider's contribution to a request: its normalized records, or
/// the failure that replaced them.
#[derive(Debug)]
pub struct ProviderFetch {
    pub provider: String,
    pub result: Result<Vec<ParsedStream>, ProviderError>,
}

impl ProviderFetch {
    pub fn ok(provider: impl Into<String>, streams: Vec<ParsedStream>) -> Self {
        Self {
            provider: provider.into(),
            result: Ok(streams),
        }
    }

    pub fn failed(provider: impl Into<String>, error: ProviderError) -> Self {
        Self {
            provider: provider.into(),
            result: Err(error),
        }
    }
}
