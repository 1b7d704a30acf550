use crate::config::{DedupeConfig, DedupeKeyComponent, DedupePolicy};
use crate::stream::ParsedStream;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use stream_cache::fetch_key;

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Groups streams by the configured composite key and collapses each group
/// per policy. Survivor selection is deterministic: earliest occurrence in
/// provider-fetch order per bucket.
pub fn apply(streams: Vec<ParsedStream>, config: &DedupeConfig) -> Vec<ParsedStream> {
    if !config.enabled || streams.is_empty() {
        return streams;
    }

    // group indices by composite key, first-seen order preserved
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    let mut group_order: Vec<String> = Vec::new();
    let mut ungrouped: Vec<usize> = Vec::new();

    for (index, stream) in streams.iter().enumerate() {
        match composite_key(stream, &config.key_components) {
            Some(key) => {
                let bucket = groups.entry(key.clone()).or_insert_with(|| {
                    group_order.push(key);
                    Vec::new()
                });
                bucket.push(index);
            }
            // nothing usable to group on; such streams always survive
            None => ungrouped.push(index),
        }
    }

    let mut survivors: HashSet<usize> = ungrouped.into_iter().collect();
    let mut dropped = 0usize;

    for key in &group_order {
        let indices = &groups[key];
        let kept = collapse(&streams, indices, config.policy);
        dropped += indices.len() - kept.len();
        survivors.extend(kept);
    }

    if dropped > 0 {
        log::debug!("deduplication dropped {} duplicate streams", dropped);
    }

    streams
        .into_iter()
        .enumerate()
        .filter(|(index, _)| survivors.contains(index))
        .map(|(_, stream)| stream)
        .collect()
}

/// Picks the surviving indices of one duplicate group.
fn collapse(streams: &[ParsedStream], indices: &[usize], policy: DedupePolicy) -> Vec<usize> {
    match policy {
        DedupePolicy::SingleResult => indices.first().map(|i| vec![*i]).unwrap_or_default(),
        DedupePolicy::PerService => {
            let mut seen: HashSet<Option<&str>> = HashSet::new();
            let mut kept = Vec::new();
            for &index in indices {
                if seen.insert(streams[index].service.as_deref()) {
                    kept.push(index);
                }
            }
            kept
        }
        DedupePolicy::PerCachedState => {
            let mut seen: HashSet<bool> = HashSet::new();
            let mut kept = Vec::new();
            for &index in indices {
                if seen.insert(streams[index].cached) {
                    kept.push(index);
                }
            }
            kept
        }
    }
}

fn composite_key(stream: &ParsedStream, components: &[DedupeKeyComponent]) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    for component in components {
        match component {
            DedupeKeyComponent::Filename => {
                if let Some(filename) = &stream.filename {
                    parts.push(format!("filename:{}", normalize(filename)));
                }
            }
            DedupeKeyComponent::InfoHash => {
                if let Some(hash) = &stream.hash {
                    parts.push(format!("hash:{}", hash.to_lowercase()));
                }
            }
            DedupeKeyComponent::Url => {
                if let Some(url) = &stream.url {
                    parts.push(format!("url:{}", url));
                }
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(fetch_key(&parts))
    }
}

/// Lowercase and strip separators so release-name cosmetics don't defeat
/// grouping.
fn normalize(filename: &str) -> String {
    NON_ALNUM
        .replace_all(&filename.to_lowercase(), "")
        .into_owned()
}
