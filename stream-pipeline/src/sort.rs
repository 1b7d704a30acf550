use crate::config::{Order, SortKey, SortRule};
use crate::error::PipelineError;
use crate::stream::ParsedStream;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Stable multi-key sort per the configured rule list. Ties cascade to the
/// next rule; the final tie preserves input order, so output is
/// reproducible for identical input.
pub fn apply(streams: &mut [ParsedStream], rules: &[SortRule]) -> Result<(), PipelineError> {
    validate(rules)?;

    streams.sort_by(|a, b| {
        for rule in rules {
            let ordering = match rule.direction {
                Order::Ascending => compare_by(a, b, rule.key),
                Order::Descending => compare_by(a, b, rule.key).reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn validate(rules: &[SortRule]) -> Result<(), PipelineError> {
    if rules.is_empty() {
        return Err(PipelineError::InvalidSortRules(
            "no sort rules configured".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for rule in rules {
        if !seen.insert(rule.key) {
            return Err(PipelineError::InvalidSortRules(format!(
                "duplicate sort key: {}",
                rule.key
            )));
        }
    }
    Ok(())
}

/// Natural ascending order per key. Streams missing the attribute order
/// before those that have it, so descending sorts push them last.
fn compare_by(a: &ParsedStream, b: &ParsedStream, key: SortKey) -> Ordering {
    match key {
        SortKey::Cached => a.cached.cmp(&b.cached),
        SortKey::Resolution => a.resolution.unwrap_or(0).cmp(&b.resolution.unwrap_or(0)),
        SortKey::Size => a.size.unwrap_or(0).cmp(&b.size.unwrap_or(0)),
        SortKey::Seeders => a.seeders.unwrap_or(0).cmp(&b.seeders.unwrap_or(0)),
        SortKey::Service => a.service.cmp(&b.service),
        SortKey::Seadex => seadex_score(a).cmp(&seadex_score(b)),
        SortKey::Keyword => a
            .keyword_matched
            .unwrap_or(false)
            .cmp(&b.keyword_matched.unwrap_or(false)),
        SortKey::RegexRank => {
            rank_score(a.regex_matched.as_ref().map(|m| m.index))
                .cmp(&rank_score(b.regex_matched.as_ref().map(|m| m.index)))
        }
        SortKey::ExpressionRank => {
            rank_score(a.stream_expression_matched).cmp(&rank_score(b.stream_expression_matched))
        }
    }
}

fn seadex_score(stream: &ParsedStream) -> u8 {
    match &stream.seadex {
        Some(tag) if tag.is_best => 2,
        Some(tag) if tag.is_seadex => 1,
        _ => 0,
    }
}

/// Lower rank index is better; unmatched is worst. Mapped so that the
/// natural ascending order goes unmatched, worst match, ..., best match.
fn rank_score(index: Option<usize>) -> i64 {
    match index {
        Some(index) => -(index as i64),
        None => i64::MIN,
    }
}
