use crate::config::{PipelineConfig, StreamExpression};
use crate::stream::{ParsedStream, RegexMatch, SeadexTag};

/// Tags every stream with cross-cutting metadata. Total: no stream is ever
/// removed here.
pub fn apply(streams: &mut [ParsedStream], config: &PipelineConfig) {
    tag_curated(streams, config);
    tag_keywords(streams, config);
    tag_patterns(streams, config);
    tag_expressions(streams, &config.expressions);
}

fn tag_curated(streams: &mut [ParsedStream], config: &PipelineConfig) {
    if config.curated.is_empty() {
        return;
    }
    for stream in streams.iter_mut() {
        let Some(hash) = &stream.hash else { continue };
        if let Some(is_best) = config.curated.get(&hash.to_lowercase()) {
            stream.seadex = Some(SeadexTag {
                is_seadex: true,
                is_best: *is_best,
            });
        }
    }
}

fn tag_keywords(streams: &mut [ParsedStream], config: &PipelineConfig) {
    if config.keywords.is_empty() {
        return;
    }
    let keywords: Vec<String> = config.keywords.iter().map(|k| k.to_lowercase()).collect();

    for stream in streams.iter_mut() {
        let haystack = format!(
            "{} {}",
            stream.filename.as_deref().unwrap_or(""),
            stream.folder_name.as_deref().unwrap_or("")
        )
        .to_lowercase();
        stream.keyword_matched = Some(keywords.iter().any(|k| haystack.contains(k)));
    }
}

/// Ranked regexes: a stream records the first pattern it matches, by
/// priority (lowest index).
fn tag_patterns(streams: &mut [ParsedStream], config: &PipelineConfig) {
    for stream in streams.iter_mut() {
        for (index, named) in config.patterns.iter().enumerate() {
            let matched = [stream.filename.as_deref(), stream.folder_name.as_deref()]
                .into_iter()
                .flatten()
                .any(|text| named.pattern.is_match(text));
            if matched {
                stream.regex_matched = Some(RegexMatch {
                    name: named.name.clone(),
                    index,
                });
                break;
            }
        }
    }
}

/// Ranked expressions, first-match-wins: once a stream matches expression
/// `i` it is out of the running for `i+1..n`.
fn tag_expressions(streams: &mut [ParsedStream], expressions: &[StreamExpression]) {
    for (index, expression) in expressions.iter().enumerate() {
        for stream in streams.iter_mut() {
            if stream.stream_expression_matched.is_none() && matches_expression(stream, expression)
            {
                stream.stream_expression_matched = Some(index);
            }
        }
    }
}

fn matches_expression(stream: &ParsedStream, expression: &StreamExpression) -> bool {
    if let Some(pattern) = &expression.filename {
        let matched = stream
            .filename
            .as_deref()
            .map(|f| pattern.is_match(f))
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }
    if let Some(cached) = expression.cached {
        if stream.cached != cached {
            return false;
        }
    }
    if !expression.services.is_empty() {
        let matched = stream
            .service
            .as_deref()
            .map(|s| expression.services.iter().any(|allowed| allowed == s))
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }
    if let Some(min) = expression.min_size {
        if stream.size.unwrap_or(0) < min {
            return false;
        }
    }
    if let Some(max) = expression.max_size {
        if stream.size.unwrap_or(u64::MAX) > max {
            return false;
        }
    }
    true
}
