//! Source aggregation and deduplication (spec.md §4.5): "deduplicate by
//! normalized URL (scheme+host+path lowercased, trailing slash stripped)".

use acm_contracts::Source;

/// Normalizes a URL for dedup comparison: lowercases scheme+host+path and
/// strips a trailing slash. Falls back to a plain lowercase trim if the URL
/// doesn't parse cleanly into scheme/host/path (e.g. a bare string), so a
/// malformed source never panics the combiner.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme_sep = trimmed.find("://").map(|idx| idx + 3);
    let (scheme, rest) = match without_scheme_sep {
        Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
        None => ("", trimmed),
    };
    let rest_no_fragment = rest.split('#').next().unwrap_or(rest);
    let rest_no_query = rest_no_fragment.split('?').next().unwrap_or(rest_no_fragment);
    let stripped = rest_no_query.trim_end_matches('/');
    format!("{scheme}{stripped}").to_lowercase()
}

/// Merges and deduplicates sources from multiple artifacts by normalized
/// URL, keeping the first-seen title for a given URL.
pub fn dedupe_sources(all: impl IntoIterator<Item = Source>) -> Vec<Source> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for source in all {
        let key = normalize_url(&source.url);
        if seen.insert(key) {
            result.push(source);
        }
    }
    result
}

/// Renders a `references` block for appending to combined content when
/// `include_sources=true` (spec.md §4.5).
pub fn render_references_block(sources: &[Source]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let mut block = String::from("\n\n## References\n\n");
    for (i, source) in sources.iter().enumerate() {
        let label = source.title.as_deref().unwrap_or(&source.url);
        block.push_str(&format!("{}. [{}]({})\n", i + 1, label, source.url));
    }
    block
}
