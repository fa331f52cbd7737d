//! Search engine: query parsing and metadata search.

pub mod metadata;
pub mod query;

use crate::model::mail::MessageEntry;

use self::query::{parse_query, SearchQuery};

/// High-level search: parse the query, search metadata and return matching
/// entry indices ordered newest first.
pub fn execute(entries: &[MessageEntry], query_str: &str) -> (SearchQuery, Vec<usize>) {
    let query = parse_query(query_str);

    let mut results = if query.is_empty() {
        (0..entries.len()).collect()
    } else {
        metadata::search_metadata(entries, &query)
    };

    results.sort_by(|&a, &b| {
        entries[b]
            .date
            .cmp(&entries[a].date)
            .then(entries[b].offset.cmp(&entries[a].offset))
    });

    (query, results)
}
