//! In-memory metadata search over the message index.
//!
//! Complexity: O(n) where n = number of messages.

use crate::model::mail::MessageEntry;

use super::query::{SearchField, SearchOperator, SearchQuery, SearchTerm};

/// Search the index metadata and return matching entry indices.
///
/// Applies date/size/attachment filters first (cheapest), then text terms.
pub fn search_metadata(entries: &[MessageEntry], query: &SearchQuery) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry_matches(entry, query))
        .map(|(i, _)| i)
        .collect()
}

/// Check whether a single entry matches the query.
pub fn entry_matches(entry: &MessageEntry, query: &SearchQuery) -> bool {
    let date = entry.date.date_naive();
    if query.before.is_some_and(|d| date >= d) {
        return false;
    }
    if query.after.is_some_and(|d| date <= d) {
        return false;
    }

    if query.larger_than.is_some_and(|n| entry.length <= n) {
        return false;
    }
    if query.smaller_than.is_some_and(|n| entry.length >= n) {
        return false;
    }

    if let Some(want_att) = query.has_attachment {
        if entry.has_attachments != want_att {
            return false;
        }
    }

    query.terms.iter().all(|term| term_matches_entry(entry, term))
}

/// Check if a text term matches an entry's metadata.
fn term_matches_entry(entry: &MessageEntry, term: &SearchTerm) -> bool {
    let raw_match = match term.field {
        SearchField::All => {
            matches_text(&entry.subject, &term.operator)
                || matches_text(&entry.from, &term.operator)
                || matches_text(&entry.to, &term.operator)
        }
        SearchField::From => matches_text(&entry.from, &term.operator),
        SearchField::To => matches_text(&entry.to, &term.operator),
        SearchField::Subject => matches_text(&entry.subject, &term.operator),
        SearchField::Label => entry.labels.iter().any(|l| matches_text(l, &term.operator)),
    };

    raw_match != term.negated
}

/// Case-insensitive text matching.
fn matches_text(haystack: &str, op: &SearchOperator) -> bool {
    let haystack_lower = haystack.to_lowercase();
    match op {
        SearchOperator::Contains(needle) | SearchOperator::Phrase(needle) => {
            haystack_lower.contains(needle.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::parse_query;
    use chrono::{TimeZone, Utc};

    fn make_entry(from: &str, subject: &str, date_str: &str) -> MessageEntry {
        let date = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map(|d| Utc.from_utc_datetime(&d.and_hms_opt(10, 0, 0).unwrap()))
            .unwrap_or(Utc::now());
        MessageEntry {
            offset: 0,
            length: 1000,
            date,
            from: from.to_string(),
            to: "recipient@example.com".to_string(),
            subject: subject.to_string(),
            message_id: format!("<msg-{subject}@example.com>"),
            thread_id: String::new(),
            labels: vec!["Inbox".to_string()],
            has_attachments: false,
            content_type: "text/plain".to_string(),
            sequence: 0,
        }
    }

    #[test]
    fn test_simple_search() {
        let entries = vec![
            make_entry("alice@example.com", "Budget Report", "2024-01-15"),
            make_entry("bob@example.com", "Meeting Notes", "2024-02-10"),
            make_entry("alice@example.com", "Re: Budget Report", "2024-01-20"),
        ];
        let results = search_metadata(&entries, &parse_query("budget"));
        assert_eq!(results, vec![0, 2]);
    }

    #[test]
    fn test_from_search() {
        let entries = vec![
            make_entry("Alice <alice@example.com>", "Hello", "2024-01-01"),
            make_entry("bob@example.com", "World", "2024-01-02"),
        ];
        let results = search_metadata(&entries, &parse_query("from:alice"));
        assert_eq!(results, vec![0]);
    }

    #[test]
    fn test_negated_search() {
        let entries = vec![
            make_entry("alice@example.com", "Important", "2024-01-01"),
            make_entry("bob@example.com", "Spam stuff", "2024-01-02"),
            make_entry("carol@example.com", "Normal", "2024-01-03"),
        ];
        let results = search_metadata(&entries, &parse_query("-subject:spam"));
        assert_eq!(results, vec![0, 2]);
    }

    #[test]
    fn test_before_after() {
        let entries = vec![
            make_entry("a@x.com", "Old", "2023-06-15"),
            make_entry("b@x.com", "New", "2024-03-10"),
            make_entry("c@x.com", "Recent", "2024-06-20"),
        ];
        assert_eq!(search_metadata(&entries, &parse_query("before:2024")), vec![0]);
        assert_eq!(
            search_metadata(&entries, &parse_query("after:2023 before:2024-06")),
            vec![1]
        );
    }

    #[test]
    fn test_size_filters() {
        let mut entries = vec![
            make_entry("a@x.com", "Small", "2024-01-01"),
            make_entry("b@x.com", "Big", "2024-01-02"),
        ];
        entries[0].length = 500;
        entries[1].length = 5_000_000;

        assert_eq!(search_metadata(&entries, &parse_query("larger:1M")), vec![1]);
        assert_eq!(search_metadata(&entries, &parse_query("smaller:1K")), vec![0]);
    }

    #[test]
    fn test_has_attachment_and_label() {
        let mut entries = vec![
            make_entry("a@x.com", "No att", "2024-01-01"),
            make_entry("b@x.com", "Has att", "2024-01-02"),
        ];
        entries[1].has_attachments = true;
        entries[1].labels = vec!["Archived".to_string()];

        assert_eq!(
            search_metadata(&entries, &parse_query("has:attachment")),
            vec![1]
        );
        assert_eq!(search_metadata(&entries, &parse_query("label:inbox")), vec![0]);
    }
}
