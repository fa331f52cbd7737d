//! RFC 5322 header parsing: folding, encoded-words (RFC 2047), and date parsing.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

use crate::model::mail::MessageEntry;

/// Build a [`MessageEntry`] from raw header bytes.
///
/// Only the headers the index needs are extracted. The body is not read.
pub fn parse_headers_to_entry(
    raw_headers: &[u8],
    offset: u64,
    message_length: u64,
    sequence: u64,
) -> crate::error::Result<MessageEntry> {
    let text = decode_header_bytes(raw_headers);
    let headers = unfold_headers(&text);

    let date = get_header(&headers, "date")
        .and_then(|d| parse_date(&d))
        .unwrap_or(DateTime::UNIX_EPOCH);

    let from = decode_encoded_words(&get_header(&headers, "from").unwrap_or_default());
    let to = decode_encoded_words(&get_header(&headers, "to").unwrap_or_default());
    let subject = decode_encoded_words(&get_header(&headers, "subject").unwrap_or_default());

    let message_id = get_header(&headers, "message-id")
        .map(|s| extract_angle_bracket(&s))
        .unwrap_or_default();

    let thread_id = get_header(&headers, "x-gm-thrid").unwrap_or_default();

    let content_type = get_header(&headers, "content-type")
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
        .unwrap_or_else(|| "text/plain".to_string());

    let has_attachments = content_type.starts_with("multipart/mixed")
        || content_type.starts_with("multipart/related")
        || headers
            .iter()
            .any(|(k, v)| k == "content-disposition" && v.to_lowercase().contains("attachment"));

    let labels = get_header(&headers, "x-gmail-labels")
        .map(|s| split_labels(&decode_encoded_words(&s)))
        .unwrap_or_default();

    Ok(MessageEntry {
        offset,
        length: message_length,
        date,
        from,
        to,
        subject,
        message_id,
        thread_id,
        labels,
        has_attachments,
        content_type,
        sequence,
    })
}

/// Split an `X-Gmail-Labels` value into labels.
pub fn split_labels(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Find the byte offset where headers end (position of the first blank line).
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i);
        }
        if data[i..].starts_with(b"\r\n\r\n") {
            return Some(i);
        }
    }
    None
}

/// Look up one header of a raw message (case-insensitive, unfolded, decoded).
pub fn raw_header_value(raw_message: &[u8], name: &str) -> Option<String> {
    let end = find_header_end(raw_message).unwrap_or(raw_message.len());
    let text = decode_header_bytes(&raw_message[..end]);
    let headers = unfold_headers(&text);
    get_header(&headers, &name.to_lowercase()).map(|v| decode_encoded_words(&v))
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
        // Lines without a colon and not a continuation are silently skipped
    }

    result
}

/// Get the first value for a header name (`name` must be lowercase).
fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some((text, consumed)) = decode_one_word(after_start) {
            result.push_str(&text);
            remaining = &remaining[start + 2 + consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?encoding?text?=`, returning the text and the bytes consumed.
fn decode_one_word(s: &str) -> Option<(String, usize)> {
    let (charset, rest) = s.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let encoded_text = &rest[..end];
    let consumed = charset.len() + 1 + encoding.len() + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => {
            let compact: String = encoded_text.split_whitespace().collect();
            BASE64.decode(compact.as_bytes()).ok()?
        }
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some((decode_charset(charset, &bytes), consumed))
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => result.push(b' '),
            b'=' => {
                let byte = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                if let Some(byte) = byte {
                    result.push(byte);
                    i += 3;
                    continue;
                }
                result.push(b'=');
            }
            b => result.push(b),
        }
        i += 1;
    }
    result
}

/// Decode bytes using a named charset.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    // RFC 2231 language suffix: `utf-8*en`
    let charset = charset.split('*').next().unwrap_or(charset);
    match charset.to_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Extract content between `<` and `>` (for Message-ID).
fn extract_angle_bracket(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(start) = trimmed.find('<') {
        if let Some(end) = trimmed[start..].find('>') {
            return trimmed[start..start + end + 1].to_string();
        }
    }
    trimmed.to_string()
}

/// Parse an email date string in the common formats.
///
/// Supports RFC 2822, RFC 3339 and the usual broken real-world variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // Drop a leading day-of-week and a trailing "(UTC)" style comment
    let no_dow = trimmed
        .split_once(", ")
        .filter(|(dow, _)| dow.len() == 3)
        .map_or(trimmed, |(_, rest)| rest);
    let cleaned = no_dow
        .split_once(" (")
        .map_or(no_dow, |(before, _)| before)
        .trim();
    let cleaned = replace_named_tz(cleaned);

    const FORMATS: &[&str] = &[
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d-%b-%Y %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S %z",
    ];
    const NAIVE_FORMATS: &[&str] = &[
        "%d %b %Y %H:%M:%S",
        "%d-%b-%Y %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%a %b %e %H:%M:%S %Y",
    ];

    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&cleaned, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    // Last resort: mail-parser's own date parser
    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Attempt to parse a date using `mail-parser`'s built-in parser.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    use mail_parser::MessageParser;

    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Replace a trailing timezone abbreviation with its numeric offset.
fn replace_named_tz(s: &str) -> String {
    const TZS: &[(&str, &str)] = &[
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("UT", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
    ];
    for (name, offset) in TZS {
        if let Some(head) = s.strip_suffix(name) {
            if head.ends_with(' ') {
                return format!("{head}{offset}");
            }
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_adjacent_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        assert_eq!(
            decode_encoded_words("Fwd: =?UTF-8?Q?Factura_n=C2=BA_12?= (scan)"),
            "Fwd: Factura nº 12 (scan)"
        );
    }

    #[test]
    fn test_broken_encoded_word_is_kept() {
        assert_eq!(decode_encoded_words("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
        assert_eq!(decode_encoded_words("a =? b"), "a =? b");
    }

    #[test]
    fn test_q_encoding_trailing_equals() {
        assert_eq!(decode_q_encoding("a=4"), b"a=4".to_vec());
        assert_eq!(decode_q_encoding("a=41"), b"aA".to_vec());
    }

    #[test]
    fn test_unfold_headers() {
        let text = "Subject: Holiday photos\n\tfrom the lake\nX-GM-THRID: 1790000000000000001\n";
        let headers = unfold_headers(text);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "subject");
        assert_eq!(headers[0].1, "Holiday photos from the lake");
        assert_eq!(headers[1].0, "x-gm-thrid");
    }

    #[test]
    fn test_parse_headers_to_entry() {
        let raw = b"From sender@example.com Mon Jan 08 09:30:00 2018\n\
X-GM-THRID: 1589000000000000001\n\
X-Gmail-Labels: Inbox,Important,Category Personal\n\
Date: Mon, 08 Jan 2018 09:30:00 +0100\n\
From: Ana <ana@example.com>\n\
To: bob@example.com\n\
Subject: =?UTF-8?Q?Fotos_del_viaje?=\n\
Message-ID: <trip@example.com>\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\n";
        let entry = parse_headers_to_entry(raw, 42, 1000, 3).expect("entry");
        assert_eq!(entry.offset, 42);
        assert_eq!(entry.subject, "Fotos del viaje");
        assert_eq!(entry.thread_id, "1589000000000000001");
        assert_eq!(entry.labels, vec!["Inbox", "Important", "Category Personal"]);
        assert_eq!(entry.message_id, "<trip@example.com>");
        assert!(entry.has_attachments);
        assert_eq!(entry.date.format("%Y-%m-%d %H:%M").to_string(), "2018-01-08 08:30");
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"From: a@b.com\nSubject: Hi\n\nBody\n"), Some(25));
        assert_eq!(
            find_header_end(b"From: a@b.com\r\nSubject: Hi\r\n\r\nBody\r\n"),
            Some(26)
        );
        assert_eq!(find_header_end(b"Subject: no body"), None);
    }

    #[test]
    fn test_raw_header_value() {
        let raw = b"Subject: =?UTF-8?B?SG9sYQ==?=\r\nDate: x\r\n\r\nSubject: body line\r\n";
        assert_eq!(raw_header_value(raw, "Subject").as_deref(), Some("Hola"));
        assert_eq!(raw_header_value(raw, "X-Missing"), None);
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0000").expect("date");
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-04");
    }

    #[test]
    fn test_parse_date_named_tz_and_comment() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 EST").expect("date");
        assert_eq!(dt.format("%H").to_string(), "15");
        assert!(parse_date("Thu, 4 Jan 2024 10:00:00 +0000 (UTC)").is_some());
    }

    #[test]
    fn test_parse_date_iso8601() {
        assert!(parse_date("2024-01-04T10:00:00Z").is_some());
    }

    #[test]
    fn test_parse_date_asctime() {
        let dt = parse_date("Mon Jan 08 09:30:00 2018").expect("date");
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2018-01-08");
    }

    #[test]
    fn test_decode_windows1252_encoded_word() {
        assert_eq!(decode_encoded_words("=?Windows-1252?Q?M=FCller?="), "Müller");
    }
}
