//! Free-text parsing of inbound message content.
//!
//! Pure string processing: recipient marker extraction and message body
//! splitting. No I/O happens here.

/// Strip the HTML wrapper the server puts around plain-text statuses:
/// the outer `<p>...</p>` pair, with inner `</p><p>` boundaries turned
/// into blank lines.
pub fn strip_html(content: &str) -> String {
    let mut content = content;
    if let Some(rest) = content.strip_prefix("<p>") {
        content = rest;
    }
    if let Some(rest) = content.strip_suffix("</p>") {
        content = rest;
    }
    content.replace("</p><p>", "\n\n")
}

/// Find the recipient marker token in `content`.
///
/// Tokens are space-separated; a token qualifies if it starts with the
/// marker character and is longer than the marker alone. The last
/// qualifying token wins. Returns the raw token and the cleaned username.
pub fn extract_target(content: &str, marker: char) -> Option<(String, String)> {
    let mut found = None;
    for word in content.split(' ') {
        if is_marked(word, marker) {
            found = Some((word.to_string(), clean_username(word, marker)));
        }
    }
    found
}

fn is_marked(word: &str, marker: char) -> bool {
    word.starts_with(marker) && word.chars().count() > 1
}

/// Strip the marker and surrounding punctuation from a marked token, then
/// truncate at the first line break.
fn clean_username(word: &str, marker: char) -> String {
    let cleaned: String = word
        .chars()
        .filter(|c| !matches!(c, '?' | ':' | '!' | ',' | '(' | ')') && *c != marker)
        .collect();
    cleaned.lines().next().unwrap_or_default().to_string()
}

/// Extract the forwardable body: everything after the first non-blank
/// line, trimmed, re-joined with blank lines. `None` when the message has
/// fewer than two non-blank lines.
pub fn extract_body(content: &str) -> Option<String> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 2 {
        return None;
    }
    Some(lines[1..].join("\n\n"))
}
