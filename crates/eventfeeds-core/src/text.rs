//! Text cleanup helpers shared by extractors and the normalizer.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static DATE_PREFIX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{3}\s+\d{1,2},\s+\d{4}:\s+").expect("Invalid date prefix regex")
});

static TRAILING_AT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+at\s+(.+)$").expect("Invalid trailing at regex"));

static SCRIPT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
        .expect("Invalid script regex")
});

static BREAK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr|section|article|blockquote)\s*>|<(p|li|tr)\b[^>]*>")
        .expect("Invalid break regex")
});

static INLINE_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(a|abbr|b|code|em|font|i|mark|small|span|strong|sub|sup|u)\b[^>]*>")
        .expect("Invalid inline tag regex")
});

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Invalid tag regex"));

static HTML_HINT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(/?[a-z][a-z0-9]*)(\s[^>]*)?/?>|&[a-z]+;|&#\d+;")
        .expect("Invalid HTML hint regex")
});

static ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#\d+|[a-zA-Z]+);").expect("Invalid entity regex")
});

/// Collapses every run of whitespace into a single space and trims.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns true if the string appears to contain HTML markup or entities.
pub fn looks_like_html(s: &str) -> bool {
    HTML_HINT_REGEX.is_match(s)
}

/// Decodes the HTML character references that show up in event listings.
pub fn decode_entities(s: &str) -> String {
    ENTITY_REGEX
        .replace_all(s, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse().ok().and_then(char::from_u32)
            } else {
                named_entity(entity)
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "hellip" => '…',
        "bull" => '•',
        "middot" => '·',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        _ => return None,
    };
    Some(c)
}

/// Converts an HTML fragment to compact plain text.
///
/// Block-level boundaries become line breaks and inline tags vanish without
/// a gap; every line has its whitespace collapsed and blank lines are
/// dropped.
pub fn strip_html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let without_scripts = SCRIPT_REGEX.replace_all(html, " ");
    let with_breaks = BREAK_REGEX.replace_all(&without_scripts, "\n");
    let without_inline = INLINE_TAG_REGEX.replace_all(&with_breaks, "");
    let without_tags = TAG_REGEX.replace_all(&without_inline, " ");
    let decoded = decode_entities(&without_tags);

    decoded
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Removes a leading "Oct 23, 2025: " date prefix from a title and, when no
/// location is known, moves a trailing " at <place>" into the location.
pub fn clean_title_and_location(raw_title: &str, location: Option<&str>) -> (String, Option<String>) {
    let title = collapse_whitespace(raw_title);
    let mut title = DATE_PREFIX_REGEX.replace(&title, "").trim().to_string();

    let mut location = location
        .map(collapse_whitespace)
        .filter(|loc| !loc.is_empty());

    if location.is_none()
        && let Some(caps) = TRAILING_AT_REGEX.captures(&title)
    {
        let place = caps[1].trim().to_string();
        let stripped = TRAILING_AT_REGEX.replace(&title, "").trim().to_string();
        if !place.is_empty() && !stripped.is_empty() {
            location = Some(place);
            title = stripped;
        }
    }

    (title, location)
}

/// Reverses iCalendar TEXT escaping (`\n`, `\,`, `\;`, `\\`).
pub fn unescape_ics_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Shortens `s` to at most `max_chars` characters on a word boundary.
pub fn excerpt(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > max_chars / 2 => format!("{}…", cut[..idx].trim_end()),
        _ => format!("{}…", cut.trim_end()),
    }
}
