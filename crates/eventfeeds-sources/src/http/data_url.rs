//! `data:` URLs (RFC 2397), decoded locally without a request.
//!
//! Some sites put per-event calendar files behind "Add to calendar" buttons
//! as `data:text/calendar;base64,...` links.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{SourceError, SourceResult};

/// Returns true if `url` uses the `data:` scheme.
pub fn is_data_url(url: &str) -> bool {
    url.get(..5).is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Decodes the payload of a `data:` URL to text.
///
/// Percent-encoding is always undone; base64 is decoded when the media type
/// carries `;base64`. Invalid UTF-8 is replaced rather than rejected.
pub fn decode_data_url(url: &str) -> SourceResult<String> {
    let rest = url
        .get(5..)
        .filter(|_| is_data_url(url))
        .ok_or_else(|| SourceError::invalid_response("not a data: URL"))?;

    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| SourceError::parse("malformed data: URL (no comma)"))?;

    let is_base64 = meta
        .split(';')
        .any(|param| param.trim().eq_ignore_ascii_case("base64"));

    let raw = urlencoding::decode_binary(payload.as_bytes());
    let bytes = if is_base64 {
        let compact: Vec<u8> = raw.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
        STANDARD
            .decode(compact)
            .map_err(|e| SourceError::parse(format!("invalid base64 in data: URL: {}", e)).with_source(e))?
    } else {
        raw.into_owned()
    };

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
