use axum::http::HeaderValue;
use base64::Engine;

/// Raster formats only; anything that can carry script is refused.
const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];

/// Where a payment screenshot lives: inline in a data URI or behind a URL.
#[derive(Debug, PartialEq)]
pub enum Screenshot {
    Inline { mime: String, bytes: Vec<u8> },
    /// Normalised, and always usable as a `Location` header.
    Url(String),
}

impl Screenshot {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.strip_prefix("data:") {
            Some(rest) => parse_data_uri(rest),
            None => parse_url(raw),
        }
    }

    /// The value to keep on the booking for a submitted `raw` screenshot.
    pub fn stored_form(raw: &str) -> Option<String> {
        match Self::parse(raw)? {
            Screenshot::Url(url) => Some(url),
            Screenshot::Inline { .. } => Some(raw.trim().to_string()),
        }
    }
}

fn parse_url(raw: &str) -> Option<Screenshot> {
    let url = reqwest::Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    let url = String::from(url);
    HeaderValue::from_str(&url).ok()?;
    Some(Screenshot::Url(url))
}

fn parse_data_uri(rest: &str) -> Option<Screenshot> {
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?.trim().to_ascii_lowercase();
    let mime = match mime.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => mime,
    };
    if !IMAGE_TYPES.contains(&mime.as_str()) {
        return None;
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()?;
    if bytes.is_empty() {
        return None;
    }

    Some(Screenshot::Inline { mime, bytes })
}
