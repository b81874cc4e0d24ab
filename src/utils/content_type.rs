//! Best-guess media type for an upload.
//!
//! Magic bytes win. When they say nothing useful the filename extension is
//! consulted, and anything still unknown is `application/octet-stream`.

use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// How many leading bytes are inspected
pub const SNIFF_LEN: usize = 8 * 1024;

const EXTENSION_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("markdown", "text/markdown"),
    ("csv", "text/csv"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
];

/// Aliases some clients and sniffers use for markdown
pub const MARKDOWN_ALIASES: &[&str] = &[
    "text/x-markdown",
    "application/x-markdown",
    "text/x-web-markdown",
];

/// Classify `bytes` uploaded under `filename` into a normalized media type.
pub fn classify(bytes: &[u8], filename: &str) -> String {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];

    match sniff(head) {
        Some(mime) if mime != OCTET_STREAM => normalize_content_type(mime),
        _ => type_for_extension(filename)
            .unwrap_or(OCTET_STREAM)
            .to_string(),
    }
}

/// Lowercase, drop parameters and fold markdown aliases.
pub fn normalize_content_type(content_type: &str) -> String {
    let essence = match content_type.trim().parse::<mime::Mime>() {
        Ok(parsed) => parsed.essence_str().to_lowercase(),
        Err(_) => content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase(),
    };

    if MARKDOWN_ALIASES.contains(&essence.as_str()) {
        return "text/markdown".to_string();
    }
    if essence.is_empty() {
        return OCTET_STREAM.to_string();
    }
    essence
}

/// Static extension lookup, case-insensitive
pub fn type_for_extension(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();
    EXTENSION_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

fn sniff(head: &[u8]) -> Option<&'static str> {
    if head.is_empty() {
        return None;
    }
    // infer reports SVG documents as generic XML
    if looks_like_svg(head) {
        return Some("image/svg+xml");
    }
    infer::get(head).map(|kind| kind.mime_type())
}

fn looks_like_svg(head: &[u8]) -> bool {
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    let Ok(text) = std::str::from_utf8(head) else {
        return false;
    };
    let text = text.trim_start();
    if text.starts_with("<svg") {
        return true;
    }
    (text.starts_with("<?xml") || text.starts_with("<!DOCTYPE svg") || text.starts_with("<!--"))
        && text.contains("<svg")
}
