use crate::models::{RejectReason, ValidationVerdict};
use crate::utils::content_type::{OCTET_STREAM, normalize_content_type};
use std::path::Path;
use thiserror::Error;

/// Maximum file size: 2 MiB, inclusive
pub const MAX_FILE_SIZE: usize = 2 * 1024 * 1024;

/// Maximum filename length in characters
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Normalized content types an upload may have
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/svg+xml",
    "text/plain",
    "text/markdown",
    "text/x-markdown",
    "application/x-markdown",
    "text/x-web-markdown",
    "text/csv",
    "application/csv",
    // Only together with an allowed extension
    OCTET_STREAM,
];

/// Lower-cased, without the leading dot
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "svg", "txt", "md", "markdown", "csv",
];

/// Windows device names, never valid as a base name
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Clone, Error)]
#[error("{reason}: {message}")]
pub struct ValidationError {
    pub reason: RejectReason,
    pub message: String,
}

impl ValidationError {
    fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ValidationVerdict {
    fn from(err: ValidationError) -> Self {
        ValidationVerdict::rejected(err.reason, err.message)
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

/// Validates file size against the (0, max] window
pub fn validate_file_size(size: usize, max_size: usize) -> Result<()> {
    if size == 0 {
        return Err(ValidationError::new(
            RejectReason::NoFile,
            "No file provided",
        ));
    }
    if size > max_size {
        return Err(ValidationError::new(
            RejectReason::TooLarge,
            format!(
                "File size exceeds {}MB limit ({} bytes > {} bytes)",
                max_size / 1024 / 1024,
                size,
                max_size
            ),
        ));
    }
    Ok(())
}

/// Validates a classified content type against the allowlist.
///
/// The generic binary type is only admissible when the filename carries an
/// allowed extension.
pub fn validate_content_type(content_type: &str, filename: &str) -> Result<String> {
    let normalized = normalize_content_type(content_type);

    if !ALLOWED_CONTENT_TYPES.contains(&normalized.as_str()) {
        return Err(ValidationError::new(
            RejectReason::UnsupportedType,
            format!("File type '{}' is not supported", normalized),
        ));
    }

    if normalized == OCTET_STREAM {
        validate_extension(filename)?;
    }

    Ok(normalized)
}

/// Requires a non-empty extension from the allowlist
pub fn validate_extension(filename: &str) -> Result<String> {
    let ext = extension_of(filename).ok_or_else(|| {
        ValidationError::new(
            RejectReason::InvalidFilename,
            "Filename must include a file extension",
        )
    })?;

    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ValidationError::new(
            RejectReason::UnsupportedExtension,
            format!(
                "File extension '.{}' is not allowed. Allowed extensions: {}",
                ext,
                allowed_extensions_display()
            ),
        ));
    }

    Ok(ext)
}

/// Checks filename well-formedness, stopping at the first violation
pub fn validate_filename(filename: &str) -> Result<()> {
    let length = filename.chars().count();
    if length == 0 {
        return Err(ValidationError::new(
            RejectReason::InvalidFilename,
            "Filename cannot be empty",
        ));
    }
    if length > MAX_FILENAME_LENGTH {
        return Err(ValidationError::new(
            RejectReason::InvalidFilename,
            format!(
                "Filename is too long ({} characters, maximum {})",
                length, MAX_FILENAME_LENGTH
            ),
        ));
    }

    if !filename
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
    {
        if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
            tracing::warn!("Path traversal attempt detected: {}", filename);
        }
        return Err(ValidationError::new(
            RejectReason::InvalidFilename,
            "Filename contains invalid characters",
        ));
    }

    let base = base_name(filename);
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(base))
    {
        return Err(ValidationError::new(
            RejectReason::InvalidFilename,
            format!("Filename '{}' uses a reserved system name", base),
        ));
    }

    if filename.starts_with('.') || filename.starts_with(' ') {
        return Err(ValidationError::new(
            RejectReason::InvalidFilename,
            "Filename cannot start with a dot or space",
        ));
    }
    if filename.ends_with(' ') || base.ends_with(' ') {
        return Err(ValidationError::new(
            RejectReason::InvalidFilename,
            "Filename cannot end with a space",
        ));
    }

    validate_extension(filename)?;

    Ok(())
}

/// Local checks for one upload in order: size, content type against the
/// filename, then the filename itself. `content_type` is the classified type,
/// never the client's declaration.
pub fn validate_upload(
    size: usize,
    max_size: usize,
    content_type: &str,
    filename: &str,
) -> ValidationVerdict {
    let checked = validate_file_size(size, max_size)
        .and_then(|_| validate_content_type(content_type, filename))
        .and_then(|normalized| validate_filename(filename).map(|_| normalized));

    match checked {
        Ok(normalized_content_type) => ValidationVerdict::Accepted {
            normalized_content_type,
        },
        Err(e) => e.into(),
    }
}

/// Lower-cased extension without the dot, if there is a non-empty one
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() || stem.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

fn base_name(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

fn allowed_extensions_display() -> String {
    ALLOWED_EXTENSIONS
        .iter()
        .map(|e| format!(".{}", e))
        .collect::<Vec<_>>()
        .join(", ")
}

/// "1.5 KB" style rendering, two decimals at most
pub fn human_readable_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

pub fn is_image(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

pub fn is_text(content_type: &str) -> bool {
    content_type.starts_with("text/") || content_type.contains("csv")
}
