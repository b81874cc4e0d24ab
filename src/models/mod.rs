use crate::services::scanner::ScanOutcome;
use bytes::Bytes;
use serde::Serialize;
use std::pin::Pin;
use tokio::io::AsyncRead;
use utoipa::ToSchema;

/// Stable rejection codes rendered by the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoFile,
    TooLarge,
    UnsupportedType,
    UnsupportedExtension,
    InvalidFilename,
    ScanInfected,
    ScanUnavailable,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoFile => "no_file",
            RejectReason::TooLarge => "too_large",
            RejectReason::UnsupportedType => "unsupported_type",
            RejectReason::UnsupportedExtension => "unsupported_extension",
            RejectReason::InvalidFilename => "invalid_filename",
            RejectReason::ScanInfected => "scan_infected",
            RejectReason::ScanUnavailable => "scan_unavailable",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The inbound file for the duration of one request
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    pub filename: String,
    /// Content type claimed by the client, if any. Never trusted on its own.
    pub declared_content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadCandidate {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            declared_content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_declared_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.declared_content_type = Some(content_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// A fresh reader over the payload. Cloning `Bytes` does not copy.
    pub fn reader(&self) -> Pin<Box<dyn AsyncRead + Send>> {
        Box::pin(std::io::Cursor::new(self.bytes.clone()))
    }
}

/// Result of the local filename / type / size checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    Accepted {
        normalized_content_type: String,
    },
    Rejected {
        reason: RejectReason,
        message: String,
    },
}

impl ValidationVerdict {
    pub fn rejected(reason: RejectReason, message: impl Into<String>) -> Self {
        ValidationVerdict::Rejected {
            reason,
            message: message.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationVerdict::Accepted { .. })
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            ValidationVerdict::Accepted { .. } => None,
            ValidationVerdict::Rejected { reason, .. } => Some(*reason),
        }
    }
}

/// How the scan stage reached its verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanAnnotation {
    /// Authoritative daemon verdict
    Scanned,
    /// Scanning disabled by configuration; the outcome is synthetic
    Skipped,
    /// The scan failed and fail-open policy let the file through
    FailedOpen { warning: String },
}

impl ScanAnnotation {
    pub fn warning(&self) -> Option<&str> {
        match self {
            ScanAnnotation::FailedOpen { warning } => Some(warning),
            _ => None,
        }
    }
}

/// The single output of the upload pipeline
#[derive(Debug, Clone)]
pub enum PipelineDecision {
    Accept {
        content_type: String,
        scan: ScanOutcome,
        annotation: ScanAnnotation,
    },
    Reject {
        reason: RejectReason,
        message: String,
        detail: Option<String>,
    },
}

impl PipelineDecision {
    pub fn reject(reason: RejectReason, message: impl Into<String>) -> Self {
        PipelineDecision::Reject {
            reason,
            message: message.into(),
            detail: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, PipelineDecision::Accept { .. })
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            PipelineDecision::Accept { .. } => None,
            PipelineDecision::Reject { reason, .. } => Some(*reason),
        }
    }
}
