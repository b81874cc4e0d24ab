use crate::models::{PipelineDecision, RejectReason, UploadCandidate, ValidationVerdict};
use crate::services::scan_policy::{ScanDisposition, ScanPolicyEngine};
use crate::services::scanner::VirusScanner;
use crate::utils::content_type::{self, normalize_content_type};
use crate::utils::validation::{MAX_FILE_SIZE, validate_upload};
use chrono::Utc;
use std::sync::Arc;

/// Ordered upload validation ending in a single accept/reject decision.
///
/// presence -> classify -> size -> type/extension -> filename -> scan.
/// Classification only reads the leading bytes. The first failing check
/// decides; nothing after it runs.
pub struct UploadPipeline {
    scanner: Arc<dyn VirusScanner>,
    policy: ScanPolicyEngine,
    max_file_size: usize,
}

impl UploadPipeline {
    pub fn new(scanner: Arc<dyn VirusScanner>, policy: ScanPolicyEngine) -> Self {
        Self {
            scanner,
            policy,
            max_file_size: MAX_FILE_SIZE,
        }
    }

    pub fn policy(&self) -> &ScanPolicyEngine {
        &self.policy
    }

    pub fn scanner(&self) -> &Arc<dyn VirusScanner> {
        &self.scanner
    }

    pub async fn process(&self, candidate: Option<&UploadCandidate>) -> PipelineDecision {
        // 1. Presence
        let Some(candidate) = candidate.filter(|c| !c.is_empty()) else {
            return PipelineDecision::reject(RejectReason::NoFile, "No file provided");
        };

        // 2. Classify from content, falling back to the extension
        let detected = content_type::classify(&candidate.bytes, &candidate.filename);
        if let Some(declared) = &candidate.declared_content_type {
            if normalize_content_type(declared) != detected {
                tracing::debug!(
                    "Declared type '{}' for {} differs from detected '{}'",
                    declared,
                    candidate.filename,
                    detected
                );
            }
        }

        // 3-5. Size, type / extension admissibility, filename
        let content_type = match validate_upload(
            candidate.len(),
            self.max_file_size,
            &detected,
            &candidate.filename,
        ) {
            ValidationVerdict::Accepted {
                normalized_content_type,
            } => normalized_content_type,
            ValidationVerdict::Rejected { reason, message } => {
                tracing::info!("Rejecting {}: {}: {}", candidate.filename, reason, message);
                return PipelineDecision::reject(reason, message);
            }
        };

        // 6. Virus scan under policy
        match self
            .policy
            .run(self.scanner.as_ref(), candidate.reader())
            .await
        {
            ScanDisposition::Allow {
                outcome,
                annotation,
            } => {
                if let Some(warning) = annotation.warning() {
                    tracing::warn!(
                        "Accepting {} without a clean scan: {}",
                        candidate.filename,
                        warning
                    );
                } else {
                    tracing::info!("File scan clean: {}", candidate.filename);
                }
                PipelineDecision::Accept {
                    content_type,
                    scan: outcome,
                    annotation,
                }
            }
            ScanDisposition::Reject {
                reason,
                message,
                detail,
                outcome,
            } => {
                if let Some(threat) = outcome.threat_name() {
                    notify_virus_detection(&candidate.filename, threat);
                } else {
                    tracing::error!(
                        "File scan error: {} - {}",
                        candidate.filename,
                        detail.as_deref().unwrap_or("unknown")
                    );
                }
                PipelineDecision::Reject {
                    reason,
                    message,
                    detail,
                }
            }
        }
    }
}

fn notify_virus_detection(filename: &str, threat: &str) {
    tracing::warn!(
        filename = %filename,
        threat = %threat,
        timestamp = %Utc::now().to_rfc3339(),
        "SECURITY ALERT: Virus detected in uploaded file"
    );
}
