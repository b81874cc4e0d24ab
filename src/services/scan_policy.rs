use crate::config::{ScanConfig, Strictness};
use crate::models::{RejectReason, ScanAnnotation};
use crate::services::scanner::{ScanOutcome, ScanResult, VirusScanner};
use std::pin::Pin;
use tokio::io::AsyncRead;

/// What the upload pipeline should do after the scan stage
#[derive(Debug, Clone)]
pub enum ScanDisposition {
    Allow {
        outcome: ScanOutcome,
        annotation: ScanAnnotation,
    },
    Reject {
        reason: RejectReason,
        message: String,
        detail: Option<String>,
        outcome: ScanOutcome,
    },
}

/// Turns scan outcomes into allow/reject under a fixed strictness.
///
/// Infected files are always rejected. Strictness only decides what happens
/// when the daemon could not give a verdict.
#[derive(Debug, Clone, Copy)]
pub struct ScanPolicyEngine {
    strictness: Strictness,
    skip_scanning: bool,
}

impl ScanPolicyEngine {
    pub fn new(strictness: Strictness, skip_scanning: bool) -> Self {
        Self {
            strictness,
            skip_scanning,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.strictness, config.skip_scanning)
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    pub fn skips_scanning(&self) -> bool {
        self.skip_scanning
    }

    /// Scan `reader` with `scanner` unless scanning is skipped, then decide.
    pub async fn run(
        &self,
        scanner: &dyn VirusScanner,
        reader: Pin<Box<dyn AsyncRead + Send>>,
    ) -> ScanDisposition {
        if self.skip_scanning {
            tracing::warn!("Virus scanning skipped by configuration");
            return ScanDisposition::Allow {
                outcome: ScanOutcome::clean(),
                annotation: ScanAnnotation::Skipped,
            };
        }

        let outcome = scanner.scan(reader).await;
        self.decide(outcome)
    }

    /// Apply the policy to a finished scan attempt
    pub fn decide(&self, outcome: ScanOutcome) -> ScanDisposition {
        match &outcome.result {
            ScanResult::Clean => ScanDisposition::Allow {
                outcome,
                annotation: ScanAnnotation::Scanned,
            },
            ScanResult::Infected { threat_name } => ScanDisposition::Reject {
                reason: RejectReason::ScanInfected,
                message: format!("File rejected: virus detected ({})", threat_name),
                detail: Some(threat_name.clone()),
                outcome,
            },
            ScanResult::Error(error) => match self.strictness {
                Strictness::FailOpen => {
                    let warning = format!("Scan failed but allowed: {}", error);
                    tracing::warn!(
                        "Virus scan failed but allowing file due to fail-open policy: {}",
                        error
                    );
                    ScanDisposition::Allow {
                        outcome,
                        annotation: ScanAnnotation::FailedOpen { warning },
                    }
                }
                Strictness::FailClosed => {
                    let detail = error.to_string();
                    let message = if error.is_unavailable() {
                        "Virus scanning service unavailable. Please try again later."
                    } else {
                        "Virus scan could not be completed. Please try again later."
                    };
                    ScanDisposition::Reject {
                        reason: RejectReason::ScanUnavailable,
                        message: message.to_string(),
                        detail: Some(detail),
                        outcome,
                    }
                }
            },
        }
    }
}
