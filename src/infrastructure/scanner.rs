use crate::config::ScanConfig;
use crate::services::scanner::{ClamAvScanner, VirusScanner};
use std::sync::Arc;
use tracing::info;

pub async fn setup_scanner(config: &ScanConfig) -> Arc<dyn VirusScanner> {
    let scanner = ClamAvScanner::from_config(config);

    if config.skip_scanning {
        tracing::warn!("⚠️  SKIP_VIRUS_SCAN is set: uploads will not be scanned. Testing only!");
        return Arc::new(scanner);
    }

    // Warm-up probe only; each scan opens its own connection
    match scanner.ping().await {
        Ok(()) => {
            info!("🦠 Virus scanner reachable at {}", scanner.addr());
            if let Ok(version) = scanner.version().await {
                info!("🦠 {}", version);
            }
        }
        Err(e) => {
            tracing::warn!(
                "⚠️  Virus scanner unreachable ({}). Uploads will be {} while it stays down.",
                e,
                match config.strictness {
                    crate::config::Strictness::FailOpen => "accepted with a warning",
                    crate::config::Strictness::FailClosed => "rejected",
                }
            );
        }
    }

    Arc::new(scanner)
}
