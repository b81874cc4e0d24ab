use crate::services::scanner::DEFAULT_PORT;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// What to do with an upload when the virus scan could not be completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Store the file anyway and flag the decision with a warning
    FailOpen,
    /// Reject the upload as scan-unavailable
    FailClosed,
}

impl Strictness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strictness::FailOpen => "fail-open",
            Strictness::FailClosed => "fail-closed",
        }
    }
}

impl FromStr for Strictness {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-open" | "fail_open" | "open" => Ok(Strictness::FailOpen),
            "fail-closed" | "fail_closed" | "closed" | "strict" => Ok(Strictness::FailClosed),
            other => Err(anyhow::anyhow!("Unknown scan strictness '{}'", other)),
        }
    }
}

impl std::fmt::Display for Strictness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Virus scanning configuration, read once at startup
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// clamd host (default: "127.0.0.1")
    pub daemon_host: String,

    /// clamd port (default: 3310)
    pub daemon_port: u16,

    /// Deadline for a whole daemon exchange in seconds (default: 30)
    pub timeout_secs: u64,

    /// Extra connect attempts before giving up (default: 0)
    pub connect_retries: u32,

    /// Behaviour when the scan cannot be completed (default: fail-closed)
    pub strictness: Strictness,

    /// Bypass the daemon entirely. Automated testing only.
    pub skip_scanning: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            daemon_host: "127.0.0.1".to_string(),
            daemon_port: DEFAULT_PORT,
            timeout_secs: 30,
            connect_retries: 0,
            strictness: Strictness::FailClosed,
            skip_scanning: false,
        }
    }
}

impl ScanConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// `REQUIRE_VIRUS_SCAN=true` wins over every fail-open switch.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let development = lookup("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("development"))
            .unwrap_or(false);

        let strictness = if flag(lookup("REQUIRE_VIRUS_SCAN")) {
            Strictness::FailClosed
        } else if let Some(mode) = lookup("VIRUS_SCAN_STRICTNESS").and_then(|v| v.parse().ok()) {
            mode
        } else if flag(lookup("VIRUS_SCAN_FAIL_OPEN")) || development {
            Strictness::FailOpen
        } else {
            default.strictness
        };

        Self {
            daemon_host: lookup("CLAMAV_HOST").unwrap_or(default.daemon_host),

            daemon_port: lookup("CLAMAV_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.daemon_port),

            timeout_secs: lookup("CLAMAV_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(default.timeout_secs),

            connect_retries: lookup("CLAMAV_CONNECT_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.connect_retries),

            strictness,

            skip_scanning: flag(lookup("SKIP_VIRUS_SCAN")),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            bind_addr: env::var("SERVER_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.bind_addr),
        }
    }
}

fn flag(value: Option<String>) -> bool {
    value
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}
