use crate::config::ScanConfig;
use chrono::{DateTime, Utc};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const DEFAULT_PORT: u16 = 3310;

/// Payload bytes per INSTREAM chunk
pub const CHUNK_SIZE: usize = 8192;

const PING: &[u8] = b"zPING\0";
const VERSION: &[u8] = b"zVERSION\0";
const STATS: &[u8] = b"zSTATS\0";
const INSTREAM: &[u8] = b"zINSTREAM\0";
const END_OF_STREAM: [u8; 4] = [0, 0, 0, 0];

/// Why a daemon exchange did not produce a verdict
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("ClamAV unavailable at {addr}: {reason}")]
    ServiceUnavailable { addr: String, reason: String },

    #[error("ClamAV exchange timed out after {0:?}")]
    Timeout(Duration),

    #[error("ClamAV I/O error: {0}")]
    Io(String),

    #[error("empty response")]
    EmptyResponse,

    #[error("unknown scan result format: {0}")]
    UnknownFormat(String),

    #[error("ClamAV scan error: {0}")]
    Daemon(String),
}

impl ScanError {
    /// The daemon could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ScanError::ServiceUnavailable { .. })
    }
}

impl From<std::io::Error> for ScanError {
    fn from(e: std::io::Error) -> Self {
        ScanError::Io(e.to_string())
    }
}

/// Result of a virus scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    /// File is clean (no threats detected)
    Clean,
    /// File is infected with malware
    Infected { threat_name: String },
    /// Scan could not be completed
    Error(ScanError),
}

/// A scan result and when it was determined
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub result: ScanResult,
    pub scanned_at: DateTime<Utc>,
}

impl ScanOutcome {
    pub fn new(result: ScanResult) -> Self {
        Self {
            result,
            scanned_at: Utc::now(),
        }
    }

    pub fn clean() -> Self {
        Self::new(ScanResult::Clean)
    }

    pub fn error(error: ScanError) -> Self {
        Self::new(ScanResult::Error(error))
    }

    pub fn is_clean(&self) -> bool {
        matches!(self.result, ScanResult::Clean)
    }

    pub fn threat_name(&self) -> Option<&str> {
        match &self.result {
            ScanResult::Infected { threat_name } => Some(threat_name),
            _ => None,
        }
    }

    /// Short status label: "clean", "infected" or "error"
    pub fn status(&self) -> &'static str {
        match self.result {
            ScanResult::Clean => "clean",
            ScanResult::Infected { .. } => "infected",
            ScanResult::Error(_) => "error",
        }
    }
}

/// Trait for virus scanning implementations
#[async_trait::async_trait]
pub trait VirusScanner: Send + Sync {
    /// Scan file content for malware using a stream
    async fn scan(&self, reader: Pin<Box<dyn AsyncRead + Send>>) -> ScanOutcome;

    /// Liveness probe
    async fn ping(&self) -> Result<(), ScanError>;

    /// Engine and signature database version
    async fn version(&self) -> Result<String, ScanError>;

    /// Daemon thread pool and memory statistics
    async fn stats(&self) -> Result<String, ScanError>;

    /// Check if the scanner is available/healthy
    async fn health_check(&self) -> bool {
        self.ping().await.is_ok()
    }
}

/// ClamAV scanner using TCP socket (clamd)
///
/// Every operation opens its own connection and closes it before returning,
/// so one instance can be shared by all requests.
///
/// Docker command to run ClamAV:
/// ```bash
/// docker run -d --name clamav -p 3310:3310 clamav/clamav:latest
/// ```
#[derive(Debug, Clone)]
pub struct ClamAvScanner {
    host: String,
    port: u16,
    timeout: Duration,
    connect_retries: u32,
}

impl ClamAvScanner {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            timeout: Duration::from_secs(30),
            connect_retries: 0,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.daemon_host.clone(), config.daemon_port)
            .with_timeout(config.timeout())
            .with_connect_retries(config.connect_retries)
    }

    /// Deadline for a whole exchange: connect, write and read
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> Result<TcpStream, ScanError> {
        let addr = self.addr();
        let mut attempt = 0;
        loop {
            match TcpStream::connect(&addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) if attempt < self.connect_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "ClamAV connection attempt {} to {} failed: {}",
                        attempt,
                        addr,
                        e
                    );
                    tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                }
                Err(e) => {
                    return Err(ScanError::ServiceUnavailable {
                        addr,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Runs `exchange` under the configured deadline. The stream lives inside
    /// the future, so expiry drops and closes the connection.
    async fn with_deadline<F, T>(&self, exchange: F) -> Result<T, ScanError>
    where
        F: std::future::Future<Output = Result<T, ScanError>>,
    {
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ScanError::Timeout(self.timeout))?
    }

    /// Send a bare command and return the trimmed reply
    async fn command(&self, command: &[u8]) -> Result<String, ScanError> {
        let raw = self
            .with_deadline(async {
                let mut stream = self.connect().await?;
                stream.write_all(command).await?;
                stream.flush().await?;

                let mut response = Vec::new();
                stream.read_to_end(&mut response).await?;
                Ok(response)
            })
            .await?;

        let reply = trim_reply(&raw);
        if reply.is_empty() {
            return Err(ScanError::EmptyResponse);
        }
        Ok(reply)
    }

    async fn instream(&self, mut reader: Pin<Box<dyn AsyncRead + Send>>) -> Result<Vec<u8>, ScanError> {
        let mut stream = self.connect().await?;

        // Format: zINSTREAM\0 <length:u32 big-endian> <data> ... <0:u32>
        stream.write_all(INSTREAM).await?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut total_sent = 0usize;
        let mut write_error = None;

        loop {
            let n = read_chunk(&mut reader, &mut buffer)
                .await
                .map_err(|e| ScanError::Io(format!("Failed to read from source: {}", e)))?;
            if n == 0 {
                break;
            }

            let len = (n as u32).to_be_bytes();
            if let Err(e) = write_frame(&mut stream, &len, &buffer[..n]).await {
                // clamd drops the connection once StreamMaxLength is hit but
                // still leaves its verdict in the socket
                tracing::warn!("ClamAV write error after {} bytes: {}", total_sent, e);
                write_error = Some(e);
                break;
            }
            total_sent += n;
        }

        if write_error.is_none() {
            if let Err(e) = stream.write_all(&END_OF_STREAM).await {
                write_error = Some(e);
            } else if let Err(e) = stream.flush().await {
                write_error = Some(e);
            }
        }
        tracing::debug!("Finished sending data to ClamAV ({} bytes)", total_sent);

        let mut response = Vec::new();
        let read_result = stream.read_to_end(&mut response).await;

        match (write_error, read_result) {
            (_, Ok(_)) if !response.is_empty() => Ok(response),
            (Some(we), _) => Err(ScanError::Io(format!(
                "write failed ({}) and ClamAV closed the connection without a result",
                we
            ))),
            (None, Err(re)) => Err(re.into()),
            (None, Ok(_)) => Ok(response),
        }
    }
}

#[async_trait::async_trait]
impl VirusScanner for ClamAvScanner {
    async fn scan(&self, reader: Pin<Box<dyn AsyncRead + Send>>) -> ScanOutcome {
        let result = match self.with_deadline(self.instream(reader)).await {
            Ok(raw) => {
                tracing::debug!("ClamAV response: '{}'", trim_reply(&raw));
                parse_scan_response(&raw)
            }
            Err(e) => ScanResult::Error(e),
        };

        match &result {
            ScanResult::Clean => tracing::info!("ClamAV scan clean"),
            ScanResult::Infected { threat_name } => {
                tracing::warn!("ClamAV scan infected: {}", threat_name)
            }
            ScanResult::Error(e) => tracing::error!("ClamAV scan failed: {}", e),
        }

        ScanOutcome::new(result)
    }

    async fn ping(&self) -> Result<(), ScanError> {
        let reply = self.command(PING).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(ScanError::UnknownFormat(reply))
        }
    }

    async fn version(&self) -> Result<String, ScanError> {
        self.command(VERSION).await
    }

    async fn stats(&self) -> Result<String, ScanError> {
        self.command(STATS).await
    }
}

/// Interpret the daemon's reply to INSTREAM by its trailing token
pub fn parse_scan_response(raw: &[u8]) -> ScanResult {
    let line = trim_reply(raw);

    if line.is_empty() {
        return ScanResult::Error(ScanError::EmptyResponse);
    }

    if line.ends_with(": OK") {
        return ScanResult::Clean;
    }

    if let Some(rest) = line.strip_suffix(" FOUND") {
        let threat = subject_of(rest);
        let threat_name = if threat.is_empty() {
            "Unknown threat".to_string()
        } else {
            threat.to_string()
        };
        return ScanResult::Infected { threat_name };
    }

    if let Some(rest) = line.strip_suffix(" ERROR") {
        let detail = subject_of(rest);
        let reason = if detail.contains("size limit exceeded") {
            format!(
                "ClamAV limit exceeded: {}. Please increase StreamMaxLength in clamd.conf",
                detail
            )
        } else {
            detail.to_string()
        };
        return ScanResult::Error(ScanError::Daemon(reason));
    }

    if line.contains("ERROR") {
        return ScanResult::Error(ScanError::Daemon(line));
    }

    ScanResult::Error(ScanError::UnknownFormat(line))
}

/// "stream: Eicar-Signature" -> "Eicar-Signature"
fn subject_of(rest: &str) -> &str {
    rest.split_once(": ")
        .map(|(_, subject)| subject)
        .unwrap_or(rest)
        .trim()
}

fn trim_reply(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// Fill `buf` from `reader`, short only at end of input
async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn write_frame(stream: &mut TcpStream, len: &[u8; 4], data: &[u8]) -> std::io::Result<()> {
    stream.write_all(len).await?;
    stream.write_all(data).await
}
