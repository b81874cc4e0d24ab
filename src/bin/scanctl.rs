use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use filenest::config::ScanConfig;
use filenest::services::scanner::{ClamAvScanner, ScanResult, VirusScanner};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Talk to the configured clamd directly
#[derive(Parser)]
#[command(name = "scanctl", version, about)]
struct Cli {
    /// Overrides CLAMAV_HOST
    #[arg(long)]
    host: Option<String>,

    /// Overrides CLAMAV_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Overrides CLAMAV_TIMEOUT (seconds)
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send PING and expect PONG
    Ping,
    /// Print engine and signature versions
    Version,
    /// Print thread pool and memory statistics
    Stats,
    /// Stream a file with INSTREAM and print the verdict
    Scan { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanctl=info,filenest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = ScanConfig::from_env();
    if let Some(host) = cli.host {
        config.daemon_host = host;
    }
    if let Some(port) = cli.port {
        config.daemon_port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }

    let scanner = ClamAvScanner::from_config(&config);
    info!("🔌 Using clamd at {}", scanner.addr());

    match cli.command {
        Command::Ping => {
            scanner.ping().await?;
            println!("PONG");
        }
        Command::Version => println!("{}", scanner.version().await?),
        Command::Stats => println!("{}", scanner.stats().await?),
        Command::Scan { path } => {
            let file = tokio::fs::File::open(&path).await?;
            let outcome = scanner.scan(Box::pin(file)).await;
            match outcome.result {
                ScanResult::Clean => println!("{}: OK", path.display()),
                ScanResult::Infected { threat_name } => {
                    println!("{}: {} FOUND", path.display(), threat_name);
                    std::process::exit(1);
                }
                ScanResult::Error(e) => {
                    error!("❌ Scan of {} failed: {}", path.display(), e);
                    std::process::exit(2);
                }
            }
        }
    }

    Ok(())
}
