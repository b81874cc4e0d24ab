//! In-process stand-in for clamd, speaking the z-prefixed TCP protocol.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const EICAR_THREAT: &str = "EICAR-STANDARD-ANTIVIRUS-TEST-FILE";

/// How the fake daemon answers INSTREAM
#[derive(Clone)]
#[allow(dead_code)]
pub enum Behavior {
    /// Write these bytes, then close
    Reply(Vec<u8>),
    /// Close without writing anything
    Hangup,
    /// Never answer
    Silent,
    /// Answer "FOUND" if the payload contains the EICAR marker, "OK" otherwise
    Detect,
}

/// One connection as seen by the daemon
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Command without the leading 'z' and trailing NUL
    pub command: String,
    /// Everything received after the command, framing included
    pub raw_frames: Vec<u8>,
    /// Payload with the framing removed
    pub payload: Vec<u8>,
}

pub struct FakeClamd {
    pub addr: SocketAddr,
    exchanges: Arc<Mutex<Vec<Exchange>>>,
}

#[allow(dead_code)]
impl FakeClamd {
    pub async fn spawn(behavior: Behavior) -> Self {
        Self::spawn_on(0, behavior).await
    }

    /// Listen on a specific local port, 0 for any
    pub async fn spawn_on(port: u16, behavior: Behavior) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let exchanges = Arc::new(Mutex::new(Vec::new()));

        let log = exchanges.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let behavior = behavior.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = handle(socket, behavior, log).await;
                });
            }
        });

        Self { addr, exchanges }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges.lock().unwrap().clone()
    }
}

async fn handle(
    mut socket: TcpStream,
    behavior: Behavior,
    log: Arc<Mutex<Vec<Exchange>>>,
) -> std::io::Result<()> {
    let mut command = Vec::new();
    loop {
        let byte = socket.read_u8().await?;
        if byte == 0 {
            break;
        }
        command.push(byte);
    }
    let command = String::from_utf8_lossy(&command)
        .trim_start_matches('z')
        .to_string();

    let mut exchange = Exchange {
        command: command.clone(),
        raw_frames: Vec::new(),
        payload: Vec::new(),
    };

    let reply: Vec<u8> = match command.as_str() {
        "PING" => b"PONG\0".to_vec(),
        "VERSION" => b"ClamAV 1.3.1/27400/Mon Sep 30 08:00:00 2024\0".to_vec(),
        "STATS" => b"POOLS: 1\n\nSTATE: VALID PRIMARY\nTHREADS: live 1  idle 0 max 10\nEND\0".to_vec(),
        "INSTREAM" => {
            loop {
                let mut len = [0u8; 4];
                socket.read_exact(&mut len).await?;
                exchange.raw_frames.extend_from_slice(&len);
                let n = u32::from_be_bytes(len) as usize;
                if n == 0 {
                    break;
                }
                let mut data = vec![0u8; n];
                socket.read_exact(&mut data).await?;
                exchange.raw_frames.extend_from_slice(&data);
                exchange.payload.extend_from_slice(&data);
            }

            let reply = match &behavior {
                Behavior::Reply(bytes) => bytes.clone(),
                Behavior::Hangup => Vec::new(),
                Behavior::Silent => {
                    log.lock().unwrap().push(exchange);
                    std::future::pending::<()>().await;
                    return Ok(());
                }
                Behavior::Detect => {
                    let text = String::from_utf8_lossy(&exchange.payload);
                    if text.contains("EICAR-STANDARD-ANTIVIRUS-TEST-FILE") {
                        format!("stream: {} FOUND\0", EICAR_THREAT).into_bytes()
                    } else {
                        b"stream: OK\0".to_vec()
                    }
                }
            };
            reply
        }
        _ => b"UNKNOWN COMMAND\0".to_vec(),
    };

    log.lock().unwrap().push(exchange);
    socket.write_all(&reply).await?;
    socket.shutdown().await?;
    Ok(())
}

/// Address that refuses connections: bound once, then released
#[allow(dead_code)]
pub async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Built at runtime so the test sources do not trip local antivirus
#[allow(dead_code)]
pub fn eicar() -> Vec<u8> {
    let part1 = "X5O!P%@AP[4\\PZ";
    let part2 = "X54(P^)7CC)7}$EICAR-STANDA";
    let part3 = "RD-ANTIVIRUS-TEST-FILE!$H+H*";
    format!("{}{}{}", part1, part2, part3).into_bytes()
}
