use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const DEFAULT_PORT: u16 = 25565;
// Protocol version -1 asks the server to answer with whatever it speaks.
const STATUS_PROTOCOL_VERSION: i32 = -1;
const MAX_STATUS_BYTES: i32 = 1 << 20;

/// Result of one successful status query. Never persisted; rebuilt each tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub description: String,
    pub version_name: String,
    pub players_online: Option<u32>,
    pub players_max: Option<u32>,
}

/// A single best-effort status query. Any failure - resolution, connect,
/// timeout, malformed frame or JSON - collapses to `None`; callers only ever
/// see reachable or not.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self, address: &str) -> Option<StatusSnapshot>;
}

#[derive(Error, Debug)]
enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad status payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Java Edition Server List Ping client.
#[derive(Debug, Clone)]
pub struct JavaProbe {
    timeout: Duration,
}

impl Default for JavaProbe {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl StatusProbe for JavaProbe {
    async fn probe(&self, address: &str) -> Option<StatusSnapshot> {
        let (host, port) = parse_address(address)?;
        match tokio::time::timeout(self.timeout, query(&host, port)).await {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(e)) => {
                debug!("probe of {} failed: {}", address, e);
                None
            }
            Err(_) => {
                debug!("probe of {} timed out", address);
                None
            }
        }
    }
}

async fn query(host: &str, port: u16) -> Result<StatusSnapshot, ProbeError> {
    let mut stream = TcpStream::connect((host, port)).await?;

    // Handshake (state 1 = status), then an empty status request.
    let mut handshake = vec![0x00];
    write_varint(&mut handshake, STATUS_PROTOCOL_VERSION);
    write_varint(&mut handshake, host.len() as i32);
    handshake.extend_from_slice(host.as_bytes());
    handshake.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut handshake, 1);

    let mut request = Vec::with_capacity(handshake.len() + 3);
    write_varint(&mut request, handshake.len() as i32);
    request.extend_from_slice(&handshake);
    request.extend_from_slice(&[0x01, 0x00]);
    stream.write_all(&request).await?;

    let _frame_len = read_varint(&mut stream).await?;
    let packet_id = read_varint(&mut stream).await?;
    if packet_id != 0x00 {
        return Err(ProbeError::Protocol(format!(
            "unexpected packet id {}",
            packet_id
        )));
    }
    let json_len = read_varint(&mut stream).await?;
    if !(0..=MAX_STATUS_BYTES).contains(&json_len) {
        return Err(ProbeError::Protocol(format!(
            "status payload of {} bytes",
            json_len
        )));
    }
    let mut body = vec![0u8; json_len as usize];
    stream.read_exact(&mut body).await?;

    let raw: RawStatus = serde_json::from_slice(&body)?;
    Ok(StatusSnapshot {
        description: flatten_motd(&raw.description),
        version_name: raw.version.name.unwrap_or_default(),
        players_online: raw.players.as_ref().and_then(|p| p.online),
        players_max: raw.players.as_ref().and_then(|p| p.max),
    })
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(default)]
    version: RawVersion,
    #[serde(default)]
    players: Option<RawPlayers>,
    #[serde(default)]
    description: Value,
}

#[derive(Default, Deserialize)]
struct RawVersion {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawPlayers {
    #[serde(default)]
    online: Option<u32>,
    #[serde(default)]
    max: Option<u32>,
}

fn parse_address(address: &str) -> Option<(String, u16)> {
    let address = address.trim();
    if address.is_empty() {
        return None;
    }
    // IPv6 literals: bracketed with an optional port, or bare and host-only
    if let Some(rest) = address.strip_prefix('[') {
        let (host, rest) = rest.split_once(']')?;
        return match rest.strip_prefix(':') {
            Some(port) => Some((host.to_string(), port.parse().ok()?)),
            None if rest.is_empty() => Some((host.to_string(), DEFAULT_PORT)),
            None => None,
        };
    }
    if address.matches(':').count() > 1 {
        return Some((address.to_string(), DEFAULT_PORT));
    }
    match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().ok()?;
            Some((host.to_string(), port))
        }
        None => Some((address.to_string(), DEFAULT_PORT)),
    }
}

/// The MOTD arrives either as a plain string or as a chat component tree
/// (`text` plus nested `extra` parts).
fn flatten_motd(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => {
            let mut out = String::new();
            if let Some(Value::String(text)) = map.get("text") {
                out.push_str(text);
            }
            if let Some(Value::Array(extra)) = map.get("extra") {
                for part in extra {
                    out.push_str(&flatten_motd(part));
                }
            }
            out
        }
        _ => String::new(),
    }
}

fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<i32> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = reader.read_u8().await?;
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "varint too long",
    ))
}
