//! The 68-byte BitTorrent handshake, the first message exchanged on every
//! peer connection.
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::instrument;

use crate::error::{Error, Result};

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// `<pstrlen:1><pstr:19><reserved:8><info_hash:20><peer_id:20>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Handshake { info_hash, peer_id }
    }

    pub fn serialize(&self) -> [u8; 68] {
        let mut buf = [0u8; 68];
        buf[0] = 19;
        buf[1..20].copy_from_slice(PROTOCOL);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    fn parse(buf: &[u8; 68]) -> Result<Self> {
        if buf[0] != 19 {
            return Err(Error::HandshakeRejected(format!("invalid pstrlen {}", buf[0])));
        }
        if &buf[1..20] != PROTOCOL {
            return Err(Error::HandshakeRejected("unexpected protocol string".to_string()));
        }
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);
        Ok(Handshake { info_hash, peer_id })
    }

    pub fn validate(&self, expected_info_hash: &[u8; 20]) -> Result<()> {
        if &self.info_hash != expected_info_hash {
            return Err(Error::HandshakeRejected("info_hash mismatch".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(stream), level = "trace")]
    async fn write(&self, stream: &mut TcpStream) -> Result<()> {
        stream.write_all(&self.serialize()).await?;
        Ok(())
    }

    #[instrument(skip(stream), level = "trace")]
    async fn read(stream: &mut TcpStream) -> Result<Self> {
        let mut buf = [0u8; 68];
        stream.read_exact(&mut buf).await?;
        Self::parse(&buf)
    }
}

/// Connects to `addr`, exchanges handshakes, and validates the peer's
/// info_hash against `info_hash`. Every step is bounded by a 3-second
/// timeout, matching the deadline the reference client sets on its
/// handshake socket.
#[instrument(skip(info_hash, peer_id), level = "debug")]
pub async fn connect(
    addr: std::net::SocketAddr,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
) -> Result<(TcpStream, Handshake)> {
    let mut stream = timeout(HANDSHAKE_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

    let ours = Handshake::new(info_hash, peer_id);
    timeout(HANDSHAKE_TIMEOUT, ours.write(&mut stream))
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

    let theirs = timeout(HANDSHAKE_TIMEOUT, Handshake::read(&mut stream))
        .await
        .map_err(|_| Error::HandshakeTimeout)??;
    theirs.validate(&info_hash)?;

    Ok((stream, theirs))
}
