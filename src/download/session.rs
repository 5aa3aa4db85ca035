//! A single peer connection and the small state machine that drives it:
//! `Connecting -> Handshaking -> AwaitBitfield -> Active -> Closed`.
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::peer::handshake;
use crate::peer::{Bitfield, Message, MessageId};

const READ_TIMEOUT: Duration = Duration::from_secs(120);

pub struct PeerSession {
    pub addr: SocketAddr,
    stream: TcpStream,
    pub peer_id: [u8; 20],
    bitfield: Bitfield,
    choked: bool,
}

impl PeerSession {
    /// Connects, exchanges handshakes, and waits for the peer's initial
    /// `bitfield` message (the BitTorrent convention is to send it
    /// immediately after the handshake, before anything else).
    #[instrument(skip(info_hash, peer_id), fields(peer = %addr), level = "debug")]
    pub async fn connect(addr: SocketAddr, info_hash: [u8; 20], peer_id: [u8; 20]) -> Result<Self> {
        let (mut stream, theirs) = handshake::connect(addr, info_hash, peer_id).await?;
        let bitfield = read_bitfield(&mut stream).await?;

        Ok(PeerSession { addr, stream, peer_id: theirs.peer_id, bitfield, choked: true })
    }

    pub fn has_piece(&self, index: usize) -> bool {
        self.bitfield.has_piece(index)
    }

    #[instrument(skip(self), level = "trace")]
    async fn send_interested(&mut self) -> Result<()> {
        Message::new(MessageId::Interested, Vec::new()).write(&mut self.stream).await
    }

    #[instrument(skip(self), level = "trace")]
    async fn read_message(&mut self) -> Result<Option<Message>> {
        timeout(READ_TIMEOUT, Message::read(&mut self.stream))
            .await
            .map_err(|_| Error::Protocol("peer went silent past the read deadline".to_string()))?
    }

    /// Downloads and hash-verifies one piece, requesting one 16 KiB block
    /// at a time (no pipelining, matching the reference client).
    #[instrument(skip(self, hash), fields(peer = %self.addr, piece = index), level = "debug")]
    pub async fn download_piece(&mut self, index: usize, size: i64, hash: [u8; 20]) -> Result<Vec<u8>> {
        use sha1::{Digest, Sha1};

        let size = size as usize;
        let mut data = vec![0u8; size];
        let mut downloaded = 0usize;

        self.send_interested().await?;

        while downloaded < size {
            if !self.choked {
                let block_size = super::engine::BLOCK_SIZE.min(size - downloaded);
                let request =
                    Message::request(index as u32, downloaded as u32, block_size as u32);
                request.write(&mut self.stream).await?;
            }

            let Some(message) = self.read_message().await? else {
                continue;
            };

            match message.id {
                MessageId::Choke => self.choked = true,
                MessageId::Unchoke => self.choked = false,
                MessageId::Have => {
                    let Some(bytes) = message.payload.get(..4) else {
                        tracing::warn!("have payload shorter than 4 bytes, ignoring");
                        continue;
                    };
                    let piece_index = u32::from_be_bytes(bytes.try_into().unwrap());
                    self.bitfield.set_piece(piece_index as usize);
                }
                MessageId::Piece => {
                    let (piece_index, begin, block) = message.parse_piece()?;
                    if piece_index as usize != index {
                        continue;
                    }
                    let begin = begin as usize;
                    let Some(end) = begin.checked_add(block.len()).filter(|&end| end <= size) else {
                        tracing::warn!(begin, block_len = block.len(), size, "piece block overruns piece size, ignoring");
                        continue;
                    };
                    data[begin..end].copy_from_slice(block);
                    downloaded += block.len();
                }
                _ => {}
            }
        }

        let actual: [u8; 20] = Sha1::digest(&data).into();
        if actual != hash {
            return Err(Error::HashMismatch { index });
        }
        Ok(data)
    }
}

#[instrument(skip(stream), level = "trace")]
async fn read_bitfield(stream: &mut TcpStream) -> Result<Bitfield> {
    let message = timeout(READ_TIMEOUT, Message::read(stream))
        .await
        .map_err(|_| Error::Protocol("peer did not send a bitfield in time".to_string()))??;
    match message {
        Some(message) if message.id == MessageId::Bitfield => Ok(Bitfield::new(message.payload)),
        Some(other) => {
            Err(Error::Protocol(format!("expected bitfield, got message id {:?}", other.id)))
        }
        None => Err(Error::Protocol("connection closed before bitfield".to_string())),
    }
}
