//! The length-prefixed peer wire message: `<length:4><id:1><payload:...>`.
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl MessageId {
    fn from_u8(b: u8) -> Result<Self> {
        match b {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            other => Err(Error::Protocol(format!("unknown message id {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(id: MessageId, payload: Vec<u8>) -> Self {
        Message { id, payload }
    }

    pub fn request(piece_index: u32, begin: u32, length: u32) -> Self {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&piece_index.to_be_bytes());
        payload.extend_from_slice(&begin.to_be_bytes());
        payload.extend_from_slice(&length.to_be_bytes());
        Message::new(MessageId::Request, payload)
    }

    pub fn have(piece_index: u32) -> Self {
        Message::new(MessageId::Have, piece_index.to_be_bytes().to_vec())
    }

    pub fn cancel(piece_index: u32, begin: u32, length: u32) -> Self {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&piece_index.to_be_bytes());
        payload.extend_from_slice(&begin.to_be_bytes());
        payload.extend_from_slice(&length.to_be_bytes());
        Message::new(MessageId::Cancel, payload)
    }

    /// Parses the `<piece index:4><begin:4><block:...>` payload of a `piece`
    /// message. Returns `(piece_index, begin, block)`.
    pub fn parse_piece(&self) -> Result<(u32, u32, &[u8])> {
        if self.id != MessageId::Piece {
            return Err(Error::Protocol("expected a piece message".to_string()));
        }
        if self.payload.len() < 8 {
            return Err(Error::Protocol("piece payload shorter than 8 bytes".to_string()));
        }
        let piece_index = u32::from_be_bytes(self.payload[0..4].try_into().unwrap());
        let begin = u32::from_be_bytes(self.payload[4..8].try_into().unwrap());
        Ok((piece_index, begin, &self.payload[8..]))
    }

    fn serialize(&self) -> Vec<u8> {
        let length = 1 + self.payload.len() as u32;
        let mut buf = Vec::with_capacity(4 + length as usize);
        buf.extend_from_slice(&length.to_be_bytes());
        buf.push(self.id as u8);
        buf.extend_from_slice(&self.payload);
        buf
    }

    #[instrument(skip(writer, self), level = "trace")]
    pub async fn write<W: AsyncWriteExt + Unpin>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.serialize()).await?;
        Ok(())
    }

    /// Reads one message from the wire. A zero-length prefix is a
    /// keep-alive and is reported as `Ok(None)`.
    #[instrument(skip(reader), level = "trace")]
    pub async fn read<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Self>> {
        let mut length_buf = [0u8; 4];
        reader.read_exact(&mut length_buf).await?;
        let length = u32::from_be_bytes(length_buf);
        if length == 0 {
            return Ok(None);
        }

        let mut id_buf = [0u8; 1];
        reader.read_exact(&mut id_buf).await?;
        let id = MessageId::from_u8(id_buf[0])?;

        let payload_len = length as usize - 1;
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).await?;

        Ok(Some(Message::new(id, payload)))
    }
}
