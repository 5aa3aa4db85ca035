//! Peer wire protocol: handshake, length-prefixed messages, bitfields.
pub mod bitfield;
pub mod handshake;
pub mod message;

pub use bitfield::Bitfield;
pub use handshake::Handshake;
pub use message::{Message, MessageId};
