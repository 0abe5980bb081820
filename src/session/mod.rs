//! Per-connection session state: role-specific handshake/request state
//! machines (`client`, `server`) built on top of the shared frame extractor
//! in [`dispatcher`], plus the server-global [`ChannelTable`].
//!
//! Per-connection state is kept separate from the one piece of truly global
//! state (the channel table), which every connection shares through an `Arc`.

pub mod client;
pub mod dispatcher;
pub mod server;

pub use client::{ClientSession, ClientState};
pub use dispatcher::FrameExtractor;
pub use server::{ChannelEntry, ChannelRegistry, ChannelTable, ServerSession, ServerState};

use thiserror::Error;

use crate::protocol::message::MessageHeader;
use crate::protocol::ProtocolError;

/// One outbound frame a session handler is ready to send: a header together
/// with its already-encoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    /// The frame's header, with `payload_size` already set to `payload.len()`.
    pub header: MessageHeader,
    /// The encoded message body.
    pub payload: Vec<u8>,
}

impl OutboundFrame {
    /// Concatenates the header and payload into the bytes ready to write to
    /// the socket.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes().to_vec();
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Errors a session state machine can raise, layered over [`ProtocolError`]
/// with session-lifecycle failures the protocol layer doesn't know about.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A frame failed to decode, or otherwise violated the wire contract.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The peer closed the connection, or it was closed locally.
    #[error("session disconnected")]
    Disconnected,
    /// A frame arrived that the state machine's current state doesn't expect,
    /// outside of the "skip and log" cases each role already tolerates (e.g.
    /// a caller driving a session's handshake methods out of order).
    #[error("unexpected session state")]
    UnexpectedState,
}
