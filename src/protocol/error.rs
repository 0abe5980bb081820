//! Defines error types understood by the protocol layer.

use thiserror::Error;

use super::message::{ApplicationMessageCode, ControlMessageCode};
use super::status::Status;

/// A generic protocol error, covering the decode/encode layer and framing.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The reader ran out of bytes before finishing a decode.
    #[error("short buffer: need more bytes to decode a complete value")]
    ShortBuffer,
    /// A message header's magic byte was not `0xCA`.
    #[error("bad magic byte: {0:#04x}")]
    BadMagic(u8),
    /// A command other than what was expected was received.
    #[error("unexpected command: {0:?}")]
    UnexpectedCommand(ApplicationMessageCode),
    /// A control command other than what was expected was received.
    #[error("unexpected control command: {0:?}")]
    UnexpectedControlCommand(ControlMessageCode),
    /// A field-descriptor byte used a reserved bit pattern.
    #[error("invalid field descriptor byte: {0:#04x}")]
    InvalidFieldDescriptor(u8),
    /// An Only-ID reference named a type id absent from the registry.
    #[error("unknown introspection type id: {0}")]
    UnknownTypeId(u16),
    /// The message is structurally invalid.
    #[error("invalid message: {0}")]
    Invalid(String),
    /// The peer violated the expected message sequencing for its role.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// An I/O error occurred on the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The server reported an error status in a reply.
    #[error("server error: {0:?}")]
    ServerStatus(Status),
}
