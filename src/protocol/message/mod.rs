//! The message envelope (header) and the catalogue of application messages.
//!
//! One submodule per message type, re-exported here.

mod beacon;
mod channel;
mod channel_get;
mod search;
mod validation;

pub use beacon::BeaconMessage;
pub use channel::{CreateChannelRequest, CreateChannelResponse, DestroyChannelMessage};
pub use channel_get::{ChannelGetFieldRequest, ChannelGetFieldResponse};
pub use search::{SearchRequest, SearchResponse};
pub use validation::{ConnectionValidated, ConnectionValidationRequest, ConnectionValidationResponse};

use enum_primitive_derive::Primitive;
use num_traits::{FromPrimitive, ToPrimitive};

use super::buffer::{WireReader, WireWriter};
use super::error::ProtocolError;
use super::{Flags, HEADER_SIZE, PVA_MAGIC, PVA_VERSION};

/// The application-level command codes.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Primitive)]
pub enum ApplicationMessageCode {
    /// Server presence advertisement.
    Beacon = 0x00,
    /// Connection parameter negotiation, request half.
    ConnectionValidation = 0x01,
    /// Echo request/response, used for liveness checks.
    Echo = 0x02,
    /// Channel discovery broadcast.
    SearchRequest = 0x03,
    /// Reply to a `SearchRequest`.
    SearchResponse = 0x04,
    /// Authentication/authorization negotiation.
    AuthNz = 0x05,
    /// Access-rights notification for a channel.
    AccessRights = 0x06,
    /// Create one or more channels by name.
    CreateChannel = 0x07,
    /// Tear down a channel.
    DestroyChannel = 0x08,
    /// Acknowledges a completed connection validation.
    ConnectionValidated = 0x09,
    /// Fetch or initialize a channel's value.
    ChannelGet = 0x0A,
    /// Write a channel's value.
    ChannelPut = 0x0B,
    /// Combined put-then-get on a channel.
    ChannelPutGet = 0x0C,
    /// Subscribe to changes on a channel.
    ChannelMonitor = 0x0D,
    /// Array-specific channel operation.
    ChannelArray = 0x0E,
    /// Cancels an outstanding request.
    DestroyRequest = 0x0F,
    /// Triggers server-side processing on a channel.
    ChannelProcess = 0x10,
    /// Fetches a channel's introspection (its interface).
    ChannelIf = 0x11,
    /// Carries an informational/diagnostic message.
    Message = 0x12,
    /// Bundles several responses in one frame.
    MultipleDataResponse = 0x13,
    /// Remote-procedure-call style channel operation.
    ChannelRpc = 0x14,
    /// Cancels a specific outstanding request by id.
    CancelRequest = 0x15,
}

/// The control-level command codes.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Primitive)]
pub enum ControlMessageCode {
    /// Marks a byte offset in the stream as sent (flow control).
    MarkSent = 0x00,
    /// Acknowledges a previously marked offset.
    AcknowledgeSent = 0x01,
    /// Declares the sender's chosen payload endianness.
    ByteOrder = 0x02,
    /// Requests an echo at the control layer.
    EchoRequest = 0x03,
    /// Responds to a control-layer echo request.
    EchoResponse = 0x04,
}

/// The decoded command slot of a [`MessageHeader`]: either an application or a
/// control command code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageCommand {
    /// An application-layer command.
    Application(ApplicationMessageCode),
    /// A control-layer command.
    Control(ControlMessageCode),
    /// A command byte that doesn't map to a known application or control
    /// code, carried as-is (which half of the catalogue it would have
    /// belonged to is recorded in the header's flags). The payload is still
    /// `payload_size` bytes long and framed normally; a caller that doesn't
    /// recognize this command simply has nothing to do with it.
    Unknown(u8),
}

/// The 8-byte header that opens every PVAccess message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Must equal [`PVA_MAGIC`].
    pub magic: u8,
    /// Protocol version, normally [`PVA_VERSION`].
    pub version: u8,
    /// Decoded flag byte.
    pub flags: Flags,
    /// Decoded command, application or control.
    pub command: MessageCommand,
    /// Size in bytes of the payload following this header.
    pub payload_size: u32,
}

impl MessageHeader {
    /// Parses a header from exactly [`HEADER_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::ShortBuffer);
        }

        let magic = bytes[0];
        if magic != PVA_MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }

        let version = bytes[1];
        let flags = Flags::from_bits_truncate(bytes[2]);
        let command_byte = bytes[3];

        // payload_size is decoded unconditionally, even for a command byte
        // this crate doesn't recognize: the frame still has to be skipped
        // by its declared length, not dropped as if the header itself were
        // corrupt.
        let mut reader = WireReader::new(&bytes[4..8], flags.is_big_endian());
        let payload_size = reader.u32()?;

        let command = if flags.is_control() {
            match ControlMessageCode::from_u8(command_byte) {
                Some(code) => MessageCommand::Control(code),
                None => MessageCommand::Unknown(command_byte),
            }
        } else {
            match ApplicationMessageCode::from_u8(command_byte) {
                Some(code) => MessageCommand::Application(code),
                None => MessageCommand::Unknown(command_byte),
            }
        };

        Ok(MessageHeader {
            magic,
            version,
            flags,
            command,
            payload_size,
        })
    }

    /// Encodes this header into exactly [`HEADER_SIZE`] bytes.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.magic;
        bytes[1] = self.version;
        bytes[2] = self.flags.bits();
        bytes[3] = match self.command {
            MessageCommand::Application(code) => code.to_u8().expect("fits in u8"),
            MessageCommand::Control(code) => code.to_u8().expect("fits in u8"),
            MessageCommand::Unknown(byte) => byte,
        };

        let mut writer = WireWriter::new(self.flags.is_big_endian());
        writer.u32(self.payload_size);
        bytes[4..8].copy_from_slice(&writer.into_bytes());

        bytes
    }

    /// Builds the canonical little-endian application-message header for
    /// `command` and `payload_size`, with the client/server direction and
    /// segment flags the caller supplies via `extra_flags`.
    pub fn application(
        command: ApplicationMessageCode,
        payload_size: u32,
        extra_flags: Flags,
    ) -> Self {
        MessageHeader {
            magic: PVA_MAGIC,
            version: PVA_VERSION,
            flags: extra_flags - Flags::CONTROL,
            command: MessageCommand::Application(command),
            payload_size,
        }
    }

    /// Builds the canonical little-endian control-message header for
    /// `command`.
    pub fn control(command: ControlMessageCode, payload_size: u32, extra_flags: Flags) -> Self {
        MessageHeader {
            magic: PVA_MAGIC,
            version: PVA_VERSION,
            flags: (extra_flags | Flags::CONTROL),
            command: MessageCommand::Control(command),
            payload_size,
        }
    }
}

/// A fully decoded message: its header plus the typed payload.
///
/// Only application messages with a payload this crate understands are
/// represented as variants; anything else (an unknown command, or a control
/// message) is left to the caller to inspect via the raw [`MessageHeader`].
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A server's periodic presence advertisement.
    Beacon(BeaconMessage),
    /// A channel discovery broadcast.
    SearchRequest(SearchRequest),
    /// A reply to a discovery broadcast.
    SearchResponse(SearchResponse),
    /// The client's half of connection parameter negotiation.
    ConnectionValidationRequest(ConnectionValidationRequest),
    /// The server's half of connection parameter negotiation.
    ConnectionValidationResponse(ConnectionValidationResponse),
    /// Acknowledgement that validation completed.
    ConnectionValidated(ConnectionValidated),
    /// A request to create one or more channels by name.
    CreateChannelRequest(CreateChannelRequest),
    /// The server's reply to a channel creation request.
    CreateChannelResponse(CreateChannelResponse),
    /// A request for a channel's (or sub-field's) introspection.
    ChannelGetFieldRequest(ChannelGetFieldRequest),
    /// The introspection reply to a `ChannelGetFieldRequest`.
    ChannelGetFieldResponse(ChannelGetFieldResponse),
    /// Tears down a channel (request or acknowledgement; symmetric on the wire).
    DestroyChannel(DestroyChannelMessage),
}

impl Message {
    /// The application command code this message would be framed under.
    pub fn command(&self) -> ApplicationMessageCode {
        match self {
            Message::Beacon(_) => ApplicationMessageCode::Beacon,
            Message::SearchRequest(_) => ApplicationMessageCode::SearchRequest,
            Message::SearchResponse(_) => ApplicationMessageCode::SearchResponse,
            Message::ConnectionValidationRequest(_) => ApplicationMessageCode::ConnectionValidation,
            Message::ConnectionValidationResponse(_) => ApplicationMessageCode::ConnectionValidation,
            Message::ConnectionValidated(_) => ApplicationMessageCode::ConnectionValidated,
            Message::CreateChannelRequest(_) => ApplicationMessageCode::CreateChannel,
            Message::CreateChannelResponse(_) => ApplicationMessageCode::CreateChannel,
            Message::ChannelGetFieldRequest(_) => ApplicationMessageCode::ChannelGet,
            Message::ChannelGetFieldResponse(_) => ApplicationMessageCode::ChannelIf,
            Message::DestroyChannel(_) => ApplicationMessageCode::DestroyChannel,
        }
    }
}
