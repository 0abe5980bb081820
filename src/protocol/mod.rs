//! The PVAccess wire protocol: message framing, the introspection engine, and
//! the message catalogue.

pub mod buffer;
pub mod descriptor;
pub mod error;
pub mod introspection;
pub mod message;
pub mod status;

pub use error::ProtocolError;
pub use message::{ApplicationMessageCode, ControlMessageCode, Message, MessageHeader};
pub use status::{Status, StatusKind};

use bitflags::bitflags;

/// Protocol version carried in every message header.
pub const PVA_VERSION: u8 = 1;

/// The fixed magic byte that opens every message header.
pub const PVA_MAGIC: u8 = 0xCA;

/// Default UDP port for beacons and channel search.
pub const PVA_BROADCAST_PORT: u16 = 5076;

/// Default TCP port for channel-access sessions.
pub const PVA_SERVER_PORT: u16 = 5075;

/// Size in bytes of a [`MessageHeader`].
pub const HEADER_SIZE: usize = 8;

bitflags! {
    /// The flag byte in a [`MessageHeader`].
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        /// Control message, as opposed to application (the default, 0).
        const CONTROL = 0b0000_0001;
        /// Segment: first of a multi-segment message.
        const SEGMENT_FIRST = 0b0001_0000;
        /// Segment: last of a multi-segment message.
        const SEGMENT_LAST = 0b0010_0000;
        /// Direction: server-to-client, as opposed to client-to-server (the default, 0).
        const FROM_SERVER = 0b0100_0000;
        /// Endianness: big-endian payload, as opposed to little-endian (the default, 0).
        const BIG_ENDIAN = 0b1000_0000;
    }
}

impl Flags {
    /// True if this flag byte marks a control message.
    pub fn is_control(self) -> bool {
        self.contains(Flags::CONTROL)
    }

    /// True if this flag byte marks the payload as big-endian.
    pub fn is_big_endian(self) -> bool {
        self.contains(Flags::BIG_ENDIAN)
    }

    /// True if this flag byte marks a server-originated message.
    pub fn is_from_server(self) -> bool {
        self.contains(Flags::FROM_SERVER)
    }
}

#[cfg(test)]
mod tests {
    use super::message::MessageHeader;
    use super::*;

    #[test]
    fn header_parse_canonical_search_request() {
        let bytes = [0xCA, 0x01, 0x00, 0x03, 0x08, 0x00, 0x00, 0x00];
        let header = MessageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.magic, PVA_MAGIC);
        assert_eq!(header.version, 1);
        assert_eq!(header.flags, Flags::empty());
        assert_eq!(
            header.command,
            message::MessageCommand::Application(ApplicationMessageCode::SearchRequest)
        );
        assert_eq!(header.payload_size, 8);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let bytes = [0x00, 0x01, 0x00, 0x03, 0x08, 0x00, 0x00, 0x00];
        assert!(matches!(
            MessageHeader::from_bytes(&bytes),
            Err(ProtocolError::BadMagic(0x00))
        ));
    }

    #[test]
    fn unrecognized_command_byte_still_decodes_payload_size() {
        let bytes = [0xCA, 0x01, 0x00, 0xEE, 0x08, 0x00, 0x00, 0x00];
        let header = MessageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.command, message::MessageCommand::Unknown(0xEE));
        assert_eq!(header.payload_size, 8);
    }

    #[test]
    fn unrecognized_control_command_byte_still_decodes_payload_size() {
        let bytes = [0xCA, 0x01, 0x01, 0xEE, 0x08, 0x00, 0x00, 0x00];
        let header = MessageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.command, message::MessageCommand::Unknown(0xEE));
        assert_eq!(header.payload_size, 8);
    }

    #[test]
    fn segment_middle_sets_both_segment_bits_at_0x30() {
        // Middle = first|last, per the 2-bit segment field at bits 5-4
        // (0x10=first, 0x20=last, 0x30=middle), matching the reference
        // implementation's bit layout.
        let flags = Flags::SEGMENT_FIRST | Flags::SEGMENT_LAST;
        assert_eq!(flags.bits(), 0x30);

        let bytes = [0xCA, 0x01, 0x30, 0x03, 0x00, 0x00, 0x00, 0x00];
        let header = MessageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.flags, flags);
        assert!(header.flags.contains(Flags::SEGMENT_FIRST));
        assert!(header.flags.contains(Flags::SEGMENT_LAST));
    }
}
