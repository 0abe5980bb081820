//! The `Beacon` message: periodic server presence advertisement over UDP.

use crate::protocol::buffer::{DataRead, DataWrite, WireReader, WireWriter};
use crate::protocol::error::ProtocolError;
use crate::protocol::status::Status;

/// A server's periodic UDP advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconMessage {
    /// 12-byte server identity, stable across restarts of the underlying
    /// process but not across reinstalls. Decoded little-endian.
    pub guid: [u8; 12],
    /// Reserved flags byte.
    pub flags: u8,
    /// Monotonic counter distinguishing successive beacons from one server.
    pub sequence_id: u8,
    /// Incremented whenever the server's channel list changes.
    pub change_count: u16,
    /// The server's TCP listen address, as an IPv6 (or IPv4-mapped) address.
    pub server_address: [u8; 16],
    /// The server's TCP listen port.
    pub server_port: u16,
    /// The transport protocol offered, e.g. `"tcp"`.
    pub protocol: String,
    /// Optional server status, absent when the wire encodes the DEFAULT marker.
    pub server_status: Option<Status>,
}

impl BeaconMessage {
    /// Interprets [`Self::guid`] as a little-endian 96-bit integer.
    pub fn guid_as_u128_le(&self) -> u128 {
        let mut bytes = [0u8; 16];
        bytes[..12].copy_from_slice(&self.guid);
        u128::from_le_bytes(bytes)
    }

    /// Decodes a `BeaconMessage` from its payload bytes.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let mut guid = [0u8; 12];
        guid.copy_from_slice(reader.raw(12)?);

        let flags = reader.u8()?;
        let sequence_id = reader.u8()?;
        let change_count = reader.u16()?;
        let server_address = reader.ipv6()?;
        let server_port = reader.u16()?;
        let protocol = reader.string()?;

        let server_status = if reader.has_data_left() {
            Some(Status::read(reader)?)
        } else {
            None
        };

        Ok(BeaconMessage {
            guid,
            flags,
            sequence_id,
            change_count,
            server_address,
            server_port,
            protocol,
            server_status,
        })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.raw(&self.guid);
        writer.u8(self.flags);
        writer.u8(self.sequence_id);
        writer.u16(self.change_count);
        writer.ipv6(&self.server_address);
        writer.u16(self.server_port);
        writer.string(&self.protocol);

        match &self.server_status {
            Some(status) => status.write(writer),
            None => writer.u8(0xFF),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::buffer::{WireReader, WireWriter};

    fn sample() -> BeaconMessage {
        BeaconMessage {
            guid: [0xFFu8, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF],
            flags: 0,
            sequence_id: 1,
            change_count: 0,
            server_address: {
                let mut a = [0u8; 16];
                a[10] = 0xFF;
                a[11] = 0xFF;
                a
            },
            server_port: 5075,
            protocol: "tcp".into(),
            server_status: None,
        }
    }

    #[test]
    fn roundtrip_without_status() {
        let beacon = sample();
        let mut writer = WireWriter::new(false);
        beacon.write(&mut writer);
        let bytes = writer.into_bytes();

        let mut reader = WireReader::new(&bytes, false);
        let decoded = BeaconMessage::read(&mut reader).unwrap();
        assert_eq!(decoded, beacon);
    }

    #[test]
    fn roundtrip_with_status() {
        let mut beacon = sample();
        beacon.server_status = Some(Status::ok("steady"));

        let mut writer = WireWriter::new(false);
        beacon.write(&mut writer);
        let bytes = writer.into_bytes();

        let mut reader = WireReader::new(&bytes, false);
        let decoded = BeaconMessage::read(&mut reader).unwrap();
        assert_eq!(decoded, beacon);
    }
}
