//! `CreateChannelRequest`/`CreateChannelResponse` and `DestroyChannel`.

use crate::protocol::buffer::{DataRead, DataWrite, WireReader, WireWriter};
use crate::protocol::error::ProtocolError;
use crate::protocol::status::{Status, StatusKind};

/// A client's request to open one or more channels by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateChannelRequest {
    /// `(client-assigned id, channel name)` pairs to create.
    pub channels: Vec<(u32, String)>,
}

impl CreateChannelRequest {
    /// Decodes a `CreateChannelRequest` from its payload bytes.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let count = reader.u16()? as usize;
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            let client_id = reader.u32()?;
            let name = reader.string()?;
            channels.push((client_id, name));
        }
        Ok(CreateChannelRequest { channels })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.u16(self.channels.len() as u16);
        for (client_id, name) in &self.channels {
            writer.u32(*client_id);
            writer.string(name);
        }
    }
}

/// The server's reply to (one entry of) a `CreateChannelRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateChannelResponse {
    /// Echoes the client-assigned id from the request.
    pub client_id: u32,
    /// The server-assigned id used to refer to this channel from now on.
    pub server_id: u32,
    /// Whether the channel was created successfully.
    pub status: Status,
    /// Present only when `status` is OK or WARNING. Read as a single `u16`,
    /// not unpacked into individual permission bits.
    pub access_rights: Option<u16>,
}

fn carries_access_rights(status: &Status) -> bool {
    matches!(status.kind, Some(StatusKind::Ok) | Some(StatusKind::Warning))
}

impl CreateChannelResponse {
    /// Decodes a `CreateChannelResponse` from its payload bytes.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let client_id = reader.u32()?;
        let server_id = reader.u32()?;
        let status = Status::read(reader)?;
        let access_rights = if carries_access_rights(&status) {
            Some(reader.u16()?)
        } else {
            None
        };

        Ok(CreateChannelResponse {
            client_id,
            server_id,
            status,
            access_rights,
        })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.u32(self.client_id);
        writer.u32(self.server_id);
        self.status.write(writer);
        if carries_access_rights(&self.status) {
            let access_rights = self
                .access_rights
                .expect("access_rights required when status is OK/WARNING");
            writer.u16(access_rights);
        }
    }
}

/// Tears down a channel. Symmetric on the wire: the client sends this to
/// request destruction, and the server sends it back to acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyChannelMessage {
    /// The client-assigned channel id.
    pub client_channel_id: u32,
    /// The server-assigned channel id.
    pub server_channel_id: u32,
}

impl DestroyChannelMessage {
    /// Decodes a `DestroyChannelMessage` from its payload bytes.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(DestroyChannelMessage {
            client_channel_id: reader.u32()?,
            server_channel_id: reader.u32()?,
        })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.u32(self.client_channel_id);
        writer.u32(self.server_channel_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_channel_request_roundtrip() {
        let request = CreateChannelRequest {
            channels: vec![(1, "testMP".into()), (2, "otherMP".into())],
        };
        let mut writer = WireWriter::new(false);
        request.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes, false);
        assert_eq!(CreateChannelRequest::read(&mut reader).unwrap(), request);
    }

    #[test]
    fn create_channel_response_ok_carries_access_rights() {
        let response = CreateChannelResponse {
            client_id: 1,
            server_id: 7,
            status: Status::ok(""),
            access_rights: Some(0x03),
        };
        let mut writer = WireWriter::new(false);
        response.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes, false);
        assert_eq!(CreateChannelResponse::read(&mut reader).unwrap(), response);
    }

    #[test]
    fn create_channel_response_error_omits_access_rights() {
        let response = CreateChannelResponse {
            client_id: 1,
            server_id: 0,
            status: Status::error("no such channel"),
            access_rights: None,
        };
        let mut writer = WireWriter::new(false);
        response.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes, false);
        assert_eq!(CreateChannelResponse::read(&mut reader).unwrap(), response);
    }

    #[test]
    fn create_channel_response_default_omits_access_rights() {
        let response = CreateChannelResponse {
            client_id: 1,
            server_id: 7,
            status: Status::default_ok(),
            access_rights: None,
        };
        let mut writer = WireWriter::new(false);
        response.write(&mut writer);
        let bytes = writer.into_bytes();
        // magic marker byte only, no access-rights u16 following.
        assert_eq!(bytes.len(), 4 + 4 + 1);
        let mut reader = WireReader::new(&bytes, false);
        assert_eq!(CreateChannelResponse::read(&mut reader).unwrap(), response);
    }

    #[test]
    fn destroy_channel_roundtrip() {
        let destroy = DestroyChannelMessage {
            client_channel_id: 1,
            server_channel_id: 7,
        };
        let mut writer = WireWriter::new(false);
        destroy.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes, false);
        assert_eq!(DestroyChannelMessage::read(&mut reader).unwrap(), destroy);
    }
}
