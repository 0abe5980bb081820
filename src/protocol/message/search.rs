//! `SearchRequest` and `SearchResponse`: UDP channel discovery.

use crate::protocol::buffer::{WireReader, WireWriter};
use crate::protocol::error::ProtocolError;

/// A broadcast request asking whether any server hosts the named channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Sequence number, echoed back in any `SearchResponse`.
    pub sequence_id: u32,
    /// Reserved flags byte.
    pub flags: u8,
    /// Where a server should send its `SearchResponse`.
    pub response_address: [u8; 16],
    /// The port paired with [`Self::response_address`].
    pub response_port: u16,
    /// Transport protocols the requester is willing to use, e.g. `["tcp"]`.
    pub protocols: Vec<String>,
    /// `(client-assigned instance id, channel name)` pairs being searched for.
    pub channels: Vec<(u32, String)>,
}

impl SearchRequest {
    /// Decodes a `SearchRequest` from its payload bytes.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let sequence_id = reader.u32()?;
        let flags = reader.u8()?;
        reader.raw(3)?; // padding
        let response_address = reader.ipv6()?;
        let response_port = reader.u16()?;
        let protocols = reader.string_array()?;

        let count = reader.u16()? as usize;
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            let instance_id = reader.u32()?;
            let name = reader.string()?;
            channels.push((instance_id, name));
        }

        Ok(SearchRequest {
            sequence_id,
            flags,
            response_address,
            response_port,
            protocols,
            channels,
        })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.u32(self.sequence_id);
        writer.u8(self.flags);
        writer.raw(&[0, 0, 0]);
        writer.ipv6(&self.response_address);
        writer.u16(self.response_port);
        writer.string_array(&self.protocols);

        writer.u16(self.channels.len() as u16);
        for (instance_id, name) in &self.channels {
            writer.u32(*instance_id);
            writer.string(name);
        }
    }
}

/// A server's reply to a matching `SearchRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResponse {
    /// The responding server's identity, decoded little-endian.
    pub guid: [u8; 12],
    /// Echoes the request's `sequence_id`.
    pub sequence_id: u32,
    /// The server's TCP listen address.
    pub server_address: [u8; 16],
    /// The server's TCP listen port.
    pub server_port: u16,
    /// The transport protocol the server offers, e.g. `"tcp"`.
    pub protocol: String,
    /// True if the server hosts (at least one of) the requested channels.
    pub found: bool,
    /// Instance ids, echoed from the request, that the server can serve.
    pub instance_ids: Vec<u32>,
}

impl SearchResponse {
    /// Decodes a `SearchResponse` from its payload bytes.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let mut guid = [0u8; 12];
        guid.copy_from_slice(reader.raw(12)?);

        let sequence_id = reader.u32()?;
        let server_address = reader.ipv6()?;
        let server_port = reader.u16()?;
        let protocol = reader.string()?;
        let found = reader.u16()? != 0;
        let instance_ids = reader.u32_array()?;

        Ok(SearchResponse {
            guid,
            sequence_id,
            server_address,
            server_port,
            protocol,
            found,
            instance_ids,
        })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.raw(&self.guid);
        writer.u32(self.sequence_id);
        writer.ipv6(&self.server_address);
        writer.u16(self.server_port);
        writer.string(&self.protocol);
        writer.u16(self.found as u16);
        writer.u32_array(&self.instance_ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> SearchRequest {
        SearchRequest {
            sequence_id: 1,
            flags: 0,
            response_address: {
                let mut a = [0u8; 16];
                a[10] = 0xFF;
                a[11] = 0xFF;
                a
            },
            response_port: 50001,
            protocols: vec!["tcp".into()],
            channels: vec![(1, "testMP".into())],
        }
    }

    #[test]
    fn search_request_roundtrip_and_length() {
        let request = sample_request();
        let mut writer = WireWriter::new(false);
        request.write(&mut writer);
        let bytes = writer.into_bytes();

        // sequenceId(4) + flags(1) + pad(3) + addr(16) + port(2)
        //   + protocols[1 count + (1 size + 3 "tcp")]
        //   + channel-count(2) + [4 instanceId + (1 size + 6 "testMP")]
        assert_eq!(bytes.len(), 4 + 1 + 3 + 16 + 2 + (1 + 1 + 3) + 2 + (4 + 1 + 6));

        let mut reader = WireReader::new(&bytes, false);
        let decoded = SearchRequest::read(&mut reader).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn search_response_roundtrip() {
        let response = SearchResponse {
            guid: [0xFFu8, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF],
            sequence_id: 1,
            server_address: {
                let mut a = [0u8; 16];
                a[10] = 0xFF;
                a[11] = 0xFF;
                a
            },
            server_port: 5075,
            protocol: "tcp".into(),
            found: true,
            instance_ids: vec![1],
        };

        let mut writer = WireWriter::new(false);
        response.write(&mut writer);
        let bytes = writer.into_bytes();

        // guid(12) + sequenceId(4) + addr(16) + port(2) + protocol(1 size + 3 "tcp")
        //   + found(2) + instanceIds(1 count + 4 id)
        assert_eq!(bytes.len(), 12 + 4 + 16 + 2 + (1 + 3) + 2 + (1 + 4));

        let mut reader = WireReader::new(&bytes, false);
        let decoded = SearchResponse::read(&mut reader).unwrap();
        assert_eq!(decoded, response);
    }
}
