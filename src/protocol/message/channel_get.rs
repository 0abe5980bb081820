//! `ChannelGetField` request/response: fetching a channel's introspection.

use std::sync::Arc;

use crate::protocol::buffer::{DataRead, DataWrite, WireReader, WireWriter};
use crate::protocol::error::ProtocolError;
use crate::protocol::introspection::{self, DataObject, TypeRegistry};
use crate::protocol::status::Status;

/// Asks the server for the introspection of a channel, or one of its
/// sub-fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGetFieldRequest {
    /// The server-assigned channel id, from a prior `CreateChannelResponse`.
    pub server_channel_id: u32,
    /// A client-chosen id correlating this request with its response.
    pub request_id: u32,
    /// Empty for the channel's whole type, otherwise a dotted sub-field path.
    pub sub_field_name: String,
}

impl ChannelGetFieldRequest {
    /// Builds the request the client dispatcher sends immediately after a
    /// successful `CreateChannelResponse`.
    pub fn whole_channel(server_channel_id: u32, request_id: u32) -> Self {
        ChannelGetFieldRequest {
            server_channel_id,
            request_id,
            sub_field_name: String::new(),
        }
    }

    /// Decodes a `ChannelGetFieldRequest` from its payload bytes.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(ChannelGetFieldRequest {
            server_channel_id: reader.u32()?,
            request_id: reader.u32()?,
            sub_field_name: reader.string()?,
        })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.u32(self.server_channel_id);
        writer.u32(self.request_id);
        writer.string(&self.sub_field_name);
    }
}

/// The server's reply, carrying the requested introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelGetFieldResponse {
    /// Echoes the request's `request_id`.
    pub request_id: u32,
    /// Whether the field lookup succeeded.
    pub status: Status,
    /// The introspected type, present iff `status.is_ok()`.
    pub field: Option<Arc<DataObject>>,
}

impl ChannelGetFieldResponse {
    /// Decodes a `ChannelGetFieldResponse` from its payload bytes, resolving
    /// any Only-ID reference in `registry`.
    pub fn read(
        reader: &mut WireReader<'_>,
        registry: &mut TypeRegistry,
    ) -> Result<Self, ProtocolError> {
        let request_id = reader.u32()?;
        let status = Status::read(reader)?;
        let field = if status.is_ok() && reader.has_data_left() {
            introspection::read_field(reader, registry)?
        } else {
            None
        };

        Ok(ChannelGetFieldResponse {
            request_id,
            status,
            field,
        })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter, registry: &mut TypeRegistry) {
        writer.u32(self.request_id);
        self.status.write(writer);
        match &self.field {
            Some(field) if self.status.is_ok() => introspection::write_field(writer, registry, field),
            _ => {}
        }
    }
}
