//! `ConnectionValidation{Request,Response}` and `ConnectionValidated`.

use crate::protocol::buffer::{DataRead, DataWrite, WireReader, WireWriter};
use crate::protocol::error::ProtocolError;
use crate::protocol::status::Status;

/// Sent by the server immediately after the byte-order control message,
/// describing the server's buffering and authentication requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionValidationRequest {
    /// The server's TCP receive-buffer size, in bytes.
    pub server_receive_buffer_size: u32,
    /// The maximum introspection registry size the server will honor.
    pub registry_max_size: u16,
    /// Names of authentication/authorization plugins the server offers.
    pub auth_nz: Vec<String>,
}

impl ConnectionValidationRequest {
    /// The canonical default a server with no special requirements sends.
    pub fn default_for_server() -> Self {
        ConnectionValidationRequest {
            server_receive_buffer_size: 0x4400,
            registry_max_size: 0x7FFF,
            auth_nz: Vec::new(),
        }
    }

    /// Decodes a `ConnectionValidationRequest` from its payload bytes.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(ConnectionValidationRequest {
            server_receive_buffer_size: reader.u32()?,
            registry_max_size: reader.u16()?,
            auth_nz: reader.string_array()?,
        })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.u32(self.server_receive_buffer_size);
        writer.u16(self.registry_max_size);
        writer.string_array(&self.auth_nz);
    }
}

/// The client's reply to a `ConnectionValidationRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionValidationResponse {
    /// The client's TCP receive-buffer size, in bytes.
    pub client_receive_buffer_size: u32,
    /// The maximum introspection registry size the client will honor.
    pub registry_max_size: u16,
    /// Connection quality-of-service hint; `0` for the default.
    pub connection_qos: u16,
    /// The authentication/authorization plugin the client selected, empty for none.
    pub auth_nz_selection: String,
}

impl ConnectionValidationResponse {
    /// The canonical reply a client with no special requirements sends.
    pub fn default_for_client() -> Self {
        ConnectionValidationResponse {
            client_receive_buffer_size: 0x4400,
            registry_max_size: 0x7FFF,
            connection_qos: 0,
            auth_nz_selection: String::new(),
        }
    }

    /// Decodes a `ConnectionValidationResponse` from its payload bytes.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(ConnectionValidationResponse {
            client_receive_buffer_size: reader.u32()?,
            registry_max_size: reader.u16()?,
            connection_qos: reader.u16()?,
            auth_nz_selection: reader.string()?,
        })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.u32(self.client_receive_buffer_size);
        writer.u16(self.registry_max_size);
        writer.u16(self.connection_qos);
        writer.string(&self.auth_nz_selection);
    }
}

/// Sent by the server to confirm the connection is ready for channel
/// operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionValidated {
    /// OK unless validation failed, in which case the connection is closed.
    pub status: Status,
}

impl ConnectionValidated {
    /// Decodes a `ConnectionValidated` from its payload bytes.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(ConnectionValidated {
            status: Status::read(reader)?,
        })
    }

    /// Encodes this message into `writer`.
    pub fn write(&self, writer: &mut WireWriter) {
        self.status.write(writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_request_roundtrip() {
        let request = ConnectionValidationRequest::default_for_server();
        let mut writer = WireWriter::new(false);
        request.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes, false);
        assert_eq!(ConnectionValidationRequest::read(&mut reader).unwrap(), request);
    }

    #[test]
    fn validation_response_roundtrip() {
        let response = ConnectionValidationResponse::default_for_client();
        let mut writer = WireWriter::new(false);
        response.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes, false);
        assert_eq!(
            ConnectionValidationResponse::read(&mut reader).unwrap(),
            response
        );
    }

    #[test]
    fn validated_roundtrip() {
        let validated = ConnectionValidated {
            status: Status::default_ok(),
        };
        let mut writer = WireWriter::new(false);
        validated.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes, false);
        assert_eq!(ConnectionValidated::read(&mut reader).unwrap(), validated);
    }
}
