//! The client role's session state machine: byte-order handshake →
//! connection validation → channel creation → introspection fetch.
//!
//! Grounded on `client::reactor::ReactorState`'s synchronous-handshake
//! pattern (`roundtrip_blocking` drives auth then props before the async
//! loop takes over); here the whole lifecycle is driven the same way, one
//! inbound frame at a time, since PVAccess's handshake is itself
//! multi-round-trip rather than a single blocking call.

use std::sync::Arc;

use crate::protocol::buffer::{WireReader, WireWriter};
use crate::protocol::introspection::{DataObject, TypeRegistry};
use crate::protocol::message::{
    ChannelGetFieldRequest, ChannelGetFieldResponse, ConnectionValidated,
    ConnectionValidationRequest, ConnectionValidationResponse, CreateChannelRequest,
    CreateChannelResponse, MessageCommand,
};
use crate::protocol::{ApplicationMessageCode, ControlMessageCode, Flags, MessageHeader, ProtocolError};

use super::OutboundFrame;

/// States the client role passes through while establishing a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Waiting for the server's byte-order control message.
    AwaitingByteOrder,
    /// Waiting for the server's `ConnectionValidationRequest`.
    AwaitingValidation,
    /// `ConnectionValidationResponse` sent; waiting for `ConnectionValidated`.
    AwaitingValidated,
    /// `CreateChannelRequest` sent; waiting for its response.
    AwaitingChannel,
    /// `ChannelGetFieldRequest` sent; waiting for the introspection reply.
    AwaitingIntrospection,
    /// The channel's introspection has been fetched.
    Idle,
}

/// Drives one client-side TCP session through to a fetched channel
/// introspection.
#[derive(Debug)]
pub struct ClientSession {
    state: ClientState,
    registry: TypeRegistry,
    client_channel_id: u32,
    channel_name: String,
    server_channel_id: Option<u32>,
    introspection: Option<Arc<DataObject>>,
}

impl ClientSession {
    /// Begins a session that will request `channel_name` under
    /// `client_channel_id` once the handshake completes.
    pub fn new(client_channel_id: u32, channel_name: impl Into<String>) -> Self {
        ClientSession {
            state: ClientState::AwaitingByteOrder,
            registry: TypeRegistry::new(),
            client_channel_id,
            channel_name: channel_name.into(),
            server_channel_id: None,
            introspection: None,
        }
    }

    /// The current handshake/request state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The server-assigned channel id, once `CreateChannelResponse` has
    /// arrived.
    pub fn server_channel_id(&self) -> Option<u32> {
        self.server_channel_id
    }

    /// The channel's introspected type, once fetched.
    pub fn introspection(&self) -> Option<&Arc<DataObject>> {
        self.introspection.as_ref()
    }

    /// True once the introspection fetch has completed.
    pub fn is_done(&self) -> bool {
        self.introspection.is_some()
    }

    /// Feeds one extracted `(header, payload)` frame to the state machine,
    /// returning the frames it produces in response.
    ///
    /// A message that doesn't match the current state is skipped rather than
    /// treated as an error: a server may legitimately send control frames
    /// this state machine doesn't track (`MarkSent`/`AcknowledgeSent`), and
    /// those must not abort the session.
    pub fn handle_frame(
        &mut self,
        header: &MessageHeader,
        payload: &[u8],
    ) -> Result<Vec<OutboundFrame>, ProtocolError> {
        let big_endian = header.flags.is_big_endian();
        log::trace!("CLIENT [{:?}]: {:?}", self.state, header.command);

        match (self.state, header.command) {
            (ClientState::AwaitingByteOrder, MessageCommand::Control(ControlMessageCode::ByteOrder)) => {
                self.state = ClientState::AwaitingValidation;
                Ok(Vec::new())
            }
            (
                ClientState::AwaitingValidation,
                MessageCommand::Application(ApplicationMessageCode::ConnectionValidation),
            ) => {
                let mut reader = WireReader::new(payload, big_endian);
                let request = ConnectionValidationRequest::read(&mut reader)?;

                let response = ConnectionValidationResponse {
                    client_receive_buffer_size: request.server_receive_buffer_size,
                    registry_max_size: request.registry_max_size,
                    connection_qos: 0,
                    auth_nz_selection: String::new(),
                };
                let mut writer = WireWriter::new(false);
                response.write(&mut writer);

                self.state = ClientState::AwaitingValidated;
                Ok(vec![application_frame(
                    ApplicationMessageCode::ConnectionValidation,
                    writer.into_bytes(),
                )])
            }
            (
                ClientState::AwaitingValidated,
                MessageCommand::Application(ApplicationMessageCode::ConnectionValidated),
            ) => {
                let mut reader = WireReader::new(payload, big_endian);
                let validated = ConnectionValidated::read(&mut reader)?;
                if !validated.status.is_ok() {
                    log::warn!("connection validation denied: {:?}", validated.status);
                    return Err(ProtocolError::ServerStatus(validated.status));
                }
                log::debug!("connection validated, requesting channel {:?}", self.channel_name);

                let request = CreateChannelRequest {
                    channels: vec![(self.client_channel_id, self.channel_name.clone())],
                };
                let mut writer = WireWriter::new(false);
                request.write(&mut writer);

                self.state = ClientState::AwaitingChannel;
                Ok(vec![application_frame(
                    ApplicationMessageCode::CreateChannel,
                    writer.into_bytes(),
                )])
            }
            (
                ClientState::AwaitingChannel,
                MessageCommand::Application(ApplicationMessageCode::CreateChannel),
            ) => {
                let mut reader = WireReader::new(payload, big_endian);
                let response = CreateChannelResponse::read(&mut reader)?;
                if response.client_id != self.client_channel_id {
                    return Err(ProtocolError::ProtocolViolation(format!(
                        "CreateChannelResponse for unknown client id {}",
                        response.client_id
                    )));
                }
                if !response.status.is_ok() {
                    log::warn!("channel creation denied: {:?}", response.status);
                    return Err(ProtocolError::ServerStatus(response.status));
                }
                log::debug!("channel created with server id {}", response.server_id);

                self.server_channel_id = Some(response.server_id);
                let request = ChannelGetFieldRequest::whole_channel(response.server_id, 1);
                let mut writer = WireWriter::new(false);
                request.write(&mut writer);

                self.state = ClientState::AwaitingIntrospection;
                Ok(vec![application_frame(
                    ApplicationMessageCode::ChannelGet,
                    writer.into_bytes(),
                )])
            }
            (
                ClientState::AwaitingIntrospection,
                MessageCommand::Application(ApplicationMessageCode::ChannelIf),
            ) => {
                let mut reader = WireReader::new(payload, big_endian);
                let response = ChannelGetFieldResponse::read(&mut reader, &mut self.registry)?;
                if !response.status.is_ok() {
                    log::warn!("introspection fetch denied: {:?}", response.status);
                    return Err(ProtocolError::ServerStatus(response.status));
                }
                log::debug!("introspection fetched for channel {:?}", self.channel_name);

                self.introspection = response.field;
                self.state = ClientState::Idle;
                Ok(Vec::new())
            }
            _ => {
                log::debug!("ignoring unexpected command in state {:?}: {:?}", self.state, header.command);
                Ok(Vec::new())
            }
        }
    }
}

fn application_frame(command: ApplicationMessageCode, payload: Vec<u8>) -> OutboundFrame {
    OutboundFrame {
        header: MessageHeader::application(command, payload.len() as u32, Flags::empty()),
        payload,
    }
}
