//! The server role's session state machine: byte-order → connection
//! validation → channel creation/introspection, plus the server-global
//! channel table.
//!
//! Grounded on `examples/server.rs`'s mio accept loop and its
//! auth-gate-first/props-gate-second `match` ordering in `handle_command`:
//! here byte-order is done first, then validation, then channel operations,
//! and an unrecognized command falls through to the same "skip, don't fail
//! the connection" policy that file's final `_ =>` arm uses.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::protocol::buffer::{WireReader, WireWriter};
use crate::protocol::introspection::{DataObject, TypeRegistry};
use crate::protocol::message::{
    ChannelGetFieldRequest, ChannelGetFieldResponse, ConnectionValidated,
    ConnectionValidationRequest, ConnectionValidationResponse, CreateChannelRequest,
    CreateChannelResponse, DestroyChannelMessage, MessageCommand,
};
use crate::protocol::status::Status;
use crate::protocol::{
    ApplicationMessageCode, ControlMessageCode, Flags, MessageHeader, ProtocolError,
};

use super::OutboundFrame;

/// Default access-rights bitmask granted to every newly created channel:
/// bit 0 read, bit 1 write.
pub const DEFAULT_ACCESS_RIGHTS: u16 = 0b11;

/// A server-side record of one live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    /// The id the client used when it requested this channel.
    pub client_id: u32,
    /// The channel's name.
    pub name: String,
    /// The access-rights bitmask granted to the client.
    pub access_rights: u16,
}

/// The server-global table of live channels: mutations are serialized under
/// a single mutex, and the table is shared by every connection's
/// [`ServerSession`] through an `Arc`.
#[derive(Debug, Default)]
pub struct ChannelTable {
    by_server_id: BTreeMap<u32, ChannelEntry>,
    next_id: u32,
}

impl ChannelTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        ChannelTable::default()
    }

    /// Allocates a new server-assigned id for `name` and records it.
    pub fn create(&mut self, client_id: u32, name: impl Into<String>) -> u32 {
        let server_id = self.next_id;
        self.next_id += 1;
        self.by_server_id.insert(
            server_id,
            ChannelEntry {
                client_id,
                name: name.into(),
                access_rights: DEFAULT_ACCESS_RIGHTS,
            },
        );
        server_id
    }

    /// Looks up a channel by its server-assigned id.
    pub fn get(&self, server_id: u32) -> Option<&ChannelEntry> {
        self.by_server_id.get(&server_id)
    }

    /// Removes a channel, returning its entry if it existed.
    pub fn destroy(&mut self, server_id: u32) -> Option<ChannelEntry> {
        self.by_server_id.remove(&server_id)
    }

    /// Number of live channels.
    pub fn len(&self) -> usize {
        self.by_server_id.len()
    }

    /// True if there are no live channels.
    pub fn is_empty(&self) -> bool {
        self.by_server_id.is_empty()
    }
}

/// Supplies the introspected type for a named channel. The server core has
/// no notion of the underlying process-variable storage; a concrete server
/// wires one of these in to answer `ChannelGetField` requests.
pub trait ChannelRegistry: std::fmt::Debug + Send + Sync {
    /// Returns the root introspection type for `channel_name`, or `None` if
    /// no such channel is served.
    fn introspect(&self, channel_name: &str) -> Option<Arc<DataObject>>;
}

impl std::fmt::Debug for dyn ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ChannelRegistry")
    }
}

/// States the server role passes through for one TCP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// The byte-order control frame has been sent; nothing else yet.
    SentByteOrder,
    /// `ConnectionValidationRequest` has been sent.
    SentValidationRequest,
    /// The client's response has been accepted; `ConnectionValidated` sent.
    Validated,
    /// Serving channel-creation and introspection requests.
    Serving,
}

/// Drives one server-side TCP session.
#[derive(Debug)]
pub struct ServerSession {
    state: ServerState,
    registry: TypeRegistry,
    channels: Arc<Mutex<ChannelTable>>,
    data: Arc<dyn ChannelRegistry>,
}

impl ServerSession {
    /// Creates a session over the server-global `channels` table, answering
    /// introspection lookups via `data`.
    pub fn new(channels: Arc<Mutex<ChannelTable>>, data: Arc<dyn ChannelRegistry>) -> Self {
        ServerSession {
            state: ServerState::SentByteOrder,
            registry: TypeRegistry::new(),
            channels,
            data,
        }
    }

    /// The current session state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The frames to send immediately after accepting a new connection: a
    /// byte-order control message followed by a `ConnectionValidationRequest`.
    pub fn on_accept(&mut self) -> Vec<OutboundFrame> {
        log::debug!("accepted connection, sending byte order and validation request");
        self.state = ServerState::SentValidationRequest;
        let request = ConnectionValidationRequest::default_for_server();
        let mut writer = WireWriter::new(false);
        request.write(&mut writer);

        vec![
            control_frame(ControlMessageCode::ByteOrder),
            application_frame(
                ApplicationMessageCode::ConnectionValidation,
                writer.into_bytes(),
            ),
        ]
    }

    /// Feeds one extracted `(header, payload)` frame to the state machine.
    pub fn handle_frame(
        &mut self,
        header: &MessageHeader,
        payload: &[u8],
    ) -> Result<Vec<OutboundFrame>, ProtocolError> {
        let big_endian = header.flags.is_big_endian();
        log::trace!("SERVER [{:?}]: {:?}", self.state, header.command);

        match (self.state, header.command) {
            (
                ServerState::SentValidationRequest,
                MessageCommand::Application(ApplicationMessageCode::ConnectionValidation),
            ) => {
                let mut reader = WireReader::new(payload, big_endian);
                ConnectionValidationResponse::read(&mut reader)?;

                log::debug!("connection validated");
                self.state = ServerState::Validated;
                let validated = ConnectionValidated {
                    status: Status::default_ok(),
                };
                let mut writer = WireWriter::new(false);
                validated.write(&mut writer);
                Ok(vec![application_frame(
                    ApplicationMessageCode::ConnectionValidated,
                    writer.into_bytes(),
                )])
            }
            (
                ServerState::Validated | ServerState::Serving,
                MessageCommand::Application(ApplicationMessageCode::CreateChannel),
            ) => {
                let mut reader = WireReader::new(payload, big_endian);
                let request = CreateChannelRequest::read(&mut reader)?;

                self.state = ServerState::Serving;
                let mut frames = Vec::with_capacity(request.channels.len());
                for (client_id, name) in request.channels {
                    log::debug!("creating channel {name:?} for client id {client_id}");
                    let server_id = self
                        .channels
                        .lock()
                        .expect("channel table mutex poisoned")
                        .create(client_id, name);
                    let response = CreateChannelResponse {
                        client_id,
                        server_id,
                        status: Status::ok(""),
                        access_rights: Some(DEFAULT_ACCESS_RIGHTS),
                    };
                    let mut writer = WireWriter::new(false);
                    response.write(&mut writer);
                    frames.push(application_frame(
                        ApplicationMessageCode::CreateChannel,
                        writer.into_bytes(),
                    ));
                }
                Ok(frames)
            }
            (ServerState::Serving, MessageCommand::Application(ApplicationMessageCode::ChannelGet)) => {
                let mut reader = WireReader::new(payload, big_endian);
                let request = ChannelGetFieldRequest::read(&mut reader)?;
                let response = self.answer_get_field(&request);

                let mut writer = WireWriter::new(false);
                response.write(&mut writer, &mut self.registry);
                Ok(vec![application_frame(
                    ApplicationMessageCode::ChannelIf,
                    writer.into_bytes(),
                )])
            }
            (
                ServerState::Serving,
                MessageCommand::Application(ApplicationMessageCode::DestroyChannel),
            ) => {
                let mut reader = WireReader::new(payload, big_endian);
                let request = DestroyChannelMessage::read(&mut reader)?;
                log::debug!("destroying channel id {}", request.server_channel_id);
                self.channels
                    .lock()
                    .expect("channel table mutex poisoned")
                    .destroy(request.server_channel_id);

                let mut writer = WireWriter::new(false);
                request.write(&mut writer);
                Ok(vec![application_frame(
                    ApplicationMessageCode::DestroyChannel,
                    writer.into_bytes(),
                )])
            }
            _ => {
                log::debug!("ignoring unexpected command in state {:?}: {:?}", self.state, header.command);
                Ok(Vec::new())
            }
        }
    }

    fn answer_get_field(&self, request: &ChannelGetFieldRequest) -> ChannelGetFieldResponse {
        let not_found = |message: &str| {
            log::warn!("channel get field failed: {message}");
            ChannelGetFieldResponse {
                request_id: request.request_id,
                status: Status::error(message),
                field: None,
            }
        };

        let channel_name = {
            let channels = self.channels.lock().expect("channel table mutex poisoned");
            match channels.get(request.server_channel_id) {
                Some(entry) => entry.name.clone(),
                None => return not_found("no such channel"),
            }
        };

        let root = match self.data.introspect(&channel_name) {
            Some(root) => root,
            None => return not_found("channel has no introspection"),
        };

        let field = if request.sub_field_name.is_empty() {
            Some(root)
        } else {
            lookup_sub_field(&root, &request.sub_field_name)
        };

        match field {
            Some(field) => ChannelGetFieldResponse {
                request_id: request.request_id,
                status: Status::default_ok(),
                field: Some(field),
            },
            None => not_found("no such field"),
        }
    }
}

fn lookup_sub_field(root: &Arc<DataObject>, dotted_path: &str) -> Option<Arc<DataObject>> {
    let mut current = root.clone();
    for segment in dotted_path.split('.') {
        current = current.field(segment)?.data_object.clone();
    }
    Some(current)
}

fn application_frame(command: ApplicationMessageCode, payload: Vec<u8>) -> OutboundFrame {
    OutboundFrame {
        header: MessageHeader::application(command, payload.len() as u32, Flags::FROM_SERVER),
        payload,
    }
}

fn control_frame(command: ControlMessageCode) -> OutboundFrame {
    OutboundFrame {
        header: MessageHeader::control(command, 0, Flags::FROM_SERVER),
        payload: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::introspection::time_stamp_t;
    use crate::protocol::status::StatusKind;
    use assert_matches::assert_matches;
    use rand::Rng;
    use std::collections::HashMap;

    #[derive(Debug)]
    struct StaticRegistry(HashMap<String, Arc<DataObject>>);

    impl ChannelRegistry for StaticRegistry {
        fn introspect(&self, channel_name: &str) -> Option<Arc<DataObject>> {
            self.0.get(channel_name).cloned()
        }
    }

    fn session_with_timestamp_channel() -> ServerSession {
        let mut map = HashMap::new();
        map.insert("testMP".to_string(), time_stamp_t());
        ServerSession::new(
            Arc::new(Mutex::new(ChannelTable::new())),
            Arc::new(StaticRegistry(map)),
        )
    }

    fn client_frame(command: ApplicationMessageCode, payload: &[u8]) -> MessageHeader {
        MessageHeader::application(command, payload.len() as u32, Flags::empty())
    }

    fn random_channel_name() -> String {
        format!("testMP-{}", rand::rng().random_range(0..10000))
    }

    /// Drives the session through byte-order + validation, leaving it in
    /// `Validated`.
    fn handshake(session: &mut ServerSession) {
        session.on_accept();
        let mut writer = WireWriter::new(false);
        ConnectionValidationResponse::default_for_client().write(&mut writer);
        let payload = writer.into_bytes();
        let header = client_frame(ApplicationMessageCode::ConnectionValidation, &payload);
        session.handle_frame(&header, &payload).unwrap();
    }

    #[test]
    fn accept_emits_byte_order_then_validation_request() {
        let mut session = session_with_timestamp_channel();
        let frames = session.on_accept();
        assert_eq!(frames.len(), 2);
        assert_eq!(session.state(), ServerState::SentValidationRequest);
        assert!(matches!(
            frames[0].header.command,
            MessageCommand::Control(ControlMessageCode::ByteOrder)
        ));
        assert!(matches!(
            frames[1].header.command,
            MessageCommand::Application(ApplicationMessageCode::ConnectionValidation)
        ));
    }

    #[test_log::test]
    fn full_create_and_get_field_flow() {
        let mut session = session_with_timestamp_channel();
        handshake(&mut session);
        assert_eq!(session.state(), ServerState::Validated);

        let create_request = CreateChannelRequest {
            channels: vec![(1, "testMP".into())],
        };
        let mut writer = WireWriter::new(false);
        create_request.write(&mut writer);
        let payload = writer.into_bytes();
        let header = client_frame(ApplicationMessageCode::CreateChannel, &payload);
        let frames = session.handle_frame(&header, &payload).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(session.state(), ServerState::Serving);

        let mut reader = WireReader::new(&frames[0].payload, false);
        let create_response = CreateChannelResponse::read(&mut reader).unwrap();
        assert!(create_response.status.is_ok());
        let server_id = create_response.server_id;

        let get_request = ChannelGetFieldRequest::whole_channel(server_id, 1);
        let mut writer = WireWriter::new(false);
        get_request.write(&mut writer);
        let payload = writer.into_bytes();
        let header = client_frame(ApplicationMessageCode::ChannelGet, &payload);
        let frames = session.handle_frame(&header, &payload).unwrap();
        assert_eq!(frames.len(), 1);

        let mut read_registry = TypeRegistry::new();
        let mut reader = WireReader::new(&frames[0].payload, false);
        let get_response = ChannelGetFieldResponse::read(&mut reader, &mut read_registry).unwrap();
        assert!(get_response.status.is_ok());
        assert_eq!(get_response.field.unwrap().name, "timeStamp_t");
    }

    #[test]
    fn get_field_on_unknown_channel_id_errors() {
        let mut session = session_with_timestamp_channel();
        handshake(&mut session);

        let get_request = ChannelGetFieldRequest::whole_channel(999, 1);
        let mut writer = WireWriter::new(false);
        get_request.write(&mut writer);
        let payload = writer.into_bytes();
        let header = client_frame(ApplicationMessageCode::ChannelGet, &payload);
        let frames = session.handle_frame(&header, &payload).unwrap();

        let mut read_registry = TypeRegistry::new();
        let mut reader = WireReader::new(&frames[0].payload, false);
        let response = ChannelGetFieldResponse::read(&mut reader, &mut read_registry).unwrap();
        assert_matches!(response.status.kind, Some(StatusKind::Error));
        assert!(response.field.is_none());
    }

    #[test]
    fn channel_table_assigns_distinct_ids_per_name() {
        let mut table = ChannelTable::new();
        let first = table.create(1, random_channel_name());
        let second = table.create(2, random_channel_name());
        assert_ne!(first, second);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn destroy_channel_removes_entry_and_acks() {
        let mut session = session_with_timestamp_channel();
        handshake(&mut session);

        let create_request = CreateChannelRequest {
            channels: vec![(1, "testMP".into())],
        };
        let mut writer = WireWriter::new(false);
        create_request.write(&mut writer);
        let payload = writer.into_bytes();
        let header = client_frame(ApplicationMessageCode::CreateChannel, &payload);
        let frames = session.handle_frame(&header, &payload).unwrap();
        let mut reader = WireReader::new(&frames[0].payload, false);
        let create_response = CreateChannelResponse::read(&mut reader).unwrap();
        let server_id = create_response.server_id;

        assert_eq!(session.channels.lock().unwrap().len(), 1);

        let destroy = DestroyChannelMessage {
            client_channel_id: 1,
            server_channel_id: server_id,
        };
        let mut writer = WireWriter::new(false);
        destroy.write(&mut writer);
        let payload = writer.into_bytes();
        let header = client_frame(ApplicationMessageCode::DestroyChannel, &payload);
        let frames = session.handle_frame(&header, &payload).unwrap();
        assert_eq!(frames.len(), 1);

        assert!(session.channels.lock().unwrap().is_empty());
    }
}
