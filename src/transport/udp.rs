//! UDP sockets for channel discovery: binding with the broadcast/reuse
//! socket options PVAccess discovery depends on, and a beacon emitter that
//! advertises server presence on demand.
//!
//! `mio::net::UdpSocket` offers no way to set `SO_REUSEADDR`, `SO_REUSEPORT`,
//! or `SO_BROADCAST` before binding, so this module builds the socket with
//! `socket2` first and hands the already-configured file descriptor to `mio`.
//! Grounded on `original_source/e4py/server.py` and `client.py`, which set
//! the same three options on their discovery sockets before `bind`/`sendto`.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use mio::net::UdpSocket;
use mio::{Interest, Registry, Token};
use socket2::{Domain, Protocol, Socket, Type};

use crate::protocol::buffer::{WireReader, WireWriter};
use crate::protocol::message::{BeaconMessage, SearchRequest, SearchResponse};
use crate::protocol::ProtocolError;

/// A UDP socket configured for PVAccess discovery traffic.
#[derive(Debug)]
pub struct DiscoverySocket {
    socket: UdpSocket,
}

impl DiscoverySocket {
    fn configured(addr: SocketAddrV4, broadcast: bool, reuse: bool) -> io::Result<Socket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        if reuse {
            socket.set_reuse_address(true)?;
            #[cfg(unix)]
            socket.set_reuse_port(true)?;
        }
        if broadcast {
            socket.set_broadcast(true)?;
        }
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;
        Ok(socket)
    }

    /// Binds to `port` on every interface with `SO_REUSEADDR`/`SO_REUSEPORT`
    /// set, for a server receiving beacons, search requests, and its own
    /// beacon's loopback.
    pub fn bind_server(port: u16) -> io::Result<Self> {
        let addr = SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, port);
        let socket = Self::configured(addr, true, true)?;
        Ok(DiscoverySocket {
            socket: UdpSocket::from_std(socket.into()),
        })
    }

    /// Binds an ephemeral port with `SO_BROADCAST` set, for a client sending
    /// search requests and receiving their unicast responses.
    pub fn bind_client() -> io::Result<Self> {
        let addr = SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0);
        let socket = Self::configured(addr, true, false)?;
        Ok(DiscoverySocket {
            socket: UdpSocket::from_std(socket.into()),
        })
    }

    /// Registers this socket for readable events under `token`.
    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.socket, token, Interest::READABLE)
    }

    /// The local address this socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sends raw bytes to `addr`.
    pub fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(bytes, addr)
    }

    /// Receives into `buf`, returning the number of bytes read and the
    /// sender's address. Returns `Ok(None)` if no datagram is currently
    /// available.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Encodes and sends a `SearchRequest` to `addr` (typically the
    /// subnet broadcast address on [`crate::protocol::PVA_BROADCAST_PORT`]).
    pub fn send_search_request(&self, request: &SearchRequest, addr: SocketAddr) -> io::Result<usize> {
        let mut writer = WireWriter::new(false);
        request.write(&mut writer);
        self.send_to(&writer.into_bytes(), addr)
    }

    /// Encodes and sends a `SearchResponse` to `addr`.
    pub fn send_search_response(&self, response: &SearchResponse, addr: SocketAddr) -> io::Result<usize> {
        let mut writer = WireWriter::new(false);
        response.write(&mut writer);
        self.send_to(&writer.into_bytes(), addr)
    }

    /// Decodes a `SearchRequest` from a received datagram's payload.
    pub fn decode_search_request(payload: &[u8]) -> Result<SearchRequest, ProtocolError> {
        let mut reader = WireReader::new(payload, false);
        SearchRequest::read(&mut reader)
    }

    /// Decodes a `SearchResponse` from a received datagram's payload.
    pub fn decode_search_response(payload: &[u8]) -> Result<SearchResponse, ProtocolError> {
        let mut reader = WireReader::new(payload, false);
        SearchResponse::read(&mut reader)
    }

    /// Builds and sends the `SearchResponse` a server gives for `request`,
    /// directed at the requester's advertised response address/port.
    ///
    /// The socket itself only ever speaks IPv4 (see the module docs); the
    /// wire's IPv6 `response_address` is unwrapped via
    /// [`ipv4_mapped_to_ipv4`], which is the only shape this transport can
    /// actually dial.
    pub fn reply_to_search(
        &self,
        request: &SearchRequest,
        identity: &ServerIdentity,
    ) -> io::Result<usize> {
        let response = answer_search_request(request, identity);
        let ipv4 = ipv4_mapped_to_ipv4(request.response_address).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "response address is not an IPv4-mapped IPv6 address",
            )
        })?;
        let addr = SocketAddr::new(ipv4.into(), request.response_port);
        self.send_search_response(&response, addr)
    }
}

/// Unwraps a 16-byte `::ffff:a.b.c.d`-mapped address into its IPv4 form.
/// Returns `None` for anything else (a genuine IPv6 address this transport,
/// which only binds `AF_INET` sockets, cannot dial).
pub fn ipv4_mapped_to_ipv4(bytes: [u8; 16]) -> Option<Ipv4Addr> {
    if bytes[..10].iter().all(|&b| b == 0) && bytes[10] == 0xFF && bytes[11] == 0xFF {
        Some(Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]))
    } else {
        None
    }
}

/// Encodes an IPv4 address as its `::ffff:a.b.c.d`-mapped 16-byte wire form.
pub fn ipv4_to_ipv4_mapped(addr: Ipv4Addr) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes[10] = 0xFF;
    bytes[11] = 0xFF;
    bytes[12..16].copy_from_slice(&addr.octets());
    bytes
}

/// A server's identity and listen address, as advertised over both beacons
/// and search responses.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    /// The server's 12-byte GUID.
    pub guid: [u8; 12],
    /// The server's TCP listen address (IPv6, IPv4-mapped if applicable).
    pub address: [u8; 16],
    /// The server's TCP listen port.
    pub port: u16,
    /// The transport protocol offered, e.g. `"tcp"`.
    pub protocol: String,
}

/// Builds the `SearchResponse` a server sends back for `request`.
///
/// Grounded on `original_source/e4py/server.py: run_server`: a server always
/// responds with `found=1` and echoes every requested channel's instance id
/// verbatim — matching channel names against what's actually served is not
/// part of core discovery, only the found flag and echo are.
pub fn answer_search_request(request: &SearchRequest, identity: &ServerIdentity) -> SearchResponse {
    SearchResponse {
        guid: identity.guid,
        sequence_id: request.sequence_id,
        server_address: identity.address,
        server_port: identity.port,
        protocol: identity.protocol.clone(),
        found: true,
        instance_ids: request.channels.iter().map(|(id, _)| *id).collect(),
    }
}

/// Periodically advertises a server's presence by broadcasting `Beacon`
/// messages. Nothing here sleeps: [`Self::tick`] is an explicit,
/// caller-driven call, left to a timer the embedding application owns (a
/// `mio_timerfd`, a `tokio::time::interval`, or a test calling it directly).
#[derive(Debug)]
pub struct BeaconEmitter {
    socket: DiscoverySocket,
    target: SocketAddr,
    guid: [u8; 12],
    sequence_id: u8,
    server_address: [u8; 16],
    server_port: u16,
    protocol: String,
}

impl BeaconEmitter {
    /// Creates an emitter that will broadcast beacons to `target` via
    /// `socket`, advertising a server reachable at `server_address:server_port`.
    pub fn new(
        socket: DiscoverySocket,
        target: SocketAddr,
        guid: [u8; 12],
        server_address: [u8; 16],
        server_port: u16,
    ) -> Self {
        BeaconEmitter {
            socket,
            target,
            guid,
            sequence_id: 0,
            server_address,
            server_port,
            protocol: "tcp".to_string(),
        }
    }

    /// Builds and sends the next beacon, advancing the sequence counter.
    pub fn tick(&mut self, change_count: u16) -> io::Result<usize> {
        log::trace!(
            "sending beacon seq={} change_count={change_count} to {}",
            self.sequence_id,
            self.target
        );
        let message = BeaconMessage {
            guid: self.guid,
            flags: 0,
            sequence_id: self.sequence_id,
            change_count,
            server_address: self.server_address,
            server_port: self.server_port,
            protocol: self.protocol.clone(),
            server_status: None,
        };
        self.sequence_id = self.sequence_id.wrapping_add(1);

        let mut writer = WireWriter::new(false);
        message.write(&mut writer);
        self.socket.send_to(&writer.into_bytes(), self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_sockets_bind() {
        let server = DiscoverySocket::bind_server(0).unwrap();
        let client = DiscoverySocket::bind_client().unwrap();
        assert!(server.local_addr().unwrap().port() > 0);
        assert!(client.local_addr().unwrap().port() > 0);
    }

    #[test]
    fn search_request_roundtrips_over_loopback() {
        let server = DiscoverySocket::bind_server(0).unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = DiscoverySocket::bind_client().unwrap();

        let request = SearchRequest {
            sequence_id: 1,
            flags: 0,
            response_address: [0u8; 16],
            response_port: client.local_addr().unwrap().port(),
            protocols: vec!["tcp".into()],
            channels: vec![(1, "testMP".into())],
        };
        client.send_search_request(&request, server_addr).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));

        let mut buf = [0u8; 1024];
        let (n, _from) = server.recv_from(&mut buf).unwrap().expect("datagram received");
        let decoded = DiscoverySocket::decode_search_request(&buf[..n]).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn beacon_emitter_sends_a_well_formed_beacon() {
        let target_socket = DiscoverySocket::bind_server(0).unwrap();
        let target_addr = target_socket.local_addr().unwrap();
        let source_socket = DiscoverySocket::bind_client().unwrap();

        let mut emitter = BeaconEmitter::new(
            source_socket,
            target_addr,
            [0xAB; 12],
            [0u8; 16],
            5075,
        );
        emitter.tick(0).unwrap();
        emitter.tick(0).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));

        let mut buf = [0u8; 1024];
        let (n, _) = target_socket.recv_from(&mut buf).unwrap().expect("first beacon");
        let mut reader = WireReader::new(&buf[..n], false);
        let first = BeaconMessage::read(&mut reader).unwrap();
        assert_eq!(first.sequence_id, 0);

        let (n, _) = target_socket.recv_from(&mut buf).unwrap().expect("second beacon");
        let mut reader = WireReader::new(&buf[..n], false);
        let second = BeaconMessage::read(&mut reader).unwrap();
        assert_eq!(second.sequence_id, 1);
    }

    #[test]
    fn answer_search_request_always_found_and_echoes_ids() {
        let identity = ServerIdentity {
            guid: [0xAB; 12],
            address: [0u8; 16],
            port: 5075,
            protocol: "tcp".to_string(),
        };
        let request = SearchRequest {
            sequence_id: 7,
            flags: 0,
            response_address: [0u8; 16],
            response_port: 0,
            protocols: vec!["tcp".into()],
            channels: vec![(1, "testMP".into()), (2, "otherMP".into())],
        };

        let response = answer_search_request(&request, &identity);
        assert!(response.found);
        assert_eq!(response.sequence_id, 7);
        assert_eq!(response.instance_ids, vec![1, 2]);
        assert_eq!(response.guid, identity.guid);
    }

    #[test]
    fn ipv4_mapped_roundtrip() {
        let addr = Ipv4Addr::new(127, 0, 0, 1);
        let mapped = ipv4_to_ipv4_mapped(addr);
        assert_eq!(ipv4_mapped_to_ipv4(mapped), Some(addr));
    }

    #[test]
    fn reply_to_search_reaches_the_advertised_response_address() {
        let server = DiscoverySocket::bind_server(0).unwrap();
        let client = DiscoverySocket::bind_client().unwrap();
        let client_port = client.local_addr().unwrap().port();

        let request = SearchRequest {
            sequence_id: 1,
            flags: 0,
            response_address: ipv4_to_ipv4_mapped(Ipv4Addr::LOCALHOST),
            response_port: client_port,
            protocols: vec!["tcp".into()],
            channels: vec![(9, "testMP".into())],
        };

        let identity = ServerIdentity {
            guid: [0xCD; 12],
            address: [0u8; 16],
            port: 5075,
            protocol: "tcp".to_string(),
        };

        server.reply_to_search(&request, &identity).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));

        let mut buf = [0u8; 1024];
        let (n, _) = client.recv_from(&mut buf).unwrap().expect("search response received");
        let decoded = DiscoverySocket::decode_search_response(&buf[..n]).unwrap();
        assert!(decoded.found);
        assert_eq!(decoded.instance_ids, vec![9]);
    }
}
