//! A non-blocking TCP connection paired with frame extraction and a queued
//! outbound byte stream, the unit that a `mio` event loop registers and
//! drives per accepted (or connected) socket.
//!
//! Grounded on `examples/server.rs`'s per-client read loop: read into a
//! scratch buffer until the socket reports `WouldBlock`, rather than reading
//! once per poll wakeup.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::protocol::message::MessageHeader;
use crate::protocol::ProtocolError;
use crate::session::{FrameExtractor, OutboundFrame};

/// One TCP socket's read/write state: an inbound [`FrameExtractor`] and an
/// outbound byte queue, both driven by a caller's `mio` event loop.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    extractor: FrameExtractor,
    outbound: VecDeque<u8>,
    scratch: Vec<u8>,
}

impl TcpConnection {
    /// Wraps an already-connected or just-accepted stream.
    pub fn new(stream: TcpStream) -> Self {
        TcpConnection {
            stream,
            extractor: FrameExtractor::new(),
            outbound: VecDeque::new(),
            scratch: vec![0u8; 64 * 1024],
        }
    }

    /// Begins a non-blocking connection to `addr`. The caller must wait for
    /// a writable event before treating the connection as established.
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        Ok(TcpConnection::new(TcpStream::connect(addr)?))
    }

    /// Registers this connection's socket for both readable and writable
    /// events under `token`.
    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(
            &mut self.stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        )
    }

    /// Deregisters this connection's socket.
    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.stream)
    }

    /// Appends `frame`'s bytes to the outbound queue. Call [`Self::flush`]
    /// (on a writable event, or right away for the optimistic case) to
    /// actually send them.
    pub fn queue(&mut self, frame: &OutboundFrame) {
        self.outbound.extend(frame.to_bytes());
    }

    /// Writes as much of the outbound queue as the socket will currently
    /// accept. Returns `Ok(())` whether or not the queue was fully drained;
    /// check [`Self::has_pending_writes`] to find out.
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            let chunk: Vec<u8> = self.outbound.iter().copied().collect();
            match self.stream.write(&chunk) {
                Ok(0) => break,
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// True if the outbound queue still holds unwritten bytes.
    pub fn has_pending_writes(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Reads until the socket would block, feeding every byte to the frame
    /// extractor, and returns every complete frame produced. A closed peer is
    /// reported as `Ok` with whatever frames were extracted before the
    /// `Ok(0)` read; the caller detects the close via a separate read-closed
    /// poll event, as `examples/server.rs` does.
    pub fn poll_frames(&mut self) -> Result<Vec<(MessageHeader, Vec<u8>)>, ProtocolError> {
        loop {
            match self.stream.read(&mut self.scratch) {
                Ok(0) => break,
                Ok(n) => {
                    log::trace!("read {n} bytes from {:?}", self.stream.peer_addr());
                    self.extractor.feed(&self.scratch[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("read error on {:?}: {e}", self.stream.peer_addr());
                    return Err(ProtocolError::Io(e));
                }
            }
        }

        let mut frames = Vec::new();
        while let Some(frame) = self.extractor.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// The connection's peer address, if connected.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}
