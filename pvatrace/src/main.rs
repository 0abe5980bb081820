//! A tool for tracing PVAccess channel discovery and introspection. Searches
//! for a channel by name over UDP, connects to whichever server answers, and
//! dumps every handshake message along with the channel's introspected type.
//!
//! To use it:
//!
//!     $ pvatrace --channel testMP

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use console::style;

use pvaccess::protocol::buffer::{WireReader, WireWriter};
use pvaccess::protocol::message::{MessageHeader, SearchRequest, SearchResponse};
use pvaccess::protocol::{ApplicationMessageCode, Flags, HEADER_SIZE};
use pvaccess::session::{ClientSession, OutboundFrame};
use pvaccess::transport::udp::{ipv4_mapped_to_ipv4, ipv4_to_ipv4_mapped};

/// Searches for a PVAccess channel and dumps its handshake and introspection.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The channel name to search for.
    #[arg(long, value_name = "NAME")]
    channel: String,

    /// How long to wait for a SearchResponse before giving up.
    #[arg(long, value_name = "MILLIS", default_value_t = 2000)]
    timeout: u64,

    /// The broadcast address to send the SearchRequest to.
    #[arg(long, value_name = "ADDR", default_value = "255.255.255.255")]
    broadcast_addr: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let timeout = Duration::from_millis(args.timeout);

    let search_socket = UdpSocket::bind("0.0.0.0:0").context("binding search socket")?;
    search_socket.set_broadcast(true)?;
    search_socket.set_read_timeout(Some(timeout))?;

    let broadcast_port = pvaccess::broadcast_port_from_env();
    let broadcast_addr: SocketAddr = format!("{}:{}", args.broadcast_addr, broadcast_port)
        .parse()
        .context("parsing broadcast address")?;

    let request = SearchRequest {
        sequence_id: 1,
        flags: 0,
        response_address: ipv4_to_ipv4_mapped(Ipv4Addr::UNSPECIFIED),
        response_port: search_socket.local_addr()?.port(),
        protocols: vec!["tcp".to_string()],
        channels: vec![(1, args.channel.clone())],
    };

    let mut writer = WireWriter::new(false);
    request.write(&mut writer);
    let payload = writer.into_bytes();
    let header = MessageHeader::application(
        ApplicationMessageCode::SearchRequest,
        payload.len() as u32,
        Flags::empty(),
    );
    let mut frame = header.to_bytes().to_vec();
    frame.extend_from_slice(&payload);

    println!(
        "{} searching for channel {}",
        style(Utc::now().to_string()).dim(),
        style(&args.channel).cyan().bold()
    );
    search_socket
        .send_to(&frame, broadcast_addr)
        .context("sending search request")?;

    let mut buf = [0u8; 4096];
    let (n, from) = search_socket
        .recv_from(&mut buf)
        .context("no SearchResponse received before timeout")?;

    let response_header = MessageHeader::from_bytes(&buf[..HEADER_SIZE])?;
    let mut reader = WireReader::new(&buf[HEADER_SIZE..n], response_header.flags.is_big_endian());
    let response = SearchResponse::read(&mut reader)?;

    if !response.found {
        bail!("server at {from} does not host channel {}", args.channel);
    }

    let server_ip = ipv4_mapped_to_ipv4(response.server_address)
        .with_context(|| "server advertised a non-IPv4-mapped address")?;
    let server_addr = SocketAddr::new(server_ip.into(), response.server_port);
    println!(
        "{} {} found on server {} ({})",
        style(Utc::now().to_string()).dim(),
        style(&args.channel).cyan().bold(),
        style(server_addr).green(),
        response.protocol,
    );

    let mut stream = TcpStream::connect(server_addr)
        .with_context(|| format!("connecting to {server_addr}"))?;
    stream.set_nodelay(true)?;

    let mut session = ClientSession::new(1, args.channel.clone());
    loop {
        let (header, payload) = read_frame(&mut stream)?;
        dump_frame(&header, &payload);

        let outbound = session
            .handle_frame(&header, &payload)
            .context("handshake error")?;
        for frame in &outbound {
            write_frame(&mut stream, frame)?;
        }

        if session.is_done() {
            break;
        }
    }

    println!(
        "\n{}\n{:#?}",
        style("introspection").bold().underlined(),
        session.introspection().expect("handshake completed")
    );

    Ok(())
}

fn read_frame(stream: &mut TcpStream) -> anyhow::Result<(MessageHeader, Vec<u8>)> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    stream
        .read_exact(&mut header_bytes)
        .context("reading message header")?;
    let header = MessageHeader::from_bytes(&header_bytes)?;

    let mut payload = vec![0u8; header.payload_size as usize];
    stream.read_exact(&mut payload).context("reading message payload")?;

    Ok((header, payload))
}

fn write_frame(stream: &mut TcpStream, frame: &OutboundFrame) -> anyhow::Result<()> {
    stream.write_all(&frame.to_bytes()).context("writing frame")?;
    Ok(())
}

fn dump_frame(header: &MessageHeader, payload: &[u8]) {
    println!(
        "{} {:?} ({} bytes)",
        style(Utc::now().to_string()).dim(),
        header.command,
        payload.len()
    );
}

