//! UDP transport and request/response framing.
//!
//! Grounded in `updateclient/udpsocket.hpp` for the socket wrapper and
//! `updateclient/client.cpp`'s `_Request`/`_SendRecv` for the single-packet
//! vs. multi-packet transfer decision: a payload that fits in one UDP
//! datagram goes out as `TRANSFER_SINGLE_PACKET`, anything larger is split
//! into `TRANSFER_MULTI_PACKET_INIT`/`_TRANSFER`/`_END` frames.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use fwupdate_core::protocol::{
    TRANSFER_MULTI_PACKET_END, TRANSFER_MULTI_PACKET_INIT, TRANSFER_MULTI_PACKET_TRANSFER,
    TRANSFER_SINGLE_PACKET,
};

/// Matches the original's `UDP_MAX_PAYLOAD_SIZE`; payloads at or under this
/// many bytes go out as a single packet.
pub const UDP_MAX_PAYLOAD_SIZE: usize = 512;

/// A thin wrapper over [`std::net::UdpSocket`] bound to one local port and
/// talking to one fixed remote address, mirroring `UdpSocket` in the
/// original.
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl UdpTransport {
    pub fn bind(local_port: u16, remote: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port))?;
        socket.set_read_timeout(Some(Duration::from_secs(2)))?;
        Ok(Self { socket, remote })
    }

    pub fn send(&self, data: &[u8]) -> io::Result<()> {
        self.socket.send_to(data, self.remote)?;
        Ok(())
    }

    pub fn recv(&self) -> io::Result<Vec<u8>> {
        let mut buf = [0u8; 2048];
        let (len, _from) = self.socket.recv_from(&mut buf)?;
        Ok(buf[..len].to_vec())
    }
}

/// Frames `service_id` and `payload` as one logical message
/// (`[service_id, ..payload]`) and sends it as either a single
/// `TRANSFER_SINGLE_PACKET` frame or a `MULTI_INIT`/`MULTI_TRANSFER`.../
/// `MULTI_END` sequence, depending on whether the whole message fits in one
/// datagram. Returns the device's final response, leading transfer-code
/// byte included — callers pass that straight through
/// [`crate::update_server`]'s own `[sid, result, ..]` convention one byte in.
///
/// Every frame on the wire is `[transfer_code, ..data]`; for
/// `MULTI_PACKET_INIT` that data is the message's total length as a 4-byte
/// big-endian count, for `MULTI_PACKET_TRANSFER` it is a chunk of the
/// message itself, and `MULTI_PACKET_END` carries no data at all — it only
/// triggers dispatch once every chunk has arrived.
pub fn request(transport: &UdpTransport, service_id: u8, payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut message = Vec::with_capacity(1 + payload.len());
    message.push(service_id);
    message.extend_from_slice(payload);

    if message.len() + 1 <= UDP_MAX_PAYLOAD_SIZE {
        let mut frame = Vec::with_capacity(1 + message.len());
        frame.push(TRANSFER_SINGLE_PACKET);
        frame.extend_from_slice(&message);
        transport.send(&frame)?;
        return transport.recv();
    }

    let mut frame = Vec::with_capacity(5);
    frame.push(TRANSFER_MULTI_PACKET_INIT);
    frame.extend_from_slice(&(message.len() as u32).to_be_bytes());
    transport.send(&frame)?;
    let mut response = transport.recv()?;

    let chunk_size = UDP_MAX_PAYLOAD_SIZE - 1;
    for chunk in message.chunks(chunk_size) {
        let mut frame = Vec::with_capacity(1 + chunk.len());
        frame.push(TRANSFER_MULTI_PACKET_TRANSFER);
        frame.extend_from_slice(chunk);
        transport.send(&frame)?;
        response = transport.recv()?;
    }

    transport.send(&[TRANSFER_MULTI_PACKET_END])?;
    response = transport.recv()?;

    Ok(response)
}
