//! Segmentation/reassembly state machine: turns a stream of small, bounded
//! packets into one logical request before handing it to
//! [`crate::update_server::UpdateServer`].
//!
//! Grounded in `updateserver/transfer.c`. Deliberately preserves that file's
//! one real asymmetry: `handle_transfer_end` returns a bare `0` (not a
//! 3-byte NACK frame) when called with the wrong packet size, because at
//! that point there is no reliable SID byte in the packet to echo back.

use crate::error::{CoreError, ProtocolResult};
use crate::protocol::{
    TRANSFER_MULTI_PACKET_END, TRANSFER_MULTI_PACKET_INIT, TRANSFER_MULTI_PACKET_TRANSFER,
    TRANSFER_SINGLE_PACKET,
};
use crate::update_server::{PutFragmentHandler, PutMetadataHandler, ReadDataById, UpdateServer, WriteDataById};

const MIN_PACKET_SIZE: usize = 2;
const MIN_RESPONSE_CAPACITY: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferState {
    Idle,
    Rx,
}

fn decode_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn transfer_response(packet: &mut [u8], code: ProtocolResult) -> usize {
    packet[0] = TRANSFER_SINGLE_PACKET;
    packet[1] = 0;
    packet[2] = code.into();
    3
}

/// Reassembles packets into `buf`, a caller-owned backing buffer bounding
/// the largest single logical request this instance will accept.
pub struct TransferBuffer<'a, R, W, M, F> {
    server: &'a UpdateServer<R, W, M, F>,
    buf: &'a mut [u8],
    msg_size: usize,
    transfer_size: usize,
    state: TransferState,
}

impl<'a, R, W, M, F> TransferBuffer<'a, R, W, M, F>
where
    R: ReadDataById,
    W: WriteDataById,
    M: PutMetadataHandler,
    F: PutFragmentHandler,
{
    /// `Param` if `buf` is shorter than two bytes.
    pub fn new(server: &'a UpdateServer<R, W, M, F>, buf: &'a mut [u8]) -> Result<Self, CoreError> {
        if buf.len() < MIN_PACKET_SIZE {
            return Err(CoreError::Param);
        }
        Ok(Self {
            server,
            buf,
            msg_size: 0,
            transfer_size: 0,
            state: TransferState::Idle,
        })
    }

    fn handle_single_packet(&mut self, packet: &mut [u8], packet_size: usize) -> usize {
        self.state = TransferState::Idle;
        self.msg_size = packet_size - 1;
        self.transfer_size = 0;

        self.buf[..self.msg_size].copy_from_slice(&packet[1..packet_size]);

        let response_len = self
            .server
            .process_request(&self.buf[..self.msg_size], &mut packet[1..]);
        1 + response_len
    }

    fn handle_transfer_start(&mut self, packet: &mut [u8], packet_size: usize) -> usize {
        if packet_size != 5 {
            return transfer_response(packet, ProtocolResult::InvalidRequest);
        }

        let transfer_size = decode_u32_be(&packet[1..5]) as usize;
        if transfer_size == 0 || transfer_size > self.buf.len() {
            return transfer_response(packet, ProtocolResult::RequestOutOfRange);
        }

        self.state = TransferState::Rx;
        self.msg_size = 0;
        self.transfer_size = transfer_size;
        transfer_response(packet, ProtocolResult::Ok)
    }

    fn handle_transfer_data(&mut self, packet: &mut [u8], packet_size: usize) -> usize {
        if self.state != TransferState::Rx {
            return transfer_response(packet, ProtocolResult::RequestFailed);
        }

        let data_size = packet_size - 1;
        let space_remaining = self.buf.len() - self.msg_size;
        if data_size > space_remaining {
            return transfer_response(packet, ProtocolResult::RequestOutOfRange);
        }
        if self.msg_size + data_size > self.transfer_size {
            return transfer_response(packet, ProtocolResult::InvalidRequest);
        }

        self.buf[self.msg_size..self.msg_size + data_size]
            .copy_from_slice(&packet[1..packet_size]);
        self.msg_size += data_size;
        transfer_response(packet, ProtocolResult::Ok)
    }

    fn handle_transfer_end(&mut self, packet: &mut [u8], packet_size: usize) -> usize {
        if packet_size != 1 {
            return 0;
        }
        if self.state != TransferState::Rx {
            return transfer_response(packet, ProtocolResult::RequestFailed);
        }
        if self.msg_size != self.transfer_size {
            return transfer_response(packet, ProtocolResult::RequestOutOfRange);
        }

        packet[0] = TRANSFER_SINGLE_PACKET;
        let response_len = self
            .server
            .process_request(&self.buf[..self.msg_size], &mut packet[1..]);
        1 + response_len
    }

    /// Processes one packet in place: `packet[..packet_size]` is the valid
    /// input, `packet.len()` bounds how large a response may be written back
    /// into the same buffer. Returns `0` if `packet_size` is out of
    /// `[2, bufSize]` or `packet.len()` is smaller than six bytes — not
    /// enough room for even a minimal transfer-layer response.
    pub fn process(&mut self, packet: &mut [u8], packet_size: usize) -> usize {
        if packet_size < MIN_PACKET_SIZE
            || packet_size > self.buf.len()
            || packet.len() < MIN_RESPONSE_CAPACITY
        {
            return 0;
        }

        let max_packet_size = packet.len();
        let response_size = match packet[0] {
            TRANSFER_SINGLE_PACKET => self.handle_single_packet(packet, packet_size),
            TRANSFER_MULTI_PACKET_INIT => self.handle_transfer_start(packet, packet_size),
            TRANSFER_MULTI_PACKET_TRANSFER => self.handle_transfer_data(packet, packet_size),
            TRANSFER_MULTI_PACKET_END => self.handle_transfer_end(packet, packet_size),
            _ => return 0,
        };

        if response_size > max_packet_size {
            return 0;
        }
        response_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Handlers;

    impl ReadDataById for Handlers {
        fn read(&self, _id: u8, _out: &mut [u8]) -> (ProtocolResult, usize) {
            (ProtocolResult::Ok, 0)
        }
    }
    impl WriteDataById for Handlers {
        fn write(&self, _id: u8, _data: &[u8]) -> ProtocolResult {
            ProtocolResult::Ok
        }
    }
    impl PutMetadataHandler for Handlers {
        fn put_metadata(&self, _data: &[u8]) -> ProtocolResult {
            ProtocolResult::Ok
        }
    }
    impl PutFragmentHandler for Handlers {
        fn put_fragment(&self, _data: &[u8]) -> ProtocolResult {
            ProtocolResult::Ok
        }
    }

    fn server() -> UpdateServer<Handlers, Handlers, Handlers, Handlers> {
        UpdateServer::new(Handlers, Handlers, Handlers, Handlers)
    }

    #[test]
    fn single_packet_round_trips_ping() {
        let server = server();
        let mut buf = [0u8; 64];
        let mut tb = TransferBuffer::new(&server, &mut buf).unwrap();

        let mut packet = [0u8; 32];
        packet[0] = TRANSFER_SINGLE_PACKET;
        packet[1] = crate::protocol::SID_PING;
        let len = tb.process(&mut packet, 2);

        assert_eq!(len, 1 + 2);
        assert_eq!(packet[0], TRANSFER_SINGLE_PACKET);
        assert_eq!(&packet[1..3], &[crate::protocol::SID_PING, 0x00]);
    }

    #[test]
    fn multi_packet_flow_reassembles_before_dispatch() {
        let server = server();
        let mut buf = [0u8; 64];
        let mut tb = TransferBuffer::new(&server, &mut buf).unwrap();

        let mut packet = [0u8; 32];
        packet[0] = TRANSFER_MULTI_PACKET_INIT;
        packet[1..5].copy_from_slice(&1u32.to_be_bytes());
        let len = tb.process(&mut packet, 5);
        assert_eq!(&packet[..len], &[TRANSFER_SINGLE_PACKET, 0, 0x00]);

        let mut packet = [0u8; 32];
        packet[0] = TRANSFER_MULTI_PACKET_TRANSFER;
        packet[1] = crate::protocol::SID_PING;
        let len = tb.process(&mut packet, 2);
        assert_eq!(&packet[..len], &[TRANSFER_SINGLE_PACKET, 0, 0x00]);

        let mut packet = [0u8; 32];
        packet[0] = TRANSFER_MULTI_PACKET_END;
        let len = tb.process(&mut packet, 1);
        assert_eq!(packet[0], TRANSFER_SINGLE_PACKET);
        assert_eq!(&packet[1..len], &[crate::protocol::SID_PING, 0x00]);
    }

    #[test]
    fn transfer_end_with_wrong_packet_size_returns_bare_zero() {
        let server = server();
        let mut buf = [0u8; 64];
        let mut tb = TransferBuffer::new(&server, &mut buf).unwrap();

        let mut packet = [0u8; 32];
        packet[0] = TRANSFER_MULTI_PACKET_END;
        let len = tb.process(&mut packet, 2);
        assert_eq!(len, 0);
    }

    #[test]
    fn transfer_data_out_of_order_is_request_failed() {
        let server = server();
        let mut buf = [0u8; 64];
        let mut tb = TransferBuffer::new(&server, &mut buf).unwrap();

        let mut packet = [0u8; 32];
        packet[0] = TRANSFER_MULTI_PACKET_TRANSFER;
        let len = tb.process(&mut packet, 2);
        assert_eq!(len, 3);
        assert_eq!(packet[2], u8::from(ProtocolResult::RequestFailed));
    }

    #[test]
    fn transfer_start_larger_than_buffer_is_out_of_range() {
        let server = server();
        let mut buf = [0u8; 4];
        let mut tb = TransferBuffer::new(&server, &mut buf).unwrap();

        let mut packet = [0u8; 32];
        packet[0] = TRANSFER_MULTI_PACKET_INIT;
        packet[1..5].copy_from_slice(&100u32.to_be_bytes());
        let len = tb.process(&mut packet, 5);
        assert_eq!(len, 3);
        assert_eq!(packet[2], u8::from(ProtocolResult::RequestOutOfRange));
    }

    #[test]
    fn transfer_start_of_zero_length_is_out_of_range() {
        let server = server();
        let mut buf = [0u8; 64];
        let mut tb = TransferBuffer::new(&server, &mut buf).unwrap();

        let mut packet = [0u8; 32];
        packet[0] = TRANSFER_MULTI_PACKET_INIT;
        packet[1..5].copy_from_slice(&0u32.to_be_bytes());
        let len = tb.process(&mut packet, 5);
        assert_eq!(len, 3);
        assert_eq!(packet[2], u8::from(ProtocolResult::RequestOutOfRange));
    }

    #[test]
    fn tiny_response_capacity_returns_zero() {
        let server = server();
        let mut buf = [0u8; 64];
        let mut tb = TransferBuffer::new(&server, &mut buf).unwrap();

        let mut packet = [0u8; 4];
        packet[0] = TRANSFER_SINGLE_PACKET;
        packet[1] = crate::protocol::SID_PING;
        assert_eq!(tb.process(&mut packet, 2), 0);
    }
}
