//! A pure request/response dispatcher: given a decoded request buffer and
//! four injected handlers, produces a response buffer. Holds no mutable
//! state of its own across calls.
//!
//! Grounded in `updateserver/server.c`: one private handler function per
//! service id, the same minimum-length guards, and the same `BasicResponse`
//! two-byte-header convention.

use crate::error::ProtocolResult;
use crate::protocol::{SID_PING, SID_PUT_FRAGMENT, SID_PUT_METADATA, SID_READ_DATA_BY_ID, SID_WRITE_DATA_BY_ID};

const MINIMUM_RESPONSE_LENGTH: usize = 2;

/// `READ_DATA_BY_ID` handler: reads up to `out.len()` bytes for `id`,
/// returning how many it wrote.
pub trait ReadDataById {
    fn read(&self, id: u8, out: &mut [u8]) -> (ProtocolResult, usize);
}

/// `WRITE_DATA_BY_ID` handler.
pub trait WriteDataById {
    fn write(&self, id: u8, data: &[u8]) -> ProtocolResult;
}

/// `PUT_METADATA` handler.
pub trait PutMetadataHandler {
    fn put_metadata(&self, data: &[u8]) -> ProtocolResult;
}

/// `PUT_FRAGMENT` handler.
pub trait PutFragmentHandler {
    fn put_fragment(&self, data: &[u8]) -> ProtocolResult;
}

/// Dispatches one request buffer to its handler and writes the response,
/// generic over the four injected handler capabilities rather than the
/// source's four function pointers bundled into `UpdateServer_t`.
pub struct UpdateServer<R, W, M, F> {
    read_did: R,
    write_did: W,
    put_metadata: M,
    put_fragment: F,
}

fn basic_response(sid: u8, code: ProtocolResult, response: &mut [u8]) -> usize {
    response[0] = sid;
    response[1] = code.into();
    MINIMUM_RESPONSE_LENGTH
}

impl<R, W, M, F> UpdateServer<R, W, M, F>
where
    R: ReadDataById,
    W: WriteDataById,
    M: PutMetadataHandler,
    F: PutFragmentHandler,
{
    pub fn new(read_did: R, write_did: W, put_metadata: M, put_fragment: F) -> Self {
        Self {
            read_did,
            write_did,
            put_metadata,
            put_fragment,
        }
    }

    fn handle_ping(&self, sid: u8, request: &[u8], response: &mut [u8]) -> usize {
        if request.len() != 1 {
            return basic_response(sid, ProtocolResult::InvalidRequest, response);
        }
        basic_response(sid, ProtocolResult::Ok, response)
    }

    fn handle_read_data_by_id(&self, sid: u8, request: &[u8], response: &mut [u8]) -> usize {
        if request.len() != 2 {
            return basic_response(sid, ProtocolResult::InvalidRequest, response);
        }
        if response.len() <= MINIMUM_RESPONSE_LENGTH {
            return basic_response(sid, ProtocolResult::InternalError, response);
        }

        let id = request[1];
        let (result, read_len) = self.read_did.read(id, &mut response[MINIMUM_RESPONSE_LENGTH..]);

        if result == ProtocolResult::Ok {
            basic_response(sid, result, response) + read_len
        } else {
            basic_response(sid, result, response)
        }
    }

    fn handle_write_data_by_id(&self, sid: u8, request: &[u8], response: &mut [u8]) -> usize {
        if request.len() < 3 {
            return basic_response(sid, ProtocolResult::InvalidRequest, response);
        }

        let id = request[1];
        let data = &request[2..];
        let result = self.write_did.write(id, data);
        basic_response(sid, result, response)
    }

    fn handle_put_metadata(&self, sid: u8, request: &[u8], response: &mut [u8]) -> usize {
        if request.len() < 2 {
            return basic_response(sid, ProtocolResult::InvalidRequest, response);
        }
        let result = self.put_metadata.put_metadata(&request[1..]);
        basic_response(sid, result, response)
    }

    fn handle_put_fragment(&self, sid: u8, request: &[u8], response: &mut [u8]) -> usize {
        if request.len() < 2 {
            return basic_response(sid, ProtocolResult::InvalidRequest, response);
        }
        let result = self.put_fragment.put_fragment(&request[1..]);
        basic_response(sid, result, response)
    }

    /// Dispatches `request` by its first byte, writing the response into
    /// `response` and returning how many bytes were written. Returns `0` if
    /// `request` is empty or `response` is shorter than
    /// [`MINIMUM_RESPONSE_LENGTH`] — the caller has no room even for a
    /// negative acknowledgement.
    pub fn process_request(&self, request: &[u8], response: &mut [u8]) -> usize {
        if request.is_empty() || response.len() < MINIMUM_RESPONSE_LENGTH {
            return 0;
        }

        let sid = request[0];
        match sid {
            SID_PING => self.handle_ping(sid, request, response),
            SID_READ_DATA_BY_ID => self.handle_read_data_by_id(sid, request, response),
            SID_WRITE_DATA_BY_ID => self.handle_write_data_by_id(sid, request, response),
            SID_PUT_METADATA => self.handle_put_metadata(sid, request, response),
            SID_PUT_FRAGMENT => self.handle_put_fragment(sid, request, response),
            _ => basic_response(sid, ProtocolResult::RequestOutOfRange, response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Handlers;

    impl ReadDataById for Handlers {
        fn read(&self, id: u8, out: &mut [u8]) -> (ProtocolResult, usize) {
            if id != 0x01 {
                return (ProtocolResult::RequestFailed, 0);
            }
            let payload = [0xDE, 0xAD, 0xBE, 0xEF];
            out[..payload.len()].copy_from_slice(&payload);
            (ProtocolResult::Ok, payload.len())
        }
    }

    impl WriteDataById for Handlers {
        fn write(&self, id: u8, data: &[u8]) -> ProtocolResult {
            if id == 0x12 && data == [7] {
                ProtocolResult::Ok
            } else {
                ProtocolResult::RequestFailed
            }
        }
    }

    impl PutMetadataHandler for Handlers {
        fn put_metadata(&self, _data: &[u8]) -> ProtocolResult {
            ProtocolResult::Ok
        }
    }

    impl PutFragmentHandler for Handlers {
        fn put_fragment(&self, data: &[u8]) -> ProtocolResult {
            if data.is_empty() {
                ProtocolResult::InvalidRequest
            } else {
                ProtocolResult::Ok
            }
        }
    }

    fn server() -> UpdateServer<Handlers, Handlers, Handlers, Handlers> {
        UpdateServer::new(Handlers, Handlers, Handlers, Handlers)
    }

    #[test]
    fn ping_acks() {
        let server = server();
        let mut response = [0u8; 8];
        let len = server.process_request(&[SID_PING], &mut response);
        assert_eq!(len, 2);
        assert_eq!(&response[..2], &[SID_PING, 0x00]);
    }

    #[test]
    fn ping_wrong_length_is_invalid_request() {
        let server = server();
        let mut response = [0u8; 8];
        let len = server.process_request(&[SID_PING, 0xFF], &mut response);
        assert_eq!(len, 2);
        assert_eq!(response[1], u8::from(ProtocolResult::InvalidRequest));
    }

    #[test]
    fn read_data_by_id_appends_payload_after_header() {
        let server = server();
        let mut response = [0u8; 16];
        let len = server.process_request(&[SID_READ_DATA_BY_ID, 0x01], &mut response);
        assert_eq!(len, 6);
        assert_eq!(&response[..2], &[SID_READ_DATA_BY_ID, 0x00]);
        assert_eq!(&response[2..6], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn read_data_by_id_with_no_response_room_is_internal_error() {
        let server = server();
        let mut response = [0u8; 2];
        let len = server.process_request(&[SID_READ_DATA_BY_ID, 0x01], &mut response);
        assert_eq!(len, 2);
        assert_eq!(response[1], u8::from(ProtocolResult::InternalError));
    }

    #[test]
    fn write_data_by_id_requires_at_least_three_bytes() {
        let server = server();
        let mut response = [0u8; 8];
        let len = server.process_request(&[SID_WRITE_DATA_BY_ID, 0x12], &mut response);
        assert_eq!(response[1], u8::from(ProtocolResult::InvalidRequest));
        assert_eq!(len, 2);

        let len = server.process_request(&[SID_WRITE_DATA_BY_ID, 0x12, 7], &mut response);
        assert_eq!(len, 2);
        assert_eq!(response[1], 0x00);
    }

    #[test]
    fn put_metadata_and_put_fragment_require_payload() {
        let server = server();
        let mut response = [0u8; 8];

        let len = server.process_request(&[SID_PUT_METADATA], &mut response);
        assert_eq!(response[1], u8::from(ProtocolResult::InvalidRequest));
        assert_eq!(len, 2);

        let len = server.process_request(&[SID_PUT_FRAGMENT, 0x01], &mut response);
        assert_eq!(len, 2);
        assert_eq!(response[1], 0x00);
    }

    #[test]
    fn unknown_sid_echoes_sid_with_out_of_range() {
        let server = server();
        let mut response = [0u8; 8];
        let len = server.process_request(&[0x7F, 0x00], &mut response);
        assert_eq!(len, 2);
        assert_eq!(
            &response[..2],
            &[0x7F, u8::from(ProtocolResult::RequestOutOfRange)]
        );
    }

    #[test]
    fn empty_request_or_tiny_response_returns_zero() {
        let server = server();
        let mut response = [0u8; 8];
        assert_eq!(server.process_request(&[], &mut response), 0);

        let mut tiny = [0u8; 1];
        assert_eq!(server.process_request(&[SID_PING], &mut tiny), 0);
    }
}
