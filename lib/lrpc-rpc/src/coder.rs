use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lrpc_reactor::Buffer;
use prost::Message as ProstMessage;

use crate::error::RpcError;
use crate::message::RpcMessage;

/// Header size; `total_len` includes these 4 bytes (spec §4.7).
pub const HEADER_LEN: usize = 4;
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

pub enum Decoded<T> {
    NeedMore,
    Frame(T),
}

/// Pulls one length-prefixed frame's raw body out of `buf`, or reports that more bytes are
/// needed. Matches spec §4.7's bytes-to-frame rules exactly, including the `(4, 256 MiB)` bound
/// on `total_len`.
pub fn decode_frame(buf: &mut Buffer) -> Result<Decoded<Vec<u8>>, RpcError> {
    if buf.readable() < HEADER_LEN {
        return Ok(Decoded::NeedMore);
    }
    let mut header = &buf.peek()[..HEADER_LEN];
    let total_len = header.read_u32::<LittleEndian>().map_err(|_| RpcError::DecodeFail)?;

    if total_len <= HEADER_LEN as u32 || total_len >= MAX_FRAME_LEN {
        return Err(RpcError::TooLongFrame);
    }
    if buf.readable() < total_len as usize {
        return Ok(Decoded::NeedMore);
    }

    let frame = buf.retrieve_as_bytes(total_len as usize);
    Ok(Decoded::Frame(frame[HEADER_LEN..].to_vec()))
}

pub fn decode_rpc_message(body: &[u8]) -> Result<RpcMessage, RpcError> {
    RpcMessage::decode(body).map_err(|_| RpcError::DecodeFail)
}

/// Encodes `msg` into wire bytes: `[u32 total_len][protobuf body]`. Uses `Buffer::prepend` to
/// stamp the length in front of the already-encoded body instead of copying it (spec §3's
/// prepend-reserve rationale, spec §4.7's default bytes-encoder).
pub fn encode_rpc_message(msg: &RpcMessage) -> Result<Vec<u8>, RpcError> {
    let mut body = Vec::new();
    msg.encode(&mut body).map_err(|_| RpcError::EncodeFail)?;

    let total_len = (body.len() + HEADER_LEN) as u32;
    let mut header = [0u8; HEADER_LEN];
    (&mut header[..]).write_u32::<LittleEndian>(total_len).map_err(|_| RpcError::EncodeFail)?;

    let mut buf = Buffer::with_capacity(body.len());
    buf.append(&body);
    buf.prepend(&header);
    Ok(buf.retrieve_all_as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Request, RpcMessage};

    #[test]
    fn encode_then_decode_recovers_request() {
        let msg = RpcMessage::request(Request {
            id: 7,
            service_name: "Echo".into(),
            method_name: "echo".into(),
            serialized_request: b"hi".to_vec(),
        });
        let wire = encode_rpc_message(&msg).unwrap();

        let mut buf = Buffer::new();
        buf.append(&wire);
        let body = match decode_frame(&mut buf).unwrap() {
            Decoded::Frame(b) => b,
            Decoded::NeedMore => panic!("expected a full frame"),
        };
        let decoded = decode_rpc_message(&body).unwrap();
        match decoded.kind {
            Some(crate::message::rpc_message::Kind::Request(r)) => {
                assert_eq!(r.id, 7);
                assert_eq!(r.method_name, "echo");
            }
            _ => panic!("expected Request variant"),
        }
    }

    #[test]
    fn partial_frame_reports_need_more() {
        let msg = RpcMessage::request(Request {
            id: 1,
            service_name: "S".into(),
            method_name: "m".into(),
            serialized_request: vec![0u8; 100],
        });
        let wire = encode_rpc_message(&msg).unwrap();

        let mut buf = Buffer::new();
        buf.append(&wire[..wire.len() - 1]);
        assert!(matches!(decode_frame(&mut buf).unwrap(), Decoded::NeedMore));
    }

    #[test]
    fn oversized_header_is_rejected() {
        let mut buf = Buffer::new();
        buf.append(&(300 * 1024 * 1024u32).to_le_bytes());
        assert!(matches!(decode_frame(&mut buf), Err(RpcError::TooLongFrame)));
    }
}
