//! Generated prost types for the wire envelope (spec §4.7/§6): `Request`, `Response`,
//! `RpcMessage`, and the name-service payload records. See `proto/rpc.proto`.

include!(concat!(env!("OUT_DIR"), "/lrpc.rs"));

impl RpcMessage {
    pub fn request(r: Request) -> RpcMessage {
        RpcMessage {
            kind: Some(rpc_message::Kind::Request(r)),
        }
    }

    pub fn response(r: Response) -> RpcMessage {
        RpcMessage {
            kind: Some(rpc_message::Kind::Response(r)),
        }
    }
}

impl Response {
    pub fn ok(id: i32, serialized_response: Vec<u8>) -> Response {
        Response {
            id,
            payload: Some(response::Payload::SerializedResponse(serialized_response)),
        }
    }

    pub fn error(id: i32, errnum: i32, msg: String) -> Response {
        Response {
            id,
            payload: Some(response::Payload::Error(ResponseError { errnum, msg })),
        }
    }
}
