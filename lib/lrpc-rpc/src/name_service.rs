use std::sync::Arc;

use lrpc_future::{Future, FutureResult};
use prost::Message;

use crate::client_channel::ClientChannel;
use crate::error::RpcError;
use crate::message::{Endpoint, EndpointList, KeepaliveInfo, ServiceName, Status};

/// Name of the well-known RPC service name-service calls are dispatched against (spec §6):
/// endpoint discovery rides the ordinary `Request`/`Response` envelope like any other service,
/// rather than a distinct wire message kind.
pub const NAME_SERVICE_NAME: &str = "lrpc.NameService";

/// What a `ClientStub` needs from a name service: endpoint discovery and keepalive registration
/// (spec §6). The default implementation below dispatches these as ordinary RPC calls against
/// `lrpc.NameService`; a Redis-text adapter reaching the same contract over `hgetall`/`hset` is
/// out of scope here (spec's explicit non-goal) and swaps in at the channel's encoder/decoder
/// instead of this trait.
pub trait NameServiceClient: Send + Sync {
    fn get_endpoints(&self, service_name: String) -> Future<Vec<lrpc_reactor::InetAddress>, RpcError>;
    fn keepalive(&self, service_name: String, endpoint: lrpc_reactor::InetAddress) -> Future<bool, RpcError>;
}

/// Talks to `lrpc.NameService` over a plain `ClientChannel` using the binary wire protocol.
pub struct RpcNameServiceClient {
    channel: Arc<ClientChannel>,
}

impl RpcNameServiceClient {
    pub fn new(channel: Arc<ClientChannel>) -> RpcNameServiceClient {
        RpcNameServiceClient { channel }
    }
}

impl NameServiceClient for RpcNameServiceClient {
    fn get_endpoints(&self, service_name: String) -> Future<Vec<lrpc_reactor::InetAddress>, RpcError> {
        let request = ServiceName { name: service_name };
        let bytes = request.encode_to_vec();
        self.channel.invoke("GetEndpoints", bytes).then(None, |result| match result {
            FutureResult::Value(bytes) => match EndpointList::decode(bytes.as_slice()) {
                Ok(list) => FutureResult::Value(
                    list.endpoints
                        .into_iter()
                        .map(|e| lrpc_reactor::InetAddress::new(e.ip.parse().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED), e.port as u16))
                        .collect(),
                ),
                Err(_) => FutureResult::Exception(RpcError::DecodeFail),
            },
            FutureResult::Exception(e) => FutureResult::Exception(e),
            FutureResult::None => FutureResult::Exception(RpcError::ConnectionLost),
        })
    }

    fn keepalive(&self, service_name: String, endpoint: lrpc_reactor::InetAddress) -> Future<bool, RpcError> {
        let request = KeepaliveInfo {
            service_name,
            endpoint: Some(Endpoint { ip: endpoint.ip().to_string(), port: endpoint.port() as u32 }),
        };
        let bytes = request.encode_to_vec();
        self.channel.invoke("Keepalive", bytes).then(None, |result| match result {
            FutureResult::Value(bytes) => match Status::decode(bytes.as_slice()) {
                Ok(status) => FutureResult::Value(status.result),
                Err(_) => FutureResult::Exception(RpcError::DecodeFail),
            },
            FutureResult::Exception(e) => FutureResult::Exception(e),
            FutureResult::None => FutureResult::Exception(RpcError::ConnectionLost),
        })
    }
}
