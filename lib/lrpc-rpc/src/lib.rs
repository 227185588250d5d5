//! RPC channel layer (spec §4.7-§4.12): length-prefixed wire framing over `lrpc_reactor`,
//! request/response correlation by integer id, service registration, name-service-backed
//! endpoint discovery, and client-side connection pooling with round-robin load balancing.

pub mod client_channel;
pub mod client_stub;
pub mod coder;
pub mod config;
pub mod error;
pub mod message;
pub mod name_service;
pub mod server;
pub mod server_channel;
pub mod service;
pub mod util;

pub use client_channel::ClientChannel;
pub use client_stub::ClientStub;
pub use coder::{decode_frame, decode_rpc_message, encode_rpc_message, Decoded, HEADER_LEN, MAX_FRAME_LEN};
pub use config::{ClientStubConfig, RpcServerConfig};
pub use error::RpcError;
pub use message::{Endpoint, EndpointList, KeepaliveInfo, Request, Response, ResponseError, RpcMessage, ServiceName, Status};
pub use name_service::{NameServiceClient, RpcNameServiceClient, NAME_SERVICE_NAME};
pub use server::{Registry, RpcServer};
pub use server_channel::ServerChannel;
pub use service::{typed_method, Completion, ServiceDescriptor};
pub use util::execute;
