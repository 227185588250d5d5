use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use lrpc_reactor::InetAddress;

/// Configuration surface for `RpcServer` (spec §3's ambient config layer): worker thread count,
/// listen address, and an optional name-service URL services register against. Loaded the way
/// `GameConfig::load` does in the teacher, via `serdeconv::from_toml_file`.
#[derive(Serialize, Deserialize)]
pub struct RpcServerConfig {
    pub thread_num: usize,
    pub bind_address: String,
    pub reuse_port: bool,
    pub name_server_url: Option<String>,
}

impl Default for RpcServerConfig {
    fn default() -> RpcServerConfig {
        RpcServerConfig {
            thread_num: 4,
            bind_address: "0.0.0.0:9000".to_string(),
            reuse_port: true,
            name_server_url: None,
        }
    }
}

impl RpcServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> RpcServerConfig {
        serdeconv::from_toml_file(path).expect("error loading RPC server configuration file")
    }

    pub fn bind_addr(&self) -> InetAddress {
        InetAddress::parse(&self.bind_address).expect("invalid bind_address in RPC server configuration")
    }
}

/// Per-stub configuration: a service's hard-coded endpoints (when no name service is in play)
/// and the call timeout a `ClientChannel::invoke` future should be given.
#[derive(Serialize, Deserialize)]
pub struct ClientStubConfig {
    pub hard_coded_urls: Vec<String>,
    pub call_timeout_ms: u64,
}

impl Default for ClientStubConfig {
    fn default() -> ClientStubConfig {
        ClientStubConfig { hard_coded_urls: Vec::new(), call_timeout_ms: 5_000 }
    }
}

impl ClientStubConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ClientStubConfig {
        serdeconv::from_toml_file(path).expect("error loading client stub configuration file")
    }

    pub fn endpoints(&self) -> Vec<InetAddress> {
        self.hard_coded_urls
            .iter()
            .map(|url| InetAddress::parse(url).expect("invalid entry in hard_coded_urls"))
            .collect()
    }
}
