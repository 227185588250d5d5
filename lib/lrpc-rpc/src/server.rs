use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use lrpc_future::FutureResult;
use lrpc_reactor::{Acceptor, EventLoop, InetAddress, ReactorResult, SharedEventLoopThreadPool, Socket, TcpConnection};
use slog::Logger;

use crate::client_stub::ClientStub;
use crate::name_service::{RpcNameServiceClient, NAME_SERVICE_NAME};
use crate::server_channel::ServerChannel;
use crate::service::ServiceDescriptor;

/// `RpcServer::start`'s `runEvery(3.0, ...)` keepalive period (original_source/rpc/RpcServer.cc).
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(3);

/// Process-wide map from service name to its dispatch table (spec §4.8/§9's "registry map on
/// the owning loop" — here shared across loops since service registration is process-wide, not
/// per-connection).
pub struct Registry {
    services: Mutex<IndexMap<String, Arc<ServiceDescriptor>>>,
}

impl Registry {
    pub fn new() -> Arc<Registry> {
        Arc::new(Registry { services: Mutex::new(IndexMap::new()) })
    }

    pub fn register(&self, service: ServiceDescriptor) {
        self.services.lock().unwrap().insert(service.name().to_string(), Arc::new(service));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        self.services.lock().unwrap().get(name).cloned()
    }

    fn service_names(&self) -> Vec<String> {
        self.services.lock().unwrap().keys().cloned().collect()
    }
}

/// Owns the listening `Acceptor` and registry (module O, spec §4.8/§5). Each accepted connection
/// is handed to a worker loop picked round-robin by `thread_pool`; the `TcpConnection` and its
/// `ServerChannel` are constructed and registered there, never on the base loop, matching the
/// "established connections live on exactly one worker loop" invariant.
pub struct RpcServer {
    registry: Arc<Registry>,
    thread_pool: SharedEventLoopThreadPool,
    acceptor: Mutex<Option<Acceptor>>,
    log: Logger,
}

impl RpcServer {
    pub fn new(thread_pool: SharedEventLoopThreadPool, log: Logger) -> Arc<RpcServer> {
        Arc::new(RpcServer {
            registry: Registry::new(),
            thread_pool,
            acceptor: Mutex::new(None),
            log,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn listen(self: &Arc<Self>, el: &mut EventLoop, addr: InetAddress, reuse_port: bool) -> ReactorResult<()> {
        let this = self.clone();
        let accept_log = self.log.clone();
        let acceptor = Acceptor::install(
            el,
            addr,
            reuse_port,
            move |socket, peer| this.dispatch_new_connection(socket, peer),
            accept_log,
        )?;
        *self.acceptor.lock().unwrap() = Some(acceptor);
        Ok(())
    }

    fn dispatch_new_connection(self: &Arc<Self>, socket: Socket, peer: InetAddress) {
        let worker = self.thread_pool.next_loop();
        let registry = self.registry.clone();
        let log = self.log.clone();
        let worker_for_register = worker.clone();

        worker.run_in_loop(move |el| {
            let local = socket.local_addr().unwrap_or(peer);
            let name = format!("{}->{}", local, peer);
            let conn = TcpConnection::new(worker_for_register, name, socket, local, peer, log.clone());

            ServerChannel::install(&conn, registry, log.clone());

            let close_log = log.clone();
            let close_name = conn.name().to_string();
            conn.set_close_callback(move |_conn| {
                slog::debug!(close_log, "connection closed"; "conn" => %close_name);
            });

            let _ = conn.register(el);
            conn.connection_established(el);
        });
    }

    /// Registers `endpoint` for every currently-registered service with the name service at
    /// `name_server` and keeps it alive with a `Keepalive` call every `KEEPALIVE_PERIOD`
    /// (original_source/rpc/RpcServer.cc's `setNameServer`/`start`). Call once, after all
    /// services have been registered and the listen socket is bound.
    pub fn start_name_service_heartbeat(self: &Arc<Self>, el: &mut EventLoop, name_server: InetAddress, endpoint: InetAddress) {
        let stub = ClientStub::with_hard_coded_urls(NAME_SERVICE_NAME.to_string(), self.thread_pool.clone(), vec![name_server], self.log.clone());
        let this = self.clone();
        el.handle().run_every(KEEPALIVE_PERIOD, move || {
            let this = this.clone();
            let stub = stub.clone();
            let log = this.log.clone();
            let names = this.registry.service_names();
            if names.is_empty() {
                return;
            }
            let _ = stub.get_channel().then(None, move |result| {
                match result {
                    FutureResult::Value(channel) => {
                        let name_service = RpcNameServiceClient::new(channel);
                        for service_name in &names {
                            let _ = name_service.keepalive(service_name.clone(), endpoint);
                        }
                    }
                    _ => slog::warn!(log, "keepalive: name service unreachable"; "name_server" => %name_server),
                }
                FutureResult::Value(())
            });
        });
    }
}
