use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lrpc_future::{Future, FutureResult};
use lrpc_reactor::{EventLoopThread, EventLoopThreadPool, InetAddress, PollerKind};
use lrpc_rpc::{ClientStub, NameServiceClient, RpcError, RpcServer, ServiceDescriptor};

fn test_logger() -> slog::Logger {
    lrpc_reactor::logging::init()
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Spins up an `RpcServer` with an `Echo` service on a fresh loopback port. Returns the bound
/// address; the server's base `EventLoopThread` is leaked intentionally so it outlives the test
/// (each test binds its own port, so leaked threads never collide).
fn spin_echo_server(delay_response: bool) -> InetAddress {
    let log = test_logger();
    let port = free_port();
    let addr = InetAddress::parse(&format!("127.0.0.1:{port}")).unwrap();

    let base_thread = EventLoopThread::spawn(PollerKind::Epoll, log.clone()).unwrap();
    let thread_pool = Arc::new(EventLoopThreadPool::start(base_thread.handle(), 2, PollerKind::Epoll, log.clone()).unwrap());
    let server = RpcServer::new(thread_pool, log.clone());

    let mut echo = ServiceDescriptor::new("Echo");
    echo.add_method("echo", move |request, completion| {
        if delay_response {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_secs(3));
                completion(Ok(request));
            });
        } else {
            completion(Ok(request));
        }
    });
    server.registry().register(echo);

    let base_handle = base_thread.handle();
    base_handle
        .run_in_loop({
            let server = server.clone();
            let addr = addr;
            move |el| {
                server.listen(el, addr, true).expect("failed to bind listen socket");
            }
        });

    // give the listener a moment to bind before any client dials it
    std::thread::sleep(Duration::from_millis(50));
    std::mem::forget(base_thread);
    addr
}

fn client_stub_for(addr: InetAddress) -> Arc<ClientStub> {
    let log = test_logger();
    let base_thread = EventLoopThread::spawn(PollerKind::Epoll, log.clone()).unwrap();
    let thread_pool = Arc::new(EventLoopThreadPool::start(base_thread.handle(), 1, PollerKind::Epoll, log.clone()).unwrap());
    std::mem::forget(base_thread);
    ClientStub::with_hard_coded_urls("Echo".into(), thread_pool, vec![addr], log)
}

#[test]
fn ping_round_trip_within_200ms() {
    let addr = spin_echo_server(false);
    let stub = client_stub_for(addr);

    let started = std::time::Instant::now();
    let channel = match stub.get_channel().wait(Duration::from_millis(500)) {
        FutureResult::Value(c) => c,
        FutureResult::Exception(e) => panic!("expected a connected channel, got exception: {e}"),
        FutureResult::None => panic!("expected a connected channel, got a still-pending result"),
    };
    let result = channel.invoke("echo", b"hello".to_vec()).wait(Duration::from_millis(500));
    assert!(started.elapsed() < Duration::from_millis(200));
    match result {
        FutureResult::Value(bytes) => assert_eq!(bytes, b"hello"),
        other => panic!("expected echoed bytes, got {other:?}"),
    }
}

#[test]
fn unknown_method_reports_no_such_method_and_keeps_connection_open() {
    let addr = spin_echo_server(false);
    let stub = client_stub_for(addr);

    let channel = match stub.get_channel().wait(Duration::from_millis(500)) {
        FutureResult::Value(c) => c,
        FutureResult::Exception(e) => panic!("expected a connected channel, got exception: {e}"),
        FutureResult::None => panic!("expected a connected channel, got a still-pending result"),
    };

    match channel.invoke("Shout", b"hi".to_vec()).wait(Duration::from_millis(500)) {
        FutureResult::Exception(RpcError::NoSuchMethod) => {}
        other => panic!("expected NoSuchMethod, got {other:?}"),
    }

    // the connection survives a recoverable error: a subsequent call still succeeds
    match channel.invoke("echo", b"still alive".to_vec()).wait(Duration::from_millis(500)) {
        FutureResult::Value(bytes) => assert_eq!(bytes, b"still alive"),
        other => panic!("expected the connection to still serve calls, got {other:?}"),
    }
}

#[test]
fn timeout_fires_and_late_response_is_dropped() {
    let addr = spin_echo_server(true);
    let stub = client_stub_for(addr);

    let channel = match stub.get_channel().wait(Duration::from_millis(500)) {
        FutureResult::Value(c) => c,
        FutureResult::Exception(e) => panic!("expected a connected channel, got exception: {e}"),
        FutureResult::None => panic!("expected a connected channel, got a still-pending result"),
    };

    match channel.invoke("echo", b"slow".to_vec()).wait(Duration::from_secs(1)) {
        FutureResult::Exception(RpcError::Timeout) => {}
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[test]
fn oversized_frame_is_rejected_and_closes_the_connection() {
    let addr = spin_echo_server(false);

    let mut stream = TcpStream::connect(addr.to_host_port()).expect("failed to dial echo server");
    let oversized_len: u32 = 300 * 1024 * 1024;
    stream.write_all(&oversized_len.to_le_bytes()).unwrap();
    stream.write_all(&[0u8; 16]).unwrap();

    // server should close the connection in response; a subsequent read observes EOF or reset
    let mut buf = [0u8; 8];
    use std::io::Read;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(500)));
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "expected the server to close the connection after an oversized frame");
}

struct CountingNameService {
    calls: AtomicUsize,
    addr: InetAddress,
}

impl NameServiceClient for CountingNameService {
    fn get_endpoints(&self, _service_name: String) -> Future<Vec<InetAddress>, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Future::ready(vec![self.addr])
    }

    fn keepalive(&self, _service_name: String, _endpoint: InetAddress) -> Future<bool, RpcError> {
        Future::ready(true)
    }
}

#[test]
fn name_service_lookup_is_cached_across_get_channel_calls() {
    let addr = spin_echo_server(false);
    let log = test_logger();
    let base_thread = EventLoopThread::spawn(PollerKind::Epoll, log.clone()).unwrap();
    let thread_pool = Arc::new(EventLoopThreadPool::start(base_thread.handle(), 1, PollerKind::Epoll, log.clone()).unwrap());
    std::mem::forget(base_thread);

    let name_service = Arc::new(CountingNameService { calls: AtomicUsize::new(0), addr });
    let stub = ClientStub::with_name_service("Echo".into(), thread_pool, name_service.clone(), log);

    let first = stub.get_channel().wait(Duration::from_millis(500));
    assert!(matches!(first, FutureResult::Value(_)));
    let second = stub.get_channel().wait(Duration::from_millis(500));
    assert!(matches!(second, FutureResult::Value(_)));

    assert_eq!(name_service.calls.load(Ordering::SeqCst), 1);
}
