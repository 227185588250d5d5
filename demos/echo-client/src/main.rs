use std::sync::Arc;
use std::time::Duration;

use clap::{App, Arg};
use lrpc_future::FutureResult;
use lrpc_reactor::{logging, EventLoopThreadPool, InetAddress, PollerKind};
use lrpc_rpc::{ClientStub, ClientStubConfig};

fn main() {
    let matches = App::new("Echo Client")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Demo lrpc-rpc client: calls Echo.echo against echo-server")
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .help("TOML config file (overrides SERVER when given)"),
        )
        .arg(
            Arg::with_name("SERVER")
                .help("Server address, e.g. 127.0.0.1:9000")
                .required_unless("config"),
        )
        .arg(
            Arg::with_name("MESSAGE")
                .help("Message to echo")
                .required(true),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => ClientStubConfig::load(path),
        None => ClientStubConfig {
            hard_coded_urls: vec![matches.value_of("SERVER").unwrap().to_string()],
            ..ClientStubConfig::default()
        },
    };
    let endpoints: Vec<InetAddress> = config.endpoints();
    let call_timeout = Duration::from_millis(config.call_timeout_ms);
    let message = matches.value_of("MESSAGE").unwrap().to_string();

    let log = logging::init();

    let base_loop = lrpc_reactor::EventLoopThread::spawn(PollerKind::Epoll, log.clone())
        .expect("failed to start event loop thread");
    let thread_pool = Arc::new(
        EventLoopThreadPool::start(base_loop.handle(), 1, PollerKind::Epoll, log.clone())
            .expect("failed to start worker thread pool"),
    );

    let stub = ClientStub::with_hard_coded_urls("Echo".to_string(), thread_pool, endpoints, log.clone());

    let channel = match stub.get_channel().wait(call_timeout) {
        FutureResult::Value(channel) => channel,
        FutureResult::Exception(e) => {
            eprintln!("failed to connect: {e}");
            std::process::exit(1);
        }
        FutureResult::None => {
            eprintln!("timed out connecting");
            std::process::exit(1);
        }
    };

    match channel.invoke("echo", message.into_bytes()).wait(call_timeout) {
        FutureResult::Value(bytes) => {
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        FutureResult::Exception(e) => {
            eprintln!("call failed: {e}");
            std::process::exit(1);
        }
        FutureResult::None => {
            eprintln!("timed out waiting for response");
            std::process::exit(1);
        }
    }
}
