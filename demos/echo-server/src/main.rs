use std::sync::Arc;

use clap::{App, Arg};
use lrpc_reactor::{logging, EventLoop, EventLoopThreadPool, InetAddress, PollerKind};
use lrpc_rpc::{RpcServer, RpcServerConfig, ServiceDescriptor};

fn main() {
    let matches = App::new("Echo Server")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Demo lrpc-rpc server: registers an Echo service and listens for connections")
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .help("TOML config file (overrides PORT/threads when given)"),
        )
        .arg(
            Arg::with_name("PORT")
                .help("Port to listen on")
                .default_value("9000"),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .takes_value(true)
                .default_value("4")
                .help("Number of worker loops"),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => RpcServerConfig::load(path),
        None => {
            let port: u16 = matches.value_of("PORT").unwrap().parse().expect("invalid port");
            let thread_num: usize = matches.value_of("threads").unwrap().parse().expect("invalid thread count");
            RpcServerConfig {
                thread_num,
                bind_address: format!("0.0.0.0:{port}"),
                ..RpcServerConfig::default()
            }
        }
    };

    let log = logging::init();

    let mut base_loop = EventLoop::new(PollerKind::Epoll, log.clone()).expect("failed to create base event loop");
    let thread_pool = Arc::new(
        EventLoopThreadPool::start(base_loop.handle(), config.thread_num, PollerKind::Epoll, log.clone())
            .expect("failed to start worker thread pool"),
    );

    let server = RpcServer::new(thread_pool, log.clone());

    let mut echo = ServiceDescriptor::new("Echo");
    echo.add_method("echo", |request, completion| completion(Ok(request)));
    server.registry().register(echo);

    let addr = config.bind_addr();
    server
        .listen(&mut base_loop, addr, config.reuse_port)
        .expect("failed to bind listen socket");

    if let Some(url) = &config.name_server_url {
        let name_server = InetAddress::parse(url).expect("invalid name_server_url in configuration");
        server.start_name_service_heartbeat(&mut base_loop, name_server, addr);
    }

    slog::info!(log, "echo server listening"; "address" => addr.to_host_port(), "threads" => config.thread_num);
    base_loop.run().expect("event loop exited with an error");
}
