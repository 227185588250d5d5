use std::sync::{Arc, Mutex, Weak};

use lrpc_reactor::{Buffer, TcpConnection};
use slog::Logger;

use crate::coder::{decode_frame, decode_rpc_message, encode_rpc_message, Decoded};
use crate::error::RpcError;
use crate::message::{rpc_message, Response, RpcMessage};
use crate::server::Registry;
use crate::service::Completion;

/// Per-connection server-side dispatcher (spec §4.8): decodes requests off the connection's
/// input buffer, looks the method up on the registered service, and encodes whatever the method
/// completes with back onto the connection — provided the connection is still alive, checked via
/// `connection: Weak<TcpConnection>` the way spec §9 prescribes for the reactor's handler-lifetime
/// problem.
pub struct ServerChannel {
    connection: Weak<TcpConnection>,
    registry: Arc<Registry>,
    log: Logger,
}

impl ServerChannel {
    pub fn install(conn: &Arc<TcpConnection>, registry: Arc<Registry>, log: Logger) -> Arc<ServerChannel> {
        let channel = Arc::new(ServerChannel {
            connection: Arc::downgrade(conn),
            registry,
            log,
        });
        let dispatch_channel = channel.clone();
        conn.set_message_callback(move |conn, buf| dispatch_channel.on_data(&conn, buf));
        channel
    }

    fn on_data(&self, conn: &Arc<TcpConnection>, buf: &mut Buffer) {
        loop {
            match decode_frame(buf) {
                Ok(Decoded::NeedMore) => break,
                Ok(Decoded::Frame(body)) => match decode_rpc_message(&body) {
                    Ok(msg) => self.dispatch(conn, msg),
                    Err(e) => {
                        slog::warn!(self.log, "decode failure, closing connection"; "error" => %e);
                        self.send_error(conn, 0, &e);
                        conn.shutdown();
                        break;
                    }
                },
                Err(e) => {
                    slog::warn!(self.log, "oversized frame, closing connection"; "error" => %e);
                    self.send_error(conn, 0, &e);
                    conn.shutdown();
                    break;
                }
            }
        }
    }

    fn dispatch(&self, conn: &Arc<TcpConnection>, msg: RpcMessage) {
        let request = match msg.kind {
            Some(rpc_message::Kind::Request(r)) => r,
            _ => return,
        };
        let id = request.id;

        if request.method_name.is_empty() {
            slog::error!(self.log, "request carries no method name, closing connection"; "id" => id);
            self.send_error(conn, id, &RpcError::MethodUndetermined);
            conn.shutdown();
            return;
        }

        let service = match self.registry.get(&request.service_name) {
            Some(s) => s,
            None => {
                self.send_error(conn, id, &RpcError::NoSuchService);
                return;
            }
        };

        if request.serialized_request.is_empty() {
            self.send_error(conn, id, &RpcError::EmptyRequest);
            return;
        }

        let weak_conn = self.connection.clone();
        let completion: Completion = Box::new(move |result| {
            if let Some(conn) = weak_conn.upgrade() {
                let response = match result {
                    Ok(bytes) => Response::ok(id, bytes),
                    Err(e) => Response::error(id, e.errnum(), e.message()),
                };
                if let Ok(wire) = encode_rpc_message(&RpcMessage::response(response)) {
                    conn.send(wire);
                }
            }
        });

        // The method runs synchronously up to the point it calls (or schedules) `completion`;
        // a panic inside it is ThrowInMethod, recoverable (spec §4.8/§7 band 2). `completion`
        // survives the unwind via this slot so it can still be answered.
        let slot: Arc<Mutex<Option<Completion>>> = Arc::new(Mutex::new(Some(completion)));
        let call_slot = slot.clone();
        let wrapped: Completion = Box::new(move |result| {
            if let Some(completion) = call_slot.lock().unwrap().take() {
                completion(result);
            }
        });

        let call_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            service.call(&request.method_name, request.serialized_request, wrapped)
        }));

        match call_result {
            Ok(Ok(())) => {}
            Ok(Err((e, completion))) => completion(Err(e)),
            Err(_) => {
                if let Some(completion) = slot.lock().unwrap().take() {
                    completion(Err(RpcError::ThrowInMethod("method panicked".into())));
                }
            }
        }
    }

    fn send_error(&self, conn: &Arc<TcpConnection>, id: i32, e: &RpcError) {
        let response = Response::error(id, e.errnum(), e.message());
        if let Ok(wire) = encode_rpc_message(&RpcMessage::response(response)) {
            conn.send(wire);
        }
    }
}
