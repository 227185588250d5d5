use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use lrpc_future::{Future, Promise};
use lrpc_reactor::{Buffer, Handle, TcpConnection, TimerId};
use slog::Logger;

use crate::coder::{decode_frame, decode_rpc_message, encode_rpc_message, Decoded};
use crate::error::RpcError;
use crate::message::{response, rpc_message, Request, RpcMessage};
use crate::util::execute;

const PENDING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const PENDING_MAX_AGE: Duration = Duration::from_secs(60);

struct PendingCall {
    promise: Promise<Vec<u8>, RpcError>,
    sent_at: Instant,
}

/// Per-connection client-side dispatcher (spec §4.9). Assigns request ids, tracks in-flight calls
/// in `pending`, and sweeps entries older than 60 s every second via a repeating timer.
pub struct ClientChannel {
    connection: Weak<TcpConnection>,
    handle: Handle,
    service_name: String,
    pending: Mutex<IndexMap<i32, PendingCall>>,
    next_id: AtomicI32,
    sweep_timer: Mutex<Option<TimerId>>,
    log: Logger,
}

impl ClientChannel {
    pub fn install(
        conn: &Arc<TcpConnection>,
        handle: Handle,
        service_name: String,
        log: Logger,
    ) -> Arc<ClientChannel> {
        let channel = Arc::new(ClientChannel {
            connection: Arc::downgrade(conn),
            handle: handle.clone(),
            service_name,
            pending: Mutex::new(IndexMap::new()),
            next_id: AtomicI32::new(1),
            sweep_timer: Mutex::new(None),
            log,
        });

        let data_channel = channel.clone();
        conn.set_message_callback(move |_conn, buf| data_channel.on_data(buf));

        let sweep_channel = channel.clone();
        let timer_id = handle.run_every(PENDING_SWEEP_INTERVAL, move || sweep_channel.sweep_expired());
        *channel.sweep_timer.lock().unwrap() = Some(timer_id);

        channel
    }

    /// Invokes `method` with `request`'s raw bytes, returning a future of the raw response bytes.
    /// Callers typically chain `.then` to decode into the response type.
    pub fn invoke(self: &Arc<Self>, method: &str, request: Vec<u8>) -> Future<Vec<u8>, RpcError> {
        if self.connection.upgrade().is_none() {
            return Future::errored(RpcError::ConnectionLost);
        }
        let this = self.clone();
        let method = method.to_string();
        execute(&self.handle.clone(), move || this.invoke_in_loop(&method, request))
    }

    fn invoke_in_loop(self: &Arc<Self>, method: &str, request: Vec<u8>) -> Future<Vec<u8>, RpcError> {
        let conn = match self.connection.upgrade() {
            Some(c) => c,
            None => return Future::errored(RpcError::ConnectionLost),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let wire_request = Request {
            id,
            service_name: self.service_name.clone(),
            method_name: method.to_string(),
            serialized_request: request,
        };
        let wire = match encode_rpc_message(&RpcMessage::request(wire_request)) {
            Ok(w) => w,
            Err(_) => return Future::errored(RpcError::EncodeFail),
        };

        let (promise, future) = Promise::new();
        self.pending
            .lock()
            .unwrap()
            .insert(id, PendingCall { promise, sent_at: Instant::now() });
        conn.send(wire);
        future
    }

    fn on_data(self: &Arc<Self>, buf: &mut Buffer) {
        loop {
            match decode_frame(buf) {
                Ok(Decoded::NeedMore) => break,
                Ok(Decoded::Frame(body)) => match decode_rpc_message(&body) {
                    Ok(msg) => self.on_message(msg),
                    Err(e) => {
                        slog::warn!(self.log, "client channel decode failure"; "error" => %e);
                        break;
                    }
                },
                Err(e) => {
                    slog::warn!(self.log, "client channel oversized frame"; "error" => %e);
                    break;
                }
            }
        }
    }

    fn on_message(&self, msg: RpcMessage) {
        let resp = match msg.kind {
            Some(rpc_message::Kind::Response(r)) => r,
            _ => return,
        };
        let pending = match self.pending.lock().unwrap().remove(&resp.id) {
            Some(p) => p,
            None => {
                slog::debug!(self.log, "dropping response for unknown request id"; "id" => resp.id);
                return;
            }
        };
        match resp.payload {
            Some(response::Payload::SerializedResponse(bytes)) => pending.promise.set_value(bytes),
            Some(response::Payload::Error(e)) => {
                pending.promise.set_exception(RpcError::from_wire(e.errnum, e.msg))
            }
            None => pending.promise.set_exception(RpcError::DecodeFail),
        }
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        self.pending
            .lock()
            .unwrap()
            .retain(|_, call| now.duration_since(call.sent_at) < PENDING_MAX_AGE);
    }

    /// Cancels the periodic sweep timer; called when the owning connection tears down (spec
    /// §4.9: "on channel destruction, cancel the periodic timer if the connection still exists").
    pub fn on_destroy(&self) {
        if let Some(id) = self.sweep_timer.lock().unwrap().take() {
            self.handle.cancel_timer(id);
        }
    }
}
