use indexmap::IndexMap;
use prost::Message as ProstMessage;

use crate::error::RpcError;

pub type Completion = Box<dyn FnOnce(Result<Vec<u8>, RpcError>) + Send>;
type MethodHandler = Box<dyn Fn(Vec<u8>, Completion) + Send + Sync>;

/// A registered service's callable-method table (spec §4.8 "registered service descriptor").
/// Each method is a callback-style handler rather than a synchronous function, so a service
/// implementation can defer its response (the timeout end-to-end scenario in spec §8 relies on
/// this: the server delays invoking `completion` by 3 s).
pub struct ServiceDescriptor {
    name: String,
    methods: IndexMap<String, MethodHandler>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> ServiceDescriptor {
        ServiceDescriptor {
            name: name.into(),
            methods: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_method(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(Vec<u8>, Completion) + Send + Sync + 'static,
    ) {
        self.methods.insert(name.into(), Box::new(handler));
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Looks up `method` and invokes it with the raw request body, or returns `NoSuchMethod`
    /// without consuming `completion` so the caller can still answer the request id itself.
    pub fn call(&self, method: &str, request: Vec<u8>, completion: Completion) -> Result<(), (RpcError, Completion)> {
        match self.methods.get(method) {
            Some(handler) => {
                handler(request, completion);
                Ok(())
            }
            None => Err((RpcError::NoSuchMethod, completion)),
        }
    }
}

/// Wraps a typed `Fn(Req, completion)` into the raw byte-handler `ServiceDescriptor` stores,
/// decoding the request and encoding the response through `prost`, the same machinery the
/// generated client/server stubs in the pack's gRPC crates use (`prost::Message::{decode,
/// encode}`).
pub fn typed_method<Req, Resp, F>(f: F) -> impl Fn(Vec<u8>, Completion) + Send + Sync + 'static
where
    Req: ProstMessage + Default,
    Resp: ProstMessage,
    F: Fn(Req, Box<dyn FnOnce(Result<Resp, RpcError>) + Send>) + Send + Sync + 'static,
{
    move |bytes, completion| match Req::decode(bytes.as_slice()) {
        Ok(req) => f(
            req,
            Box::new(move |result| {
                completion(result.and_then(|resp| {
                    let mut buf = Vec::new();
                    resp.encode(&mut buf).map_err(|_| RpcError::EncodeFail)?;
                    Ok(buf)
                }));
            }),
        ),
        Err(_) => completion(Err(RpcError::DecodeFail)),
    }
}
