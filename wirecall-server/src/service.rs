//! The service-method resolver capability.
//!
//! The connection loop never looks inside a request body: it hands the
//! method name and the decoded argument value to a [`Service`] and writes
//! whatever comes back. Typed deserialization happens behind this seam, so
//! the transport performs no type discovery of its own.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by service calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors a service call can report.
///
/// They end up in `Header::error` on the response; they never tear down the
/// connection.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service method not found: {0:?}")]
    MethodNotFound(String),

    #[error("{0}")]
    Call(String),
}

/// Resolves "Service.Method" names and computes replies.
pub trait Service: Send + Sync {
    /// Computes the reply for `method` called with `argv`.
    fn call(&self, method: &str, argv: Value) -> BoxFuture<'static, Result<Value, ServiceError>>;
}

/// Identity service: replies with the request body unchanged, whatever the
/// method. Stands in where no real method set has been registered.
pub struct EchoService;

impl Service for EchoService {
    fn call(&self, _method: &str, argv: Value) -> BoxFuture<'static, Result<Value, ServiceError>> {
        Box::pin(async move { Ok(argv) })
    }
}

type BoxedMethod =
    Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ServiceError>> + Send + Sync>;

/// Name-to-handler registry: the extension seam for real method sets.
///
/// Built before the server starts, then shared read-only.
pub struct ServiceMap {
    methods: HashMap<String, BoxedMethod>,
}

impl ServiceMap {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Registers a handler working directly on `Value` arguments.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Box::new(move |argv| Box::pin(handler(argv))));
    }

    /// Registers a handler with serde-typed argument and reply.
    ///
    /// The argument value is deserialized into `T` before the handler runs;
    /// a value of the wrong shape becomes a call error, not a transport
    /// error.
    pub fn register_typed<T, R, F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        T: DeserializeOwned + Send + 'static,
        R: Serialize,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ServiceError>> + Send + 'static,
    {
        self.methods.insert(
            name.into(),
            Box::new(move |argv| match serde_json::from_value::<T>(argv) {
                Ok(argv) => {
                    let fut = handler(argv);
                    Box::pin(async move {
                        let reply = fut.await?;
                        serde_json::to_value(reply).map_err(|e| ServiceError::Call(e.to_string()))
                    })
                }
                Err(e) => Box::pin(std::future::ready(Err(ServiceError::Call(format!(
                    "invalid argument: {e}"
                ))))),
            }),
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for ServiceMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for ServiceMap {
    fn call(&self, method: &str, argv: Value) -> BoxFuture<'static, Result<Value, ServiceError>> {
        match self.methods.get(method) {
            Some(handler) => handler(argv),
            None => Box::pin(std::future::ready(Err(ServiceError::MethodNotFound(
                method.to_string(),
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_service() {
        let service = EchoService;
        let reply = service.call("Foo.Sum", json!("ping")).await.unwrap();
        assert_eq!(reply, json!("ping"));
    }

    #[tokio::test]
    async fn test_service_map_dispatch() {
        let mut map = ServiceMap::new();
        map.register("Arith.Double", |argv| async move {
            let n = argv.as_i64().ok_or_else(|| {
                ServiceError::Call("expected an integer".to_string())
            })?;
            Ok(json!(n * 2))
        });

        assert!(map.contains("Arith.Double"));
        assert_eq!(map.len(), 1);

        let reply = map.call("Arith.Double", json!(21)).await.unwrap();
        assert_eq!(reply, json!(42));
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let map = ServiceMap::new();
        let err = map.call("No.Such", json!(null)).await.unwrap_err();
        assert!(matches!(err, ServiceError::MethodNotFound(name) if name == "No.Such"));
    }

    #[tokio::test]
    async fn test_typed_handler() {
        #[derive(serde::Deserialize)]
        struct Args {
            a: i64,
            b: i64,
        }

        let mut map = ServiceMap::new();
        map.register_typed("Arith.Sum", |args: Args| async move { Ok(args.a + args.b) });

        let reply = map.call("Arith.Sum", json!({"a": 2, "b": 40})).await.unwrap();
        assert_eq!(reply, json!(42));
    }

    #[tokio::test]
    async fn test_typed_handler_bad_argument() {
        #[derive(serde::Deserialize)]
        struct Args {
            a: i64,
        }

        let mut map = ServiceMap::new();
        map.register_typed("Arith.Neg", |args: Args| async move { Ok(-args.a) });

        let err = map.call("Arith.Neg", json!("nope")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Call(msg) if msg.contains("invalid argument")));
    }
}
