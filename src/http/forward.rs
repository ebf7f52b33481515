//! Outbound request forwarding.
//!
//! # Responsibilities
//! - Build the upstream URI from the route target and the request remainder
//! - Forward method, headers and the unread inbound body
//! - Enforce the upstream deadline on the response head (the body is held
//!   to the same deadline by `response.rs`)
//! - Classify the result for the circuit breaker
//!
//! # Design Decisions
//! - Only transport problems are failures. Any response that arrives, 5xx
//!   included, is a success as far as the breaker is concerned
//! - The request body is streamed, never buffered
//! - No retries; a transport failure is reported once
//! - Client disconnects are not propagated; the deadline is the only
//!   cancellation of an outbound call

use axum::{
    body::Body,
    http::{header, Request, Response, Uri},
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::error::Error as StdError;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::UpstreamConfig;
use crate::error::GatewayError;

/// Sends requests to route backends.
#[derive(Clone)]
pub struct ProxyExecutor {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl ProxyExecutor {
    pub fn new(config: &UpstreamConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `target + remainder` (plus the query string), without re-encoding.
    pub fn resolve(target: &str, remainder: &str, query: Option<&str>) -> Result<Uri, GatewayError> {
        let mut url = String::with_capacity(target.len() + remainder.len() + 1);
        url.push_str(target);
        url.push_str(remainder);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }

        let uri: Uri = url
            .parse()
            .map_err(|e| GatewayError::InvalidTargetUrl(format!("{}: {}", url, e)))?;
        match (uri.scheme_str(), uri.authority()) {
            (Some("http"), Some(_)) => Ok(uri),
            _ => Err(GatewayError::InvalidTargetUrl(format!(
                "{}: expected an absolute http URL",
                url
            ))),
        }
    }

    /// Forward `inbound` to `uri` and wait for the response head.
    pub async fn forward(&self, inbound: Request<Body>, uri: Uri) -> Result<Response<Incoming>, GatewayError> {
        self.forward_until(inbound, uri, Instant::now() + self.timeout).await
    }

    /// Like [`forward`](Self::forward), with the deadline supplied by the
    /// caller so the response body can be held to it too.
    pub async fn forward_until(
        &self,
        inbound: Request<Body>,
        uri: Uri,
        deadline: Instant,
    ) -> Result<Response<Incoming>, GatewayError> {
        let (parts, body) = inbound.into_parts();

        let mut outbound = Request::builder().method(parts.method).uri(uri);
        if let Some(headers) = outbound.headers_mut() {
            for (name, value) in parts.headers.iter() {
                if name != header::HOST {
                    headers.append(name.clone(), value.clone());
                }
            }
        }
        let outbound = outbound
            .body(body)
            .map_err(|e| GatewayError::TransportFailure(format!("error creating request: {}", e)))?;

        match tokio::time::timeout_at(deadline, self.client.request(outbound)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(GatewayError::TransportFailure(describe(&e))),
            Err(_) => Err(GatewayError::TransportFailure(format!(
                "no response within {}s",
                self.timeout.as_secs_f64()
            ))),
        }
    }
}

/// Error text including its sources, e.g. "client error (Connect): tcp connect error: Connection refused".
fn describe(error: &dyn StdError) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn executor(timeout_secs: u64) -> ProxyExecutor {
        ProxyExecutor::new(&UpstreamConfig {
            timeout_secs,
            ..UpstreamConfig::default()
        })
    }

    #[test]
    fn test_resolve() {
        let uri = ProxyExecutor::resolve("http://localhost:8082", "/123", None).unwrap();
        assert_eq!(uri.to_string(), "http://localhost:8082/123");

        let uri = ProxyExecutor::resolve("http://localhost:8082/v1", "/a%2Fb", Some("x=1&y=2")).unwrap();
        assert_eq!(uri.path(), "/v1/a%2Fb");
        assert_eq!(uri.query(), Some("x=1&y=2"));

        let uri = ProxyExecutor::resolve("http://localhost:8082", "", None).unwrap();
        assert_eq!(uri.path(), "/");
    }

    #[test]
    fn test_resolve_rejects_bad_targets() {
        for target in ["not a url", "accounts:8080", "/relative", "https://secure:443"] {
            let err = ProxyExecutor::resolve(target, "/1", None).unwrap_err();
            assert!(matches!(err, GatewayError::InvalidTargetUrl(_)), "{}", target);
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let uri = ProxyExecutor::resolve(&format!("http://{}", addr), "/x", None).unwrap();
        let err = executor(10)
            .forward(Request::new(Body::empty()), uri)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TransportFailure(_)));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let uri = ProxyExecutor::resolve(&format!("http://{}", addr), "/", None).unwrap();
        let err = executor(1)
            .forward(Request::new(Body::empty()), uri)
            .await
            .unwrap_err();
        match err {
            GatewayError::TransportFailure(msg) => assert!(msg.contains("no response within")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forwards_method_headers_and_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut request = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.ends_with(b"hello") {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8(request).unwrap()
        });

        let inbound = Request::builder()
            .method(Method::PUT)
            .uri("/account/7")
            .header("host", "gateway.local")
            .header("x-trace", "abc")
            .header("content-length", "5")
            .body(Body::from("hello"))
            .unwrap();
        let uri = ProxyExecutor::resolve(&format!("http://{}", addr), "/7", None).unwrap();
        let response = executor(10).forward(inbound, uri).await.unwrap();
        assert_eq!(response.status(), 500);

        let request = received.await.unwrap().to_lowercase();
        assert!(request.starts_with("put /7 http/1.1"));
        assert!(request.contains("x-trace: abc"));
        assert!(!request.contains("gateway.local"));
        assert!(request.ends_with("hello"));
    }
}
