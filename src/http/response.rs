//! Response handling.
//!
//! # Responsibilities
//! - Copy upstream status and headers back to the client
//! - Stream the upstream body through unchanged, counting bytes
//! - Hold the body to the upstream deadline
//! - Report how the copy ended once the body is finished or dropped
//!
//! # Design Decisions
//! - The body is never buffered
//! - A body error after the status line is sent cannot change the status;
//!   the stream ends with an error and the copy is reported as failed

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Response},
};
use futures_util::Stream;
use hyper::body::{Body as _, Incoming};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::{Instant, Sleep};

use crate::config::HeaderCopyMode;

/// How streaming the upstream body to the client ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyEnd {
    /// The whole body was delivered.
    Complete,
    /// The upstream body failed or the deadline passed mid-stream.
    Failed(String),
    /// The client went away before the body ended.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub bytes_copied: u64,
    pub end: CopyEnd,
}

type DataStream = Pin<Box<dyn Stream<Item = Result<Bytes, axum::Error>> + Send>>;
type OnComplete = Box<dyn FnOnce(CopyReport) + Send>;

/// Build the client response from an upstream response.
///
/// The body must finish by `deadline`. `on_complete` runs exactly once: at
/// end of body, on a body error or timeout, or when the client goes away and
/// the body is dropped.
pub fn stream_upstream<F>(
    upstream: Response<Incoming>,
    mode: HeaderCopyMode,
    deadline: Instant,
    on_complete: F,
) -> Response<Body>
where
    F: FnOnce(CopyReport) + Send + 'static,
{
    let (mut parts, body) = upstream.into_parts();
    parts.headers = copy_headers(&parts.headers, mode);

    let tracked = TrackedBody::new(Body::new(body), deadline, Box::new(on_complete));
    Response::from_parts(parts, Body::from_stream(tracked))
}

/// Copy response headers according to `mode`.
pub fn copy_headers(source: &HeaderMap, mode: HeaderCopyMode) -> HeaderMap {
    match mode {
        HeaderCopyMode::All => source.clone(),
        HeaderCopyMode::FirstValue => {
            let mut headers = HeaderMap::with_capacity(source.keys_len());
            for name in source.keys() {
                if let Some(value) = source.get(name) {
                    headers.insert(name.clone(), value.clone());
                }
            }
            headers
        }
    }
}

struct TrackedBody {
    inner: DataStream,
    /// Exact body length, when the upstream declared one.
    expected: Option<u64>,
    deadline: Pin<Box<Sleep>>,
    bytes_copied: u64,
    on_complete: Option<OnComplete>,
}

impl TrackedBody {
    fn new(body: Body, deadline: Instant, on_complete: OnComplete) -> Self {
        Self {
            expected: body.size_hint().exact(),
            inner: Box::pin(body.into_data_stream()),
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            bytes_copied: 0,
            on_complete: Some(on_complete),
        }
    }

    /// The server may stop polling once a sized body is fully written, so
    /// reaching the declared length counts as completion.
    fn delivered(&self) -> bool {
        self.expected == Some(self.bytes_copied)
    }

    fn finish(&mut self, end: CopyEnd) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(CopyReport {
                bytes_copied: self.bytes_copied,
                end,
            });
        }
    }
}

impl Stream for TrackedBody {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.on_complete.is_none() {
            return Poll::Ready(None);
        }

        if this.deadline.as_mut().poll(cx).is_ready() {
            let message = String::from("upstream deadline exceeded while streaming the body");
            this.finish(CopyEnd::Failed(message.clone()));
            return Poll::Ready(Some(Err(axum::Error::new(message))));
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_copied += chunk.len() as u64;
                if this.delivered() {
                    this.finish(CopyEnd::Complete);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish(CopyEnd::Failed(e.to_string()));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish(CopyEnd::Complete);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        let end = if self.delivered() {
            CopyEnd::Complete
        } else {
            CopyEnd::Abandoned
        };
        self.finish(end);
    }
}
