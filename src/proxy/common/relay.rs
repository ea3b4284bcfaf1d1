// Streaming response relay
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue},
    response::Response,
};
use bytes::Bytes;
use futures::{ready, Stream};
use pin_project::{pin_project, pinned_drop};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

use super::headers::is_relayable_response_header;

/// How a route's responses are relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Live event stream: tell caches and intermediaries not to hold bytes back
    Live,
    /// Plain pass-through
    Plain,
}

/// Turn an upstream response into the client response.
///
/// Status and relayable headers are copied; the body is passed through
/// chunk by chunk. Each upstream chunk becomes its own body frame, which
/// hyper writes and flushes before polling for the next one, so partial
/// output reaches the client as it arrives.
pub fn relay_response(upstream: reqwest::Response, mode: RelayMode, route: &'static str) -> Response {
    let status = upstream.status();
    let mut headers = HeaderMap::with_capacity(upstream.headers().len() + 2);
    copy_response_headers(upstream.headers(), &mut headers);

    if mode == RelayMode::Live {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    }

    let body = Body::from_stream(RelayStream::new(upstream.bytes_stream(), route));
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Copy every relayable header, keeping repeated values
pub fn copy_response_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for (name, value) in src {
        if is_relayable_response_header(name.as_str()) {
            dst.append(name.clone(), value.clone());
        }
    }
}

/// Upstream body stream with relay bookkeeping.
///
/// Once the status line is out nothing can be turned into an HTTP error,
/// so failures are only logged here. Timeouts and the client walking away
/// are ordinary endings and stay at debug level.
#[pin_project(PinnedDrop)]
pub struct RelayStream<S> {
    #[pin]
    inner: S,
    route: &'static str,
    chunks: usize,
    bytes: u64,
    finished: bool,
}

impl<S> RelayStream<S> {
    pub fn new(inner: S, route: &'static str) -> Self {
        Self {
            inner,
            route,
            chunks: 0,
            bytes: 0,
            finished: false,
        }
    }
}

impl<S> Stream for RelayStream<S>
where
    S: Stream<Item = reqwest::Result<Bytes>>,
{
    type Item = reqwest::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }

        match ready!(this.inner.poll_next(cx)) {
            Some(Ok(chunk)) => {
                *this.chunks += 1;
                *this.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                *this.finished = true;
                if e.is_timeout() {
                    debug!("[{}] relay stopped by timeout: {}", this.route, e);
                } else {
                    warn!("[{}] stream copy error: {}", this.route, e);
                }
                Poll::Ready(Some(Err(e)))
            }
            None => {
                *this.finished = true;
                debug!(
                    "[{}] relay complete: {} chunks, {} bytes",
                    this.route, this.chunks, this.bytes
                );
                Poll::Ready(None)
            }
        }
    }
}

#[pinned_drop]
impl<S> PinnedDrop for RelayStream<S> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if !*this.finished {
            // Client disconnected; dropping `inner` aborts the upstream read
            debug!(
                "[{}] client went away after {} chunks, upstream call aborted",
                this.route, this.chunks
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use std::convert::Infallible;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    fn upstream_with(
        status: StatusCode,
        headers: &[(&'static str, &'static str)],
        body: reqwest::Body,
    ) -> reqwest::Response {
        let mut builder = axum::http::Response::builder().status(status);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        reqwest::Response::from(builder.body(body).unwrap())
    }

    #[test]
    fn test_copy_response_headers_strips_encoding() {
        let mut src = HeaderMap::new();
        src.insert("content-encoding", HeaderValue::from_static("gzip"));
        src.insert("content-type", HeaderValue::from_static("text/event-stream"));
        src.append("set-cookie", HeaderValue::from_static("a=1"));
        src.append("set-cookie", HeaderValue::from_static("b=2"));
        src.insert("connection", HeaderValue::from_static("keep-alive"));

        let mut dst = HeaderMap::new();
        copy_response_headers(&src, &mut dst);
        assert!(dst.get("content-encoding").is_none());
        assert!(dst.get("connection").is_none());
        assert_eq!(dst["content-type"], "text/event-stream");
        assert_eq!(dst.get_all("set-cookie").iter().count(), 2);
    }

    #[tokio::test]
    async fn test_live_mode_adds_anti_buffering_hints() {
        let upstream = upstream_with(
            StatusCode::OK,
            &[("content-encoding", "br"), ("content-type", "text/event-stream")],
            reqwest::Body::from("data: hi\n\n"),
        );
        let response = relay_response(upstream, RelayMode::Live, "test");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["cache-control"], "no-cache");
        assert_eq!(response.headers()["x-accel-buffering"], "no");
        assert!(response.headers().get("content-encoding").is_none());
    }

    #[tokio::test]
    async fn test_plain_mode_keeps_upstream_status_and_no_hints() {
        let upstream = upstream_with(
            StatusCode::MULTI_STATUS,
            &[("content-type", "application/xml")],
            reqwest::Body::from("<multistatus/>"),
        );
        let response = relay_response(upstream, RelayMode::Plain, "test");
        assert_eq!(response.status(), StatusCode::MULTI_STATUS);
        assert!(response.headers().get("cache-control").is_none());
        assert!(response.headers().get("x-accel-buffering").is_none());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<multistatus/>");
    }

    #[tokio::test]
    async fn test_each_chunk_is_its_own_frame() {
        let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(4);
        let upstream = upstream_with(
            StatusCode::OK,
            &[],
            reqwest::Body::wrap_stream(ReceiverStream::new(rx)),
        );
        let mut body = relay_response(upstream, RelayMode::Live, "test").into_body();

        // Each chunk is observable before the next one is even produced
        for i in 0..3 {
            let chunk = Bytes::from(format!("data: {}\n\n", i));
            tx.send(Ok(chunk.clone())).await.unwrap();
            let frame = body.frame().await.unwrap().unwrap();
            assert_eq!(frame.into_data().unwrap(), chunk);
        }
        drop(tx);
        assert!(body.frame().await.is_none());
    }
}
