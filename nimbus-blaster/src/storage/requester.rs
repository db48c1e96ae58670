//! The transport capability the protocol client is written against
//!
//! A `Requester` resolves collections to hosts, builds requests and executes
//! them. The protocol code never touches HTTP directly, which keeps it testable
//! with a scripted requester.

use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};

use crate::error::{NimbusError, Result};

/// Streaming byte source used for both request and response bodies
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Outgoing request body
pub enum RequestBody {
    /// No body (session lifecycle calls, retrieve, delete)
    Empty,
    /// Streamed body with a declared length
    Stream { length: u64, stream: ByteStream },
}

impl RequestBody {
    /// Body with no content
    pub fn empty() -> Self {
        RequestBody::Empty
    }

    /// Streamed body of exactly `length` bytes
    pub fn from_stream(length: u64, stream: ByteStream) -> Self {
        RequestBody::Stream { length, stream }
    }

    /// Declared body length
    pub fn len(&self) -> u64 {
        match self {
            RequestBody::Empty => 0,
            RequestBody::Stream { length, .. } => *length,
        }
    }

    /// True when no bytes will be sent
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the body into memory. Meant for test requesters and small payloads.
    pub async fn collect(self) -> io::Result<Bytes> {
        match self {
            RequestBody::Empty => Ok(Bytes::new()),
            RequestBody::Stream { length, mut stream } => {
                let mut buffer = BytesMut::with_capacity(length.min(1 << 20) as usize);
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok(buffer.freeze())
            }
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Stream { length, .. } => {
                f.debug_struct("Stream").field("length", length).finish()
            }
        }
    }
}

/// A request ready to hand to [`Requester::execute`]
#[derive(Debug)]
pub struct Request {
    method: Method,
    host: String,
    path: String,
    headers: HeaderMap,
    body: RequestBody,
}

impl Request {
    /// Create a request for `method` on `host` with an already-escaped `path`
    pub fn new(
        method: Method,
        host: impl Into<String>,
        path: impl Into<String>,
        body: RequestBody,
    ) -> Self {
        Self {
            method,
            host: host.into(),
            path: path.into(),
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path including the query string
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Split into head parts and body
    pub fn into_parts(self) -> (Method, String, String, HeaderMap, RequestBody) {
        (self.method, self.host, self.path, self.headers, self.body)
    }
}

/// Response returned by a requester
pub struct Response {
    status: StatusCode,
    body: ByteStream,
}

impl Response {
    /// Response with a streaming body
    pub fn new(status: StatusCode, body: ByteStream) -> Self {
        Self { status, body }
    }

    /// Response with an in-memory body
    pub fn from_bytes(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Read the whole body
    pub async fn bytes(self) -> Result<Bytes> {
        let mut body = self.body;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk.map_err(NimbusError::Io)?);
        }
        Ok(buffer.freeze())
    }

    /// Hand the body stream to the caller
    pub fn into_stream(self) -> ByteStream {
        self.body
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response").field("status", &self.status).finish()
    }
}

/// Transport capability consumed by the protocol client
pub trait Requester: Send + Sync {
    /// Resolve a collection name to the host serving it
    fn collection_host_name(&self, collection_name: &str) -> String;

    /// Build an outgoing request. `path` is already escaped and carries the query.
    fn create_request(
        &self,
        method: Method,
        host_name: &str,
        path: &str,
        body: RequestBody,
    ) -> Result<Request>;

    /// Execute a request and return the service's response
    fn execute<'a>(&'a self, request: Request) -> BoxFuture<'a, Result<Response>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_body_collect() {
        let chunks = vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))];
        let body = RequestBody::from_stream(5, stream::iter(chunks).boxed());
        assert_eq!(body.len(), 5);

        let collected = body.collect().await.unwrap();
        assert_eq!(&collected[..], b"abcde");
    }

    #[tokio::test]
    async fn test_response_bytes() {
        let response = Response::from_bytes(StatusCode::OK, r#"{"success": true}"#);
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.bytes().await.unwrap();
        assert_eq!(&body[..], br#"{"success": true}"#);
    }
}
