//! Request/response shape shared by every protocol call
//!
//! Each call builds a path and query, issues one request, checks the status the
//! operation accepts and, for JSON calls, decodes a typed envelope.

use std::collections::BTreeMap;

use bytes::BytesMut;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::requester::{RequestBody, Requester, Response};
use crate::error::{NimbusError, Result};

/// Error bodies are echoed into diagnostics up to this many bytes
const MAX_ERROR_BODY_BYTES: usize = 4096;

/// One request/response exchange against a collection
pub(crate) struct Exchange {
    method: Method,
    host: String,
    path: String,
    headers: HeaderMap,
    body: RequestBody,
    expected: StatusCode,
}

impl Exchange {
    /// Exchange against the host serving `collection`, expecting 200
    pub(crate) fn new<R>(requester: &R, method: Method, collection: &str, path: String) -> Self
    where
        R: Requester + ?Sized,
    {
        Self {
            method,
            host: requester.collection_host_name(collection),
            path,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            expected: StatusCode::OK,
        }
    }

    pub(crate) fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub(crate) fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub(crate) fn expect(mut self, status: StatusCode) -> Self {
        self.expected = status;
        self
    }

    /// Issue the request and return the response if its status is the expected one
    pub(crate) async fn send<R>(self, requester: &R) -> Result<Response>
    where
        R: Requester + ?Sized,
    {
        let Exchange {
            method,
            host,
            path,
            headers,
            body,
            expected,
        } = self;

        let mut request = requester.create_request(method.clone(), &host, &path, body)?;
        request.headers_mut().extend(headers);

        let response = requester.execute(request).await?;
        let status = response.status();

        if status != expected {
            let body = error_body(response).await;
            return Err(NimbusError::UnexpectedStatus {
                method: method.to_string(),
                host,
                path,
                status: status.as_u16(),
                body,
            });
        }

        debug!(%method, %host, %path, status = status.as_u16(), "exchange completed");
        Ok(response)
    }

    /// Issue the request and decode the JSON success envelope
    pub(crate) async fn send_json<R, T>(self, requester: &R) -> Result<T>
    where
        R: Requester + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(requester).await?;
        decode_envelope(response).await
    }
}

/// Leading bytes of an error body, read lossily.
///
/// Stops pulling from the stream once [`MAX_ERROR_BODY_BYTES`] are in hand, so a
/// large unexpected body is never buffered. A read error ends the diagnostic early.
async fn error_body(response: Response) -> String {
    let mut stream = response.into_stream();
    let mut buffer = BytesMut::new();
    while buffer.len() < MAX_ERROR_BODY_BYTES {
        match stream.next().await {
            Some(Ok(chunk)) => {
                let take = chunk.len().min(MAX_ERROR_BODY_BYTES - buffer.len());
                buffer.extend_from_slice(&chunk[..take]);
            }
            Some(Err(_)) | None => break,
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Decode a JSON envelope from a response body
pub(crate) async fn decode_envelope<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// `/conjoined/{key}?{query}`
pub(crate) fn conjoined_path(key: &str, query: &[(&str, String)]) -> String {
    build_path("conjoined", key, query)
}

/// `/data/{key}` with an optional query
pub(crate) fn data_path(key: &str, query: &[(&str, String)]) -> String {
    build_path("data", key, query)
}

fn build_path(prefix: &str, key: &str, query: &[(&str, String)]) -> String {
    let mut path = format!("/{}/{}", prefix, urlencoding::encode(key));
    if !query.is_empty() {
        path.push('?');
        path.push_str(&encode_query(query));
    }
    path
}

/// Encode query pairs sorted by name so paths are deterministic
pub(crate) fn encode_query(query: &[(&str, String)]) -> String {
    let sorted: BTreeMap<&str, &str> = query
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect();

    sorted
        .into_iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// `{"conjoined_identifier": str}`
#[derive(Debug, Deserialize)]
pub(crate) struct StartEnvelope {
    pub(crate) conjoined_identifier: String,
}

/// `{"version_identifier": str}`
#[derive(Debug, Deserialize)]
pub(crate) struct ArchiveEnvelope {
    pub(crate) version_identifier: String,
}

/// `{"success": bool}`
#[derive(Debug, Deserialize)]
pub(crate) struct SuccessEnvelope {
    pub(crate) success: bool,
}

impl SuccessEnvelope {
    /// `success: false` becomes an error naming the operation
    pub(crate) fn into_result(self, operation: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(NimbusError::Rejected {
                operation: operation.to_string(),
            })
        }
    }
}
