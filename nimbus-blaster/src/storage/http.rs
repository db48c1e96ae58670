//! reqwest-backed [`Requester`]
//!
//! Resolves collections to `{collection}.{service_domain}` and streams request
//! and response bodies. Retries are left to callers.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::TryStreamExt;
use reqwest::header::{HeaderValue, CONTENT_LENGTH};
use reqwest::{Body, Client, Method};
use tracing::debug;

use super::requester::{Request, RequestBody, Requester, Response};
use crate::config::HttpConfig;
use crate::error::{NimbusError, Result};

/// HTTP requester using reqwest
#[derive(Debug, Clone)]
pub struct HttpRequester {
    client: Client,
    config: HttpConfig,
}

impl HttpRequester {
    /// Create a new requester
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| NimbusError::Internal {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Build the URL for a host and escaped path
    fn url(&self, host: &str, path: &str) -> String {
        match self.config.port {
            Some(port) => format!("{}://{}:{}{}", self.config.scheme, host, port, path),
            None => format!("{}://{}{}", self.config.scheme, host, path),
        }
    }

    async fn send(&self, request: Request) -> Result<Response> {
        let (method, host, path, headers, body) = request.into_parts();
        let url = self.url(&host, &path);

        let mut builder = self.client.request(method.clone(), &url).headers(headers);

        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.auth_key.as_ref());
        }

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Stream { length, stream } => builder
                .header(CONTENT_LENGTH, HeaderValue::from(length))
                .body(Body::wrap_stream(stream)),
        };

        let resp = builder.send().await.map_err(|e| NimbusError::Transport {
            host: host.clone(),
            reason: format!("{} {} failed: {}", method, path, e),
        })?;

        let status = resp.status();
        debug!(%method, %url, status = status.as_u16(), "HTTP response received");

        let stream = resp.bytes_stream().map_err(std::io::Error::other);
        Ok(Response::new(status, Box::pin(stream)))
    }
}

impl Requester for HttpRequester {
    fn collection_host_name(&self, collection_name: &str) -> String {
        format!("{}.{}", collection_name, self.config.service_domain)
    }

    fn create_request(
        &self,
        method: Method,
        host_name: &str,
        path: &str,
        body: RequestBody,
    ) -> Result<Request> {
        if !path.starts_with('/') {
            return Err(NimbusError::Internal {
                message: format!("request path must be absolute: {}", path),
            });
        }
        Ok(Request::new(method, host_name, path, body))
    }

    fn execute<'a>(&'a self, request: Request) -> BoxFuture<'a, Result<Response>> {
        Box::pin(self.send(request))
    }
}
