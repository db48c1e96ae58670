//! Scripted requester for exercising the protocol client without a network

#![allow(dead_code)]

use std::collections::BTreeSet;

use bytes::Bytes;
use futures::future::BoxFuture;
use nimbus_blaster::error::{NimbusError, Result};
use nimbus_blaster::storage::{Request, RequestBody, Requester, Response};
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};

/// A request as the mock saw it, with its body drained
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub host: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Path without the query string
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }

    /// Decoded value of a query parameter
    pub fn query(&self, name: &str) -> Option<String> {
        let (_, query) = self.path.split_once('?')?;
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| urlencoding::decode(value).unwrap().into_owned())
        })
    }

    pub fn has_query(&self) -> bool {
        self.path.contains('?')
    }

    pub fn is_archive(&self) -> bool {
        self.method == Method::POST && self.route().starts_with("/data/")
    }

    pub fn conjoined_action(&self) -> Option<String> {
        if self.route().starts_with("/conjoined/") {
            self.query("action")
        } else {
            None
        }
    }
}

/// Reply produced by a handler: `None` simulates a transport failure
pub type Reply = Option<(u16, String)>;

type Handler = Box<dyn Fn(&RecordedRequest) -> Reply + Send + Sync>;

pub struct MockRequester {
    handler: Handler,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockRequester {
    pub fn new(handler: impl Fn(&RecordedRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same status and body
    pub fn fixed(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::new(move |_| Some((status, body.clone())))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn archives(&self) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.is_archive()).collect()
    }

    /// Identifiers passed to finish or abort calls, in order
    pub fn conjoined_calls(&self, action: &str) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.conjoined_action().as_deref() == Some(action))
            .map(|r| r.query("conjoined_identifier").unwrap_or_default())
            .collect()
    }
}

impl Requester for MockRequester {
    fn collection_host_name(&self, collection_name: &str) -> String {
        format!("{}.mock.test", collection_name)
    }

    fn create_request(
        &self,
        method: Method,
        host_name: &str,
        path: &str,
        body: RequestBody,
    ) -> Result<Request> {
        Ok(Request::new(method, host_name, path, body))
    }

    fn execute<'a>(&'a self, request: Request) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let (method, host, path, headers, body) = request.into_parts();
            let body = body.collect().await?;
            let recorded = RecordedRequest {
                method,
                host: host.clone(),
                path,
                headers,
                body,
            };

            let reply = (self.handler)(&recorded);
            self.requests.lock().push(recorded);

            match reply {
                Some((status, body)) => Ok(Response::from_bytes(
                    StatusCode::from_u16(status).expect("valid status in test script"),
                    body,
                )),
                None => Err(NimbusError::Transport {
                    host,
                    reason: "connection reset by mock".into(),
                }),
            }
        })
    }
}

/// A well-behaved conjoined service that fails Archive for `failing_parts`
pub fn conjoined_service(identifier: &str, failing_parts: &[u32]) -> MockRequester {
    let identifier = identifier.to_string();
    let failing: BTreeSet<u32> = failing_parts.iter().copied().collect();

    MockRequester::new(move |request| {
        if let Some(action) = request.conjoined_action() {
            return match action.as_str() {
                "start" => Some((
                    200,
                    format!(r#"{{"conjoined_identifier": "{}"}}"#, identifier),
                )),
                _ => Some((200, r#"{"success": true}"#.to_string())),
            };
        }

        if request.is_archive() {
            let part: u32 = request
                .query("conjoined_part")
                .and_then(|p| p.parse().ok())
                .unwrap_or(0);
            if failing.contains(&part) {
                return Some((500, "archive exploded".to_string()));
            }
            return Some((
                200,
                format!(r#"{{"version_identifier": "v-{}"}}"#, part),
            ));
        }

        Some((404, String::new()))
    })
}
