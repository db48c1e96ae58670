//! Object data calls: archive (plain or as a conjoined part), retrieve, delete

use std::io;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, RANGE};
use reqwest::{Method, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use super::conjoined::ConjoinedParams;
use super::protocol::{data_path, ArchiveEnvelope, Exchange, SuccessEnvelope};
use super::requester::{ByteStream, RequestBody, Requester};
use crate::error::{NimbusError, Result};

/// Size of each chunk moved from the reader into the request body
pub const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the reader and the transport
const BODY_CHANNEL_DEPTH: usize = 4;

/// Store `length` bytes read from `body` under `key`.
///
/// With `conjoined` set, the request carries the session identifier and part
/// index; without it this is a standalone object write. The body is streamed in
/// [`BODY_CHUNK_SIZE`] chunks, never buffered whole. Returns the version
/// identifier assigned by the service.
pub async fn archive<R, B>(
    requester: &R,
    collection_name: &str,
    key: &str,
    conjoined: Option<&ConjoinedParams>,
    body: B,
    length: u64,
) -> Result<String>
where
    R: Requester + ?Sized,
    B: AsyncRead + Unpin + Send,
{
    let query = conjoined.map(ConjoinedParams::query).unwrap_or_default();
    let path = data_path(key, &query);

    let (tx, rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
    let stream: ByteStream = Box::pin(ReceiverStream::new(rx));
    let exchange = Exchange::new(requester, Method::POST, collection_name, path)
        .body(RequestBody::from_stream(length, stream));

    let (streamed, response) = tokio::join!(
        pump_body(body, tx),
        exchange.send_json::<R, ArchiveEnvelope>(requester)
    );

    let envelope = response?;
    let streamed = streamed?;
    if streamed != length {
        return Err(NimbusError::BodyLengthMismatch {
            expected: length,
            actual: streamed,
        });
    }

    debug!(
        key,
        bytes = streamed,
        version_identifier = %envelope.version_identifier,
        "archive completed"
    );
    Ok(envelope.version_identifier)
}

/// Move bytes from `body` into the request channel until EOF.
///
/// Stops early, without error, when the transport drops its end. A read error
/// is forwarded to the transport so the request fails too.
async fn pump_body<B>(mut body: B, tx: mpsc::Sender<io::Result<bytes::Bytes>>) -> Result<u64>
where
    B: AsyncRead + Unpin,
{
    let mut streamed = 0u64;
    loop {
        let mut chunk = BytesMut::with_capacity(BODY_CHUNK_SIZE);
        let read = match body.read_buf(&mut chunk).await {
            Ok(read) => read,
            Err(err) => {
                let _ = tx
                    .send(Err(io::Error::new(err.kind(), err.to_string())))
                    .await;
                return Err(err.into());
            }
        };
        if read == 0 {
            break;
        }
        streamed += read as u64;
        if tx.send(Ok(chunk.freeze())).await.is_err() {
            break;
        }
    }
    Ok(streamed)
}

/// Options for [`retrieve`].
///
/// `version_id`, `modified_since` and `unmodified_since` are recognised but not
/// supported: setting any of them fails with [`NimbusError::NotImplemented`]
/// before a request is issued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrieveParams {
    pub version_id: Option<String>,
    pub slice_offset: u64,
    pub slice_size: u64,
    pub modified_since: Option<DateTime<Utc>>,
    pub unmodified_since: Option<DateTime<Utc>>,
}

impl RetrieveParams {
    /// Request `size` bytes starting at `offset`; `size == 0` means to the end
    pub fn slice(offset: u64, size: u64) -> Self {
        Self {
            slice_offset: offset,
            slice_size: size,
            ..Default::default()
        }
    }

    fn check_supported(&self) -> Result<()> {
        if self.version_id.is_some() {
            return Err(NimbusError::NotImplemented {
                feature: "retrieve version_id",
            });
        }
        if self.modified_since.is_some() {
            return Err(NimbusError::NotImplemented {
                feature: "retrieve modified_since",
            });
        }
        if self.unmodified_since.is_some() {
            return Err(NimbusError::NotImplemented {
                feature: "retrieve unmodified_since",
            });
        }
        Ok(())
    }

    /// `Range` header value, if a slice was requested
    pub fn range_header(&self) -> Result<Option<String>> {
        if self.slice_offset == 0 && self.slice_size == 0 {
            return Ok(None);
        }
        if self.slice_size == 0 {
            return Ok(Some(format!("bytes={}-", self.slice_offset)));
        }
        let end = self
            .slice_offset
            .checked_add(self.slice_size)
            .ok_or_else(|| NimbusError::InvalidConfig {
                reason: format!(
                    "slice offset {} plus size {} overflows",
                    self.slice_offset, self.slice_size
                ),
            })?;
        Ok(Some(format!("bytes={}-{}", self.slice_offset, end)))
    }
}

/// Fetch the object stored under `key` as a byte stream.
///
/// A sliced retrieve sends a `Range` header and accepts only 206; a whole-object
/// retrieve accepts only 200.
pub async fn retrieve<R>(
    requester: &R,
    collection_name: &str,
    key: &str,
    params: &RetrieveParams,
) -> Result<ByteStream>
where
    R: Requester + ?Sized,
{
    params.check_supported()?;

    let mut exchange = Exchange::new(requester, Method::GET, collection_name, data_path(key, &[]));
    if let Some(range) = params.range_header()? {
        let value = HeaderValue::from_str(&range).map_err(|e| NimbusError::Internal {
            message: format!("invalid range header {range}: {e}"),
        })?;
        exchange = exchange.header(RANGE, value).expect(StatusCode::PARTIAL_CONTENT);
    }

    let response = exchange.send(requester).await?;
    Ok(response.into_stream())
}

/// Read a retrieved stream fully into memory
pub async fn read_to_end(mut stream: ByteStream) -> Result<bytes::Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
}

/// Delete the object stored under `key`
pub async fn delete_key<R>(requester: &R, collection_name: &str, key: &str) -> Result<()>
where
    R: Requester + ?Sized,
{
    let envelope: SuccessEnvelope =
        Exchange::new(requester, Method::DELETE, collection_name, data_path(key, &[]))
            .send_json(requester)
            .await?;
    envelope.into_result("delete")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header() {
        assert_eq!(RetrieveParams::default().range_header().unwrap(), None);
        assert_eq!(
            RetrieveParams::slice(100, 50).range_header().unwrap().as_deref(),
            Some("bytes=100-150")
        );
        assert_eq!(
            RetrieveParams::slice(100, 0).range_header().unwrap().as_deref(),
            Some("bytes=100-")
        );
        assert_eq!(
            RetrieveParams::slice(0, 10).range_header().unwrap().as_deref(),
            Some("bytes=0-10")
        );
    }

    #[test]
    fn test_range_header_overflow() {
        let result = RetrieveParams::slice(u64::MAX - 5, 10).range_header();
        assert!(matches!(result, Err(NimbusError::InvalidConfig { .. })));

        assert_eq!(
            RetrieveParams::slice(u64::MAX, 0).range_header().unwrap(),
            Some(format!("bytes={}-", u64::MAX))
        );
    }

    #[test]
    fn test_unsupported_options_rejected() {
        let params = RetrieveParams {
            version_id: Some("v1".into()),
            ..Default::default()
        };
        assert!(matches!(
            params.check_supported(),
            Err(NimbusError::NotImplemented { .. })
        ));

        let params = RetrieveParams {
            unmodified_since: Some(Utc::now()),
            ..Default::default()
        };
        assert!(matches!(
            params.check_supported(),
            Err(NimbusError::NotImplemented { feature: "retrieve unmodified_since" })
        ));
    }

    #[tokio::test]
    async fn test_pump_body_streams_in_chunks() {
        let data = vec![7u8; BODY_CHUNK_SIZE + 10];
        let (tx, mut rx) = mpsc::channel(BODY_CHANNEL_DEPTH);

        let pump = tokio::spawn(async move { pump_body(&data[..], tx).await });

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk.unwrap().len());
        }

        assert_eq!(pump.await.unwrap().unwrap(), (BODY_CHUNK_SIZE + 10) as u64);
        assert_eq!(chunks.iter().sum::<usize>(), BODY_CHUNK_SIZE + 10);
        assert!(chunks.iter().all(|len| *len <= BODY_CHUNK_SIZE));
    }

    #[tokio::test]
    async fn test_pump_body_stops_when_transport_drops() {
        let data = vec![1u8; BODY_CHUNK_SIZE * 8];
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let streamed = pump_body(&data[..], tx).await.unwrap();
        assert!(streamed <= BODY_CHUNK_SIZE as u64);
    }
}
