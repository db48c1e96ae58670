//! Conjoined (multi-part) session lifecycle
//!
//! A session is opened with [`start_conjoined`], referenced by every archived
//! part through [`ConjoinedParams`], and closed exactly once by
//! [`finish_conjoined`] or [`abort_conjoined`].

use reqwest::Method;
use tracing::{info, warn};

use super::protocol::{conjoined_path, Exchange, StartEnvelope, SuccessEnvelope};
use super::requester::Requester;
use crate::error::Result;

/// Identifies one part of a conjoined upload on an Archive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConjoinedParams {
    /// Session identifier returned by Start
    pub conjoined_identifier: String,
    /// Zero-based part index, authoritative for reassembly
    pub conjoined_part: u32,
}

impl ConjoinedParams {
    pub fn new(conjoined_identifier: impl Into<String>, conjoined_part: u32) -> Self {
        Self {
            conjoined_identifier: conjoined_identifier.into(),
            conjoined_part,
        }
    }

    /// Query pairs carried by an Archive request
    pub(crate) fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("conjoined_identifier", self.conjoined_identifier.clone()),
            ("conjoined_part", self.conjoined_part.to_string()),
        ]
    }
}

/// Open a conjoined session and return its identifier
pub async fn start_conjoined<R>(requester: &R, collection_name: &str, key: &str) -> Result<String>
where
    R: Requester + ?Sized,
{
    let path = conjoined_path(key, &[("action", "start".to_string())]);
    let envelope: StartEnvelope = Exchange::new(requester, Method::POST, collection_name, path)
        .send_json(requester)
        .await?;
    Ok(envelope.conjoined_identifier)
}

/// Complete a conjoined session. Call only after every part archived.
pub async fn finish_conjoined<R>(
    requester: &R,
    collection_name: &str,
    key: &str,
    conjoined_identifier: &str,
) -> Result<()>
where
    R: Requester + ?Sized,
{
    conjoined_action(requester, collection_name, key, conjoined_identifier, "finish").await
}

/// Discard every part archived so far under a conjoined session
pub async fn abort_conjoined<R>(
    requester: &R,
    collection_name: &str,
    key: &str,
    conjoined_identifier: &str,
) -> Result<()>
where
    R: Requester + ?Sized,
{
    conjoined_action(requester, collection_name, key, conjoined_identifier, "abort").await
}

async fn conjoined_action<R>(
    requester: &R,
    collection_name: &str,
    key: &str,
    conjoined_identifier: &str,
    action: &str,
) -> Result<()>
where
    R: Requester + ?Sized,
{
    let path = conjoined_path(
        key,
        &[
            ("action", action.to_string()),
            ("conjoined_identifier", conjoined_identifier.to_string()),
        ],
    );
    let envelope: SuccessEnvelope = Exchange::new(requester, Method::POST, collection_name, path)
        .send_json(requester)
        .await?;
    envelope.into_result(&format!("conjoined action={action}"))
}

/// An open server-side session.
///
/// `finish` and `abort` take the session by value, so a session reaches its
/// terminal state at most once.
#[derive(Debug)]
#[must_use = "an open session must be finished or aborted"]
pub struct ConjoinedSession {
    collection_name: String,
    key: String,
    conjoined_identifier: String,
}

impl ConjoinedSession {
    /// Issue Start and wrap the returned identifier
    pub async fn start<R>(requester: &R, collection_name: &str, key: &str) -> Result<Self>
    where
        R: Requester + ?Sized,
    {
        let conjoined_identifier = start_conjoined(requester, collection_name, key).await?;
        info!(
            collection = collection_name,
            key,
            conjoined_identifier = %conjoined_identifier,
            "conjoined session started"
        );
        Ok(Self {
            collection_name: collection_name.to_string(),
            key: key.to_string(),
            conjoined_identifier,
        })
    }

    /// Wrap an identifier obtained elsewhere
    pub fn resume(
        collection_name: impl Into<String>,
        key: impl Into<String>,
        conjoined_identifier: impl Into<String>,
    ) -> Self {
        Self {
            collection_name: collection_name.into(),
            key: key.into(),
            conjoined_identifier: conjoined_identifier.into(),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn conjoined_identifier(&self) -> &str {
        &self.conjoined_identifier
    }

    /// Archive parameters for part `conjoined_part` of this session
    pub fn params(&self, conjoined_part: u32) -> ConjoinedParams {
        ConjoinedParams::new(self.conjoined_identifier.clone(), conjoined_part)
    }

    /// Complete the session
    pub async fn finish<R>(self, requester: &R) -> Result<()>
    where
        R: Requester + ?Sized,
    {
        finish_conjoined(
            requester,
            &self.collection_name,
            &self.key,
            &self.conjoined_identifier,
        )
        .await?;
        info!(
            key = %self.key,
            conjoined_identifier = %self.conjoined_identifier,
            "conjoined session finished"
        );
        Ok(())
    }

    /// Discard the session and every part archived under it
    pub async fn abort<R>(self, requester: &R) -> Result<()>
    where
        R: Requester + ?Sized,
    {
        warn!(
            key = %self.key,
            conjoined_identifier = %self.conjoined_identifier,
            "aborting conjoined session"
        );
        abort_conjoined(
            requester,
            &self.collection_name,
            &self.key,
            &self.conjoined_identifier,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_query() {
        let params = ConjoinedParams::new("abc123", 7);
        assert_eq!(
            params.query(),
            vec![
                ("conjoined_identifier", "abc123".to_string()),
                ("conjoined_part", "7".to_string()),
            ]
        );
    }

    #[test]
    fn test_session_params_thread_identifier() {
        let session = ConjoinedSession::resume("photos", "movie.mkv", "abc123");
        let params = session.params(3);
        assert_eq!(params.conjoined_identifier, "abc123");
        assert_eq!(params.conjoined_part, 3);
    }
}
