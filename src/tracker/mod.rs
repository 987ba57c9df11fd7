//! Issue tracker access.
//!
//! Everything the pipeline does remotely goes through the [`TrackerClient`]
//! trait. The production implementation is [`HttpTracker`], a blocking
//! client for the Jira Cloud REST API (v3) using basic authentication.

mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpTracker;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use thiserror::Error;

use crate::models::IssueKey;

/// Errors returned by tracker calls.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The tracker answered with an unexpected status code
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// Connection, TLS or timeout failure
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The response body did not have the expected shape
    #[error("Failed to parse tracker response: {0}")]
    Parse(String),

    /// Local I/O while preparing a request (e.g., reading an attachment)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// HTTP status code, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            TrackerError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for tracker calls.
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Basic-auth credentials, resolved once at startup and handed to the client.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub api_token: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            api_token: api_token.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.api_token);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("api_token", &"***")
            .finish()
    }
}

/// One search result: the issue key and its summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub key: IssueKey,
    pub summary: String,
}

/// Wire shape of the search endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<SearchIssue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchIssue {
    pub key: String,
    #[serde(default)]
    pub fields: SearchFields,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchFields {
    #[serde(default)]
    pub summary: String,
}

impl From<SearchResponse> for Vec<SearchHit> {
    fn from(resp: SearchResponse) -> Self {
        resp.issues
            .into_iter()
            .map(|issue| SearchHit {
                key: IssueKey::new(issue.key),
                summary: issue.fields.summary,
            })
            .collect()
    }
}

/// Wire shape of the create endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct CreatedIssue {
    pub key: String,
}

/// Operations the pipeline needs from the issue tracker.
///
/// All calls block until the tracker answers.
pub trait TrackerClient {
    /// Run a JQL query and return the matching issues in tracker order.
    fn search(&self, jql: &str, max_results: Option<u32>) -> TrackerResult<Vec<SearchHit>>;

    /// Create an issue from a `fields` object. Success is HTTP 201.
    fn create(&self, fields: &serde_json::Value) -> TrackerResult<IssueKey>;

    /// Edit an issue with a full request body (`fields` and/or `update`). Success is HTTP 204.
    fn update(&self, key: &IssueKey, body: &serde_json::Value) -> TrackerResult<()>;

    /// Delete an issue. Success is HTTP 204.
    fn delete(&self, key: &IssueKey) -> TrackerResult<()>;

    /// Upload one file as an attachment. Success is any 2xx.
    fn attach(&self, key: &IssueKey, bytes: &[u8], file_name: &str, mime: &str) -> TrackerResult<()>;

    /// Link two issues; `from` is the outward side, `to` the inward side. Success is HTTP 201.
    fn link(&self, from: &IssueKey, to: &IssueKey, relation: &str) -> TrackerResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        let creds = Credentials::new("user", "token");
        // base64("user:token")
        assert_eq!(creds.basic_auth_header(), "Basic dXNlcjp0b2tlbg==");
    }

    #[test]
    fn test_credentials_debug_masks_token() {
        let creds = Credentials::new("tester@example.com", "secret-token");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("tester@example.com"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_search_response_deserialize() {
        let json = r#"{
            "issues": [
                {"key": "BTV-1", "fields": {"summary": "[NPL001] G - TC_NPL01001 - Login"}},
                {"key": "BTV-2", "fields": {}}
            ]
        }"#;

        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        let hits: Vec<SearchHit> = resp.into();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].key.as_str(), "BTV-1");
        assert_eq!(hits[0].summary, "[NPL001] G - TC_NPL01001 - Login");
        assert_eq!(hits[1].summary, "");
    }

    #[test]
    fn test_search_response_without_issues() {
        let resp: SearchResponse = serde_json::from_str("{}").unwrap();
        let hits: Vec<SearchHit> = resp.into();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_status_error_display() {
        let err = TrackerError::Status {
            code: 400,
            body: "bad field".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 400: bad field");
        assert_eq!(err.status(), Some(400));
        assert_eq!(TrackerError::Transport("timeout".into()).status(), None);
    }
}
