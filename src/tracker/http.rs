//! Blocking Jira REST client built on `reqwest`.

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;
use serde_json::json;

use super::{
    CreatedIssue, Credentials, SearchHit, SearchResponse, TrackerClient, TrackerError,
    TrackerResult,
};
use crate::models::IssueKey;

/// REST API prefix appended to the configured site URL.
const API_PATH: &str = "/rest/api/3";

/// Issue search endpoint. The plain `/search` resource is retired on Jira Cloud.
const SEARCH_PATH: &str = "/search/jql";

/// User-Agent header sent with every request
const USER_AGENT: &str = "cardwright-cli";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Tracker client talking to a Jira Cloud site.
pub struct HttpTracker {
    client: Client,
    api_base: String,
    auth_header: String,
}

impl HttpTracker {
    /// Build a client for `site_url` (e.g. `https://example.atlassian.net`).
    ///
    /// The authorization header is derived once from `credentials`.
    pub fn new(site_url: &str, credentials: &Credentials) -> TrackerResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TrackerError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, site_url, credentials))
    }

    fn with_client(client: Client, site_url: &str, credentials: &Credentials) -> Self {
        Self {
            client,
            api_base: format!("{}{}", site_url.trim_end_matches('/'), API_PATH),
            auth_header: credentials.basic_auth_header(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("Authorization", self.auth_header.as_str())
            .header("Accept", "application/json")
    }
}

/// Accept only `expected`; anything else becomes `TrackerError::Status`.
fn expect_status(
    result: reqwest::Result<Response>,
    expected: impl Fn(u16) -> bool,
) -> TrackerResult<Response> {
    let resp = result.map_err(|e| TrackerError::Transport(e.to_string()))?;
    let code = resp.status().as_u16();
    if expected(code) {
        Ok(resp)
    } else {
        let body = resp.text().unwrap_or_default();
        Err(TrackerError::Status { code, body })
    }
}

impl TrackerClient for HttpTracker {
    fn search(&self, jql: &str, max_results: Option<u32>) -> TrackerResult<Vec<SearchHit>> {
        let mut req = self
            .request(Method::GET, SEARCH_PATH)
            .query(&[("jql", jql), ("fields", "summary")]);
        if let Some(max) = max_results {
            req = req.query(&[("maxResults", max)]);
        }

        let resp = expect_status(req.send(), |code| code == 200)?;
        let parsed: SearchResponse = resp
            .json()
            .map_err(|e| TrackerError::Parse(e.to_string()))?;
        Ok(parsed.into())
    }

    fn create(&self, fields: &serde_json::Value) -> TrackerResult<IssueKey> {
        let payload = json!({ "fields": fields });
        let resp = expect_status(
            self.request(Method::POST, "/issue").json(&payload).send(),
            |code| code == 201,
        )?;
        let created: CreatedIssue = resp
            .json()
            .map_err(|e| TrackerError::Parse(e.to_string()))?;
        Ok(IssueKey::new(created.key))
    }

    fn update(&self, key: &IssueKey, body: &serde_json::Value) -> TrackerResult<()> {
        let path = format!("/issue/{}", key);
        expect_status(
            self.request(Method::PUT, &path).json(body).send(),
            |code| code == 204,
        )?;
        Ok(())
    }

    fn delete(&self, key: &IssueKey) -> TrackerResult<()> {
        let path = format!("/issue/{}", key);
        expect_status(self.request(Method::DELETE, &path).send(), |code| code == 204)?;
        Ok(())
    }

    fn attach(&self, key: &IssueKey, bytes: &[u8], file_name: &str, mime: &str) -> TrackerResult<()> {
        let path = format!("/issue/{}/attachments", key);
        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| TrackerError::Transport(e.to_string()))?;
        let form = Form::new().part("file", part);

        expect_status(
            self.request(Method::POST, &path)
                .header("X-Atlassian-Token", "no-check")
                .multipart(form)
                .send(),
            |code| (200..300).contains(&code),
        )?;
        Ok(())
    }

    fn link(&self, from: &IssueKey, to: &IssueKey, relation: &str) -> TrackerResult<()> {
        let payload = json!({
            "type": { "name": relation },
            "inwardIssue": { "key": to.as_str() },
            "outwardIssue": { "key": from.as_str() },
        });
        expect_status(
            self.request(Method::POST, "/issueLink").json(&payload).send(),
            |code| code == 201,
        )?;
        Ok(())
    }
}
