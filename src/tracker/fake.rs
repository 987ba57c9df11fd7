//! In-memory tracker that records every call, for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use super::{SearchHit, TrackerClient, TrackerError, TrackerResult};
use crate::models::IssueKey;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Search { jql: String, max_results: Option<u32> },
    Create { fields: serde_json::Value },
    Update { key: String, body: serde_json::Value },
    Delete { key: String },
    Attach { key: String, file_name: String, mime: String, len: usize },
    Link { from: String, to: String, relation: String },
}

pub(crate) struct FakeTracker {
    calls: RefCell<Vec<Call>>,
    searches: RefCell<Vec<(String, Vec<SearchHit>)>>,
    next_key: Cell<u32>,
    pub fail_search: Cell<bool>,
    /// Number of upcoming create calls that fail before one succeeds
    pub create_failures: Cell<u32>,
    pub fail_update: Cell<bool>,
    pub fail_delete: RefCell<HashSet<String>>,
    /// File names whose attach always fails
    pub fail_attach: RefCell<HashSet<String>>,
    pub fail_link: Cell<bool>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            searches: RefCell::new(Vec::new()),
            next_key: Cell::new(5000),
            fail_search: Cell::new(false),
            create_failures: Cell::new(0),
            fail_update: Cell::new(false),
            fail_delete: RefCell::new(HashSet::new()),
            fail_attach: RefCell::new(HashSet::new()),
            fail_link: Cell::new(false),
        }
    }

    /// Answer any JQL containing `needle` with the given `(key, summary)` hits.
    pub fn with_search(self, needle: &str, hits: &[(&str, &str)]) -> Self {
        let hits = hits
            .iter()
            .map(|(key, summary)| SearchHit {
                key: IssueKey::from(*key),
                summary: summary.to_string(),
            })
            .collect();
        self.searches.borrow_mut().push((needle.to_string(), hits));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn creates(&self) -> Vec<serde_json::Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create { fields } => Some(fields),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<(String, serde_json::Value)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update { key, body } => Some((key, body)),
                _ => None,
            })
            .collect()
    }

    pub fn attaches(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Attach { key, file_name, .. } => Some((key, file_name)),
                _ => None,
            })
            .collect()
    }

    pub fn links(&self) -> Vec<(String, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Link { from, to, relation } => Some((from, to, relation)),
                _ => None,
            })
            .collect()
    }

    pub fn searches(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Search { jql, .. } => Some(jql),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn bad_request() -> TrackerError {
        TrackerError::Status {
            code: 400,
            body: "{\"errorMessages\":[\"rejected by fake\"]}".to_string(),
        }
    }
}

impl TrackerClient for FakeTracker {
    fn search(&self, jql: &str, max_results: Option<u32>) -> TrackerResult<Vec<SearchHit>> {
        self.record(Call::Search {
            jql: jql.to_string(),
            max_results,
        });
        if self.fail_search.get() {
            return Err(TrackerError::Transport("connection refused".to_string()));
        }
        let searches = self.searches.borrow();
        Ok(searches
            .iter()
            .find(|(needle, _)| jql.contains(needle.as_str()))
            .map(|(_, hits)| hits.clone())
            .unwrap_or_default())
    }

    fn create(&self, fields: &serde_json::Value) -> TrackerResult<IssueKey> {
        self.record(Call::Create {
            fields: fields.clone(),
        });
        let remaining = self.create_failures.get();
        if remaining > 0 {
            self.create_failures.set(remaining - 1);
            return Err(Self::bad_request());
        }
        let n = self.next_key.get();
        self.next_key.set(n + 1);
        Ok(IssueKey::new(format!("BTV-{}", n)))
    }

    fn update(&self, key: &IssueKey, body: &serde_json::Value) -> TrackerResult<()> {
        self.record(Call::Update {
            key: key.to_string(),
            body: body.clone(),
        });
        if self.fail_update.get() {
            return Err(Self::bad_request());
        }
        Ok(())
    }

    fn delete(&self, key: &IssueKey) -> TrackerResult<()> {
        self.record(Call::Delete {
            key: key.to_string(),
        });
        if self.fail_delete.borrow().contains(key.as_str()) {
            return Err(TrackerError::Status {
                code: 404,
                body: "Issue does not exist".to_string(),
            });
        }
        Ok(())
    }

    fn attach(&self, key: &IssueKey, bytes: &[u8], file_name: &str, mime: &str) -> TrackerResult<()> {
        self.record(Call::Attach {
            key: key.to_string(),
            file_name: file_name.to_string(),
            mime: mime.to_string(),
            len: bytes.len(),
        });
        if self.fail_attach.borrow().contains(file_name) {
            return Err(TrackerError::Status {
                code: 500,
                body: "attachment storage unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn link(&self, from: &IssueKey, to: &IssueKey, relation: &str) -> TrackerResult<()> {
        self.record(Call::Link {
            from: from.to_string(),
            to: to.to_string(),
            relation: relation.to_string(),
        });
        if self.fail_link.get() {
            return Err(Self::bad_request());
        }
        Ok(())
    }
}
