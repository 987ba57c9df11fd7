//! Ticket lookup and running-number derivation.
//!
//! Nothing here is cached: every call re-queries the tracker, and the next
//! running number is recomputed from a fresh snapshot. The number is not
//! reserved, so a caller should create its ticket right away.

use tracing::{debug, info, warn};

use crate::models::{IssueKey, RunningNumber};
use crate::tracker::TrackerClient;

/// Cap on tickets scanned when deriving a running number.
pub const RUNNING_NUMBER_SCAN_LIMIT: u32 = 1000;

/// Extract the running number from a summary tag like `[NPL006] ...`.
///
/// Looks for `"[" + namespace`, then takes everything up to the next `]`,
/// trims it and parses it as a positive integer. Returns `None` for anything
/// that does not fit, including a zero value.
pub fn parse_running_tag(summary: &str, namespace: &str) -> Option<u32> {
    let opener = format!("[{}", namespace);
    let start = summary.find(&opener)? + opener.len();
    let rest = &summary[start..];
    let end = rest.find(']')?;
    let digits = rest[..end].trim();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|n| *n > 0)
}

/// Where a running-number sequence lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberingScope {
    /// Tag prefix inside the brackets (module code or defect series)
    pub namespace: String,
    /// Issue type the sequence is counted over (e.g., "Task", "Bug")
    pub issue_type: String,
    /// Summary search term used to narrow the scan
    pub search_term: String,
}

impl NumberingScope {
    /// Scope for `namespace` over `issue_type`, searching summaries for `TC_<namespace>`.
    pub fn new(namespace: impl Into<String>, issue_type: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            search_term: format!("TC_{}", namespace),
            namespace,
            issue_type: issue_type.into(),
        }
    }

    pub fn with_search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = term.into();
        self
    }
}

/// Read-only view of the tracker for one project.
pub struct TicketDirectory<'a> {
    tracker: &'a dyn TrackerClient,
    project: String,
}

impl<'a> TicketDirectory<'a> {
    pub fn new(tracker: &'a dyn TrackerClient, project: impl Into<String>) -> Self {
        Self {
            tracker,
            project: project.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// JQL matching any issue whose summary mentions `term`.
    pub fn summary_query(&self, term: &str) -> String {
        format!("project = {} AND summary ~ \"{}\"", self.project, escape_jql(term))
    }

    /// JQL listing candidate issues of a numbering scope, newest first.
    pub fn numbering_query(&self, scope: &NumberingScope) -> String {
        format!(
            "project = {} AND issuetype = {} AND summary ~ \"{}*\" ORDER BY created DESC",
            self.project,
            scope.issue_type,
            escape_jql(&scope.search_term)
        )
    }

    /// Key of the first issue whose summary mentions `test_case_id`.
    ///
    /// A failed search is logged and reported as "not found".
    pub fn find_by_test_case_id(&self, test_case_id: &str) -> Option<IssueKey> {
        let jql = self.summary_query(test_case_id);
        match self.tracker.search(&jql, None) {
            Ok(hits) => match hits.into_iter().next() {
                Some(hit) => {
                    info!(test_case_id, issue_key = %hit.key, "issue exists");
                    Some(hit.key)
                }
                None => {
                    info!(test_case_id, "no issue found");
                    None
                }
            },
            Err(e) => {
                warn!(test_case_id, error = %e, "failed to search for issue");
                None
            }
        }
    }

    /// Next free running number in `scope`: highest parsed tag plus one.
    ///
    /// Returns 1 when nothing matches, nothing parses, or the search fails.
    pub fn next_running_number(&self, scope: &NumberingScope) -> RunningNumber {
        let jql = self.numbering_query(scope);
        let hits = match self.tracker.search(&jql, Some(RUNNING_NUMBER_SCAN_LIMIT)) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(namespace = %scope.namespace, error = %e, "failed to fetch issues, starting at 001");
                return RunningNumber::FIRST;
            }
        };

        let mut highest = 0;
        for hit in &hits {
            match parse_running_tag(&hit.summary, &scope.namespace) {
                Some(n) => highest = highest.max(n),
                None => debug!(summary = %hit.summary, "no running number in summary, skipped"),
            }
        }

        let next = RunningNumber::new(highest.saturating_add(1));
        info!(
            namespace = %scope.namespace,
            scanned = hits.len(),
            next = %next,
            "next running number"
        );
        next
    }
}

/// Escape a term for use inside a double-quoted JQL string.
fn escape_jql(term: &str) -> String {
    term.replace('\\', "\\\\").replace('"', "\\\"")
}

/// In-memory running-number counter for one batch run.
///
/// The batch that creates it is its only writer: `peek` gives the number the
/// next ticket will use, `advance` moves on after a successful creation.
#[derive(Debug)]
pub struct RunningNumberAllocator {
    namespace: String,
    current: RunningNumber,
}

impl RunningNumberAllocator {
    pub fn new(namespace: impl Into<String>, start: RunningNumber) -> Self {
        Self {
            namespace: namespace.into(),
            current: start,
        }
    }

    /// Seed the allocator from the tracker.
    pub fn fetch(directory: &TicketDirectory<'_>, scope: &NumberingScope) -> Self {
        Self::new(scope.namespace.clone(), directory.next_running_number(scope))
    }

    pub fn peek(&self) -> RunningNumber {
        self.current
    }

    /// Tag body for the current number, e.g. `NPL006`.
    pub fn tag(&self) -> String {
        self.current.tag(&self.namespace)
    }

    /// Consume the current number and return the new one.
    pub fn advance(&mut self) -> RunningNumber {
        self.current = self.current.next();
        self.current
    }
}
