//! Batch reconciliation of spreadsheet test cases against tracker tickets.
//!
//! The create workflow files one card per test case that has no ticket yet;
//! the update workflow refreshes the description of every card that does.
//! Test cases are processed one at a time, in sheet order, and one failing
//! case never stops the batch. A cancel flag is polled between cases.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::card::{
    build_creation_description, build_script_table, build_update_description, card_summary,
    creation_summary_text, description_update_body, issue_fields, sanitize_or,
    update_summary_text,
};
use crate::directory::{NumberingScope, RunningNumberAllocator, TicketDirectory};
use crate::models::{IssueKey, TestCase};
use crate::retry::RetryPolicy;
use crate::tracker::TrackerClient;
use crate::{Error, Result};

const NO_DESCRIPTION: &str = "No description available";
const UNKNOWN: &str = "Unknown";
const NOT_AVAILABLE: &str = "N/A";

/// A card created by the create workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedCard {
    pub test_case_id: String,
    pub issue_key: IssueKey,
    pub summary: String,
}

/// A test case paired with the ticket that already covers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingCard {
    pub test_case_id: String,
    pub issue_key: IssueKey,
}

/// Outcome of one create run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateReport {
    pub created: Vec<CreatedCard>,
    pub skipped: Vec<ExistingCard>,
    pub failed: Vec<String>,
    /// Running number the next card would use
    pub next_running_number: u32,
    pub cancelled: bool,
}

/// Outcome of one update run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub updated: Vec<ExistingCard>,
    pub not_found: Vec<String>,
    pub failed: Vec<ExistingCard>,
    pub cancelled: bool,
}

/// Outcome of a delete run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<IssueKey>,
    pub failed: Vec<IssueKey>,
}

/// Drives the create, update and delete workflows for one project.
pub struct Reconciler<'a> {
    tracker: &'a dyn TrackerClient,
    directory: TicketDirectory<'a>,
    task_type: String,
    retry: RetryPolicy,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        tracker: &'a dyn TrackerClient,
        project: impl Into<String>,
        task_type: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            tracker,
            directory: TicketDirectory::new(tracker, project),
            task_type: task_type.into(),
            retry,
            cancel: None,
        }
    }

    /// Stop between test cases once `flag` is set.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Create a card for every test case that has no ticket yet.
    ///
    /// The running number is fetched once up front and only advances after a
    /// successful create, so a failed case leaves no gap in the sequence.
    pub fn create_cards(&self, cases: &[TestCase], module: &str) -> CreateReport {
        let scope = NumberingScope::new(module, self.task_type.clone());
        let mut allocator = RunningNumberAllocator::fetch(&self.directory, &scope);
        let mut report = CreateReport::default();

        for case in cases {
            if self.cancelled() {
                warn!(test_case_id = %case.id, "cancelled, stopping before this test case");
                report.cancelled = true;
                break;
            }

            if let Some(key) = self.directory.find_by_test_case_id(&case.id) {
                info!(test_case_id = %case.id, issue_key = %key, "skipping, card already exists");
                report.skipped.push(ExistingCard {
                    test_case_id: case.id.clone(),
                    issue_key: key,
                });
                continue;
            }

            let first = case.first_row();
            let description = sanitize_or(first.description.as_ref(), NO_DESCRIPTION);
            let group = sanitize_or(first.group.as_ref(), UNKNOWN);
            let tbn_status = sanitize_or(first.tbn_status.as_ref(), UNKNOWN);
            let test_date = sanitize_or(first.test_date.as_ref(), UNKNOWN);

            let summary = card_summary(&allocator.tag(), &group, &case.id, &description);
            let doc = build_creation_description(
                &creation_summary_text(&tbn_status, &test_date),
                build_script_table(&case.rows),
            );
            let fields = issue_fields(self.directory.project(), &self.task_type, &summary, &doc);

            info!(test_case_id = %case.id, summary = %summary, "creating card");
            match self.retry.run("create", |_| self.tracker.create(&fields)) {
                Ok(key) => {
                    info!(test_case_id = %case.id, issue_key = %key, "created card");
                    allocator.advance();
                    report.created.push(CreatedCard {
                        test_case_id: case.id.clone(),
                        issue_key: key,
                        summary,
                    });
                }
                Err(e) => {
                    error!(
                        test_case_id = %case.id,
                        status = ?e.status(),
                        error = %e,
                        "giving up on card creation"
                    );
                    report.failed.push(case.id.clone());
                }
            }
        }

        report.next_running_number = allocator.peek().value();
        report
    }

    /// Refresh the description of every test case that already has a card.
    ///
    /// Failures are logged and not retried.
    pub fn update_cards(&self, cases: &[TestCase]) -> UpdateReport {
        let mut report = UpdateReport::default();

        for case in cases {
            if self.cancelled() {
                warn!(test_case_id = %case.id, "cancelled, stopping before this test case");
                report.cancelled = true;
                break;
            }

            let Some(key) = self.directory.find_by_test_case_id(&case.id) else {
                warn!(test_case_id = %case.id, "issue not found");
                report.not_found.push(case.id.clone());
                continue;
            };

            let bam_status = sanitize_or(case.first_row().bam_status.as_ref(), NOT_AVAILABLE);
            let doc = build_update_description(
                &update_summary_text(&bam_status),
                build_script_table(&case.rows),
            );

            let entry = ExistingCard {
                test_case_id: case.id.clone(),
                issue_key: key,
            };
            match self.tracker.update(&entry.issue_key, &description_update_body(&doc)) {
                Ok(()) => {
                    info!(test_case_id = %case.id, issue_key = %entry.issue_key, "updated description");
                    report.updated.push(entry);
                }
                Err(e) => {
                    error!(
                        test_case_id = %case.id,
                        issue_key = %entry.issue_key,
                        status = ?e.status(),
                        error = %e,
                        "failed to update description"
                    );
                    report.failed.push(entry);
                }
            }
        }

        report
    }

    /// Delete one issue. Not retried.
    pub fn delete_issue(&self, key: &IssueKey) -> bool {
        match self.tracker.delete(key) {
            Ok(()) => {
                info!(issue_key = %key, "deleted issue");
                true
            }
            Err(e) => {
                error!(issue_key = %key, status = ?e.status(), error = %e, "failed to delete issue");
                false
            }
        }
    }

    /// Delete `<prefix>-<start>` through `<prefix>-<end>`, inclusive.
    pub fn delete_range(&self, prefix: &str, start: u32, end: u32) -> Result<DeleteReport> {
        if prefix.trim().is_empty() {
            return Err(Error::InvalidInput("issue prefix must not be empty".to_string()));
        }
        if start > end {
            return Err(Error::InvalidInput(format!(
                "start of range ({}) is after its end ({})",
                start, end
            )));
        }

        let mut report = DeleteReport::default();
        for n in start..=end {
            if self.cancelled() {
                warn!(prefix, next = n, "cancelled, stopping range delete");
                break;
            }
            let key = IssueKey::new(format!("{}-{}", prefix, n));
            if self.delete_issue(&key) {
                report.deleted.push(key);
            } else {
                report.failed.push(key);
            }
        }
        Ok(report)
    }
}
