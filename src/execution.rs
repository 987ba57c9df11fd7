//! Execution outcome processing.
//!
//! Turns one tester-entered outcome into evidence on disk, attachments on the
//! tracker, a remark on the main card and, for failures, a linked defect card.
//! Also hosts the smaller execution-time helpers: custom field updates and
//! archiving of old result folders.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use crate::card::{
    build_defect_description, build_remark_document, defect_summary, field_update_body,
    issue_fields,
};
use crate::config::{CustomFieldIds, FolderLayout};
use crate::directory::{NumberingScope, TicketDirectory};
use crate::evidence::{self, UploadReport};
use crate::models::{ExecutionOutcome, ExecutionStatus, IssueKey};
use crate::notify::Notifier;
use crate::retry::RetryPolicy;
use crate::tracker::TrackerClient;

/// Default age, in days, after which result folders are archived.
pub const DEFAULT_ARCHIVE_DAYS: u64 = 30;

/// Where an outcome ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Every required step succeeded
    Completed,
    /// The defect card could not be created; nothing after it ran
    FailedAtCreation,
    /// The remark on the main card could not be written
    FailedAtUpdate,
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionState::Completed => "completed",
            ExecutionState::FailedAtCreation => "failed at defect creation",
            ExecutionState::FailedAtUpdate => "failed at remark update",
        };
        write!(f, "{}", s)
    }
}

/// Everything that happened while processing one outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub test_case_id: String,
    pub issue_key: IssueKey,
    pub status: ExecutionStatus,
    pub state: ExecutionState,
    /// Folder the evidence was moved into, if any evidence was found
    pub evidence_folder: Option<PathBuf>,
    pub attachments: UploadReport,
    pub defect_key: Option<IssueKey>,
    /// `None` when no link was attempted
    pub linked: Option<bool>,
    pub remark_updated: bool,
    /// `None` when no notification was attempted
    pub notified: Option<bool>,
}

impl ExecutionReport {
    fn new(test_case_id: &str, issue_key: &IssueKey, status: ExecutionStatus) -> Self {
        Self {
            test_case_id: test_case_id.to_string(),
            issue_key: issue_key.clone(),
            status,
            state: ExecutionState::Completed,
            evidence_folder: None,
            attachments: UploadReport::default(),
            defect_key: None,
            linked: None,
            remark_updated: false,
            notified: None,
        }
    }
}

/// Tracker-side settings the processor needs.
#[derive(Debug, Clone)]
pub struct DefectSettings {
    pub project: String,
    pub bug_type: String,
    pub namespace: String,
    pub link_type: String,
}

/// Processes execution outcomes against one tracker.
pub struct OutcomeProcessor<'a> {
    tracker: &'a dyn TrackerClient,
    notifier: &'a dyn Notifier,
    directory: TicketDirectory<'a>,
    defects: DefectSettings,
    folders: FolderLayout,
    fields: CustomFieldIds,
    retry: RetryPolicy,
}

impl<'a> OutcomeProcessor<'a> {
    pub fn new(
        tracker: &'a dyn TrackerClient,
        notifier: &'a dyn Notifier,
        defects: DefectSettings,
        folders: FolderLayout,
        fields: CustomFieldIds,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            tracker,
            notifier,
            directory: TicketDirectory::new(tracker, defects.project.clone()),
            defects,
            folders,
            fields,
            retry,
        }
    }

    /// Record one outcome for `test_case_id` against its card `issue_key`.
    pub fn process_outcome(
        &self,
        test_case_id: &str,
        issue_key: &IssueKey,
        outcome: &ExecutionOutcome,
    ) -> ExecutionReport {
        info!(test_case_id, issue_key = %issue_key, status = %outcome.status, "processing outcome");
        match outcome.status {
            ExecutionStatus::Pass => {
                let folder = self.folders.results.join(test_case_id);
                self.record_on_card(test_case_id, issue_key, outcome, &folder)
            }
            ExecutionStatus::Cancel => {
                let folder = self.folders.cancelled.join(test_case_id);
                self.record_on_card(test_case_id, issue_key, outcome, &folder)
            }
            ExecutionStatus::Fail => self.file_defect(test_case_id, issue_key, outcome),
        }
    }

    /// Pass and cancel: evidence and remark both go to the main card.
    fn record_on_card(
        &self,
        test_case_id: &str,
        issue_key: &IssueKey,
        outcome: &ExecutionOutcome,
        folder: &Path,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::new(test_case_id, issue_key, outcome.status);

        report.evidence_folder = evidence::relocate(test_case_id, &self.folders.staging, folder);
        if let Some(ref dir) = report.evidence_folder {
            report.attachments =
                evidence::upload(self.tracker, issue_key, dir, test_case_id, &self.retry);
        }

        report.remark_updated = self.log_remark(issue_key, outcome);
        if !report.remark_updated {
            report.state = ExecutionState::FailedAtUpdate;
        }
        report
    }

    /// Fail: file a defect card, attach evidence to it and link it to the main card.
    fn file_defect(
        &self,
        test_case_id: &str,
        issue_key: &IssueKey,
        outcome: &ExecutionOutcome,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::new(test_case_id, issue_key, outcome.status);

        // Re-queried on every failure; nothing is cached between outcomes
        let scope = NumberingScope::new(self.defects.namespace.clone(), self.defects.bug_type.clone());
        let tag = self.directory.next_running_number(&scope).tag(&self.defects.namespace);

        let folder = self.folders.bugs.join(format!("{} - {}", tag, test_case_id));
        report.evidence_folder = evidence::relocate(test_case_id, &self.folders.staging, &folder);

        let summary = defect_summary(&tag, test_case_id, outcome.defect_title());
        let fields = issue_fields(
            &self.defects.project,
            &self.defects.bug_type,
            &summary,
            &build_defect_description(&outcome.remark),
        );
        let defect_key = match self.retry.run("create defect", |_| self.tracker.create(&fields)) {
            Ok(key) => {
                info!(test_case_id, defect_key = %key, summary = %summary, "defect created");
                key
            }
            Err(e) => {
                error!(
                    test_case_id,
                    status = ?e.status(),
                    error = %e,
                    "failed to create defect"
                );
                report.state = ExecutionState::FailedAtCreation;
                return report;
            }
        };

        if let Some(ref dir) = report.evidence_folder {
            report.attachments =
                evidence::upload(self.tracker, &defect_key, dir, test_case_id, &self.retry);
        }

        report.linked = Some(self.link_defect(issue_key, &defect_key));

        report.remark_updated = self.log_remark(issue_key, outcome);
        if !report.remark_updated {
            report.state = ExecutionState::FailedAtUpdate;
        }

        let message = format!("BUG issue {} created for test case {}", defect_key, test_case_id);
        report.notified = Some(match self.notifier.notify(&message) {
            Ok(()) => true,
            Err(e) => {
                warn!(test_case_id, defect_key = %defect_key, error = %e, "notification failed");
                false
            }
        });

        report.defect_key = Some(defect_key);
        report
    }

    fn link_defect(&self, main: &IssueKey, defect: &IssueKey) -> bool {
        match self.tracker.link(main, defect, &self.defects.link_type) {
            Ok(()) => {
                info!(issue_key = %main, defect_key = %defect, "linked defect");
                true
            }
            Err(e) => {
                error!(
                    issue_key = %main,
                    defect_key = %defect,
                    status = ?e.status(),
                    error = %e,
                    "failed to link defect"
                );
                false
            }
        }
    }

    /// Overwrite the remark field on `issue_key`. Not retried.
    fn log_remark(&self, issue_key: &IssueKey, outcome: &ExecutionOutcome) -> bool {
        let doc = build_remark_document(outcome.status.as_str(), &outcome.test_date, &outcome.remark);
        let body = field_update_body(&self.fields.remark, &doc);
        match self.tracker.update(issue_key, &body) {
            Ok(()) => {
                info!(issue_key = %issue_key, "logged result to remark");
                true
            }
            Err(e) => {
                error!(
                    issue_key = %issue_key,
                    status = ?e.status(),
                    error = %e,
                    "failed to log result to remark"
                );
                false
            }
        }
    }
}

/// Values for the execution custom fields. Unset values are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomFieldValues {
    pub tbn_test_date: Option<String>,
    pub tbn_test_status: Option<String>,
    pub bam_version: Option<String>,
}

impl CustomFieldValues {
    pub fn is_empty(&self) -> bool {
        self.tbn_test_date.is_none() && self.tbn_test_status.is_none() && self.bam_version.is_none()
    }

    /// `{"fields": {...}}` body; the status field is a select option.
    pub fn to_body(&self, ids: &CustomFieldIds) -> Value {
        let mut fields = Map::new();
        if let Some(ref date) = self.tbn_test_date {
            fields.insert(ids.tbn_test_date.clone(), json!(date));
        }
        if let Some(ref status) = self.tbn_test_status {
            fields.insert(ids.tbn_test_status.clone(), json!({ "value": status }));
        }
        if let Some(ref bam) = self.bam_version {
            fields.insert(ids.bam_version.clone(), json!(bam));
        }
        json!({ "fields": fields })
    }
}

/// Set the TBN date, TBN status and BAM version fields of `issue_key`. Not retried.
pub fn update_custom_fields(
    tracker: &dyn TrackerClient,
    ids: &CustomFieldIds,
    issue_key: &IssueKey,
    values: &CustomFieldValues,
) -> bool {
    match tracker.update(issue_key, &values.to_body(ids)) {
        Ok(()) => {
            info!(issue_key = %issue_key, "updated custom fields");
            true
        }
        Err(e) => {
            error!(
                issue_key = %issue_key,
                status = ?e.status(),
                error = %e,
                "failed to update custom fields"
            );
            false
        }
    }
}

/// Move every result folder last modified more than `days_old` days ago into
/// `archive_dir`. Returns the new locations.
pub fn archive_old_results(results_dir: &Path, archive_dir: &Path, days_old: u64) -> Vec<PathBuf> {
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(days_old.saturating_mul(24 * 60 * 60)))
        .unwrap_or(SystemTime::UNIX_EPOCH);
    archive_older_than(results_dir, archive_dir, cutoff)
}

fn archive_older_than(results_dir: &Path, archive_dir: &Path, cutoff: SystemTime) -> Vec<PathBuf> {
    let mut archived = Vec::new();

    let entries = match fs::read_dir(results_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(results = %results_dir.display(), error = %e, "cannot list results folder");
            return archived;
        }
    };

    if let Err(e) = fs::create_dir_all(archive_dir) {
        error!(archive = %archive_dir.display(), error = %e, "cannot create archive folder");
        return archived;
    }

    let mut folders: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    folders.sort();

    for folder in folders {
        let modified = match fs::metadata(&folder).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "cannot read modification time");
                continue;
            }
        };
        if modified >= cutoff {
            continue;
        }

        let Some(name) = folder.file_name() else {
            continue;
        };
        let target = archive_dir.join(name);
        if target.exists() {
            warn!(folder = %folder.display(), target = %target.display(), "already archived, skipped");
            continue;
        }
        match fs::rename(&folder, &target) {
            Ok(()) => {
                info!(folder = %name.to_string_lossy(), "archived");
                archived.push(target);
            }
            Err(e) => error!(folder = %folder.display(), error = %e, "failed to archive"),
        }
    }

    archived
}
