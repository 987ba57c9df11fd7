//! Command implementations for the cardwright CLI.
//!
//! Each function takes resolved [`Settings`], does its work and returns a
//! result struct implementing [`CommandResult`]. Commands that talk to the
//! tracker build their client here, so the rest of the library only ever
//! sees a `&dyn TrackerClient`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use serde::Serialize;

use crate::config::{Resolved, Settings};
use crate::evidence;
use crate::execution::{
    self, CustomFieldValues, DefectSettings, ExecutionReport, OutcomeProcessor,
};
use crate::models::{ExecutionOutcome, IssueKey};
use crate::notify;
use crate::reconcile::{CreateReport, DeleteReport, Reconciler, UpdateReport};
use crate::sheet;
use crate::tracker::HttpTracker;
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait CommandResult {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json_of<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

fn connect(settings: &Settings) -> Result<HttpTracker> {
    let base_url = settings.require_base_url()?;
    let credentials = settings.require_credentials()?;
    Ok(HttpTracker::new(base_url, &credentials)?)
}

fn reconciler<'a>(tracker: &'a HttpTracker, settings: &Settings, cancel: &'a AtomicBool) -> Reconciler<'a> {
    Reconciler::new(
        tracker,
        settings.project.clone(),
        settings.task_type.clone(),
        settings.retry,
    )
    .with_cancel(cancel)
}

// === create ===

#[derive(Debug, Serialize)]
pub struct CreateResult {
    pub file: PathBuf,
    pub sheet: String,
    pub module: String,
    pub test_cases: usize,
    #[serde(flatten)]
    pub report: CreateReport,
}

impl CommandResult for CreateResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!(
            "{} test case(s) in sheet '{}' (module {}):\n",
            self.test_cases, self.sheet, self.module
        );
        for card in &self.report.created {
            let _ = writeln!(out, "  created  {}  {}", card.issue_key, card.summary);
        }
        for card in &self.report.skipped {
            let _ = writeln!(out, "  exists   {}  {}", card.issue_key, card.test_case_id);
        }
        for id in &self.report.failed {
            let _ = writeln!(out, "  FAILED   {}", id);
        }
        let _ = write!(
            out,
            "{} created, {} skipped, {} failed",
            self.report.created.len(),
            self.report.skipped.len(),
            self.report.failed.len()
        );
        if self.report.cancelled {
            out.push_str(" (cancelled)");
        }
        out
    }
}

/// Create one card per test case in `sheet_name` that has no ticket yet.
pub fn create(
    settings: &Settings,
    file: &Path,
    sheet_name: &str,
    module: &str,
    cancel: &AtomicBool,
) -> Result<CreateResult> {
    let module = module.trim();
    if module.is_empty() {
        return Err(Error::InvalidInput("module code must not be empty".to_string()));
    }
    let cases = sheet::load_test_cases(file, sheet_name)?;
    let tracker = connect(settings)?;
    let report = reconciler(&tracker, settings, cancel).create_cards(&cases, module);

    Ok(CreateResult {
        file: file.to_path_buf(),
        sheet: sheet_name.to_string(),
        module: module.to_string(),
        test_cases: cases.len(),
        report,
    })
}

// === update ===

#[derive(Debug, Serialize)]
pub struct UpdateResult {
    pub file: PathBuf,
    pub sheet: String,
    pub test_cases: usize,
    #[serde(flatten)]
    pub report: UpdateReport,
}

impl CommandResult for UpdateResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("{} test case(s) in sheet '{}':\n", self.test_cases, self.sheet);
        for card in &self.report.updated {
            let _ = writeln!(out, "  updated    {}  {}", card.issue_key, card.test_case_id);
        }
        for id in &self.report.not_found {
            let _ = writeln!(out, "  not found  {}", id);
        }
        for card in &self.report.failed {
            let _ = writeln!(out, "  FAILED     {}  {}", card.issue_key, card.test_case_id);
        }
        let _ = write!(
            out,
            "{} updated, {} not found, {} failed",
            self.report.updated.len(),
            self.report.not_found.len(),
            self.report.failed.len()
        );
        if self.report.cancelled {
            out.push_str(" (cancelled)");
        }
        out
    }
}

/// Refresh the description of every test case in `sheet_name` that has a card.
pub fn update(settings: &Settings, file: &Path, sheet_name: &str, cancel: &AtomicBool) -> Result<UpdateResult> {
    let cases = sheet::load_test_cases(file, sheet_name)?;
    let tracker = connect(settings)?;
    let report = reconciler(&tracker, settings, cancel).update_cards(&cases);

    Ok(UpdateResult {
        file: file.to_path_buf(),
        sheet: sheet_name.to_string(),
        test_cases: cases.len(),
        report,
    })
}

// === execute ===

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ExecuteResult(pub ExecutionReport);

impl CommandResult for ExecuteResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let r = &self.0;
        let mut out = format!("{} on {}: {} ({})\n", r.test_case_id, r.issue_key, r.status, r.state);
        match &r.evidence_folder {
            Some(folder) => {
                let _ = writeln!(out, "  evidence:  {}", folder.display());
            }
            None => out.push_str("  evidence:  none\n"),
        }
        let _ = writeln!(
            out,
            "  attached:  {} ({} failed)",
            r.attachments.attached.len(),
            r.attachments.failed.len()
        );
        if let Some(ref key) = r.defect_key {
            let _ = writeln!(out, "  defect:    {}", key);
        }
        if let Some(linked) = r.linked {
            let _ = writeln!(out, "  linked:    {}", if linked { "yes" } else { "no" });
        }
        if let Some(notified) = r.notified {
            let _ = writeln!(out, "  notified:  {}", if notified { "yes" } else { "no" });
        }
        let _ = write!(out, "  remark:    {}", if r.remark_updated { "updated" } else { "not updated" });
        out
    }
}

/// Record one execution outcome against `issue_key`.
pub fn execute(
    settings: &Settings,
    test_case_id: &str,
    issue_key: &str,
    outcome: &ExecutionOutcome,
) -> Result<ExecuteResult> {
    let test_case_id = test_case_id.trim();
    if test_case_id.is_empty() {
        return Err(Error::InvalidInput("test case id must not be empty".to_string()));
    }
    let tracker = connect(settings)?;
    let notifier = notify::from_config(settings.webhook_url.as_deref())?;
    let processor = OutcomeProcessor::new(
        &tracker,
        notifier.as_ref(),
        DefectSettings {
            project: settings.project.clone(),
            bug_type: settings.bug_type.clone(),
            namespace: settings.defect_namespace.clone(),
            link_type: settings.link_type.clone(),
        },
        settings.folders.clone(),
        settings.fields.clone(),
        settings.retry,
    );
    let report = processor.process_outcome(test_case_id, &IssueKey::new(issue_key.trim()), outcome);
    Ok(ExecuteResult(report))
}

// === fields ===

#[derive(Debug, Serialize)]
pub struct FieldsResult {
    pub issue_key: IssueKey,
    pub updated: bool,
}

impl CommandResult for FieldsResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        if self.updated {
            format!("Updated custom fields on {}", self.issue_key)
        } else {
            format!("Failed to update custom fields on {}", self.issue_key)
        }
    }
}

/// Set the TBN date, TBN status and BAM version fields of `issue_key`.
pub fn fields(settings: &Settings, issue_key: &str, values: &CustomFieldValues) -> Result<FieldsResult> {
    if values.is_empty() {
        return Err(Error::InvalidInput(
            "nothing to update (pass --tbn-date, --tbn-status or --bam-version)".to_string(),
        ));
    }
    let tracker = connect(settings)?;
    let key = IssueKey::new(issue_key.trim());
    let updated = execution::update_custom_fields(&tracker, &settings.fields, &key, values);
    Ok(FieldsResult { issue_key: key, updated })
}

// === delete ===

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct DeleteResult(pub DeleteReport);

impl CommandResult for DeleteResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut out = String::new();
        for key in &self.0.deleted {
            let _ = writeln!(out, "  deleted  {}", key);
        }
        for key in &self.0.failed {
            let _ = writeln!(out, "  FAILED   {}", key);
        }
        let _ = write!(out, "{} deleted, {} failed", self.0.deleted.len(), self.0.failed.len());
        out
    }
}

/// Delete a single issue.
pub fn delete_one(settings: &Settings, issue_key: &str, cancel: &AtomicBool) -> Result<DeleteResult> {
    let tracker = connect(settings)?;
    let key = IssueKey::new(issue_key.trim());
    let mut report = DeleteReport::default();
    if reconciler(&tracker, settings, cancel).delete_issue(&key) {
        report.deleted.push(key);
    } else {
        report.failed.push(key);
    }
    Ok(DeleteResult(report))
}

/// Delete `<prefix>-<start>` through `<prefix>-<end>`.
pub fn delete_range(
    settings: &Settings,
    prefix: &str,
    start: u32,
    end: u32,
    cancel: &AtomicBool,
) -> Result<DeleteResult> {
    if start > end {
        return Err(Error::InvalidInput(format!(
            "start of range ({}) is after its end ({})",
            start, end
        )));
    }
    let tracker = connect(settings)?;
    let report = reconciler(&tracker, settings, cancel).delete_range(prefix.trim(), start, end)?;
    Ok(DeleteResult(report))
}

// === archive ===

#[derive(Debug, Serialize)]
pub struct ArchiveResult {
    pub results_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub days_old: u64,
    pub archived: Vec<PathBuf>,
}

impl CommandResult for ArchiveResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        if self.archived.is_empty() {
            return format!(
                "No result folders older than {} days in {}",
                self.days_old,
                self.results_dir.display()
            );
        }
        let mut out = format!(
            "Archived {} folder(s) to {}:\n",
            self.archived.len(),
            self.archive_dir.display()
        );
        for path in &self.archived {
            let _ = writeln!(out, "  {}", path.display());
        }
        out.trim_end().to_string()
    }
}

/// Move result folders older than `days_old` days into the archive folder.
pub fn archive(settings: &Settings, days_old: u64) -> Result<ArchiveResult> {
    let results_dir = settings.folders.results.clone();
    let archive_dir = settings.folders.archive.clone();
    let archived = execution::archive_old_results(&results_dir, &archive_dir, days_old);
    Ok(ArchiveResult {
        results_dir,
        archive_dir,
        days_old,
        archived,
    })
}

// === relocate ===

/// Which evidence folder a local relocate targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceTarget {
    Results,
    Bugs,
    Cancelled,
}

#[derive(Debug, Serialize)]
pub struct RelocateResult {
    pub test_case_id: String,
    pub target: EvidenceTarget,
    pub folder: Option<PathBuf>,
    pub files: Vec<String>,
}

impl CommandResult for RelocateResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        match &self.folder {
            Some(folder) => {
                let mut out = format!("Moved {} file(s) to {}:\n", self.files.len(), folder.display());
                for f in &self.files {
                    let _ = writeln!(out, "  {}", f);
                }
                out.trim_end().to_string()
            }
            None => format!("No staged evidence for {}", self.test_case_id),
        }
    }
}

/// Move staged screenshots into the folder for `target` without touching the tracker.
pub fn relocate(
    settings: &Settings,
    test_case_id: &str,
    target: EvidenceTarget,
    bug_folder: Option<&str>,
) -> Result<RelocateResult> {
    let test_case_id = test_case_id.trim();
    if test_case_id.is_empty() {
        return Err(Error::InvalidInput("test case id must not be empty".to_string()));
    }
    let destination = match target {
        EvidenceTarget::Results => settings.folders.results.join(test_case_id),
        EvidenceTarget::Cancelled => settings.folders.cancelled.join(test_case_id),
        EvidenceTarget::Bugs => settings
            .folders
            .bugs
            .join(bug_folder.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(test_case_id)),
    };

    let folder = evidence::relocate(test_case_id, &settings.folders.staging, &destination);
    let files = match &folder {
        Some(dir) => {
            let mut names: Vec<String> = evidence::evidence_files(dir, test_case_id)
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
                .collect();
            names.sort();
            names
        }
        None => Vec::new(),
    };

    Ok(RelocateResult {
        test_case_id: test_case_id.to_string(),
        target,
        folder,
        files,
    })
}

// === config show ===

#[derive(Debug, Serialize)]
pub struct SourcedValue {
    pub value: String,
    pub source: String,
}

impl SourcedValue {
    fn from_resolved(resolved: &Resolved<String>) -> Self {
        Self {
            value: resolved.value.clone(),
            source: resolved.source.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigShowResult {
    pub config_path: Option<PathBuf>,
    pub base_url: Option<SourcedValue>,
    pub project: String,
    pub task_type: String,
    pub bug_type: String,
    pub defect_namespace: String,
    pub link_type: String,
    pub webhook_url: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub username: Option<SourcedValue>,
    pub api_token: Option<SourcedValue>,
    pub folders: FoldersView,
    pub fields: FieldsView,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct FoldersView {
    pub staging: PathBuf,
    pub results: PathBuf,
    pub bugs: PathBuf,
    pub cancelled: PathBuf,
    pub archive: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct FieldsView {
    pub remark: String,
    pub tbn_test_date: String,
    pub tbn_test_status: String,
    pub bam_version: String,
}

fn sourced_or_unset(value: &Option<SourcedValue>) -> String {
    match value {
        Some(v) => format!("{} ({})", v.value, v.source),
        None => "(not set)".to_string(),
    }
}

impl CommandResult for ConfigShowResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "config file:       {}",
            self.config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none, using defaults)".to_string())
        );
        let _ = writeln!(out, "base-url:          {}", sourced_or_unset(&self.base_url));
        let _ = writeln!(out, "project:           {}", self.project);
        let _ = writeln!(out, "task-type:         {}", self.task_type);
        let _ = writeln!(out, "bug-type:          {}", self.bug_type);
        let _ = writeln!(out, "defect-namespace:  {}", self.defect_namespace);
        let _ = writeln!(out, "link-type:         {}", self.link_type);
        let _ = writeln!(
            out,
            "webhook-url:       {}",
            self.webhook_url.as_deref().unwrap_or("(not set)")
        );
        let _ = writeln!(
            out,
            "log-dir:           {}",
            self.log_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(stderr only)".to_string())
        );
        let _ = writeln!(out, "username:          {}", sourced_or_unset(&self.username));
        let _ = writeln!(out, "api-token:         {}", sourced_or_unset(&self.api_token));
        out.push_str("folders:\n");
        let _ = writeln!(out, "  staging:         {}", self.folders.staging.display());
        let _ = writeln!(out, "  results:         {}", self.folders.results.display());
        let _ = writeln!(out, "  bugs:            {}", self.folders.bugs.display());
        let _ = writeln!(out, "  cancelled:       {}", self.folders.cancelled.display());
        let _ = writeln!(out, "  archive:         {}", self.folders.archive.display());
        out.push_str("fields:\n");
        let _ = writeln!(out, "  remark:          {}", self.fields.remark);
        let _ = writeln!(out, "  tbn-test-date:   {}", self.fields.tbn_test_date);
        let _ = writeln!(out, "  tbn-test-status: {}", self.fields.tbn_test_status);
        let _ = writeln!(out, "  bam-version:     {}", self.fields.bam_version);
        let _ = write!(
            out,
            "retry:             {} attempt(s), {}s apart",
            self.retry_attempts, self.retry_delay_secs
        );
        out
    }
}

/// Show the resolved configuration. The API token is masked.
pub fn config_show(settings: &Settings) -> Result<ConfigShowResult> {
    let api_token = match (&settings.api_token, settings.masked_token()) {
        (Some(resolved), Some(masked)) => Some(SourcedValue {
            value: masked,
            source: resolved.source.to_string(),
        }),
        _ => None,
    };

    Ok(ConfigShowResult {
        config_path: settings.config_path.clone(),
        base_url: settings.base_url.as_ref().map(SourcedValue::from_resolved),
        project: settings.project.clone(),
        task_type: settings.task_type.clone(),
        bug_type: settings.bug_type.clone(),
        defect_namespace: settings.defect_namespace.clone(),
        link_type: settings.link_type.clone(),
        webhook_url: settings.webhook_url.clone(),
        log_dir: settings.log_dir.clone(),
        username: settings.username.as_ref().map(SourcedValue::from_resolved),
        api_token,
        folders: FoldersView {
            staging: settings.folders.staging.clone(),
            results: settings.folders.results.clone(),
            bugs: settings.folders.bugs.clone(),
            cancelled: settings.folders.cancelled.clone(),
            archive: settings.folders.archive.clone(),
        },
        fields: FieldsView {
            remark: settings.fields.remark.clone(),
            tbn_test_date: settings.fields.tbn_test_date.clone(),
            tbn_test_status: settings.fields.tbn_test_status.clone(),
            bam_version: settings.fields.bam_version.clone(),
        },
        retry_attempts: settings.retry.max_attempts,
        retry_delay_secs: settings.retry.delay.as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValueSource;
    use std::fs;
    use tempfile::TempDir;

    fn local_settings(root: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.folders.staging = root.join("staging");
        settings.folders.results = root.join("results");
        settings.folders.bugs = root.join("bugs");
        settings.folders.cancelled = root.join("cancelled");
        settings.folders.archive = root.join("archive");
        settings
    }

    #[test]
    fn test_config_show_masks_token() {
        let mut settings = Settings::default();
        settings.api_token = Some(Resolved::new(
            "ATATT3xFfGF0secretsecret9Zq1".to_string(),
            ValueSource::EnvVar("CW_API_TOKEN".to_string()),
        ));
        let result = config_show(&settings).unwrap();
        let json = result.to_json();

        assert!(!json.contains("secretsecret"));
        assert!(json.contains("ATAT...9Zq1"));
        assert!(json.contains("env:CW_API_TOKEN"));
        assert!(result.to_human().contains("api-token:         ATAT...9Zq1 (env:CW_API_TOKEN)"));
    }

    #[test]
    fn test_tracker_commands_need_base_url() {
        let settings = Settings::default();
        let cancel = AtomicBool::new(false);
        let err = delete_one(&settings, "BTV-1", &cancel).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("base-url"));
    }

    #[test]
    fn test_fields_requires_a_value() {
        let err = fields(&Settings::default(), "BTV-1", &CustomFieldValues::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_delete_range_rejects_reversed_before_connecting() {
        let cancel = AtomicBool::new(false);
        let err = delete_range(&Settings::default(), "BTV", 9, 3, &cancel).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_relocate_to_named_bug_folder() {
        let temp = TempDir::new().unwrap();
        let settings = local_settings(temp.path());
        fs::create_dir_all(&settings.folders.staging).unwrap();
        fs::write(settings.folders.staging.join("a.png"), "a").unwrap();

        let result = relocate(&settings, "TC_X", EvidenceTarget::Bugs, Some("NPL004 - TC_X")).unwrap();
        let expected = settings.folders.bugs.join("NPL004 - TC_X");
        assert_eq!(result.folder.as_deref(), Some(expected.as_path()));
        assert_eq!(result.files, vec!["TC_X_001.png".to_string()]);
    }

    #[test]
    fn test_relocate_without_staging() {
        let temp = TempDir::new().unwrap();
        let settings = local_settings(temp.path());
        let result = relocate(&settings, "TC_X", EvidenceTarget::Results, None).unwrap();
        assert_eq!(result.folder, None);
        assert!(result.to_human().contains("No staged evidence"));
    }

    #[test]
    fn test_archive_reports_dirs() {
        let temp = TempDir::new().unwrap();
        let settings = local_settings(temp.path());
        let result = archive(&settings, 30).unwrap();
        assert!(result.archived.is_empty());
        assert!(result.to_human().starts_with("No result folders older than 30 days"));
    }
}
