//! Screenshot evidence transport.
//!
//! Screenshots land in a shared staging folder while a tester works. After
//! an execution they are moved into a folder owned by the test case, renamed
//! `<test_case_id>_<seq>.<ext>` in capture order, and then uploaded to a
//! ticket. The staging folder is assumed to belong to one tester at a time.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::models::IssueKey;
use crate::retry::RetryPolicy;
use crate::tracker::TrackerClient;

/// File extensions treated as screenshots.
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn image_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// MIME type sent with an attachment.
pub fn mime_for(file_name: &str) -> &'static str {
    match Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Capture time of a file: birth time where the filesystem records it, else mtime.
fn capture_time(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Empty `dir` of regular files, or create it.
fn prepare_destination(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        info!(folder = %dir.display(), "created destination folder");
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                error!(folder = %dir.display(), error = %e, "failed to read destination entry");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => info!(file = %path.display(), "deleted existing file"),
            Err(e) => error!(file = %path.display(), error = %e, "failed to delete"),
        }
    }
    Ok(())
}

/// Rename, falling back to copy-and-delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// Move every staged screenshot into `destination`, renamed in capture order.
///
/// Any files already in `destination` are deleted first. Returns the
/// destination when at least one image was found, `None` when the staging
/// folder is missing, empty, or holds no images. A file that fails to move is
/// logged and skipped.
pub fn relocate(test_case_id: &str, staging: &Path, destination: &Path) -> Option<PathBuf> {
    if !staging.is_dir() {
        error!(staging = %staging.display(), "staging folder does not exist");
        return None;
    }

    let staged: Vec<PathBuf> = match fs::read_dir(staging) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            error!(staging = %staging.display(), error = %e, "failed to list staging folder");
            return None;
        }
    };
    if staged.is_empty() {
        error!(staging = %staging.display(), "no files found in staging folder");
        return None;
    }

    if let Err(e) = prepare_destination(destination) {
        error!(destination = %destination.display(), error = %e, "failed to prepare destination");
        return None;
    }

    let mut images: Vec<(SystemTime, PathBuf, String)> = staged
        .into_iter()
        .filter_map(|p| image_extension(&p).map(|ext| (capture_time(&p), p, ext)))
        .collect();
    if images.is_empty() {
        info!(test_case_id, "no image files in staging folder");
        return None;
    }
    images.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    for (idx, (_, path, ext)) in images.iter().enumerate() {
        let new_name = format!("{}_{:03}.{}", test_case_id, idx + 1, ext);
        let target = destination.join(&new_name);
        let old_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        match move_file(path, &target) {
            Ok(()) => info!(from = %old_name, to = %new_name, "moved and renamed"),
            Err(e) => error!(file = %old_name, error = %e, "failed to move"),
        }
    }

    Some(destination.to_path_buf())
}

/// What happened to each evidence file during upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub attached: Vec<String>,
    pub failed: Vec<String>,
}

impl UploadReport {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.failed.is_empty()
    }
}

/// Evidence files for `test_case_id` in `folder`, sorted by name descending.
pub fn evidence_files(folder: &Path, test_case_id: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match fs::read_dir(folder) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(test_case_id))
            })
            .collect(),
        Err(e) => {
            warn!(folder = %folder.display(), error = %e, "cannot list evidence folder");
            Vec::new()
        }
    };
    files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    files
}

/// Attach every evidence file for `test_case_id` in `folder` to `issue_key`.
///
/// Each file gets its own retry budget; a file that still fails is recorded
/// and the rest are attempted anyway.
pub fn upload(
    tracker: &dyn TrackerClient,
    issue_key: &IssueKey,
    folder: &Path,
    test_case_id: &str,
    policy: &RetryPolicy,
) -> UploadReport {
    let mut report = UploadReport::default();
    let files = evidence_files(folder, test_case_id);
    if files.is_empty() {
        info!(test_case_id, "no images found, nothing to attach");
        return report;
    }

    for path in files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(file = %file_name, error = %e, "failed to read evidence file");
                report.failed.push(file_name);
                continue;
            }
        };

        let mime = mime_for(&file_name);
        let result = policy.run("attach", |_| tracker.attach(issue_key, &bytes, &file_name, mime));
        match result {
            Ok(()) => {
                info!(issue_key = %issue_key, file = %file_name, "attached");
                report.attached.push(file_name);
            }
            Err(e) => {
                error!(
                    issue_key = %issue_key,
                    file = %file_name,
                    status = ?e.status(),
                    error = %e,
                    "failed to attach"
                );
                report.failed.push(file_name);
            }
        }
    }

    report
}
