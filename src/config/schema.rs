//! KDL schema for `cardwright.kdl`.
//!
//! ```kdl
//! base-url "https://example.atlassian.net"
//! project "BTV"
//! task-type "Task"
//! bug-type "Bug"
//! defect-namespace "NPL"
//! link-type "Relates"
//! webhook-url "https://hooks.slack.com/services/..."
//! log-dir "logs"
//! username "tester@example.com"
//! api-token "..."
//!
//! folders {
//!     staging "cfg/Temp/Screenshots"
//!     results "cfg/Test_result"
//!     bugs "cfg/Bugs"
//!     cancelled "cfg/Canceled"
//!     archive "cfg/Archive"
//! }
//!
//! fields {
//!     remark "customfield_10058"
//!     tbn-test-date "customfield_10056"
//!     tbn-test-status "customfield_10057"
//!     bam-version "customfield_10062"
//! }
//!
//! retry {
//!     attempts 3
//!     delay-secs 2
//! }
//! ```
//!
//! Every node is optional; [`super::resolver`] fills in defaults.

use kdl::KdlDocument;

/// Evidence folders as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldersSection {
    pub staging: Option<String>,
    pub results: Option<String>,
    pub bugs: Option<String>,
    pub cancelled: Option<String>,
    pub archive: Option<String>,
}

/// Custom field ids as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldsSection {
    pub remark: Option<String>,
    pub tbn_test_date: Option<String>,
    pub tbn_test_status: Option<String>,
    pub bam_version: Option<String>,
}

/// Retry settings as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySection {
    pub attempts: Option<u32>,
    pub delay_secs: Option<u64>,
}

/// Raw contents of `cardwright.kdl`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub base_url: Option<String>,
    pub project: Option<String>,
    pub task_type: Option<String>,
    pub bug_type: Option<String>,
    pub defect_namespace: Option<String>,
    pub link_type: Option<String>,
    pub webhook_url: Option<String>,
    pub log_dir: Option<String>,
    pub username: Option<String>,
    pub api_token: Option<String>,
    pub folders: FoldersSection,
    pub fields: FieldsSection,
    pub retry: RetrySection,
}

/// First string argument of node `name`.
fn string_value(doc: &KdlDocument, name: &str) -> Option<String> {
    let node = doc.get(name)?;
    let entry = node.entries().first()?;
    entry.value().as_string().map(|s| s.to_string())
}

/// First integer argument of node `name`, if it is non-negative.
fn integer_value(doc: &KdlDocument, name: &str) -> Option<u64> {
    let node = doc.get(name)?;
    let entry = node.entries().first()?;
    let value = entry.value().as_integer()?;
    u64::try_from(value).ok()
}

impl ConfigFile {
    /// Parse from KDL text.
    pub fn parse(text: &str) -> Result<Self, String> {
        let doc: KdlDocument = text.parse().map_err(|e| format!("invalid KDL: {}", e))?;
        let config = Self::from_kdl(&doc);
        config.validate()?;
        Ok(config)
    }

    /// Read the known nodes of a KDL document. Unknown nodes are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = ConfigFile {
            base_url: string_value(doc, "base-url"),
            project: string_value(doc, "project"),
            task_type: string_value(doc, "task-type"),
            bug_type: string_value(doc, "bug-type"),
            defect_namespace: string_value(doc, "defect-namespace"),
            link_type: string_value(doc, "link-type"),
            webhook_url: string_value(doc, "webhook-url"),
            log_dir: string_value(doc, "log-dir"),
            username: string_value(doc, "username"),
            api_token: string_value(doc, "api-token"),
            ..Default::default()
        };

        if let Some(folders) = doc.get("folders").and_then(|n| n.children()) {
            config.folders = FoldersSection {
                staging: string_value(folders, "staging"),
                results: string_value(folders, "results"),
                bugs: string_value(folders, "bugs"),
                cancelled: string_value(folders, "cancelled"),
                archive: string_value(folders, "archive"),
            };
        }

        if let Some(fields) = doc.get("fields").and_then(|n| n.children()) {
            config.fields = FieldsSection {
                remark: string_value(fields, "remark"),
                tbn_test_date: string_value(fields, "tbn-test-date"),
                tbn_test_status: string_value(fields, "tbn-test-status"),
                bam_version: string_value(fields, "bam-version"),
            };
        }

        if let Some(retry) = doc.get("retry").and_then(|n| n.children()) {
            config.retry = RetrySection {
                attempts: integer_value(retry, "attempts").and_then(|n| u32::try_from(n).ok()),
                delay_secs: integer_value(retry, "delay-secs"),
            };
        }

        config
    }

    /// Validate the values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(attempts) = self.retry.attempts {
            if attempts == 0 {
                return Err("retry attempts must be at least 1".to_string());
            }
        }
        if let Some(ref url) = self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("base-url must start with http:// or https://, got {}", url));
            }
        }
        if let Some(ref ns) = self.defect_namespace {
            if ns.is_empty() || ns.contains(|c: char| c == '[' || c == ']') {
                return Err(format!("defect-namespace '{}' is not a valid tag prefix", ns));
            }
        }
        Ok(())
    }
}
