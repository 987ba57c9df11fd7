//! Configuration resolution with precedence and source tracking.
//!
//! ## Config file lookup (first hit wins)
//!
//! 1. `--config <path>` (must exist)
//! 2. `CW_CONFIG` environment variable (must exist)
//! 3. `./cardwright.kdl`
//! 4. `~/.config/cardwright/cardwright.kdl`
//!
//! No file at all is fine: every setting has a default except the site URL
//! and the credentials, which are only required by commands that talk to the
//! tracker.
//!
//! ## Credential precedence (highest to lowest)
//!
//! 1. `CW_USERNAME` / `CW_API_TOKEN` environment variables
//! 2. `username` / `api-token` in the config file

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::schema::ConfigFile;
use crate::retry::RetryPolicy;
use crate::tracker::Credentials;
use crate::{Error, Result};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "CW_CONFIG";
/// Environment variable overriding the tracker site URL.
pub const BASE_URL_ENV: &str = "CW_BASE_URL";
/// Environment variable overriding the tracker username.
pub const USERNAME_ENV: &str = "CW_USERNAME";
/// Environment variable overriding the tracker API token.
pub const API_TOKEN_ENV: &str = "CW_API_TOKEN";

/// Config file name looked up in the working directory and the user config dir.
pub const CONFIG_FILE_NAME: &str = "cardwright.kdl";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from the config file
    File,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::File => write!(f, "file"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Where evidence lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    /// Screenshot capture destination
    pub staging: PathBuf,
    /// One subfolder per passed test case
    pub results: PathBuf,
    /// One subfolder per filed defect
    pub bugs: PathBuf,
    /// One subfolder per cancelled test case
    pub cancelled: PathBuf,
    /// Old result folders are moved here
    pub archive: PathBuf,
}

impl Default for FolderLayout {
    fn default() -> Self {
        Self {
            staging: PathBuf::from("cfg/Temp/Screenshots"),
            results: PathBuf::from("cfg/Test_result"),
            bugs: PathBuf::from("cfg/Bugs"),
            cancelled: PathBuf::from("cfg/Canceled"),
            archive: PathBuf::from("cfg/Archive"),
        }
    }
}

/// Tracker custom field ids written by the execution commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomFieldIds {
    pub remark: String,
    pub tbn_test_date: String,
    pub tbn_test_status: String,
    pub bam_version: String,
}

impl Default for CustomFieldIds {
    fn default() -> Self {
        Self {
            remark: "customfield_10058".to_string(),
            tbn_test_date: "customfield_10056".to_string(),
            tbn_test_status: "customfield_10057".to_string(),
            bam_version: "customfield_10062".to_string(),
        }
    }
}

/// Fully resolved settings for one process.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Config file that was read, if any
    pub config_path: Option<PathBuf>,
    pub base_url: Option<Resolved<String>>,
    pub project: String,
    pub task_type: String,
    pub bug_type: String,
    pub defect_namespace: String,
    pub link_type: String,
    pub webhook_url: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub username: Option<Resolved<String>>,
    pub api_token: Option<Resolved<String>>,
    pub folders: FolderLayout,
    pub fields: CustomFieldIds,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: None,
            base_url: None,
            project: "BTV".to_string(),
            task_type: "Task".to_string(),
            bug_type: "Bug".to_string(),
            defect_namespace: "NPL".to_string(),
            link_type: "Relates".to_string(),
            webhook_url: None,
            log_dir: None,
            username: None,
            api_token: None,
            folders: FolderLayout::default(),
            fields: CustomFieldIds::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    /// Tracker site URL, or a configuration error naming how to set it.
    pub fn require_base_url(&self) -> Result<&str> {
        self.base_url.as_ref().map(|r| r.value.as_str()).ok_or_else(|| {
            Error::Config(format!(
                "tracker base-url is not configured (set `base-url` in {} or {})",
                CONFIG_FILE_NAME, BASE_URL_ENV
            ))
        })
    }

    /// Credentials for the tracker, or a configuration error.
    pub fn require_credentials(&self) -> Result<Credentials> {
        match (&self.username, &self.api_token) {
            (Some(user), Some(token)) => Ok(Credentials::new(&user.value, &token.value)),
            _ => Err(Error::Config(format!(
                "tracker credentials are not configured (set {} and {}, or `username`/`api-token` in {})",
                USERNAME_ENV, API_TOKEN_ENV, CONFIG_FILE_NAME
            ))),
        }
    }

    /// API token with the middle hidden, for display.
    ///
    /// Tokens of 12 characters or fewer are hidden entirely.
    pub fn masked_token(&self) -> Option<String> {
        self.api_token.as_ref().map(|r| {
            let chars: Vec<char> = r.value.chars().collect();
            if chars.len() <= 12 {
                return "****".to_string();
            }
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        })
    }
}

/// Find the config file to read.
///
/// An explicitly named file (flag or env var) must exist; the implicit
/// locations are skipped when absent.
pub fn locate_config(
    explicit: Option<&Path>,
    cwd: &Path,
    user_config_dir: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<PathBuf>> {
    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| env(CONFIG_PATH_ENV).filter(|s| !s.is_empty()).map(PathBuf::from));
    if let Some(path) = named {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "config file does not exist: {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    let local = cwd.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(Some(local));
    }

    if let Some(dir) = user_config_dir {
        let user = dir.join("cardwright").join(CONFIG_FILE_NAME);
        if user.is_file() {
            return Ok(Some(user));
        }
    }

    Ok(None)
}

fn from_env_or_file(
    env: &dyn Fn(&str) -> Option<String>,
    var: &str,
    file_value: Option<String>,
) -> Option<Resolved<String>> {
    if let Some(value) = env(var).filter(|v| !v.is_empty()) {
        return Some(Resolved::new(value, ValueSource::EnvVar(var.to_string())));
    }
    file_value
        .filter(|v| !v.is_empty())
        .map(|v| Resolved::new(v, ValueSource::File))
}

/// Apply defaults and environment overrides to a parsed config file.
pub fn settings_from(
    file: ConfigFile,
    config_path: Option<PathBuf>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Settings {
    let defaults = Settings::default();
    let default_folders = defaults.folders.clone();
    let default_fields = defaults.fields.clone();

    let retry = RetryPolicy::new(
        file.retry.attempts.unwrap_or(defaults.retry.max_attempts),
        file.retry
            .delay_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.retry.delay),
    );

    Settings {
        config_path,
        base_url: from_env_or_file(env, BASE_URL_ENV, file.base_url),
        project: file.project.unwrap_or(defaults.project),
        task_type: file.task_type.unwrap_or(defaults.task_type),
        bug_type: file.bug_type.unwrap_or(defaults.bug_type),
        defect_namespace: file.defect_namespace.unwrap_or(defaults.defect_namespace),
        link_type: file.link_type.unwrap_or(defaults.link_type),
        webhook_url: file.webhook_url.filter(|u| !u.trim().is_empty()),
        log_dir: file.log_dir.map(PathBuf::from),
        username: from_env_or_file(env, USERNAME_ENV, file.username),
        api_token: from_env_or_file(env, API_TOKEN_ENV, file.api_token),
        folders: FolderLayout {
            staging: file.folders.staging.map(PathBuf::from).unwrap_or(default_folders.staging),
            results: file.folders.results.map(PathBuf::from).unwrap_or(default_folders.results),
            bugs: file.folders.bugs.map(PathBuf::from).unwrap_or(default_folders.bugs),
            cancelled: file
                .folders
                .cancelled
                .map(PathBuf::from)
                .unwrap_or(default_folders.cancelled),
            archive: file.folders.archive.map(PathBuf::from).unwrap_or(default_folders.archive),
        },
        fields: CustomFieldIds {
            remark: file.fields.remark.unwrap_or(default_fields.remark),
            tbn_test_date: file.fields.tbn_test_date.unwrap_or(default_fields.tbn_test_date),
            tbn_test_status: file
                .fields
                .tbn_test_status
                .unwrap_or(default_fields.tbn_test_status),
            bam_version: file.fields.bam_version.unwrap_or(default_fields.bam_version),
        },
        retry,
    }
}

/// Resolve settings from explicit inputs (used directly by tests).
pub fn resolve_settings_with(
    explicit: Option<&Path>,
    cwd: &Path,
    user_config_dir: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let path = locate_config(explicit, cwd, user_config_dir, env)?;
    let file = match &path {
        Some(p) => {
            let text = std::fs::read_to_string(p)?;
            ConfigFile::parse(&text)
                .map_err(|e| Error::Config(format!("{}: {}", p.display(), e)))?
        }
        None => ConfigFile::default(),
    };
    Ok(settings_from(file, path, env))
}

/// Resolve settings for this process.
pub fn resolve_settings(explicit: Option<&Path>) -> Result<Settings> {
    let cwd = std::env::current_dir()?;
    let user_dir = dirs::config_dir();
    resolve_settings_with(explicit, &cwd, user_dir.as_deref(), &|name: &str| {
        std::env::var(name).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_any_file() {
        let cwd = TempDir::new().unwrap();
        let settings = resolve_settings_with(None, cwd.path(), None, &env_of(&[])).unwrap();

        assert_eq!(settings.config_path, None);
        assert_eq!(settings.project, "BTV");
        assert_eq!(settings.defect_namespace, "NPL");
        assert_eq!(settings.link_type, "Relates");
        assert_eq!(settings.fields.remark, "customfield_10058");
        assert_eq!(settings.retry, RetryPolicy::default());
        assert!(settings.require_base_url().is_err());
        assert!(settings.require_credentials().is_err());
    }

    #[test]
    fn test_local_file_is_found() {
        let cwd = TempDir::new().unwrap();
        fs::write(
            cwd.path().join(CONFIG_FILE_NAME),
            "project \"QA\"\nbase-url \"https://qa.example.net\"\n",
        )
        .unwrap();

        let settings = resolve_settings_with(None, cwd.path(), None, &env_of(&[])).unwrap();
        assert_eq!(settings.project, "QA");
        assert_eq!(settings.require_base_url().unwrap(), "https://qa.example.net");
        assert_eq!(settings.base_url.unwrap().source, ValueSource::File);
    }

    #[test]
    fn test_user_config_dir_fallback() {
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let dir = home.path().join("cardwright");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE_NAME), "project \"HOME\"").unwrap();

        let settings =
            resolve_settings_with(None, cwd.path(), Some(home.path()), &env_of(&[])).unwrap();
        assert_eq!(settings.project, "HOME");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let cwd = TempDir::new().unwrap();
        let missing = cwd.path().join("nope.kdl");
        let err = resolve_settings_with(Some(&missing), cwd.path(), None, &env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_env_config_path() {
        let cwd = TempDir::new().unwrap();
        let path = cwd.path().join("other.kdl");
        fs::write(&path, "project \"ENV\"").unwrap();
        let path_str = path.to_string_lossy().to_string();

        let settings = resolve_settings_with(
            None,
            cwd.path(),
            None,
            &env_of(&[(CONFIG_PATH_ENV, path_str.as_str())]),
        )
        .unwrap();
        assert_eq!(settings.project, "ENV");
    }

    #[test]
    fn test_env_credentials_override_file() {
        let file = ConfigFile {
            username: Some("file-user".to_string()),
            api_token: Some("file-token".to_string()),
            ..Default::default()
        };
        let settings = settings_from(file, None, &env_of(&[(USERNAME_ENV, "env-user")]));

        let user = settings.username.clone().unwrap();
        assert_eq!(user.value, "env-user");
        assert_eq!(user.source, ValueSource::EnvVar(USERNAME_ENV.to_string()));

        let token = settings.api_token.clone().unwrap();
        assert_eq!(token.value, "file-token");
        assert_eq!(token.source, ValueSource::File);

        let creds = settings.require_credentials().unwrap();
        assert_eq!(creds.username, "env-user");
    }

    #[test]
    fn test_retry_and_folders_from_file() {
        let file = ConfigFile::parse(
            "retry {\n attempts 4\n delay-secs 0\n}\nfolders {\n staging \"shots\"\n}",
        )
        .unwrap();
        let settings = settings_from(file, None, &env_of(&[]));

        assert_eq!(settings.retry, RetryPolicy::new(4, Duration::ZERO));
        assert_eq!(settings.folders.staging, PathBuf::from("shots"));
        assert_eq!(settings.folders.results, PathBuf::from("cfg/Test_result"));
    }

    #[test]
    fn test_masked_token() {
        let mut settings = Settings::default();
        assert_eq!(settings.masked_token(), None);

        settings.api_token = Some(Resolved::new("ATATT3xFfGF0qSn1".to_string(), ValueSource::File));
        assert_eq!(settings.masked_token().unwrap(), "ATAT...qSn1");

        // Short tokens reveal nothing
        for short in ["abcde", "twelve-chars", "x"] {
            settings.api_token = Some(Resolved::new(short.to_string(), ValueSource::File));
            assert_eq!(settings.masked_token().unwrap(), "****");
        }
    }

    #[test]
    fn test_blank_webhook_is_none() {
        let file = ConfigFile::parse("webhook-url \"  \"").unwrap();
        assert_eq!(settings_from(file, None, &env_of(&[])).webhook_url, None);
    }
}
