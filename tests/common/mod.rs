//! Common test utilities for cardwright integration tests.
//!
//! Provides `TestEnv`, an isolated working directory with its own user config
//! dir, so tests never read the developer's `cardwright.kdl` or credentials.

#![allow(dead_code)]

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use assert_cmd::Command;
pub use tempfile::TempDir;

/// Environment variables the binary reads; cleared for every command.
const CW_ENV_VARS: [&str; 5] = [
    "CW_CONFIG",
    "CW_BASE_URL",
    "CW_USERNAME",
    "CW_API_TOKEN",
    "CW_LOG",
];

/// Proxy settings would route the local stub tracker through a real proxy.
const PROXY_ENV_VARS: [&str; 6] = [
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "all_proxy",
];

/// A test environment with isolated directories.
///
/// - `work_dir`: the current directory of every `cw` invocation
/// - `config_home`: stands in for `~/.config` (via `XDG_CONFIG_HOME`)
pub struct TestEnv {
    pub work_dir: TempDir,
    pub config_home: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
            config_home: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the cw binary, isolated from the host environment.
    pub fn cw(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cw"));
        cmd.current_dir(self.work_dir.path());
        for var in CW_ENV_VARS.iter().chain(PROXY_ENV_VARS.iter()) {
            cmd.env_remove(var);
        }
        cmd.env("XDG_CONFIG_HOME", self.config_home.path());
        cmd.env("HOME", self.config_home.path());
        cmd
    }

    pub fn path(&self) -> &Path {
        self.work_dir.path()
    }

    /// Write `cardwright.kdl` in the working directory.
    pub fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.path().join("cardwright.kdl");
        fs::write(&path, contents).unwrap();
        path
    }

    /// Path of a workbook under `tests/fixtures`.
    pub fn fixture(&self, name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
    }

    /// Default staging folder, relative to the working directory.
    pub fn staging(&self) -> PathBuf {
        self.path().join("cfg").join("Temp").join("Screenshots")
    }

    /// Put files into the staging folder, a little apart so capture order is stable.
    pub fn stage(&self, names: &[&str]) {
        let staging = self.staging();
        fs::create_dir_all(&staging).unwrap();
        for name in names {
            fs::write(staging.join(name), name.as_bytes()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
    }

    /// Sorted file names in `dir`.
    pub fn files_in(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// One request received by [`StubTracker`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub body: String,
}

/// Minimal tracker on a local port.
///
/// Searches answer with a fixed body, creates hand out `BTV-1`, `BTV-2`, ...,
/// and edits and deletes succeed with 204.
pub struct StubTracker {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubTracker {
    pub fn start(search_body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let search_body = search_body.to_string();

        thread::spawn(move || {
            let mut created = 0;
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Some(request) = read_request(&stream) else {
                    continue;
                };
                let path = request.target.split('?').next().unwrap_or("").to_string();
                let (status, body) = match (request.method.as_str(), path.as_str()) {
                    ("GET", "/rest/api/3/search/jql") => (200, search_body.clone()),
                    ("POST", "/rest/api/3/issue") => {
                        created += 1;
                        (201, format!("{{\"key\":\"BTV-{}\"}}", created))
                    }
                    ("PUT", _) | ("DELETE", _) => (204, String::new()),
                    _ => (404, "{}".to_string()),
                };
                log.lock().unwrap().push(request);
                write_response(&mut stream, status, &body);
            }
        });

        Self { url, requests }
    }

    /// Config pointing `cw` at this tracker, with a single attempt per call.
    pub fn config(&self) -> String {
        format!(
            "base-url \"{}\"\nusername \"qa\"\napi-token \"stub-token\"\nretry {{\n attempts 1\n delay-secs 0\n}}",
            self.url
        )
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &TcpStream) -> Option<RecordedRequest> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut length = 0;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end().to_ascii_lowercase();
        if header.is_empty() {
            break;
        }
        if let Some(value) = header.strip_prefix("content-length:") {
            length = value.trim().parse().ok()?;
        }
    }
    let mut body = vec![0; length];
    reader.read_exact(&mut body).ok()?;

    Some(RecordedRequest {
        method,
        target,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str) {
    let length = if status == 204 {
        String::new()
    } else {
        format!("Content-Length: {}\r\n", body.len())
    };
    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\n{}Connection: close\r\n\r\n{}",
        status, length, body
    );
    let _ = stream.write_all(response.as_bytes());
}
