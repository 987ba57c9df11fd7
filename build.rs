//! Build script that stamps the binary with build information.
//!
//! Sets compile-time environment variables read by `cw --version`:
//! - `CW_BUILD_TIMESTAMP`: ISO 8601 time of the build
//! - `CW_GIT_COMMIT`: short commit hash, or "unknown" outside a git checkout

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    println!("cargo:rustc-env=CW_BUILD_TIMESTAMP={}", timestamp);

    let commit = short_commit().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=CW_GIT_COMMIT={}", commit);
}

fn short_commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string())
}
