//! Build script for the OfSM orchestrator
//!
//! Stamps the binary with the git revision, build time, and target so
//! `ofsm-orchestrator version` can report exactly what is running.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = git(&["rev-parse", "--short=8", "HEAD"]).unwrap_or_else(|| "unknown".into());
    let git_dirty = match git(&["status", "--porcelain"]) {
        Some(out) if !out.is_empty() => "true",
        Some(_) => "false",
        None => "unknown",
    };
    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let rustc_version = Command::new("rustc")
        .arg("--version")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let vars = [
        ("OFSM_GIT_HASH", git_hash),
        ("OFSM_GIT_DIRTY", git_dirty.to_string()),
        ("OFSM_BUILD_TIMESTAMP", build_timestamp),
        ("OFSM_TARGET", env::var("TARGET").unwrap_or_else(|_| "unknown".into())),
        ("OFSM_PROFILE", env::var("PROFILE").unwrap_or_else(|_| "unknown".into())),
        ("OFSM_RUSTC_VERSION", rustc_version),
    ];
    for (key, value) in vars {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

/// Run a git command and return its trimmed stdout on success
fn git(args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
}
