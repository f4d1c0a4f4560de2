//! Build script for the Orra SDK
//!
//! Exposes the git revision, build time and target to `version.rs`.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let git_hash = git(&["rev-parse", "--short=8", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let git_dirty = match git(&["status", "--porcelain"]) {
        Some(out) if !out.is_empty() => "true",
        Some(_) => "false",
        None => "unknown",
    };
    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=ORRA_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=ORRA_GIT_DIRTY={}", git_dirty);
    println!("cargo:rustc-env=ORRA_BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=ORRA_TARGET={}", target);
    println!("cargo:rustc-env=ORRA_PROFILE={}", profile);
}

/// Trimmed stdout of a successful git invocation
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
}
