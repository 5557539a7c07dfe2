//! Build script to inject version and git SHA at compile time.
//!
//! Environment variables (set by CI or fall back to defaults):
//! - YTMC_VERSION: Version string (defaults to CARGO_PKG_VERSION)
//! - YTMC_GIT_SHA: Git commit SHA (defaults to git rev-parse, then "unknown")

use std::process::Command;

fn main() {
    let version = std::env::var("YTMC_VERSION").unwrap_or_else(|_| {
        std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".into())
    });
    println!("cargo:rustc-env=YTMC_VERSION={}", version);

    let git_sha = std::env::var("YTMC_GIT_SHA").unwrap_or_else(|_| short_git_sha());
    println!("cargo:rustc-env=YTMC_GIT_SHA={}", git_sha);

    println!("cargo:rerun-if-env-changed=YTMC_VERSION");
    println!("cargo:rerun-if-env-changed=YTMC_GIT_SHA");
}

fn short_git_sha() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|sha| sha.trim().to_string())
        .unwrap_or_else(|| "unknown".into())
}
