// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=OVERLAYCAM_VERSION");

    // Packagers may pin the version string explicitly
    let version = match std::env::var("OVERLAYCAM_VERSION") {
        Ok(v) => v,
        Err(_) => describe_version(),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version derived from `git describe`, falling back to the crate version
/// when the source tree is not a git checkout.
fn describe_version() -> String {
    let crate_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".into());

    let described = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());

    match described {
        // "v0.1.0" or "v0.1.0-5-gabcdef1"
        Some(tag) if tag.starts_with('v') => tag.trim_start_matches('v').to_string(),
        // Bare commit hash, no release tag yet
        Some(hash) if !hash.is_empty() => format!("{}-{}", crate_version, hash),
        _ => crate_version,
    }
}
