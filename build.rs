// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");

    // Packagers can pin the version string explicitly
    let version = if let Ok(v) = std::env::var("CAMERA_SERVER_VERSION") {
        v
    } else {
        get_git_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn get_git_version() -> Option<String> {
    // "v0.1.0" at a tag, "v0.1.0-5-gabcdef1" after it, bare hash without tags
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let version = version.strip_prefix('v').unwrap_or(&version);

    if version.contains('-') {
        let parts: Vec<&str> = version.rsplitn(3, '-').collect();
        if parts.len() >= 3 {
            let hash = parts[0].strip_prefix('g').unwrap_or(parts[0]);
            return Some(format!("{}-dirty-{}", parts[2], hash));
        }
    }

    Some(version.to_string())
}
