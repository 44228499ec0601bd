// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=LIVECAM_VERSION");

    // Packagers can pin the version string without a git checkout
    let version = std::env::var("LIVECAM_VERSION").unwrap_or_else(|_| describe_version());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` output reshaped to `<tag>-<hash>` or `<tag>-dirty-<hash>`.
fn describe_version() -> String {
    let package_version = env!("CARGO_PKG_VERSION").to_string();

    let Some(described) = git(&["describe", "--tags", "--always", "--match", "v*"]) else {
        return package_version;
    };
    let described = described.strip_prefix('v').unwrap_or(&described).to_string();

    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    match parts.as_slice() {
        [hash, _commits, tag] => {
            let hash = hash.strip_prefix('g').unwrap_or(hash);
            format!("{}-dirty-{}", tag, hash)
        }
        _ => match git(&["rev-parse", "--short", "HEAD"]) {
            Some(hash) if hash != described => format!("{}-{}", described, hash),
            _ => format!("{}-{}", package_version, described),
        },
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
