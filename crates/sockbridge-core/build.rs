use std::process::Command;

/// Stamps the relay's `--version` output with the commit and cargo profile
/// it was built from, so a running relay can be matched to its source.
fn main() {
    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=SOCKBRIDGE_GIT_HASH={commit}");

    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=SOCKBRIDGE_BUILD_PROFILE={profile}");

    // Tarball builds have no .git; cargo ignores missing paths here.
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs");
}
