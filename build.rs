//! Build script: embeds the git hash and checks GPU toolkits for whisper builds.

use std::process::Command;

fn main() {
    // Embed git short hash for version string
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");

    if cfg!(feature = "cuda") {
        require_tool("nvcc", &["--version"], "CUDA toolkit", "cuda");
    }
    if cfg!(feature = "vulkan") {
        require_tool("vulkaninfo", &["--summary"], "Vulkan SDK", "vulkan");
    }
}

/// Fail early with a readable message when a GPU toolkit is missing,
/// instead of a wall of whisper-rs-sys compiler errors.
fn require_tool(tool: &str, args: &[&str], toolkit: &str, feature: &str) {
    match Command::new(tool).args(args).output() {
        Ok(out) if out.status.success() => {
            println!("cargo::warning={toolkit} detected ({tool})");
        }
        _ => panic!(
            "\n\n`{tool}` not found: {toolkit} is not installed.\n\
             Install it, or build without the `{feature}` feature: cargo build --release\n"
        ),
    }
}
