use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");

    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let long_version = match git(&["rev-parse", "HEAD"]) {
        Some(sha) => {
            println!("cargo:rustc-env=CLANZONE_BUILD_GIT_SHA={sha}");
            let dirty = git(&["status", "--porcelain", "--untracked-files=no"]).is_some();
            let short = &sha[..sha.len().min(12)];
            format!("{version} ({short}{})", if dirty { "-dirty" } else { "" })
        }
        None => version,
    };
    println!("cargo:rustc-env=CLANZONE_LONG_VERSION={long_version}");
}
