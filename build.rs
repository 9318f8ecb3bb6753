use std::process::Command;

fn git(args: &[&str]) -> Option<std::process::Output> {
    Command::new("git").args(args).output().ok()
}

/// Stamps the build with the short commit hash.
fn main() {
    let build_rev = match git(&["rev-parse", "--short", "HEAD"]) {
        Some(out) if out.status.success() => {
            let rev = String::from_utf8_lossy(&out.stdout).trim().to_string();
            let dirty = git(&["diff", "--quiet"]).is_some_and(|o| !o.status.success());
            if dirty { format!("{}-dirty", rev) } else { rev }
        }
        _ => "unknown".to_string(),
    };

    println!("cargo:rustc-env=IB_ENGINE_BUILD_REV={}", build_rev);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
