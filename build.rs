use std::process::Command;

fn main() {
    let timestamp = command_stdout("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]);
    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        timestamp.as_deref().unwrap_or("unknown")
    );

    let git_sha = command_stdout("git", &["rev-parse", "--short", "HEAD"]);
    println!(
        "cargo:rustc-env=BUILD_GIT_SHA={}",
        git_sha.as_deref().unwrap_or("unknown")
    );

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Trimmed stdout of a successful command.
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
