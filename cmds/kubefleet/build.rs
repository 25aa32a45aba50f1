use std::process::Command;

fn main() {
	// Re-run if git HEAD changes
	println!("cargo:rerun-if-changed=.git/HEAD");
	println!("cargo:rerun-if-changed=.git/refs/");

	let version = get_version();
	println!("cargo:rustc-env=KUBEFLEET_VERSION={}", version);
}

fn get_version() -> String {
	let cargo_version = env!("CARGO_PKG_VERSION");

	// Release builds carry the real version in Cargo.toml
	if cargo_version != "0.1.0" {
		return cargo_version.to_string();
	}

	if let Some(tag) = git(&["describe", "--tags", "--exact-match", "HEAD"]) {
		return tag.strip_prefix('v').unwrap_or(&tag).to_string();
	}

	if let Some(commit) = git(&["rev-parse", "--short", "HEAD"]) {
		return format!("{cargo_version}+{commit}");
	}

	cargo_version.to_string()
}

fn git(args: &[&str]) -> Option<String> {
	let output = Command::new("git").args(args).output().ok()?;
	if !output.status.success() {
		return None;
	}
	let text = String::from_utf8(output.stdout).ok()?;
	Some(text.trim().to_string())
}
