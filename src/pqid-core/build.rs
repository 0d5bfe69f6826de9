//! Build script for pqid-core.
//!
//! Records the target triple so version strings can report it.

fn main() {
    println!(
        "cargo:rustc-env=PQID_BUILD_TARGET={}",
        std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string())
    );

    println!("cargo:rerun-if-env-changed=TARGET");
}
