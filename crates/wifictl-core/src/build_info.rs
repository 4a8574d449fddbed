//! Build metadata embedded by the build script.

/// `git describe --always --dirty` at build time.
pub const GIT_DESCRIBE: &str = env!("WIFICTL_GIT_DESCRIBE");

/// The cargo profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("WIFICTL_BUILD_PROFILE");

/// The target triple the binary was compiled for.
pub const BUILD_TARGET: &str = env!("WIFICTL_BUILD_TARGET");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One-line version banner, e.g. `"0.1.0 (a1b2c3d, release, aarch64-unknown-linux-musl)"`.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_DESCRIBE}, {BUILD_PROFILE}, {BUILD_TARGET})")
}
