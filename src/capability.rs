//! Build identity of the engine.
//!
//! Everything here is fixed at compile time: no handle is needed, nothing
//! fails, nothing is dispatched to the error handler.

use std::fmt;

use serde::Serialize;

/// Engine version, taken from the crate version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VersionInfo {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Revision
    pub revision: u32,
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// Licensee and product name baked into the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LicenseInfo {
    /// Licensee; empty for unlicensed builds
    pub licensee: &'static str,
    /// Product name
    pub product: &'static str,
}

const fn parse_u32(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let mut value = 0u32;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        assert!(digit.is_ascii_digit(), "version component is not numeric");
        value = value * 10 + (digit - b'0') as u32;
        i += 1;
    }
    value
}

const VERSION: VersionInfo = VersionInfo {
    major: parse_u32(env!("CARGO_PKG_VERSION_MAJOR")),
    minor: parse_u32(env!("CARGO_PKG_VERSION_MINOR")),
    revision: parse_u32(env!("CARGO_PKG_VERSION_PATCH")),
};

const LICENSE: LicenseInfo = LicenseInfo {
    licensee: match option_env!("BURROWDB_LICENSEE") {
        Some(licensee) => licensee,
        None => "",
    },
    product: env!("CARGO_PKG_NAME"),
};

/// Engine version.
pub fn get_version() -> VersionInfo {
    VERSION
}

/// Licensee and product of this build.
pub fn get_license() -> LicenseInfo {
    LICENSE
}

/// True for builds with the `pro` feature.
pub fn is_pro() -> bool {
    cfg!(feature = "pro")
}

/// True for builds with debug assertions enabled.
pub fn is_debug() -> bool {
    cfg!(debug_assertions)
}

/// True for time-limited evaluation builds of the pro edition.
pub fn is_pro_evaluation() -> bool {
    cfg!(feature = "pro-evaluation")
}
