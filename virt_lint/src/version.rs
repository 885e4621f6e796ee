//! Library version as a single integer

const MAJOR_SCALE: u64 = 1_000_000;
const MINOR_SCALE: u64 = 1_000;

/// `major * 1_000_000 + minor * 1_000 + patch`
pub fn version() -> u64 {
    let part = |s: &str| s.parse::<u64>().unwrap_or(0);

    part(env!("CARGO_PKG_VERSION_MAJOR")) * MAJOR_SCALE
        + part(env!("CARGO_PKG_VERSION_MINOR")) * MINOR_SCALE
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}

/// Decode a [`version`] integer into `major.minor.patch`
pub fn version_string(version: u64) -> String {
    format!(
        "{}.{}.{}",
        version / MAJOR_SCALE,
        (version % MAJOR_SCALE) / MINOR_SCALE,
        version % MINOR_SCALE
    )
}
