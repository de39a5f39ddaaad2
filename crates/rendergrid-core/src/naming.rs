//! Deterministic naming for workers, sites, buckets and chunk outputs.
//!
//! Every function here is pure. The worker name format is an external
//! contract that other systems parse and predict:
//!
//! ```text
//! <family>--<version-dashed>--mem<memory>--cpu<cpu>--t-<timeout>
//! remotion--3-3-96--mem2gi--cpu1-0--t-1900
//! ```
//!
//! `--` only ever appears as a field separator: the family may not contain
//! it, and every other token is built from digits, lowercase letters and
//! single dashes. Version dots and CPU decimal points become dashes.

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ConfigError, ConfigResult};
use crate::types::TimeRange;

/// Longest worker timeout accepted by any supported platform.
pub const MAX_TIMEOUT_SECS: u32 = 3600;

const FAMILY_PATTERN: &str = r"^[a-z][a-z0-9-]{0,31}$";
const MEMORY_PATTERN: &str = r"^([1-9][0-9]{0,5})(Mi|Gi)$";
const CPU_PATTERN: &str = r"^(0|[1-9][0-9]{0,2})(?:\.([0-9]{1,3}))?$";
const SITE_PATTERN: &str = r"^[a-z0-9][a-z0-9-]{0,63}$";

/// The configuration a worker name is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerIdentity {
    /// Name prefix shared by all workers of one installation.
    pub family: String,
    /// Renderer release, plain `MAJOR.MINOR.PATCH`.
    pub version: String,
    /// Memory limit, `<n>Mi` or `<n>Gi`.
    pub memory: String,
    /// CPU limit as a decimal, e.g. `1`, `0.5`, `2.25`.
    pub cpu: String,
    pub timeout_secs: u32,
    /// Region the worker lives in. Scopes the name, not part of it.
    pub region: String,
}

impl WorkerIdentity {
    /// Derive the worker name. See [`derive_name`].
    pub fn name(&self) -> ConfigResult<String> {
        derive_name(self)
    }
}

/// Derive the deterministic worker name for an identity.
///
/// Fails with an invalid-config error if any field is missing or outside
/// its accepted domain.
pub fn derive_name(identity: &WorkerIdentity) -> ConfigResult<String> {
    if identity.region.trim().is_empty() {
        return Err(ConfigError::invalid("region", "must not be empty"));
    }
    let family = family_token(&identity.family)?;
    let version = version_token(&identity.version)?;
    let memory = memory_token(&identity.memory)?;
    let cpu = cpu_token(&identity.cpu)?;
    let timeout = timeout_token(identity.timeout_secs)?;
    Ok(format!("{family}--{version}--mem{memory}--cpu{cpu}--t-{timeout}"))
}

fn family_token(family: &str) -> ConfigResult<&str> {
    if !Regex::new(FAMILY_PATTERN)?.is_match(family) {
        return Err(ConfigError::invalid(
            "family",
            format!("{family:?} must be lowercase alphanumeric with dashes, starting with a letter"),
        ));
    }
    if family.contains("--") || family.ends_with('-') {
        return Err(ConfigError::invalid(
            "family",
            format!("{family:?} may not contain '--' or end with '-'"),
        ));
    }
    Ok(family)
}

fn version_token(version: &str) -> ConfigResult<String> {
    let parsed = Version::parse(version)
        .map_err(|e| ConfigError::invalid("version", format!("{version:?}: {e}")))?;
    // Pre-release identifiers may contain dots and dashes, which would
    // collide once dots are dashed ("1.0.0-a.1" vs "1.0.0-a-1").
    if !parsed.pre.is_empty() || !parsed.build.is_empty() {
        return Err(ConfigError::invalid(
            "version",
            format!("{version:?} must be a plain MAJOR.MINOR.PATCH release"),
        ));
    }
    Ok(format!("{}-{}-{}", parsed.major, parsed.minor, parsed.patch))
}

fn memory_token(memory: &str) -> ConfigResult<String> {
    let re = Regex::new(MEMORY_PATTERN)?;
    let caps = re.captures(memory).ok_or_else(|| {
        ConfigError::invalid(
            "memory",
            format!("{memory:?} must look like 512Mi or 2Gi"),
        )
    })?;
    Ok(format!("{}{}", &caps[1], caps[2].to_ascii_lowercase()))
}

/// Canonical CPU token: at least one fractional digit, trailing zeros
/// trimmed, decimal point dashed. `1` → `1-0`, `2.50` → `2-5`.
fn cpu_token(cpu: &str) -> ConfigResult<String> {
    let re = Regex::new(CPU_PATTERN)?;
    let caps = re.captures(cpu).ok_or_else(|| {
        ConfigError::invalid(
            "cpu",
            format!("{cpu:?} must be a decimal with at most 3 fractional digits"),
        )
    })?;
    let whole = &caps[1];
    let fraction = caps
        .get(2)
        .map(|m| m.as_str().trim_end_matches('0'))
        .unwrap_or("");
    if whole == "0" && fraction.is_empty() {
        return Err(ConfigError::invalid("cpu", "must be greater than zero"));
    }
    let fraction = if fraction.is_empty() { "0" } else { fraction };
    Ok(format!("{whole}-{fraction}"))
}

fn timeout_token(timeout_secs: u32) -> ConfigResult<u32> {
    if timeout_secs == 0 || timeout_secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::invalid(
            "timeout_secs",
            format!("{timeout_secs} must be within 1..={MAX_TIMEOUT_SECS}"),
        ));
    }
    Ok(timeout_secs)
}

/// Parse a memory limit into MiB.
pub fn memory_mib(memory: &str) -> ConfigResult<u64> {
    let re = Regex::new(MEMORY_PATTERN)?;
    let caps = re.captures(memory).ok_or_else(|| {
        ConfigError::invalid("memory", format!("{memory:?} must look like 512Mi or 2Gi"))
    })?;
    let n: u64 = caps[1]
        .parse()
        .map_err(|_| ConfigError::invalid("memory", "value out of range"))?;
    Ok(if &caps[2] == "Gi" { n * 1024 } else { n })
}

/// Parse a CPU limit into thousandths of a core.
pub fn cpu_millis(cpu: &str) -> ConfigResult<u32> {
    let token = cpu_token(cpu)?;
    let (whole, fraction) = token.split_once('-').unwrap_or((token.as_str(), "0"));
    let whole: u32 = whole
        .parse()
        .map_err(|_| ConfigError::invalid("cpu", "value out of range"))?;
    let mut fraction = fraction.to_string();
    while fraction.len() < 3 {
        fraction.push('0');
    }
    let fraction: u32 = fraction
        .parse()
        .map_err(|_| ConfigError::invalid("cpu", "value out of range"))?;
    Ok(whole * 1000 + fraction)
}

// ── Sites & buckets ───────────────────────────────────────────────

/// Validate a user-supplied site name.
pub fn validate_site_name(name: &str) -> ConfigResult<()> {
    if Regex::new(SITE_PATTERN)?.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "site_name",
            format!("{name:?} must be 1-64 chars of lowercase letters, digits and dashes"),
        ))
    }
}

/// Site name derived from the hex digest of a bundle.
pub fn site_name_from_digest(digest_hex: &str) -> String {
    let short: String = digest_hex.chars().take(12).collect();
    format!("site-{short}")
}

/// Deterministic bucket name for a region within an account.
pub fn derive_bucket_name(family: &str, region: &str, account_id: &str) -> String {
    let digest = Sha256::digest(format!("{account_id}/{region}").as_bytes());
    let short = &hex::encode(digest)[..10];
    format!("{family}-{}-{short}", region.to_ascii_lowercase())
}

/// Object prefix under which a site's files live.
pub fn site_prefix(site_name: &str) -> String {
    format!("sites/{site_name}/")
}

// ── Render outputs ────────────────────────────────────────────────

/// Object prefix for everything a render job writes.
pub fn render_prefix(job_id: &str) -> String {
    format!("renders/{job_id}/")
}

/// Content-derived key for one chunk's output.
///
/// The key depends only on what the chunk renders, so a stale invocation
/// that finishes after a retry overwrites the same object with the same bytes.
pub fn chunk_output_key(job_id: &str, index: u32, range: TimeRange, extension: &str) -> String {
    let digest = Sha256::digest(
        format!("{job_id}|{index}|{}|{}", range.start_ms, range.end_ms).as_bytes(),
    );
    let short = &hex::encode(digest)[..16];
    format!("renders/{job_id}/chunks/{index:05}-{short}.{extension}")
}

/// Key of the stitched output for a render job.
pub fn final_output_key(job_id: &str, extension: &str) -> String {
    format!("renders/{job_id}/out.{extension}")
}
