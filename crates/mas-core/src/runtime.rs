//! Runtime facts used to enrich errors, audit events and container stats.

use std::sync::OnceLock;

/// Prefix for audit event IDs (`evt-…`).
pub const PREFIX_EVENT: &str = "evt";
/// Prefix for structured error IDs (`err-…`).
pub const PREFIX_ERROR: &str = "err";
/// Prefix for request IDs (`req-…`).
pub const PREFIX_REQUEST: &str = "req";

static REQUEST_ID: OnceLock<String> = OnceLock::new();

/// Generate a prefixed random ID, e.g. `"evt-3fa85f6457174562"`.
///
/// Uses 8 bytes from the OS entropy source. Falls back to the current
/// timestamp nanos if the entropy source is unavailable.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    let mut buf = [0u8; 8];
    if getrandom::fill(&mut buf).is_err() {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        buf = nanos.to_le_bytes();
    }
    format!("{prefix}-{}", hex::encode(buf))
}

/// Request id of the running process, generated on first use.
///
/// The host handles one request per process, so one id per process
/// correlates every error and audit event of that request.
pub fn current_request_id() -> &'static str {
    REQUEST_ID.get_or_init(|| generate_id(PREFIX_REQUEST))
}

/// Resident set size of the current process in bytes, if the platform exposes it.
#[must_use]
pub fn resident_memory_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        const PAGE_SIZE: u64 = 4096;
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(resident_pages * PAGE_SIZE)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
