//! Deterministic names for generated objects
//!
//! The generated name is the join key between a workload CR and its native
//! object, so these functions must stay pure: the same identity always maps
//! to the same legal Kubernetes name.

use aws_lc_rs::digest::{digest, SHA256};

/// Maximum length of the human-readable name prefix
pub const MAX_NAME_PREFIX_LEN: usize = 40;

/// Length of the hex hash suffix on statefulset names
const HASH_SUFFIX_LEN: usize = 10;

/// Longest job name; the job controller copies it into the `job-name` label
pub const MAX_JOB_NAME_LEN: usize = 63;

/// Lower-case `name`, turn underscores into hyphens and truncate it.
///
/// Falls back to `fallback` when the result is not a valid DNS subdomain.
pub fn sanitize_name(name: &str, fallback: &str) -> String {
    sanitize_name_with_max_len(name, fallback, MAX_NAME_PREFIX_LEN)
}

/// [`sanitize_name`] with an explicit length cap
pub fn sanitize_name_with_max_len(name: &str, fallback: &str, max_len: usize) -> String {
    let sanitized = name.to_lowercase().replace('_', "-");
    if is_dns_subdomain(&sanitized) {
        truncate(&sanitized, max_len)
    } else {
        truncate(fallback, max_len)
    }
}

/// Truncate to `max_len` chars without leaving a dangling separator
fn truncate(s: &str, max_len: usize) -> String {
    let truncated: String = s.chars().take(max_len).collect();
    truncated.trim_end_matches(['-', '.']).to_string()
}

/// Check `s` against the DNS-1123 subdomain grammar: dot-separated labels of
/// lowercase alphanumerics and hyphens, each starting and ending with an
/// alphanumeric.
pub fn is_dns_subdomain(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }

    s.split('.').all(|label| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                is_lower_alnum(*first)
                    && is_lower_alnum(*last)
                    && bytes.iter().all(|b| is_lower_alnum(*b) || *b == b'-')
            }
            _ => false,
        }
    })
}

fn is_lower_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

/// First ten hex chars of the SHA-256 of `input`
pub fn short_hash(input: &str) -> String {
    let hash = digest(&SHA256, input.as_bytes());
    hash.as_ref()
        .iter()
        .take(HASH_SUFFIX_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Name of the statefulset backing an LRP identity
pub fn statefulset_name(guid: &str, version: &str, app_name: &str, space_name: &str) -> String {
    let prefix = sanitize_name(&format!("{}-{}", app_name, space_name), guid);
    let suffix = short_hash(&format!("{}-{}", guid, version));
    format!("{}-{}", prefix, suffix)
}

/// Name of the job backing a task
///
/// Falls back to `<guid>-<task name>`, and then to the bare GUID, when the
/// app-space prefixed name is not a legal job name.
pub fn job_name(guid: &str, task_name: &str, app_name: &str, space_name: &str) -> String {
    let task_name = task_name.to_lowercase().replace('_', "-");
    let prefix = sanitize_name(&format!("{}-{}", app_name, space_name), guid);
    let name = format!("{}-{}", prefix, task_name);
    if name.len() <= MAX_JOB_NAME_LEN && is_dns_subdomain(&name) {
        return name;
    }
    sanitize_name_with_max_len(&format!("{}-{}", guid, task_name), guid, MAX_JOB_NAME_LEN)
}
