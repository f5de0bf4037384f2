// Blocked-domain handling
//
// Domains reach the daemon already validated by the write side. Normalizing
// here only guarantees each entry renders as exactly one bare line and one
// `www.` line in the hosts file.

use std::collections::BTreeSet;

use crate::error::{Error, Result};

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Lower-case, trim, and drop a trailing dot and a leading `www.`.
pub fn normalize_domain(domain: &str) -> String {
    let lowered = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    match lowered.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lowered,
    }
}

/// Syntactic hostname check used by the write side before storing a domain.
pub fn validate_domain(domain: &str) -> Result<String> {
    let normalized = normalize_domain(domain);

    if normalized.is_empty() || normalized.len() > MAX_DOMAIN_LEN || !normalized.contains('.') {
        return Err(Error::InvalidDomain(domain.to_string()));
    }

    for label in normalized.split('.') {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(Error::InvalidDomain(domain.to_string()));
        }
    }

    Ok(normalized)
}

/// Normalize a set of configured domains, dropping empty entries.
pub fn normalize_domains<'a, I>(domains: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    domains.into_iter().map(|d| normalize_domain(d)).filter(|d| !d.is_empty()).collect()
}
