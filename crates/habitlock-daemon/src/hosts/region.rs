// Marked region parsing and rendering
//
// The region is the only part of the hosts file habitlock owns. Everything
// before the begin marker and after the end marker is carried through
// byte-for-byte.

use std::collections::BTreeSet;

pub const BEGIN_MARKER: &str = "# >>> habitlock blocklist (managed automatically, do not edit) >>>";
pub const END_MARKER: &str = "# <<< habitlock blocklist <<<";
pub const BLOCK_ADDRESS: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionError(pub String);

/// A hosts file split around its marked region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split<'a> {
    pub before: &'a str,
    /// Marker lines included
    pub region: Option<&'a str>,
    pub after: &'a str,
}

fn line_body(line: &str) -> &str {
    line.trim_end_matches(&['\r', '\n'][..])
}

/// Locate the marked region. More than one region, or a marker without its
/// partner, is an error so the caller never rewrites a file it doesn't understand.
pub fn split(content: &str) -> Result<Split<'_>, RegionError> {
    let mut offset = 0;
    let mut begin: Option<usize> = None;
    let mut found: Option<(usize, usize)> = None;

    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        match line_body(line) {
            BEGIN_MARKER => {
                if begin.is_some() || found.is_some() {
                    return Err(RegionError("more than one begin marker".to_string()));
                }
                begin = Some(start);
            }
            END_MARKER => match begin.take() {
                Some(region_start) => found = Some((region_start, offset)),
                None => return Err(RegionError("end marker without begin marker".to_string())),
            },
            _ => {}
        }
    }

    if begin.is_some() {
        return Err(RegionError("begin marker without end marker".to_string()));
    }

    Ok(match found {
        Some((start, end)) => {
            // A region closing the file without a final newline was appended to
            // a file that had none; the newline before it is the region's own.
            let start = if end == content.len() && !content.ends_with('\n') && start > 0 {
                start - 1
            } else {
                start
            };
            Split {
                before: &content[..start],
                region: Some(&content[start..end]),
                after: &content[end..],
            }
        }
        None => Split { before: content, region: None, after: "" },
    })
}

/// Render a complete region: markers plus one bare and one `www.` line per domain.
pub fn render(domains: &BTreeSet<String>) -> String {
    let mut region = String::with_capacity(64 + domains.len() * 48);
    region.push_str(BEGIN_MARKER);
    region.push('\n');
    for domain in domains {
        region.push_str(&format!("{} {}\n", BLOCK_ADDRESS, domain));
        region.push_str(&format!("{} www.{}\n", BLOCK_ADDRESS, domain));
    }
    region.push_str(END_MARKER);
    region.push('\n');
    region
}

/// Content with the region replaced by one for `domains`, appended if absent.
pub fn with_region(content: &str, domains: &BTreeSet<String>) -> Result<String, RegionError> {
    let parts = split(content)?;
    let rendered = render(domains);

    Ok(if parts.after.is_empty() {
        append_region(parts.before, &rendered)
    } else {
        format!("{}{}{}", parts.before, rendered, parts.after)
    })
}

/// Append a rendered region to the end of `before`. When `before` lacks a final
/// newline the region brings its own leading one and drops its trailing one, so
/// removing it later gives back `before` exactly.
fn append_region(before: &str, rendered: &str) -> String {
    if before.is_empty() || before.ends_with('\n') {
        format!("{}{}", before, rendered)
    } else {
        format!("{}\n{}", before, rendered.trim_end_matches('\n'))
    }
}

/// Content with the region removed. Unchanged when there is no region.
pub fn without_region(content: &str) -> Result<String, RegionError> {
    let parts = split(content)?;
    Ok(format!("{}{}", parts.before, parts.after))
}

/// Every hostname mapped inside the region, `www.` variants included.
/// `None` when the file has no region.
pub fn region_hosts(content: &str) -> Result<Option<BTreeSet<String>>, RegionError> {
    let Some(region) = split(content)?.region else {
        return Ok(None);
    };

    let hosts = region
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(BLOCK_ADDRESS), Some(host)) => Some(host.to_string()),
                _ => None,
            }
        })
        .collect();

    Ok(Some(hosts))
}

/// The blocked domains a region represents, with `www.` variants folded in.
pub fn region_domains(content: &str) -> Result<Option<BTreeSet<String>>, RegionError> {
    Ok(region_hosts(content)?.map(|hosts| {
        hosts
            .into_iter()
            .map(|host| match host.strip_prefix("www.") {
                Some(bare) => bare.to_string(),
                None => host,
            })
            .collect()
    }))
}
