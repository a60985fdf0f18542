//! URL helpers shared by the transformer, backend clients, and validation.

use reqwest::Url;

use crate::error::{AppError, Result};

/// Canonical repository URL: surrounding whitespace, trailing slashes, and a
/// `.git` suffix are removed.
pub fn normalize_repo_url(repo_url: &str) -> String {
    let trimmed = repo_url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix(".git")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

/// `scheme://host[:port]` of an absolute URL, or `None` when the input has
/// no host. Default ports are elided and the host is lowercased.
pub fn source_domain(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    url.host_str()?;
    Some(url.origin().ascii_serialization())
}

/// True when both inputs are absolute URLs with the same scheme, host, and
/// effective port.
pub fn same_origin(a: &str, b: &str) -> bool {
    match (source_domain(a), source_domain(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Repository path of a backend project URL, e.g. `org/group/proj` for
/// `https://gitlab.example.com/org/group/proj.git`.
pub fn repo_path(repo_url: &str) -> Option<String> {
    let url = Url::parse(&normalize_repo_url(repo_url)).ok()?;
    let path = url.path().trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// Join `segments` under the path of `base`, replacing the query with
/// `query`. Each segment is percent-encoded as a single path segment.
pub fn build_url(base: &str, segments: &[&str], query: Option<&str>) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| AppError::Config(format!("invalid base URL '{}': {}", base, e)))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| AppError::Config(format!("base URL '{}' cannot carry a path", base)))?;
        path.pop_if_empty();
        path.extend(segments);
    }
    url.set_query(query);
    Ok(url.to_string())
}

/// Components of a gateway-emitted download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxiedUrl {
    pub alias: String,
    pub version: String,
    pub filename: String,
}

/// Inverse of the proxied URL shape `{base}/{alias}/{version}/{filename}`.
///
/// Returns `None` when `raw` is not under `base` or has fewer than three
/// trailing segments. Multi-segment filenames are joined with `/`.
pub fn parse_proxied_url(base: &str, raw: &str) -> Option<ProxiedUrl> {
    let base = Url::parse(base).ok()?;
    let url = Url::parse(raw).ok()?;
    if base.origin() != url.origin() {
        return None;
    }

    let base_segments: Vec<&str> = base
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    let segments: Vec<&str> = url.path_segments()?.collect();
    if segments.len() < base_segments.len() + 3 || !segments.starts_with(&base_segments) {
        return None;
    }

    let rest = &segments[base_segments.len()..];
    let decode = |s: &str| urlencoding::decode(s).ok().map(|c| c.into_owned());
    let filename = rest[2..]
        .iter()
        .map(|s| decode(s))
        .collect::<Option<Vec<_>>>()?
        .join("/");
    if filename.is_empty() {
        return None;
    }

    Some(ProxiedUrl {
        alias: decode(rest[0])?,
        version: decode(rest[1])?,
        filename,
    })
}
