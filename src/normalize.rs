//! URL normalization
//!
//! The normalized form is the only dedup key used by the catalog, the score
//! table, the directive pool and attribution. Normalization lowercases the
//! scheme and host, strips the fragment, strips one trailing slash from
//! non-root paths and keeps the query verbatim (an empty `?` is preserved).

use crate::error::EngineError;

/// Components of an absolute http(s) URL
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedUrl<'a> {
    scheme: String,
    authority: &'a str,
    path: &'a str,
    query: Option<&'a str>,
}

fn parse(raw: &str) -> Result<ParsedUrl<'_>, EngineError> {
    let trimmed = raw.trim();
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| EngineError::InvalidUrl(raw.to_string()))?;

    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(EngineError::InvalidUrl(raw.to_string()));
    }

    let without_fragment = match rest.split_once('#') {
        Some((before, _)) => before,
        None => rest,
    };

    let authority_end = without_fragment
        .find(['/', '?'])
        .unwrap_or(without_fragment.len());
    let authority = &without_fragment[..authority_end];
    if authority.is_empty() || authority.contains(char::is_whitespace) {
        return Err(EngineError::InvalidUrl(raw.to_string()));
    }

    let remainder = &without_fragment[authority_end..];
    let (path, query) = match remainder.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (remainder, None),
    };

    if path.contains(char::is_whitespace) {
        return Err(EngineError::InvalidUrl(raw.to_string()));
    }

    Ok(ParsedUrl {
        scheme,
        authority,
        path,
        query,
    })
}

/// Collapse `.` and `..` segments of an absolute path (RFC 3986 §5.2.4).
/// `..` above the root stays at the root.
fn remove_dot_segments(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let mut output: Vec<&str> = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        match *segment {
            "." => {}
            ".." => {
                output.pop();
            }
            other => {
                output.push(other);
                continue;
            }
        }
        // A trailing dot segment names the directory itself
        if last {
            output.push("");
        }
    }
    format!("/{}", output.join("/"))
}

/// Normalize an absolute http(s) URL into its dedup key.
///
/// # Example
/// ```
/// use hoverfetch::normalize::normalize_url;
/// assert_eq!(normalize_url("https://A.com/x/#top").unwrap(), "https://a.com/x");
/// ```
pub fn normalize_url(raw: &str) -> Result<String, EngineError> {
    let parsed = parse(raw)?;

    let resolved = if parsed.path.is_empty() {
        "/".to_string()
    } else {
        remove_dot_segments(parsed.path)
    };
    let mut path = resolved.as_str();
    if path.len() > 1 && path.ends_with('/') {
        path = &path[..path.len() - 1];
    }

    let mut normalized = format!(
        "{}://{}{}",
        parsed.scheme,
        parsed.authority.to_ascii_lowercase(),
        path
    );
    if let Some(query) = parsed.query {
        normalized.push('?');
        normalized.push_str(query);
    }
    Ok(normalized)
}

/// Resolve an href found on a page against the page URL, then normalize it.
///
/// Handles absolute, protocol-relative, root-relative, query-only and
/// document-relative references. Anything else (`mailto:`, `javascript:`,
/// bare fragments) is rejected.
pub fn resolve_href(base: &str, href: &str) -> Result<String, EngineError> {
    let href = href.trim();
    if href.contains("://") {
        return normalize_url(href);
    }
    if href.is_empty() || href.starts_with('#') {
        return Err(EngineError::InvalidUrl(href.to_string()));
    }
    if let Some((scheme, _)) = href.split_once(':') {
        if !scheme.contains('/') && !scheme.contains('?') {
            return Err(EngineError::InvalidUrl(href.to_string()));
        }
    }

    let base = parse(base)?;
    let origin = format!("{}://{}", base.scheme, base.authority);

    let joined = if let Some(rest) = href.strip_prefix("//") {
        format!("{}://{}", base.scheme, rest)
    } else if href.starts_with('/') {
        format!("{origin}{href}")
    } else if href.starts_with('?') {
        let path = if base.path.is_empty() { "/" } else { base.path };
        format!("{origin}{path}{href}")
    } else {
        let directory = match base.path.rfind('/') {
            Some(idx) => &base.path[..=idx],
            None => "/",
        };
        format!("{origin}{directory}{href}")
    };

    normalize_url(&joined)
}

/// Host part of a normalized URL, used for per-domain policy lookups
pub fn domain_of(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = host.split(':').next().unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
