//! URL Canonicalizer (spec §4.1).
//!
//! Pure, deterministic, no I/O: two spellings of the same competitor page
//! collapse to one canonical string used as the tracker dedupe key.

use url::Url;

use crate::error::FailureKind;

/// Query parameters stripped during canonicalization. Prefixed entries
/// (`utm_*`, `mc_*`) are matched by prefix below.
const TRACKING_PARAM_PREFIXES: &[&str] = &["utm_", "mc_"];
const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "ref"];

/// Canonicalize a competitor URL. Fails with `InvalidUrl` when the scheme is
/// not `http`/`https` or the host is empty.
pub fn canonicalize(raw: &str) -> Result<String, FailureKind> {
    if raw.trim().is_empty() {
        return Err(FailureKind::InvalidUrl);
    }

    let mut url = Url::parse(raw).map_err(|_| FailureKind::InvalidUrl)?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FailureKind::InvalidUrl);
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(FailureKind::InvalidUrl);
    }

    // Lowercase scheme and host.
    let host = url.host_str().unwrap().to_ascii_lowercase();
    url.set_host(Some(&host)).map_err(|_| FailureKind::InvalidUrl)?;
    let scheme = url.scheme().to_ascii_lowercase();
    let _ = url.set_scheme(&scheme);

    // Strip default port.
    let is_default_port = matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    if is_default_port {
        let _ = url.set_port(None);
    }

    // Remove fragment.
    url.set_fragment(None);

    // Sort query parameters by name, dropping tracking params.
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    // Remove trailing slash unless path is exactly "/".
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Ok(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    TRACKING_PARAM_PREFIXES
        .iter()
        .any(|p| lower.starts_with(p))
        || TRACKING_PARAMS.contains(&lower.as_str())
}
