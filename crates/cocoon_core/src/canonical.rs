use url::{form_urlencoded, Url};

use crate::{Error, Result};

const TRACKING_PARAMS: &[&str] = &["spm", "from"];

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name)
}

/// Checks the decoded name of one raw `name=value` query segment.
fn is_tracking_segment(segment: &str) -> bool {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(name, _)| is_tracking_param(&name))
        .unwrap_or(false)
}

/// Normalizes an absolute URL into the key used for deduplication.
///
/// Scheme and host are lowercased by the parser, the fragment is dropped and
/// tracking parameters are removed. Everything else, including the order of
/// the remaining query parameters, is preserved.
pub fn canonicalize_url(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::InvalidUrl(format!("unsupported scheme in {}", raw)));
    }
    if url.host_str().is_none() {
        return Err(Error::InvalidUrl(format!("missing host in {}", raw)));
    }

    url.set_fragment(None);

    // Kept segments stay byte-for-byte as received so the key does not
    // depend on whether a tracking parameter was attached.
    let filtered = url.query().and_then(|query| {
        let segments: Vec<&str> = query.split('&').collect();
        let kept: Vec<&str> = segments
            .iter()
            .copied()
            .filter(|segment| !is_tracking_segment(segment))
            .collect();
        (kept.len() != segments.len()).then(|| kept.join("&"))
    });
    if let Some(kept) = filtered {
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&kept));
        }
    }

    Ok(url.to_string())
}
