use url::Url;

use crate::error::AppError;

/// Query parameters stripped during normalization. `utm_*` is handled as a
/// prefix match separately.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "mc_cid", "mc_eid", "igshid", "ref", "ref_src",
];

/// Canonicalize a URL for dedupe keys and listing upserts.
///
/// Rules: lowercase scheme and host, strip the fragment and any trailing
/// slash, drop tracking query parameters, sort the remaining parameters.
/// The function is idempotent: `normalize_url(normalize_url(u)?) == normalize_url(u)`.
pub fn normalize_url(raw: &str) -> Result<String, AppError> {
    let url = Url::parse(raw.trim()).map_err(|e| AppError::InvalidUrl(format!("{raw}: {e}")))?;

    let scheme = url.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(AppError::InvalidUrl(format!(
            "unsupported scheme '{scheme}' in {raw}"
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| AppError::InvalidUrl(format!("no host in {raw}")))?
        .to_ascii_lowercase();

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    let mut out = format!("{scheme}://{host}");
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path().trim_end_matches('/'));

    if !params.is_empty() {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &params {
            query.append_pair(k, v);
        }
        out.push('?');
        out.push_str(&query.finish());
    }

    Ok(out)
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
