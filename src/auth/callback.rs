//! Callback URL handling
//!
//! The callback URL is where the browser lands after sign-in, and also where
//! it is sent when initiation fails. It must therefore be absolute before the
//! relay does anything that can fail.

use url::Url;

/// Value of the `error` query parameter on every failure redirect.
pub const OAUTH_INIT_FAILED: &str = "oauth_init_failed";

/// Resolve `raw` into an absolute URL.
///
/// Absolute values are returned as they are. Relative values are joined onto
/// the origin of the first candidate that parses as an absolute URL, tried
/// in order: the `Origin` header, the `Referer` header, `default_origin`.
/// Only the origin of the chosen candidate is used, so a referer path never
/// leaks into the result.
pub fn resolve_callback_url(
    raw: &str,
    origin: Option<&str>,
    referer: Option<&str>,
    default_origin: &Url,
) -> Url {
    if let Ok(absolute) = Url::parse(raw) {
        return absolute;
    }

    let candidates = [origin, referer]
        .into_iter()
        .flatten()
        .filter_map(origin_base)
        .chain(std::iter::once(origin_root(default_origin)));

    for base in candidates {
        if let Ok(resolved) = base.join(raw) {
            return resolved;
        }
    }

    origin_root(default_origin)
}

/// Append the failure parameters to the callback URL.
///
/// Existing `error`/`error_description` parameters are replaced; every other
/// query parameter is kept in order.
pub fn error_location(callback: &Url, description: &str) -> Url {
    let mut location = callback.clone();
    let retained: Vec<(String, String)> = callback
        .query_pairs()
        .filter(|(key, _)| key != "error" && key != "error_description")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    location.set_query(None);
    {
        let mut query = location.query_pairs_mut();
        for (key, value) in &retained {
            query.append_pair(key, value);
        }
        query.append_pair("error", OAUTH_INIT_FAILED);
        query.append_pair("error_description", description);
    }

    location
}

fn origin_base(candidate: &str) -> Option<Url> {
    let parsed = Url::parse(candidate.trim()).ok()?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return None;
    }
    Url::parse(&origin.ascii_serialization()).ok()
}

fn origin_root(url: &Url) -> Url {
    origin_base(url.as_str()).unwrap_or_else(|| url.clone())
}
