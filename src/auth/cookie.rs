//! Cross-origin cookie rewriting
//!
//! Cookies issued by the session authority carry the OAuth state nonce. The
//! browser has to send them back when the provider redirects to the
//! authority's callback, which is a cross-site navigation, so every forwarded
//! cookie needs `SameSite=None` and `Secure`.
//!
//! Rewriting works on the raw `Set-Cookie` bytes rather than a parsed
//! cookie so that the `name=value` pair and the remaining attributes survive
//! byte for byte and in their original order, including values that are not
//! ASCII. Attribute names are ASCII, so splitting on `;` is safe.

use axum::http::HeaderValue;
use axum_extra::extract::cookie::Cookie;
use std::fmt;

/// A `Set-Cookie` value guaranteed to carry a `SameSite` and a `Secure`
/// attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenCookie(Vec<u8>);

impl RewrittenCookie {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Cookie name, for logging. `None` if the value does not parse as a
    /// cookie at all.
    pub fn name(&self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.0);
        Cookie::parse(text.as_ref())
            .ok()
            .map(|cookie| cookie.name().to_string())
    }

    pub fn to_header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_bytes(&self.0).ok()
    }
}

impl fmt::Display for RewrittenCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Rewrite a raw `Set-Cookie` value for cross-origin delivery.
///
/// `SameSite=None` and `Secure` are inserted right after the `name=value`
/// pair when the cookie lacks them. Existing attributes, including an
/// existing `SameSite` of any value, are kept as they are. Applying the
/// rewrite to its own output returns it unchanged.
pub fn rewrite_for_cross_origin(raw: &[u8]) -> RewrittenCookie {
    let mut parts = raw.split(|&byte| byte == b';');
    let name_value = parts.next().unwrap_or_default();
    let attributes: Vec<&[u8]> = parts
        .map(<[u8]>::trim_ascii)
        .filter(|part| !part.is_empty())
        .collect();

    let has_same_site = attributes.iter().any(|attr| is_attribute(attr, b"SameSite"));
    let has_secure = attributes.iter().any(|attr| is_attribute(attr, b"Secure"));

    let mut rewritten = Vec::with_capacity(raw.len() + 24);
    rewritten.extend_from_slice(name_value);
    if !has_same_site {
        rewritten.extend_from_slice(b"; SameSite=None");
    }
    if !has_secure {
        rewritten.extend_from_slice(b"; Secure");
    }
    for attribute in attributes {
        rewritten.extend_from_slice(b"; ");
        rewritten.extend_from_slice(attribute);
    }

    RewrittenCookie(rewritten)
}

// Attribute names are case-insensitive (RFC 6265 5.2).
fn is_attribute(attribute: &[u8], name: &[u8]) -> bool {
    attribute
        .split(|&byte| byte == b'=')
        .next()
        .map(<[u8]>::trim_ascii)
        .is_some_and(|attr_name| attr_name.eq_ignore_ascii_case(name))
}
