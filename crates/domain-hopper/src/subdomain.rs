//! Random subdomain rotation applied on every outgoing hop.

use std::net::Ipv4Addr;

use rand::distributions::Alphanumeric;
use rand::{CryptoRng, Rng};

pub const MIN_LABEL_LEN: usize = 3;
pub const MAX_LABEL_LEN: usize = 6;

const SCHEMES: [&str; 2] = ["https://", "http://"];

/// A random `[A-Za-z0-9]` label whose length is uniform over 3..=6.
pub fn random_label<R: Rng + CryptoRng>(rng: &mut R) -> String {
    let len = rng.gen_range(MIN_LABEL_LEN..=MAX_LABEL_LEN);
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

/// Replace the leftmost host label of `url` with a fresh random label.
///
/// Returns `url` unchanged when it has no http(s) scheme, its host is an IP
/// literal, or its host has no `.` separating a leftmost label. Userinfo and
/// port are preserved.
pub fn rotate_subdomain(url: &str) -> String {
    rotate_subdomain_with(url, &mut rand::thread_rng())
}

pub fn rotate_subdomain_with<R: Rng + CryptoRng>(url: &str, rng: &mut R) -> String {
    let Some(scheme_len) = SCHEMES
        .iter()
        .find(|s| {
            url.get(..s.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(s))
        })
        .map(|s| s.len())
    else {
        tracing::warn!(url = %url, "No http(s) scheme, subdomain left unchanged");
        return url.to_string();
    };

    let rest = &url[scheme_len..];
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let host_start = rest[..authority_end].rfind('@').map_or(0, |at| at + 1);
    let host = &rest[host_start..authority_end];
    let hostname = host.rsplit_once(':').map_or(host, |(name, _port)| name);

    if hostname.parse::<Ipv4Addr>().is_ok() || hostname.starts_with('[') {
        tracing::warn!(url = %url, "Host is an IP literal, left unchanged");
        return url.to_string();
    }

    match host.find('.') {
        Some(dot) if dot > 0 => {
            let label_start = scheme_len + host_start;
            format!(
                "{}{}{}",
                &url[..label_start],
                random_label(rng),
                &url[label_start + dot..]
            )
        }
        _ => {
            tracing::warn!(url = %url, "Host has no subdomain label, left unchanged");
            url.to_string()
        }
    }
}

/// Append the continuation parameter carried to the next hop.
/// Inserted ahead of any `#fragment`.
pub fn with_pool_index(url: &str, index: usize) -> String {
    let (base, fragment) = match url.find('#') {
        Some(hash) => url.split_at(hash),
        None => (url, ""),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}poolIndex={index}{fragment}")
}
