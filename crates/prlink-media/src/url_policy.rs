use std::net::{Ipv4Addr, Ipv6Addr};

use reqwest::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of classifying an image URL before it is fetched.
pub struct UrlSafetyDecision {
    pub accepted: bool,
    pub reason_code: &'static str,
}

impl UrlSafetyDecision {
    const fn allow(reason_code: &'static str) -> Self {
        Self {
            accepted: true,
            reason_code,
        }
    }

    const fn deny(reason_code: &'static str) -> Self {
        Self {
            accepted: false,
            reason_code,
        }
    }
}

/// Classifies `url` for fetching.
///
/// Only `https` is accepted. A non-empty `allowed_hosts` list switches to exact
/// host matching; otherwise loopback, private, and link-local hosts are denied.
pub fn evaluate_image_url_policy(url: &str, allowed_hosts: &[String]) -> UrlSafetyDecision {
    match Url::parse(url) {
        Ok(parsed) => evaluate_parsed_url_policy(&parsed, allowed_hosts),
        Err(_) => UrlSafetyDecision::deny("deny_invalid_url"),
    }
}

pub fn evaluate_parsed_url_policy(parsed: &Url, allowed_hosts: &[String]) -> UrlSafetyDecision {
    if parsed.scheme() != "https" {
        return UrlSafetyDecision::deny("deny_non_https_scheme");
    }
    let Some(host) = parsed.host() else {
        return UrlSafetyDecision::deny("deny_missing_host");
    };

    if !allowed_hosts.is_empty() {
        let host_name = host.to_string();
        let listed = allowed_hosts
            .iter()
            .map(|allowed| allowed.trim())
            .any(|allowed| allowed.eq_ignore_ascii_case(&host_name));
        return if listed {
            UrlSafetyDecision::allow("allow_host_allowlist")
        } else {
            UrlSafetyDecision::deny("deny_host_not_allowlisted")
        };
    }

    let internal = match host {
        url::Host::Ipv4(addr) => is_internal_ipv4(addr),
        url::Host::Ipv6(addr) => is_internal_ipv6(addr),
        url::Host::Domain(domain) => is_loopback_domain(domain),
    };
    if internal {
        UrlSafetyDecision::deny("deny_internal_host")
    } else {
        UrlSafetyDecision::allow("allow_public_host")
    }
}

pub fn is_safe_image_url(url: &str, allowed_hosts: &[String]) -> bool {
    evaluate_image_url_policy(url, allowed_hosts).accepted
}

fn is_internal_ipv4(addr: Ipv4Addr) -> bool {
    let [first, second, ..] = addr.octets();
    first == 127
        || first == 10
        || first == 0
        || (first == 172 && (16..=31).contains(&second))
        || (first == 192 && second == 168)
        || (first == 169 && second == 254)
}

fn is_internal_ipv6(addr: Ipv6Addr) -> bool {
    if let Some(mapped) = addr.to_ipv4_mapped() {
        return is_internal_ipv4(mapped);
    }
    let first_segment = addr.segments()[0];
    addr.is_loopback()
        || addr.is_unspecified()
        || (first_segment & 0xffc0) == 0xfe80
        || (first_segment & 0xfe00) == 0xfc00
}

fn is_loopback_domain(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    domain == "localhost" || domain.ends_with(".localhost")
}
