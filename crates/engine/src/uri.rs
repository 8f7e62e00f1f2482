//! DRS URI classification.
//!
//! Two URI shapes arrive here: conventional `drs://host/path` URIs that
//! standard URL parsing understands, and Compact Identifier-Based (CIB)
//! URIs whose "host" is a short registered namespace prefix. CIB URIs are
//! not valid W3C/IETF URIs (the separator may be a `:`), so they are
//! recognized with dedicated patterns before falling back to `url::Url`.
//!
//! The `dos` scheme is accepted everywhere `drs` is; older repositories
//! still emit it.

use once_cell::sync::Lazy;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;

use drshub_types::ResolveError;

use crate::config::DrsHubConfig;

/// DRS protocol prefix for object endpoints.
pub const DRS_OBJECTS_PATH: &str = "/ga4gh/drs/v1/objects";

pub const NS_BDC_PROD: &str = "dg.4503";
pub const NS_BDC_STAGING: &str = "dg.712c";
pub const NS_ANVIL: &str = "dg.anv0";
pub const NS_TDR: &str = "drs.anv0";
pub const NS_CRDC: &str = "dg.4dfc";
pub const NS_KIDS_FIRST: &str = "dg.f82a1a";
pub const NS_PASSPORT_TEST: &str = "dg.test0";

// Compact hosts with a colon separator, e.g. drs://dg.4503:object-id or the
// doubled form drs://dg.4503:dg.4503/object-id.
static CIB_COLON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:dos|drs)://((?:dg|drs)\.[0-9a-z-]+):([^?]*)(?:\?(.*))?$")
        .expect("compact colon pattern")
});

// Compact hosts with a slash separator, e.g. drs://dg.anv0/object-id.
static CIB_SLASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:dos|drs)://((?:dg|drs)\.[0-9a-z-]+)/([^?]*)(?:\?(.*))?$")
        .expect("compact slash pattern")
});

// encodeURIComponent's unreserved set.
const COMPONENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// The HTTPS URL parts a DRS URI resolves to. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    /// Host with the caller's casing preserved (server-side object paths can
    /// be case-sensitive); compare case-insensitively.
    pub host: String,
    pub port: Option<u16>,
    /// Object identifier, percent-encoded as it should appear in the path.
    pub object_id: String,
    pub query: Option<String>,
    /// Set for compact URIs whose prefix is not a BioData Catalyst prefix:
    /// legacy aliases resolve through the same hosts without being BDC data,
    /// so the BDC host rule must not claim them.
    pub legacy_ambiguous: bool,
}

/// Parses either URI shape into [`UrlParts`], expanding compact namespace
/// prefixes through the static registry.
pub fn parse_drs_uri(raw: &str, config: &DrsHubConfig) -> Result<UrlParts, ResolveError> {
    if let Some(captures) = CIB_COLON.captures(raw) {
        let prefix = &captures[1];
        let mut suffix = captures.get(2).map_or("", |m| m.as_str());
        // Doubled form: the prefix appears again before the object id.
        let doubled = format!("{}/", prefix.to_lowercase());
        if suffix.to_lowercase().starts_with(&doubled) {
            suffix = &suffix[doubled.len()..];
        }
        return expand_compact(prefix, suffix, true, capture_text(&captures, 3), config);
    }

    if let Some(captures) = CIB_SLASH.captures(raw) {
        let prefix = &captures[1];
        let suffix = captures.get(2).map_or("", |m| m.as_str());
        return expand_compact(prefix, suffix, false, capture_text(&captures, 3), config);
    }

    parse_conventional(raw)
}

fn capture_text(captures: &regex::Captures<'_>, index: usize) -> Option<String> {
    captures.get(index).map(|m| m.as_str().to_string())
}

fn expand_compact(
    prefix: &str,
    suffix: &str,
    colon_separated: bool,
    query: Option<String>,
    config: &DrsHubConfig,
) -> Result<UrlParts, ResolveError> {
    let prefix_lc = prefix.to_lowercase();
    let host = match prefix_lc.as_str() {
        NS_BDC_PROD => &config.bdc_prod_host,
        NS_BDC_STAGING => &config.bdc_staging_host,
        NS_ANVIL => &config.anvil_host,
        NS_TDR => &config.terra_data_repo_host,
        NS_CRDC => &config.crdc_host,
        NS_KIDS_FIRST => &config.kids_first_host,
        NS_PASSPORT_TEST => &config.passport_test_host,
        _ => {
            return Err(ResolveError::Request(format!(
                "Unrecognized Compact Identifier Based host '{prefix}'."
            )));
        }
    };

    // A few namespaces register their objects under `prefix/suffix`; the
    // rest use the bare suffix.
    let object_id = match prefix_lc.as_str() {
        NS_BDC_PROD | NS_BDC_STAGING | NS_ANVIL => format!("{prefix}/{suffix}"),
        _ => suffix.to_string(),
    };
    // Slash-separated compact ids pass their slashes through; colon-separated
    // ones encode the whole identifier as a single path segment.
    let object_id = if colon_separated {
        utf8_percent_encode(&object_id, COMPONENT_ENCODE_SET).to_string()
    } else {
        object_id
    };

    Ok(UrlParts {
        host: host.clone(),
        port: None,
        object_id,
        query,
        legacy_ambiguous: !matches!(prefix_lc.as_str(), NS_BDC_PROD | NS_BDC_STAGING),
    })
}

fn parse_conventional(raw: &str) -> Result<UrlParts, ResolveError> {
    let parsed = url::Url::parse(raw).map_err(|error| ResolveError::Request(error.to_string()))?;

    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => {
            return Err(ResolveError::Request(format!(
                "\"{raw}\" is missing a host and/or a path."
            )));
        }
    };
    let path = parsed.path();
    if path.is_empty() || path == "/" {
        return Err(ResolveError::Request(format!(
            "\"{raw}\" is missing a host and/or a path."
        )));
    }

    Ok(UrlParts {
        host: preserve_host_case(raw, &host),
        port: parsed.port(),
        object_id: path.trim_start_matches('/').to_string(),
        query: parsed.query().map(str::to_string),
        legacy_ambiguous: false,
    })
}

/// URL parsing lowercases hostnames, but the host of a DRS URI ends up in
/// the *path* of the resolution URL, where case matters. Recover the
/// caller's casing from the raw string.
fn preserve_host_case(raw: &str, host_lc: &str) -> String {
    let raw_lc = raw.to_ascii_lowercase();
    match raw_lc.find(&host_lc.to_ascii_lowercase()) {
        Some(index) => raw[index..index + host_lc.len()].to_string(),
        None => host_lc.to_string(),
    }
}

/// Resolution URL for the provider's object metadata endpoint.
pub fn metadata_url(parts: &UrlParts) -> String {
    object_url(parts, None)
}

/// Resolution URL for the provider's `access` endpoint.
pub fn access_endpoint_url(parts: &UrlParts, access_id: &str) -> String {
    object_url(parts, Some(access_id))
}

fn object_url(parts: &UrlParts, access_id: Option<&str>) -> String {
    let mut url = format!("https://{}", parts.host);
    if let Some(port) = parts.port {
        url.push_str(&format!(":{port}"));
    }
    url.push_str(DRS_OBJECTS_PATH);
    url.push('/');
    url.push_str(&parts.object_id);
    if let Some(access_id) = access_id {
        url.push_str("/access/");
        url.push_str(access_id);
    }
    if let Some(query) = &parts.query {
        url.push('?');
        url.push_str(query);
    }
    url
}
