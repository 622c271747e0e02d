//! Resolver: normalize a hostname or URL and derive its zone, node and name facets.
//! Pure string rewriting; no name system is consulted.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::cache::DomainCache;

/// Tag that replaces the final label of every derived zone and name.
pub const DEFAULT_SUFFIX: &str = "zwb";

/// Static-site hosting domain whose hosts get an alias instead of generic rewriting.
pub const HOSTING_SUFFIX: &str = ".github.io";

/// Number of distinct inputs remembered by [`Resolver::describe`].
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Invalid hostname, URL or suffix input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("a hostname or URL is required")]
    Empty,
    #[error("unable to determine hostname from '{0}'")]
    NoHostname(String),
    #[error("domain must not be empty")]
    EmptyDomain,
    #[error("suffix must not be empty")]
    EmptySuffix,
}

/// Facets derived from one input string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainParts {
    pub hostname: String,
    pub zone: String,
    pub node: String,
    pub name: String,
}

/// Components of a URL split the way `scheme://netloc/path?query#fragment` reads.
/// The host is kept opaque: no IP or IDNA rewriting and no port validation.
struct SplitUrl<'a> {
    netloc: Option<&'a str>,
    path: &'a str,
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn split_url(url: &str) -> SplitUrl<'_> {
    let mut rest = url;
    if let Some(colon) = url.find(':') {
        if colon > 0 && is_scheme(&url[..colon]) {
            rest = &url[colon + 1..];
        }
    }
    let netloc = match rest.strip_prefix("//") {
        Some(after) => {
            let end = after.find(['/', '?', '#']).unwrap_or(after.len());
            rest = &after[end..];
            Some(&after[..end])
        }
        None => None,
    };
    let path_end = rest.find(['?', '#']).unwrap_or(rest.len());
    SplitUrl {
        netloc,
        path: &rest[..path_end],
    }
}

/// Host part of a netloc: userinfo and port dropped, IPv6 brackets removed, lower-cased.
/// `None` for an empty host or unbalanced brackets.
fn netloc_host(netloc: &str) -> Option<String> {
    if netloc.contains('[') != netloc.contains(']') {
        return None;
    }
    let hostinfo = netloc.rsplit_once('@').map_or(netloc, |(_, h)| h);
    let host = match hostinfo.split_once('[') {
        Some((_, bracketed)) => bracketed.split_once(']').map_or(bracketed, |(h, _)| h),
        None => hostinfo.split_once(':').map_or(hostinfo, |(h, _)| h),
    };
    if host.is_empty() {
        return None;
    }
    Some(host.to_lowercase())
}

/// Strictly parse `raw` into a trailing-dot-stripped hostname and its non-empty path segments.
/// Inputs without a scheme are treated as `http://` URLs. Path segments are kept verbatim.
pub fn normalize(raw: &str) -> Result<(String, Vec<String>), ResolveError> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return Err(ResolveError::Empty);
    }
    let candidate: Cow<'_, str> = if candidate.contains("://") {
        Cow::Borrowed(candidate)
    } else {
        Cow::Owned(format!("http://{candidate}"))
    };
    let parts = split_url(&candidate);
    let host = parts
        .netloc
        .and_then(netloc_host)
        .ok_or_else(|| ResolveError::NoHostname(raw.to_string()))?;
    let hostname = host.trim_end_matches('.');
    if hostname.is_empty() {
        return Err(ResolveError::NoHostname(raw.to_string()));
    }
    let segments = parts
        .path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Ok((hostname.to_string(), segments))
}

/// Like [`normalize`] but never fails: unparseable input degrades to the trimmed,
/// dot-stripped raw string with no path segments.
pub fn split_best_effort(raw: &str) -> (String, Vec<String>) {
    match normalize(raw) {
        Ok(parts) => parts,
        Err(_) => (raw.trim().trim_end_matches('.').to_string(), Vec::new()),
    }
}

/// Lower-case `label`, collapse runs of non-alphanumerics into one `-`, trim `-` at both ends.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut previous_dash = false;
    for c in label.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
            previous_dash = false;
        } else if !previous_dash {
            out.push('-');
            previous_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

fn owner_label(hostname: &str) -> Option<&str> {
    hostname
        .strip_suffix(HOSTING_SUFFIX)
        .map(|owner| owner.trim_matches('.'))
}

/// Alias for hosting-provider hosts: first path segment (else the owner) sanitized, plus `suffix`.
/// `suffix` must already be dot-trimmed and non-empty.
fn hosting_alias(hostname: &str, segments: &[String], suffix: &str) -> Option<String> {
    let owner = owner_label(hostname)?;
    let source = segments.first().map(String::as_str).unwrap_or(owner);
    let label = sanitize_label(source);
    if label.is_empty() {
        return None;
    }
    Some(format!("{label}.{suffix}"))
}

fn labels(hostname: &str) -> Vec<&str> {
    hostname.split('.').filter(|l| !l.is_empty()).collect()
}

fn replace_suffix(domain: &str, suffix: &str) -> Result<String, ResolveError> {
    let mut labels = labels(domain);
    match labels.len() {
        0 => Err(ResolveError::EmptyDomain),
        1 => Ok(format!("{}.{suffix}", labels[0])),
        n => {
            labels[n - 1] = suffix;
            Ok(labels.join("."))
        }
    }
}

/// Zone facet, best effort. `www.example.com` gives `example.zwb`.
pub fn zone(domain: &str) -> String {
    let (hostname, segments) = split_best_effort(domain);
    if hostname.is_empty() {
        return String::new();
    }
    if let Some(alias) = hosting_alias(&hostname, &segments, DEFAULT_SUFFIX) {
        return alias;
    }
    match labels(&hostname).as_slice() {
        [] => String::new(),
        [only] => format!("{only}.{DEFAULT_SUFFIX}"),
        [.., second, _] => format!("{second}.{DEFAULT_SUFFIX}"),
    }
}

/// Node facet, best effort: the labels preceding the zone.
pub fn node(domain: &str) -> String {
    let (hostname, segments) = split_best_effort(domain);
    if hostname.is_empty() {
        return String::new();
    }
    if hosting_alias(&hostname, &segments, DEFAULT_SUFFIX).is_some() {
        return alias_node(&hostname, &segments);
    }
    let labels = labels(&hostname);
    if labels.len() <= 2 {
        return labels.first().map(|l| l.to_string()).unwrap_or_default();
    }
    labels[..labels.len() - 2].join(".")
}

fn alias_node(hostname: &str, segments: &[String]) -> String {
    if segments.is_empty() {
        return String::new();
    }
    owner_label(hostname).map(sanitize_label).unwrap_or_default()
}

/// Name facet: the final label replaced by `suffix` (appended for single-label hosts),
/// or the hosting alias built with `suffix`.
pub fn name(domain: &str, suffix: &str) -> Result<String, ResolveError> {
    let (hostname, segments) = split_best_effort(domain);
    if hostname.is_empty() {
        return Err(ResolveError::EmptyDomain);
    }
    let suffix = suffix.trim_matches('.');
    if suffix.is_empty() {
        return Err(ResolveError::EmptySuffix);
    }
    if let Some(alias) = hosting_alias(&hostname, &segments, suffix) {
        return Ok(alias);
    }
    replace_suffix(&hostname, suffix)
}

/// Strict, uncached describe. The alias is computed once and shared by zone and name.
pub fn describe_uncached(raw: &str) -> Result<DomainParts, ResolveError> {
    let (hostname, segments) = normalize(raw)?;
    if let Some(alias) = hosting_alias(&hostname, &segments, DEFAULT_SUFFIX) {
        let node = alias_node(&hostname, &segments);
        return Ok(DomainParts {
            hostname,
            zone: alias.clone(),
            node,
            name: alias,
        });
    }
    Ok(DomainParts {
        zone: zone(&hostname),
        node: node(&hostname),
        name: name(&hostname, DEFAULT_SUFFIX)?,
        hostname,
    })
}

/// Memoizing resolver. Owns its cache; dropping the resolver drops the cache.
pub struct Resolver {
    cache: DomainCache,
}

impl Resolver {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: DomainCache::new(capacity),
        }
    }

    /// Describe `raw`, keyed by the exact input string. Failures are not cached.
    pub fn describe(&self, raw: &str) -> Result<DomainParts, ResolveError> {
        if let Some(hit) = self.cache.get(raw) {
            return Ok(hit);
        }
        let parts = describe_uncached(raw)?;
        self.cache.insert(raw.to_string(), parts.clone());
        Ok(parts)
    }

    pub fn cache(&self) -> &DomainCache {
        &self.cache
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosting_alias_without_path() {
        let parts = Resolver::new().describe("hello.github.io").unwrap();
        assert_eq!(parts.hostname, "hello.github.io");
        assert_eq!(parts.zone, "hello.zwb");
        assert_eq!(parts.node, "");
        assert_eq!(parts.name, "hello.zwb");
    }

    #[test]
    fn hosting_alias_with_project_path() {
        let parts = Resolver::new().describe("hello.github.io/hi").unwrap();
        assert_eq!(parts.zone, "hi.zwb");
        assert_eq!(parts.node, "hello");
        assert_eq!(parts.name, "hi.zwb");
    }

    #[test]
    fn hosting_alias_sanitizes_project() {
        let parts = Resolver::new()
            .describe("https://Some-Owner.github.io/My__Cool Project!/")
            .unwrap();
        assert_eq!(parts.zone, "my-cool-project.zwb");
        assert_eq!(parts.node, "some-owner");
        assert_eq!(parts.name, "my-cool-project.zwb");
    }

    #[test]
    fn hosting_alias_uses_custom_suffix_in_name() {
        assert_eq!(name("hello.github.io/hi", "web").unwrap(), "hi.web");
        assert_eq!(name("hello.github.io", ".web.").unwrap(), "hello.web");
    }

    #[test]
    fn empty_sanitized_label_falls_back_to_generic_rules() {
        let parts = describe_uncached("---.github.io").unwrap();
        assert_eq!(parts.zone, "github.zwb");
        assert_eq!(parts.node, "---");
        assert_eq!(parts.name, "---.github.zwb");
    }

    #[test]
    fn generic_zone_and_node() {
        assert_eq!(zone("www.example.com"), "example.zwb");
        assert_eq!(node("www.example.com"), "www");
        assert_eq!(node("mail.internal.example.com"), "mail.internal");
        assert_eq!(node("example.com"), "example");
    }

    #[test]
    fn single_label() {
        assert_eq!(zone("localhost"), "localhost.zwb");
        assert_eq!(node("localhost"), "localhost");
        assert_eq!(name("localhost", DEFAULT_SUFFIX).unwrap(), "localhost.zwb");
    }

    #[test]
    fn urls_and_trailing_dots() {
        let parts = describe_uncached("https://WWW.Example.com./path/to?q=1").unwrap();
        assert_eq!(parts.hostname, "www.example.com");
        assert_eq!(parts.zone, "example.zwb");
        assert_eq!(parts.node, "www");
        assert_eq!(parts.name, "www.example.zwb");
    }

    #[test]
    fn normalize_strips_empty_segments() {
        let (host, segments) = normalize("example.com//a///b/").unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(segments, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn empty_input_is_invalid() {
        let resolver = Resolver::new();
        assert_eq!(resolver.describe(""), Err(ResolveError::Empty));
        assert_eq!(resolver.describe("   "), Err(ResolveError::Empty));
        assert!(resolver.cache().is_empty());
    }

    #[test]
    fn missing_host_is_strict_in_describe_only() {
        for raw in ["http://", "https:///path", "user@", "[::1", "://example.com"] {
            assert!(
                matches!(describe_uncached(raw), Err(ResolveError::NoHostname(_))),
                "{raw}"
            );
        }
        assert_eq!(zone("http://"), "http://.zwb");
        assert_eq!(split_best_effort("  [::1.. "), ("[::1".to_string(), vec![]));
    }

    #[test]
    fn hosts_are_kept_opaque() {
        let parts = describe_uncached("1.2.3").unwrap();
        assert_eq!(parts.hostname, "1.2.3");
        assert_eq!(parts.zone, "2.zwb");
        assert_eq!(parts.node, "1");
        assert_eq!(parts.name, "1.2.zwb");

        assert_eq!(describe_uncached("999.1.1.1").unwrap().hostname, "999.1.1.1");
        assert_eq!(describe_uncached("Bücher.Example").unwrap().hostname, "bücher.example");
        assert_eq!(describe_uncached("exa mple.com").unwrap().zone, "exa mple.zwb");
    }

    #[test]
    fn ports_and_userinfo_are_dropped_unchecked() {
        assert_eq!(describe_uncached("example.com:abc").unwrap().hostname, "example.com");
        assert_eq!(describe_uncached("example.com:99999/x").unwrap().hostname, "example.com");
        assert_eq!(
            describe_uncached("ftp://me:pw@Host.example.org:21/").unwrap().hostname,
            "host.example.org"
        );
        assert_eq!(describe_uncached("http://[::1]:8080/").unwrap().hostname, "::1");
    }

    #[test]
    fn path_segments_are_not_percent_decoded() {
        let parts = describe_uncached("hello.github.io/My%20Site?x=1#top").unwrap();
        assert_eq!(parts.zone, "my-20site.zwb");
        assert_eq!(parts.name, "my-20site.zwb");
        assert_eq!(parts.node, "hello");
    }

    #[test]
    fn name_rejects_empty_inputs() {
        assert_eq!(name("", DEFAULT_SUFFIX), Err(ResolveError::EmptyDomain));
        assert_eq!(name("example.com", "..."), Err(ResolveError::EmptySuffix));
        assert_eq!(zone(""), "");
        assert_eq!(node("  "), "");
    }

    #[test]
    fn name_always_ends_with_suffix() {
        for host in ["a", "a.b", "a.b.c", "deep.sub.domain.example.org", "x.github.io/p"] {
            for suffix in ["zwb", "local", ".test."] {
                let got = name(host, suffix).unwrap();
                let expected = format!(".{}", suffix.trim_matches('.'));
                assert!(got.ends_with(&expected), "{host} {suffix} -> {got}");
            }
        }
    }

    #[test]
    fn node_and_zone_reconstruct_prefix() {
        for host in ["www.example.com", "a.b.c.d.example.org", "mail.internal.example.com"] {
            let z = zone(host);
            assert!(z.ends_with(".zwb"));
            let labels: Vec<&str> = host.split('.').collect();
            let second = labels[labels.len() - 2];
            let n = node(host);
            assert!(!n.is_empty());
            assert!(host.starts_with(&format!("{n}.{second}")));
        }
    }

    #[test]
    fn describe_is_memoized_and_stable() {
        let resolver = Resolver::with_capacity(4);
        let first = resolver.describe("www.example.com").unwrap();
        let second = resolver.describe("www.example.com").unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.cache().len(), 1);
    }
}
