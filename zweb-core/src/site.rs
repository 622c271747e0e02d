//! Site directory: cached-site records keyed by alias, and their JSON form.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// File name of the persisted directory inside the durable data root.
pub const DIRECTORY_FILE: &str = "sites.json";
/// Payload file written under each site's cache and data directories.
pub const PAYLOAD_FILE: &str = "site.html";

/// One cached site. Placeholders have empty `source` and `hostname`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSite {
    pub alias: String,
    pub source: String,
    pub hostname: String,
    pub cache_path: PathBuf,
    pub data_path: PathBuf,
}

impl CachedSite {
    pub fn placeholder(alias: &str, cache_path: PathBuf, data_path: PathBuf) -> Self {
        Self {
            alias: alias.to_string(),
            source: String::new(),
            hostname: String::new(),
            cache_path,
            data_path,
        }
    }
}

/// Directory name for `alias`: path separators become `-`; empty, `.` and `..` become `unknown`.
pub fn safe_alias(alias: &str) -> String {
    let safe = alias.replace(['/', '\\'], "-");
    match safe.as_str() {
        "" | "." | ".." => "unknown".to_string(),
        _ => safe,
    }
}

/// `<root>/<safe alias>`.
pub fn site_dir(root: &Path, alias: &str) -> PathBuf {
    root.join(safe_alias(alias))
}

/// Ordered collection of sites with unique aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteDirectory {
    sites: Vec<CachedSite>,
}

impl SiteDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a persisted directory. Corrupt input yields an empty directory;
    /// malformed entries are skipped and duplicate aliases keep the last one.
    pub fn from_json(text: &str) -> Self {
        let entries: Vec<serde_json::Value> = match serde_json::from_str(text) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "site directory is corrupt, starting empty");
                return Self::new();
            }
        };
        let mut dir = Self::new();
        for entry in entries {
            match serde_json::from_value::<CachedSite>(entry) {
                Ok(site) if !site.alias.is_empty() => dir.upsert(site),
                Ok(_) => warn!("skipping site entry without alias"),
                Err(e) => warn!(error = %e, "skipping malformed site entry"),
            }
        }
        dir
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.sites)
    }

    /// Insert `site`, replacing any entry with the same alias. The new entry goes last.
    pub fn upsert(&mut self, site: CachedSite) {
        self.sites.retain(|existing| existing.alias != site.alias);
        self.sites.push(site);
    }

    pub fn get(&self, alias: &str) -> Option<&CachedSite> {
        self.sites.iter().find(|s| s.alias == alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.get(alias).is_some()
    }

    pub fn sites(&self) -> &[CachedSite] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(alias: &str, source: &str) -> CachedSite {
        CachedSite {
            alias: alias.to_string(),
            source: source.to_string(),
            hostname: "host".to_string(),
            cache_path: PathBuf::from("cache").join(alias),
            data_path: PathBuf::from("data").join(alias),
        }
    }

    #[test]
    fn upsert_replaces_same_alias() {
        let mut dir = SiteDirectory::new();
        dir.upsert(site("a", "http://one"));
        dir.upsert(site("b", "http://two"));
        dir.upsert(site("a", "http://three"));
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.sites()[0].alias, "b");
        assert_eq!(dir.get("a").unwrap().source, "http://three");
    }

    #[test]
    fn json_roundtrip_keeps_placeholders() {
        let mut dir = SiteDirectory::new();
        dir.upsert(site("a", "http://one"));
        dir.upsert(CachedSite::placeholder("p", "cache/p".into(), "data/p".into()));
        let text = dir.to_json().unwrap();
        assert!(text.contains("\"cache_path\""));
        assert_eq!(SiteDirectory::from_json(&text), dir);
    }

    #[test]
    fn corrupt_json_is_empty() {
        assert!(SiteDirectory::from_json("{not json").is_empty());
        assert!(SiteDirectory::from_json("{\"alias\": \"a\"}").is_empty());
        assert!(SiteDirectory::from_json("").is_empty());
    }

    #[test]
    fn malformed_entries_skipped() {
        let text = r#"[
            {"alias": "a", "source": "s", "hostname": "h", "cache_path": "c/a", "data_path": "d/a"},
            {"alias": "b"},
            {"alias": "", "source": "s", "hostname": "h", "cache_path": "c", "data_path": "d"},
            {"alias": "a", "source": "s2", "hostname": "h", "cache_path": "c/a", "data_path": "d/a"}
        ]"#;
        let dir = SiteDirectory::from_json(text);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get("a").unwrap().source, "s2");
    }

    #[test]
    fn safe_alias_names() {
        assert_eq!(safe_alias("hi.zwb"), "hi.zwb");
        assert_eq!(safe_alias("a/b\\c"), "a-b-c");
        assert_eq!(safe_alias(""), "unknown");
        assert_eq!(safe_alias(".."), "unknown");
        assert_eq!(site_dir(Path::new("cache"), "x/y"), PathBuf::from("cache/x-y"));
    }
}
