//! Peer cache: volatile cache root, durable data root, persisted site directory, HTTP installs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};
use zweb_core::site::{site_dir, DIRECTORY_FILE, PAYLOAD_FILE};
use zweb_core::{CachedSite, SiteDirectory};

use crate::announce::{self, AnnounceError, AnnounceHandle};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to download site: {0}")]
    Download(#[from] reqwest::Error),
    #[error("unable to store site cache: {0}")]
    Storage(#[from] std::io::Error),
}

pub struct PeerCache {
    cache_dir: PathBuf,
    data_dir: PathBuf,
    directory_file: PathBuf,
    http: reqwest::Client,
    /// Single writer: every mutation holds this lock from its first filesystem write through its persist.
    sites: Arc<Mutex<SiteDirectory>>,
    announce: Mutex<Option<AnnounceHandle>>,
}

impl PeerCache {
    /// Create both roots and load the persisted directory (missing or corrupt ⇒ empty).
    pub async fn open(
        cache_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        download_timeout: Duration,
    ) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&cache_dir).await?;
        tokio::fs::create_dir_all(&data_dir).await?;
        let directory_file = data_dir.join(DIRECTORY_FILE);
        let sites = load_directory(&directory_file).await;
        info!(
            cache = %cache_dir.display(),
            data = %data_dir.display(),
            sites = sites.len(),
            "peer cache opened"
        );
        let http = reqwest::Client::builder().timeout(download_timeout).build()?;
        Ok(Self {
            cache_dir,
            data_dir,
            directory_file,
            http,
            sites: Arc::new(Mutex::new(sites)),
            announce: Mutex::new(None),
        })
    }

    /// Copy of the current directory.
    pub async fn snapshot(&self) -> Vec<CachedSite> {
        self.sites.lock().await.sites().to_vec()
    }

    async fn ensure_site_dirs(&self, alias: &str) -> std::io::Result<(PathBuf, PathBuf)> {
        let cache_path = site_dir(&self.cache_dir, alias);
        let data_path = site_dir(&self.data_dir, alias);
        tokio::fs::create_dir_all(&cache_path).await?;
        tokio::fs::create_dir_all(&data_path).await?;
        Ok((cache_path, data_path))
    }

    /// Download `source` and store it under `alias` in both roots, replacing any entry with that alias.
    /// On failure the directory is left untouched. Only the download runs outside the directory lock.
    pub async fn install_site(
        &self,
        source: &str,
        alias: &str,
        hostname: &str,
    ) -> Result<CachedSite, CacheError> {
        let source = source.trim();
        let source = if source.contains("://") {
            source.to_string()
        } else {
            format!("http://{source}")
        };

        let body = self
            .http
            .get(&source)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let mut sites = self.sites.lock().await;
        let (cache_path, data_path) = self.ensure_site_dirs(alias).await?;
        tokio::fs::write(cache_path.join(PAYLOAD_FILE), &body).await?;
        tokio::fs::write(data_path.join(PAYLOAD_FILE), &body).await?;

        let site = CachedSite {
            alias: alias.to_string(),
            source,
            hostname: hostname.to_string(),
            cache_path,
            data_path,
        };
        let mut next = sites.clone();
        next.upsert(site.clone());
        persist(&self.directory_file, &next).await?;
        *sites = next;
        info!(alias, source = %site.source, bytes = body.len(), "site installed");
        Ok(site)
    }

    /// Make sure both directories exist for `alias`; register a placeholder if it is unknown.
    pub async fn mark_site_cached(&self, alias: &str) -> Result<(), CacheError> {
        let mut sites = self.sites.lock().await;
        let (cache_path, data_path) = self.ensure_site_dirs(alias).await?;
        if sites.contains(alias) {
            return Ok(());
        }
        let mut next = sites.clone();
        next.upsert(CachedSite::placeholder(alias, cache_path, data_path));
        persist(&self.directory_file, &next).await?;
        *sites = next;
        info!(alias, "site marked cached");
        Ok(())
    }

    /// Start announcing the directory on `public_ip:port`.
    pub async fn start_server(&self, public_ip: &str, port: u16) -> Result<std::net::SocketAddr, AnnounceError> {
        let mut slot = self.announce.lock().await;
        if slot.is_some() {
            return Err(AnnounceError::AlreadyRunning);
        }
        let handle = announce::start(public_ip, port, self.sites.clone()).await?;
        let addr = handle.local_addr();
        *slot = Some(handle);
        Ok(addr)
    }

    /// No-op when not running.
    pub async fn stop_server(&self) {
        let handle = self.announce.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub async fn server_running(&self) -> bool {
        self.announce.lock().await.is_some()
    }

    /// Stop the announce server and empty the cache root. The data root is never touched;
    /// individual deletion failures are logged and skipped.
    pub async fn cleanup_on_exit(&self) {
        self.stop_server().await;
        let _guard = self.sites.lock().await;
        let mut entries = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.cache_dir.display(), error = %e, "cache root unreadable");
                return;
            }
        };
        let mut removed = 0usize;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "cache listing failed");
                    break;
                }
            };
            let path = entry.path();
            let result = match entry.file_type().await {
                Ok(t) if t.is_dir() => tokio::fs::remove_dir_all(&path).await,
                Ok(_) => tokio::fs::remove_file(&path).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "cache entry not removed"),
            }
        }
        info!(removed, "cache purged");
    }
}

async fn load_directory(path: &Path) -> SiteDirectory {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => SiteDirectory::from_json(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => SiteDirectory::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "site directory unreadable, starting empty");
            SiteDirectory::new()
        }
    }
}

/// Whole-file rewrite through a temporary sibling.
async fn persist(path: &Path, sites: &SiteDirectory) -> std::io::Result<()> {
    let text = sites
        .to_json()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, text).await?;
    tokio::fs::rename(&tmp, path).await
}
