//! Interactive session: lookups, site installs and announce control routed to a [`Frontend`].

use std::io::Write;
use std::sync::Arc;

use tracing::warn;
use zweb_core::{DomainParts, Frontend, ServerEntry};

use crate::client::{ClientError, LookupClient};
use crate::peer_cache::PeerCache;

/// Plain-text frontend over any writer.
pub struct TerminalFrontend<W: Write> {
    out: W,
}

impl<W: Write> TerminalFrontend<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            warn!(error = %e, "terminal write failed");
        }
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

impl<W: Write> Frontend for TerminalFrontend<W> {
    fn display_lookup_result(&mut self, parts: &DomainParts) {
        self.line(&format!("hostname: {}", or_dash(&parts.hostname)));
        self.line(&format!("zone:     {}", or_dash(&parts.zone)));
        self.line(&format!("node:     {}", or_dash(&parts.node)));
        self.line(&format!("name:     {}", or_dash(&parts.name)));
    }

    // The HTML page is meant for graphical frontends; a terminal shows the reason only.
    fn display_error(&mut self, message: &str, _page: Option<&str>) {
        self.line(&format!("error: {message}"));
    }

    fn display_server_directory(&mut self, domain_server: &str, servers: &[ServerEntry]) {
        self.line(&format!("domain server: {domain_server}"));
        for s in servers {
            if s.description.is_empty() {
                self.line(&format!("  {} {}", s.name, s.address));
            } else {
                self.line(&format!("  {} {} ({})", s.name, s.address, s.description));
            }
        }
    }

    fn display_status(&mut self, message: &str) {
        self.line(message);
    }
}

pub struct Session<F: Frontend> {
    client: LookupClient,
    cache: Arc<PeerCache>,
    frontend: F,
    last_query: Option<String>,
    current: Option<DomainParts>,
    current_alias: Option<String>,
}

impl<F: Frontend> Session<F> {
    pub fn new(client: LookupClient, cache: Arc<PeerCache>, frontend: F) -> Self {
        Self {
            client,
            cache,
            frontend,
            last_query: None,
            current: None,
            current_alias: None,
        }
    }

    #[allow(dead_code)]
    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    #[allow(dead_code)]
    pub fn current_alias(&self) -> Option<&str> {
        self.current_alias.as_deref()
    }

    fn show_client_error(&mut self, e: ClientError) {
        match e {
            ClientError::Server { message, error_page } => {
                self.frontend.display_error(&message, error_page.as_deref())
            }
            other => self.frontend.display_error(&other.to_string(), None),
        }
    }

    /// Look up `query`. The alias becomes name, else zone, else hostname; a replaced alias
    /// gets its directories ensured via `mark_site_cached`.
    pub async fn lookup(&mut self, query: &str) {
        let parts = match self.client.lookup(query).await {
            Ok(parts) => parts,
            Err(e) => return self.show_client_error(e),
        };
        self.frontend.display_lookup_result(&parts);
        self.last_query = Some(query.trim().to_string());
        let alias = [&parts.name, &parts.zone, &parts.hostname]
            .into_iter()
            .find(|s| !s.is_empty())
            .cloned();
        let previous = std::mem::replace(&mut self.current_alias, alias);
        self.current = Some(parts);
        if let Some(previous) = previous {
            if self.current_alias.as_deref() != Some(previous.as_str()) {
                if let Err(e) = self.cache.mark_site_cached(&previous).await {
                    self.frontend.display_error(&e.to_string(), None);
                }
            }
        }
    }

    /// Install the last looked-up source under the current alias.
    pub async fn download_current(&mut self) {
        let (Some(alias), Some(parts)) = (self.current_alias.clone(), self.current.clone()) else {
            return self.frontend.display_status("No lookup data available");
        };
        let source = self
            .last_query
            .clone()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| parts.hostname.clone());
        if source.trim().is_empty() {
            return self.frontend.display_status("No source URL to download");
        }
        match self.cache.install_site(&source, &alias, &parts.hostname).await {
            Ok(site) => self
                .frontend
                .display_status(&format!("Cached site at {}", site.cache_path.display())),
            Err(e) => self.frontend.display_error(&e.to_string(), None),
        }
    }

    pub async fn show_servers(&mut self) {
        match self.client.servers().await {
            Ok((domain_server, servers)) => {
                self.frontend.display_server_directory(&domain_server, &servers)
            }
            Err(e) => self.show_client_error(e),
        }
    }

    pub async fn start_announce(&mut self, public_ip: &str, port: u16) {
        match self.cache.start_server(public_ip, port).await {
            Ok(addr) => self.frontend.display_status(&format!(
                "P2P server broadcasting on {public_ip}:{} (bound {addr})",
                addr.port()
            )),
            Err(e) => self.frontend.display_error(&e.to_string(), None),
        }
    }

    pub async fn stop_announce(&mut self) {
        if !self.cache.server_running().await {
            return self.frontend.display_status("P2P server is not running");
        }
        self.cache.stop_server().await;
        self.frontend.display_status("P2P server stopped");
    }

    /// Stop announcing and purge the cache root.
    pub async fn shutdown(&mut self) {
        self.cache.cleanup_on_exit().await;
    }
}
