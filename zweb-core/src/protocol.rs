//! Resolution and peer-announcement protocol: commands and JSON reply shapes.

use serde::{Deserialize, Serialize};

use crate::resolver::DomainParts;
use crate::site::CachedSite;

/// Resolution server default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Resolution server default port.
pub const DEFAULT_PORT: u16 = 65432;
/// Domain server reported in every resolution reply unless configured.
pub const DEFAULT_DOMAIN_SERVER: &str = "1.1.1.1";
/// Announce server default advertised (and first-choice bind) address.
pub const DEFAULT_PUBLIC_IP: &str = "1.1.1.1";
/// Announce server default port.
pub const DEFAULT_PEER_PORT: u16 = 6881;
/// Largest peer request read from one announce connection.
pub const PEER_READ_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// One resolution request line, already decoded and trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Ping,
    Servers,
    Lookup(&'a str),
    Empty,
}

impl<'a> Command<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let request = raw.trim();
        if request.is_empty() {
            Command::Empty
        } else if request.eq_ignore_ascii_case("PING") {
            Command::Ping
        } else if request.eq_ignore_ascii_case("SERVERS") {
            Command::Servers
        } else {
            Command::Lookup(request)
        }
    }
}

/// Entry of the `SERVERS` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub description: String,
}

impl ServerEntry {
    pub fn new(name: impl Into<String>, address: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            description: description.into(),
        }
    }
}

/// Resolution server reply. Absent fields are omitted from the JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<ServerEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_page: Option<String>,
}

impl Response {
    fn empty(status: Status, domain_server: &str) -> Self {
        Self {
            status,
            message: None,
            hostname: None,
            zone: None,
            node: None,
            name: None,
            domain_server: Some(domain_server.to_string()),
            servers: None,
            error_page: None,
        }
    }

    pub fn pong(domain_server: &str) -> Self {
        Self {
            message: Some("pong".to_string()),
            ..Self::empty(Status::Ok, domain_server)
        }
    }

    pub fn servers(domain_server: &str, servers: Vec<ServerEntry>) -> Self {
        Self {
            servers: Some(servers),
            ..Self::empty(Status::Ok, domain_server)
        }
    }

    pub fn lookup(parts: DomainParts, domain_server: &str) -> Self {
        Self {
            hostname: Some(parts.hostname),
            zone: Some(parts.zone),
            node: Some(parts.node),
            name: Some(parts.name),
            ..Self::empty(Status::Ok, domain_server)
        }
    }

    /// Error reply carrying a ready-to-display HTML page.
    pub fn error(message: &str, request: &str, domain_server: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            error_page: Some(build_error_page(message, request)),
            ..Self::empty(Status::Error, domain_server)
        }
    }

    /// Facets of a successful lookup reply.
    pub fn domain_parts(&self) -> Option<DomainParts> {
        if self.status != Status::Ok {
            return None;
        }
        Some(DomainParts {
            hostname: self.hostname.clone()?,
            zone: self.zone.clone().unwrap_or_default(),
            node: self.node.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
        })
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Self-contained HTML page describing a failed lookup.
pub fn build_error_page(message: &str, request: &str) -> String {
    let request = match request.trim() {
        "" => "(empty request)",
        r => r,
    };
    let message = match message.trim() {
        "" => "Lookup failed",
        m => m,
    };
    format!(
        "<html><head><title>DNS Lookup Error</title>\
         <style>body{{font-family:Arial,Helvetica,sans-serif;margin:2em;}}\
         h1{{color:#b00;}}code{{background:#f5f5f5;padding:0.2em 0.4em;}}\
         </style></head><body>\
         <h1>Domain lookup failed</h1>\
         <p>The DNS helper was unable to resolve <code>{}</code>.</p>\
         <p><strong>Reason:</strong> {}</p>\
         <p>Please verify the address and try again or choose a different server.</p>\
         </body></html>",
        escape_html(request),
        escape_html(message),
    )
}

/// Announce server request: only `PING` is distinguished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCommand {
    Ping,
    Directory,
}

impl PeerCommand {
    /// Undecodable bytes are dropped, not rejected.
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == char::REPLACEMENT_CHARACTER);
        if text.eq_ignore_ascii_case("PING") {
            PeerCommand::Ping
        } else {
            PeerCommand::Directory
        }
    }
}

/// Announce server reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sites: Option<Vec<CachedSite>>,
}

impl PeerResponse {
    pub fn pong() -> Self {
        Self {
            status: Status::Ok,
            message: Some("pong".to_string()),
            public_ip: None,
            sites: None,
        }
    }

    pub fn directory(public_ip: &str, sites: Vec<CachedSite>) -> Self {
        Self {
            status: Status::Ok,
            message: None,
            public_ip: Some(public_ip.to_string()),
            sites: Some(sites),
        }
    }
}
