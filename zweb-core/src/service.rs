//! Request dispatcher behind the resolution server: one decoded line in, one reply out.

use tracing::debug;

use crate::protocol::{Command, Response, ServerEntry};
use crate::resolver::Resolver;

/// Owns the resolver and the server directory for the process lifetime.
pub struct LookupService {
    resolver: Resolver,
    domain_server: String,
    servers: Vec<ServerEntry>,
}

impl LookupService {
    /// `local_address` is the helper's own `host:port`. Extra entries with an empty address are skipped;
    /// an empty name becomes `Peer`.
    pub fn new(
        resolver: Resolver,
        domain_server: &str,
        local_address: &str,
        extra_servers: impl IntoIterator<Item = ServerEntry>,
    ) -> Self {
        let mut servers = vec![
            ServerEntry::new("Domain server", domain_server, "Primary DNS authority"),
            ServerEntry::new("Local helper", local_address, "Bundled lookup helper"),
        ];
        for mut entry in extra_servers {
            if entry.address.trim().is_empty() {
                continue;
            }
            if entry.name.trim().is_empty() {
                entry.name = "Peer".to_string();
            }
            servers.push(entry);
        }
        Self {
            resolver,
            domain_server: domain_server.to_string(),
            servers,
        }
    }

    pub fn handle(&self, raw: &str) -> Response {
        match Command::parse(raw) {
            Command::Empty => Response::error("no domain provided", raw, &self.domain_server),
            Command::Ping => Response::pong(&self.domain_server),
            Command::Servers => Response::servers(&self.domain_server, self.servers.clone()),
            Command::Lookup(request) => match self.resolver.describe(request) {
                Ok(parts) => Response::lookup(parts, &self.domain_server),
                Err(e) => {
                    debug!(request, error = %e, "lookup rejected");
                    Response::error(&e.to_string(), request, &self.domain_server)
                }
            },
        }
    }

    /// Reply for request bytes that are not valid UTF-8.
    pub fn handle_undecodable(&self, raw: &[u8]) -> Response {
        let shown = String::from_utf8_lossy(raw);
        Response::error("request was not valid UTF-8", &shown, &self.domain_server)
    }

    /// Reply for a request line that exceeded the server's buffer; `raw` is the kept prefix.
    pub fn handle_oversized(&self, raw: &[u8]) -> Response {
        let shown = String::from_utf8_lossy(raw);
        Response::error("request too long", &shown, &self.domain_server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Status;

    fn service() -> LookupService {
        LookupService::new(
            Resolver::new(),
            "1.1.1.1",
            "127.0.0.1:65432",
            vec![
                ServerEntry::new("", "10.0.0.2:65432", ""),
                ServerEntry::new("Ghost", "  ", "ignored"),
            ],
        )
    }

    #[test]
    fn ping() {
        let resp = service().handle("PING\n");
        assert_eq!(resp.status, Status::Ok);
        assert_eq!(resp.message.as_deref(), Some("pong"));
        assert_eq!(resp.domain_server.as_deref(), Some("1.1.1.1"));
    }

    #[test]
    fn servers_lists_builtin_and_extra() {
        let resp = service().handle("servers");
        let servers = resp.servers.unwrap();
        assert_eq!(servers.len(), 3);
        assert_eq!(servers[0].address, "1.1.1.1");
        assert_eq!(servers[1].address, "127.0.0.1:65432");
        assert_eq!(servers[2].name, "Peer");
    }

    #[test]
    fn empty_line_is_an_error() {
        let resp = service().handle("\n");
        assert_eq!(resp.status, Status::Error);
        assert!(resp.message.unwrap().contains("no domain provided"));
        assert!(!resp.error_page.unwrap().is_empty());
    }

    #[test]
    fn lookup_success_and_failure() {
        let svc = service();
        let ok = svc.handle("hello.github.io/hi\n");
        assert_eq!(ok.zone.as_deref(), Some("hi.zwb"));
        assert_eq!(ok.node.as_deref(), Some("hello"));
        let err = svc.handle("http://\n");
        assert_eq!(err.status, Status::Error);
        assert!(err.error_page.is_some());
    }

    #[test]
    fn undecodable_request() {
        let resp = service().handle_undecodable(b"\xff\xfe");
        assert_eq!(resp.status, Status::Error);
        assert_eq!(resp.message.as_deref(), Some("request was not valid UTF-8"));
    }

    #[test]
    fn oversized_request_keeps_split_prefix_readable() {
        let resp = service().handle_oversized(&"ab\u{e9}".as_bytes()[..3]);
        assert_eq!(resp.status, Status::Error);
        assert_eq!(resp.message.as_deref(), Some("request too long"));
        assert!(resp.error_page.unwrap().contains("ab\u{fffd}"));
    }
}
