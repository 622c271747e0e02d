//! What a front-end must be able to show. The core never depends on a concrete one.

use crate::protocol::ServerEntry;
use crate::resolver::DomainParts;

pub trait Frontend {
    fn display_lookup_result(&mut self, parts: &DomainParts);

    /// `page` is the server-built HTML error page when one was supplied.
    fn display_error(&mut self, message: &str, page: Option<&str>);

    fn display_server_directory(&mut self, domain_server: &str, servers: &[ServerEntry]);

    /// Free-form status line (install results, announce server state).
    fn display_status(&mut self, message: &str);
}
