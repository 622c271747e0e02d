//! ZWeb core: hostname facet resolver, protocol types and site directory model.
//! No I/O; the node binary owns sockets and the filesystem.

pub mod cache;
pub mod frontend;
pub mod protocol;
pub mod resolver;
pub mod service;
pub mod site;
pub mod wire;

pub use cache::DomainCache;
pub use frontend::Frontend;
pub use protocol::{Command, PeerCommand, PeerResponse, Response, ServerEntry, Status};
pub use resolver::{
    describe_uncached, name, node, normalize, split_best_effort, zone, DomainParts, ResolveError,
    Resolver, DEFAULT_SUFFIX,
};
pub use service::LookupService;
pub use site::{CachedSite, SiteDirectory};
pub use wire::{decode_last_line, encode_line, LineDecodeError, LineEncodeError};
