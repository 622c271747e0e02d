//! Peer announce server: answers `PING` with a pong and anything else with the site directory,
//! one reply per connection.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use zweb_core::protocol::PEER_READ_LEN;
use zweb_core::wire::encode_line;
use zweb_core::{PeerCommand, PeerResponse, SiteDirectory};

const WILDCARD: &str = "0.0.0.0";

#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    #[error("P2P server is already running")]
    AlreadyRunning,
    #[error("unable to start P2P server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bind `public_ip:port`, falling back to the wildcard address on the same port.
/// Addresses that are not IPv4 literals go straight to the wildcard.
pub async fn bind_with_fallback(public_ip: &str, port: u16) -> Result<TcpListener, AnnounceError> {
    let host = match public_ip.parse::<Ipv4Addr>() {
        Ok(_) => public_ip,
        Err(_) => WILDCARD,
    };
    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) if host != WILDCARD => {
            info!(public_ip, port, error = %e, "public address not bindable, using wildcard");
            TcpListener::bind((WILDCARD, port))
                .await
                .map_err(|source| AnnounceError::Bind {
                    addr: format!("{WILDCARD}:{port}"),
                    source,
                })
        }
        Err(source) => Err(AnnounceError::Bind {
            addr: format!("{host}:{port}"),
            source,
        }),
    }
}

/// A running announce server. Dropping it without [`AnnounceHandle::stop`] leaves the task running.
pub struct AnnounceHandle {
    local_addr: SocketAddr,
    public_ip: String,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl AnnounceHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[allow(dead_code)]
    pub fn public_ip(&self) -> &str {
        &self.public_ip
    }

    /// Stop accepting and wait for the accept loop to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
        info!(addr = %self.local_addr, "announce server stopped");
    }
}

/// Bind and spawn the accept loop over the shared directory.
pub async fn start(
    public_ip: &str,
    port: u16,
    sites: Arc<Mutex<SiteDirectory>>,
) -> Result<AnnounceHandle, AnnounceError> {
    let listener = bind_with_fallback(public_ip, port).await?;
    let local_addr = listener.local_addr().map_err(|source| AnnounceError::Bind {
        addr: format!("{public_ip}:{port}"),
        source,
    })?;
    let (shutdown, shutdown_rx) = oneshot::channel();
    let advertised = public_ip.to_string();
    let task = tokio::spawn(run_announce(listener, sites, advertised.clone(), shutdown_rx));
    info!(addr = %local_addr, public_ip, "announce server listening");
    Ok(AnnounceHandle {
        local_addr,
        public_ip: advertised,
        shutdown,
        task,
    })
}

async fn run_announce(
    listener: TcpListener,
    sites: Arc<Mutex<SiteDirectory>>,
    public_ip: String,
    mut shutdown: oneshot::Receiver<()>,
) {
    let public_ip: Arc<str> = public_ip.into();
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "announce connection");
                    let sites = sites.clone();
                    let public_ip = public_ip.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_peer(stream, sites, &public_ip).await {
                            debug!(%peer, error = %e, "announce connection failed");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "announce accept failed");
                    break;
                }
            },
        }
    }
    // Connections still waiting on a request must not answer once stopped.
    connections.shutdown().await;
}

/// One request, one reply, then close. A peer that sends nothing gets the directory.
async fn handle_peer(
    mut stream: TcpStream,
    sites: Arc<Mutex<SiteDirectory>>,
    public_ip: &str,
) -> std::io::Result<()> {
    let mut buf = [0u8; PEER_READ_LEN];
    let n = stream.read(&mut buf).await?;
    let response = match PeerCommand::parse(&buf[..n]) {
        PeerCommand::Ping => PeerResponse::pong(),
        PeerCommand::Directory => {
            let snapshot = sites.lock().await.sites().to_vec();
            PeerResponse::directory(public_ip, snapshot)
        }
    };
    let payload = encode_line(&response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use zweb_core::{CachedSite, Status};

    fn directory() -> Arc<Mutex<SiteDirectory>> {
        let mut dir = SiteDirectory::new();
        dir.upsert(CachedSite {
            alias: "hi.zwb".into(),
            source: "http://hello.github.io/hi".into(),
            hostname: "hello.github.io".into(),
            cache_path: PathBuf::from("cache/hi.zwb"),
            data_path: PathBuf::from("data/hi.zwb"),
        });
        Arc::new(Mutex::new(dir))
    }

    async fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        if request.is_empty() {
            stream.shutdown().await.unwrap();
        } else {
            stream.write_all(request).await.unwrap();
        }
        let mut buf = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf))
            .await
            .expect("server closes after replying")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn ping_replies_once_and_closes() {
        let handle = start("127.0.0.1", 0, directory()).await.unwrap();
        let buf = exchange(handle.local_addr(), b"PING").await;
        let pong: PeerResponse = serde_json::from_slice(&buf).unwrap();
        assert_eq!(pong, PeerResponse::pong());
        handle.stop().await;
    }

    #[tokio::test]
    async fn other_requests_dump_directory() {
        let sites = directory();
        let handle = start("127.0.0.1", 0, sites.clone()).await.unwrap();
        for request in [&b"SITES"[..], &b""[..], &b"\xff\xfe"[..]] {
            let buf = exchange(handle.local_addr(), request).await;
            let dump: PeerResponse = serde_json::from_slice(&buf).unwrap();
            assert_eq!(dump.status, Status::Ok);
            assert_eq!(dump.public_ip.as_deref(), Some("127.0.0.1"));
            assert_eq!(dump.sites.unwrap(), sites.lock().await.sites().to_vec());
        }
        handle.stop().await;
    }

    #[tokio::test]
    async fn open_connections_do_not_answer_after_stop() {
        let handle = start("127.0.0.1", 0, directory()).await.unwrap();
        let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let _ = stream.write_all(b"LIST").await;
        let mut buf = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf))
            .await
            .expect("connection closed by stop");
        assert!(read.is_err() || buf.is_empty());
    }

    #[tokio::test]
    async fn unbindable_public_ip_falls_back_to_wildcard() {
        // TEST-NET-3 is never assigned to a local interface.
        let handle = start("203.0.113.7", 0, directory()).await.unwrap();
        assert!(handle.local_addr().ip().is_unspecified());
        assert_eq!(handle.public_ip(), "203.0.113.7");
        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_closes_listener() {
        let handle = start("127.0.0.1", 0, directory()).await.unwrap();
        let addr = handle.local_addr();
        handle.stop().await;
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
