//! Lookup client for the resolution server, with readiness probing.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use zweb_core::wire::{decode_last_line, line_end, LineDecodeError, MAX_FRAME_LEN};
use zweb_core::{DomainParts, Response, ServerEntry, Status};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const PING_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("please provide a domain or URL")]
    EmptyQuery,
    #[error("unable to contact server: {0}")]
    Io(#[from] std::io::Error),
    #[error("server did not answer in time")]
    Timeout,
    #[error("no response received from server")]
    NoResponse,
    #[error("server returned invalid JSON: {0}")]
    InvalidResponse(#[from] serde_json::Error),
    /// `status:"error"` reply; carries the server's message and error page.
    #[error("{message}")]
    Server {
        message: String,
        error_page: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct LookupClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl LookupClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one line and read the single JSON reply.
    pub async fn request(&self, line: &str) -> Result<Response, ClientError> {
        timeout(self.timeout, self.exchange(line))
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn exchange(&self, line: &str) -> Result<Response, ClientError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;
        let mut data = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
            if line_end(&data).is_some() || data.len() > MAX_FRAME_LEN {
                break;
            }
        }
        match decode_last_line(&data) {
            Ok(resp) => Ok(resp),
            Err(LineDecodeError::Decode(e)) => Err(ClientError::InvalidResponse(e)),
            Err(_) => Err(ClientError::NoResponse),
        }
    }

    fn check(resp: Response) -> Result<Response, ClientError> {
        if resp.status == Status::Ok {
            return Ok(resp);
        }
        Err(ClientError::Server {
            message: resp.message.unwrap_or_else(|| "lookup failed".to_string()),
            error_page: resp.error_page,
        })
    }

    pub async fn lookup(&self, query: &str) -> Result<DomainParts, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::EmptyQuery);
        }
        let resp = Self::check(self.request(query).await?)?;
        resp.domain_parts().ok_or(ClientError::NoResponse)
    }

    /// Domain server and the server directory.
    pub async fn servers(&self) -> Result<(String, Vec<ServerEntry>), ClientError> {
        let resp = Self::check(self.request("SERVERS").await?)?;
        Ok((
            resp.domain_server.unwrap_or_default(),
            resp.servers.unwrap_or_default(),
        ))
    }

    /// True iff an `ok` reply to `PING` arrives within half a second.
    pub async fn ping(&self) -> bool {
        let quick = self.clone().with_timeout(PING_TIMEOUT);
        matches!(quick.request("PING").await, Ok(resp) if resp.status == Status::Ok)
    }

    /// Poll [`ping`](Self::ping) every `interval` until it succeeds or `window` elapses.
    pub async fn wait_until_ready(&self, window: Duration, interval: Duration) -> bool {
        let deadline = Instant::now() + window;
        loop {
            if self.ping().await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }
}
