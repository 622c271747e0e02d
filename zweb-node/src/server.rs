//! Resolution server: one TCP connection carries one request line and one JSON reply.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use zweb_core::wire::{encode_line, line_end, trim_line, MAX_LINE_LEN};
use zweb_core::LookupService;

/// Bind the listener and announce readiness: `READY host:port` on stdout, once, before any accept.
pub async fn bind(host: &str, port: u16) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind((host, port)).await?;
    let bound = listener.local_addr()?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "READY {}:{}", host, bound.port())?;
    stdout.flush()?;
    info!(addr = %bound, "resolution server listening");
    Ok(listener)
}

/// Accept forever; each connection runs on its own task.
pub async fn run_server(listener: TcpListener, service: Arc<LookupService>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "resolution request");
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, service).await {
                warn!(%peer, error = %e, "resolution connection failed");
            }
        });
    }
}

enum Request {
    Line(Vec<u8>),
    /// More than `MAX_LINE_LEN` bytes without a newline; holds the first `MAX_LINE_LEN`.
    TooLong(Vec<u8>),
}

/// Read until `\n`, EOF, or the line limit.
async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Request> {
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
        if let Some(end) = line_end(&data) {
            data.truncate(end);
            break;
        }
        if data.len() > MAX_LINE_LEN {
            data.truncate(MAX_LINE_LEN);
            return Ok(Request::TooLong(data));
        }
    }
    Ok(Request::Line(data))
}

async fn handle_client(mut stream: TcpStream, service: Arc<LookupService>) -> std::io::Result<()> {
    let response = match read_request(&mut stream).await? {
        Request::Line(raw) => match std::str::from_utf8(trim_line(&raw)) {
            Ok(request) => service.handle(request),
            Err(_) => service.handle_undecodable(&raw),
        },
        Request::TooLong(prefix) => {
            debug!(kept = prefix.len(), "request line too long");
            service.handle_oversized(&prefix)
        }
    };
    let payload = encode_line(&response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    let _ = stream.shutdown().await;
    Ok(())
}
