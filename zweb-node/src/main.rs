// ZWeb node: resolution server, peer cache and announce server.

mod announce;
mod client;
mod config;
mod peer_cache;
mod server;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zweb_core::{Frontend, LookupService, Resolver};

use crate::client::LookupClient;
use crate::config::Config;
use crate::peer_cache::PeerCache;
use crate::session::{Session, TerminalFrontend};

const READY_WINDOW: Duration = Duration::from_secs(5);
const READY_INTERVAL: Duration = Duration::from_millis(100);

/// ZWeb - hostname facet resolver and peer site cache
#[derive(Parser, Debug)]
#[command(name = "zweb")]
#[command(version, about, long_about = None)]
struct Args {
    /// Resolution server host
    #[arg(long, global = true)]
    host: Option<String>,
    /// Resolution server port
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Public IP of the authoritative domain server
    #[arg(long, global = true)]
    domain_server: Option<String>,
    /// Record an additional server in the directory (repeatable)
    #[arg(long = "extra-server", value_name = "NAME=ADDRESS", global = true)]
    extra_servers: Vec<String>,
    /// Volatile cache root
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Durable data root
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the resolution server until interrupted
    Serve,
    /// Print zone, node and name of a hostname or URL without any server
    Describe { raw: String },
    /// Look up a hostname or URL through the resolution server
    Lookup {
        query: String,
        /// Do not start an in-process server when none answers
        #[arg(long)]
        no_server: bool,
    },
    /// List the resolution server's directory
    Servers {
        #[arg(long)]
        no_server: bool,
    },
    /// Download a site into the peer cache
    Install {
        source: String,
        /// Cache alias (defaults to the resolved name of SOURCE)
        #[arg(long)]
        alias: Option<String>,
        #[arg(long)]
        hostname: Option<String>,
    },
    /// Announce the cached site directory to peers until interrupted
    Announce {
        #[arg(long)]
        public_ip: Option<String>,
        #[arg(long)]
        peer_port: Option<u16>,
    },
    /// Interactive terminal session
    Browse {
        #[arg(long)]
        no_server: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let cfg = apply_args(config::load(), &args);

    if let Cmd::Describe { raw } = &args.command {
        return describe(raw);
    }

    let rt = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    rt.block_on(run(args.command, cfg))
}

fn apply_args(mut cfg: Config, args: &Args) -> Config {
    if let Some(h) = &args.host {
        cfg.host = h.clone();
    }
    if let Some(p) = args.port {
        cfg.port = p;
    }
    if let Some(d) = &args.domain_server {
        cfg.domain_server = d.clone();
    }
    if let Some(d) = &args.cache_dir {
        cfg.cache_dir = d.clone();
    }
    if let Some(d) = &args.data_dir {
        cfg.data_dir = d.clone();
    }
    cfg.extra_servers
        .extend(args.extra_servers.iter().map(|e| config::parse_extra_server(e)));
    cfg
}

fn describe(raw: &str) -> Result<()> {
    let parts = Resolver::new().describe(raw)?;
    println!("{}", parts.zone);
    println!("{}", parts.node);
    println!("{}", parts.name);
    Ok(())
}

async fn run(command: Cmd, cfg: Config) -> Result<()> {
    match command {
        Cmd::Serve => {
            let listener = server::bind(&cfg.host, cfg.port)
                .await
                .with_context(|| format!("unable to bind {}", cfg.local_address()))?;
            tokio::select! {
                r = server::run_server(listener, Arc::new(lookup_service(&cfg))) => r?,
                r = shutdown_signal() => r?,
            }
            Ok(())
        }
        Cmd::Describe { raw } => describe(&raw),
        Cmd::Lookup { query, no_server } => {
            let client = connect(&cfg, no_server).await?;
            let parts = client.lookup(&query).await?;
            TerminalFrontend::new(std::io::stdout()).display_lookup_result(&parts);
            Ok(())
        }
        Cmd::Servers { no_server } => {
            let client = connect(&cfg, no_server).await?;
            let (domain_server, servers) = client.servers().await?;
            TerminalFrontend::new(std::io::stdout()).display_server_directory(&domain_server, &servers);
            Ok(())
        }
        Cmd::Install {
            source,
            alias,
            hostname,
        } => {
            let cache = open_cache(&cfg).await?;
            let parts = Resolver::new().describe(&source).ok();
            let alias = alias
                .or_else(|| parts.as_ref().map(|p| p.name.clone()))
                .context("no alias given and the source does not resolve to one")?;
            let hostname = hostname
                .or_else(|| parts.map(|p| p.hostname))
                .unwrap_or_default();
            let site = cache.install_site(&source, &alias, &hostname).await?;
            println!("Cached site at {}", site.cache_path.display());
            Ok(())
        }
        Cmd::Announce {
            public_ip,
            peer_port,
        } => {
            let cache = open_cache(&cfg).await?;
            let public_ip = public_ip.unwrap_or_else(|| cfg.public_ip.clone());
            let addr = cache
                .start_server(&public_ip, peer_port.unwrap_or(cfg.peer_port))
                .await?;
            println!("P2P server broadcasting on {public_ip}:{} (bound {addr})", addr.port());
            let result = shutdown_signal().await;
            cache.cleanup_on_exit().await;
            result
        }
        Cmd::Browse { no_server } => browse(&cfg, no_server).await,
    }
}

fn lookup_service(cfg: &Config) -> LookupService {
    LookupService::new(
        Resolver::new(),
        &cfg.domain_server,
        &cfg.local_address(),
        cfg.extra_servers.iter().cloned(),
    )
}

async fn open_cache(cfg: &Config) -> Result<PeerCache> {
    PeerCache::open(
        &cfg.cache_dir,
        &cfg.data_dir,
        Duration::from_secs(cfg.download_timeout_secs),
    )
    .await
    .context("unable to open peer cache")
}

/// Client for the configured server; starts one in-process when nothing answers (unless `no_server`).
async fn connect(cfg: &Config, no_server: bool) -> Result<LookupClient> {
    let client = LookupClient::new(cfg.host.clone(), cfg.port);
    if client.ping().await {
        return Ok(client);
    }
    if no_server {
        bail!("no resolution server answering on {}", cfg.local_address());
    }
    let listener = server::bind(&cfg.host, cfg.port)
        .await
        .with_context(|| format!("unable to bind {}", cfg.local_address()))?;
    let service = Arc::new(lookup_service(cfg));
    tokio::spawn(async move {
        if let Err(e) = server::run_server(listener, service).await {
            tracing::error!(error = %e, "in-process resolution server stopped");
        }
    });
    if !client.wait_until_ready(READY_WINDOW, READY_INTERVAL).await {
        bail!("unable to start the resolution server");
    }
    Ok(client)
}

async fn browse(cfg: &Config, no_server: bool) -> Result<()> {
    let client = connect(cfg, no_server).await?;
    let cache = Arc::new(open_cache(cfg).await?);
    let mut session = Session::new(client, cache, TerminalFrontend::new(std::io::stdout()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            r = shutdown_signal() => { r?; None }
        };
        let Some(line) = line else { break };
        let mut words = line.split_whitespace();
        match words.next() {
            None => continue,
            Some(":quit") => break,
            Some(":download") => session.download_current().await,
            Some(":servers") => session.show_servers().await,
            Some(":announce") => {
                let ip = words.next().unwrap_or(cfg.public_ip.as_str()).to_string();
                session.start_announce(&ip, cfg.peer_port).await;
            }
            Some(":stop") => session.stop_announce().await,
            Some(_) => session.lookup(&line).await,
        }
    }
    session.shutdown().await;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    tracing::info!("shutdown requested");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from([
            "zweb",
            "--port",
            "7000",
            "--extra-server",
            "peer=10.0.0.1:65432",
            "--extra-server",
            "10.0.0.2",
            "lookup",
            "example.com",
        ]);
        let cfg = apply_args(Config::default(), &args);
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.extra_servers.len(), 2);
        assert_eq!(cfg.extra_servers[1].name, "Peer");
        assert!(matches!(args.command, Cmd::Lookup { no_server: false, .. }));
    }

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
