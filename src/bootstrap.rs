//! Startup wiring
//!
//! Parses the command line, assembles the resolver tree
//! (`Alternate{ Sequence{ statics…, dynamic }, cache{ forward } }`), and runs
//! the DNS and HTTP servers until interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use crate::config::StaticZoneConfig;
use crate::dns::forward::ForwardResolver;
use crate::dns::local_cache::LocalCache;
use crate::dns::redis_cache::RedisCache;
use crate::dns::resolver::{AlternateResolver, Resolver, SequenceResolver};
use crate::dns::server::{DnsHandler, TcpDnsServer, UdpDnsServer};
use crate::dns::sqlite::SqliteResolver;
use crate::dns::static_zone::StaticResolver;
use crate::metrics::{Metrics, DEFAULT_NAMESPACE};
use crate::web;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DnsProtocol {
    Udp,
    Tcp,
}

/// Parse durations like `500ms`, `2s` or a bare number of seconds.
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let parse = |digits: &str| {
        digits
            .parse::<u64>()
            .map_err(|_| format!("invalid duration: \"{}\"", s))
    };

    if let Some(millis) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(parse(millis)?))
    } else if let Some(secs) = s.strip_suffix('s') {
        Ok(Duration::from_secs(parse(secs)?))
    } else {
        Ok(Duration::from_secs(parse(s)?))
    }
}

#[derive(Debug, Parser)]
#[command(name = "landns", version, about = "DNS server for home network")]
pub struct Args {
    /// Static zone config file (repeatable)
    #[arg(short = 'c', long = "config")]
    pub configs: Vec<PathBuf>,

    /// Dynamic zone database file; unset means in-memory ephemeral
    #[arg(short = 's', long = "sqlite")]
    pub sqlite: Option<PathBuf>,

    /// HTTP API listen address
    #[arg(short = 'l', long = "api-listen", default_value = "127.0.0.1:9353")]
    pub api_listen: SocketAddr,

    /// DNS listen address
    #[arg(short = 'L', long = "dns-listen", default_value = "0.0.0.0:53")]
    pub dns_listen: SocketAddr,

    /// DNS transport protocol
    #[arg(long = "dns-protocol", value_enum, default_value = "udp")]
    pub dns_protocol: DnsProtocol,

    /// Upstream DNS server address (repeatable)
    #[arg(short = 'u', long = "upstream")]
    pub upstreams: Vec<SocketAddr>,

    /// Per-upstream query timeout
    #[arg(long = "upstream-timeout", default_value = "500ms", value_parser = parse_duration)]
    pub upstream_timeout: Duration,

    /// Disable the local response cache
    #[arg(long = "disable-cache")]
    pub disable_cache: bool,

    /// Redis server address for the shared response cache
    #[arg(long = "redis")]
    pub redis: Option<String>,

    /// Redis server password
    #[arg(long = "redis-password", default_value = "")]
    pub redis_password: String,

    /// Redis database number
    #[arg(long = "redis-database", default_value_t = 0)]
    pub redis_database: i64,

    /// Namespace prefix for exported metrics
    #[arg(long = "metrics-namespace", default_value = DEFAULT_NAMESPACE)]
    pub metrics_namespace: String,
}

/// Build the resolver tree described by the command line.
async fn build_resolver(
    args: &Args,
    store: Arc<SqliteResolver>,
    metrics: Arc<Metrics>,
) -> Result<Arc<dyn Resolver>> {
    let mut local: Vec<Arc<dyn Resolver>> = Vec::new();
    for path in &args.configs {
        let config = StaticZoneConfig::from_path(path)?;
        let resolver = StaticResolver::from_config(&config)
            .with_context(|| format!("invalid static zone: {}", path.display()))?;
        local.push(Arc::new(resolver));
    }
    local.push(store);

    let forward: Arc<dyn Resolver> = Arc::new(ForwardResolver::new(
        args.upstreams.clone(),
        args.upstream_timeout,
        metrics.clone(),
    ));

    let remote: Arc<dyn Resolver> = match &args.redis {
        Some(addr) => Arc::new(
            RedisCache::connect(
                addr,
                args.redis_database,
                &args.redis_password,
                forward,
                metrics.clone(),
            )
            .await?,
        ),
        None if args.disable_cache => forward,
        None => Arc::new(LocalCache::new(forward, metrics)),
    };

    Ok(Arc::new(AlternateResolver::new(vec![
        Arc::new(SequenceResolver::new(local)),
        remote,
    ])))
}

pub async fn run() -> Result<()> {
    let args = Args::parse();
    crate::log::init("info");

    let metrics = Arc::new(Metrics::new(&args.metrics_namespace));

    let store = Arc::new(match &args.sqlite {
        Some(path) => SqliteResolver::open_file(path).await?,
        None => SqliteResolver::open_in_memory().await?,
    });
    info!("dynamic zone store: {}", store.description());

    let resolver = build_resolver(&args, store.clone(), metrics.clone()).await?;
    let handler = Arc::new(DnsHandler::new(resolver.clone(), metrics.clone()));

    let dns_task = match args.dns_protocol {
        DnsProtocol::Udp => {
            let server = Arc::new(UdpDnsServer::bind(args.dns_listen, handler).await?);
            tokio::spawn(server.run())
        }
        DnsProtocol::Tcp => {
            let server = Arc::new(TcpDnsServer::bind(args.dns_listen, handler).await?);
            tokio::spawn(server.run())
        }
    };

    let app = web::router(store, metrics);
    let listener = tokio::net::TcpListener::bind(args.api_listen)
        .await
        .with_context(|| format!("failed to bind API listener to {}", args.api_listen))?;
    info!("HTTP API listening on {}", args.api_listen);
    let http_task = tokio::spawn(async move { axum::serve(listener, app).await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for shutdown signal")?;
    info!("shutting down");

    dns_task.abort();
    http_task.abort();
    resolver.close().await?;

    Ok(())
}
