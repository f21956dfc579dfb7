//! socksd - a local multi-protocol proxy daemon

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use socksd::common::DnsCache;
use socksd::config::{Config, ProxyConfig};
use socksd::error::{Error, Result};
use socksd::outbound::{Dialer, LoadBalancer, UpstreamConnector, UpstreamDef};
use socksd::server::{HttpServer, LocalCipher, Socks4Server, Socks5Server};

fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        print_version();
        return Ok(());
    }

    if args.gen_config {
        println!("{}", serde_json::to_string_pretty(&Config::example()).unwrap());
        return Ok(());
    }

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            eprintln!("No config file specified, using the example config");
            Config::example()
        }
    };

    // Initialize logging: RUST_LOG wins over the config file level
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| config.log.level.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("socksd v{} starting...", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    info!("Goodbye!");
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let mut listeners = 0usize;

    for (index, proxy) in config.proxies.iter().enumerate() {
        listeners += spawn_front(index, proxy).await;
    }

    if listeners == 0 {
        return Err(Error::Config("no listeners configured".into()));
    }

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    Ok(())
}

/// Spawn the configured listeners of one proxy front. All of them share one
/// upstream connector, so they also share its DNS cache and balancer
/// rotation. Returns the number of listeners started; a listener that fails
/// to bind is logged and skipped without affecting the others.
async fn spawn_front(index: usize, proxy: &ProxyConfig) -> usize {
    let upstreams: Vec<UpstreamDef> = proxy.upstreams.iter().map(|u| u.to_def()).collect();
    let dialer: Arc<dyn Dialer> = Arc::new(UpstreamConnector::new(
        LoadBalancer::new(upstreams),
        DnsCache::new(Duration::from_secs(proxy.dns_cache_seconds)),
    ));

    let mut started = 0;

    if let Some(cfg) = &proxy.socks5 {
        match TcpListener::bind(&cfg.addr).await {
            Ok(listener) => {
                info!("[{}] SOCKS5 listening on {}", index, cfg.addr);
                let server = Socks5Server::new(Arc::clone(&dialer))
                    .with_cipher(LocalCipher::new(&cfg.crypto_method, &cfg.crypto_password));
                tokio::spawn(async move {
                    if let Err(e) = server.run(listener).await {
                        error!("SOCKS5 listener terminated: {}", e);
                    }
                });
                started += 1;
            }
            Err(e) => error!("[{}] SOCKS5 bind {} failed: {}", index, cfg.addr, e),
        }
    }

    if let Some(cfg) = &proxy.socks4 {
        match TcpListener::bind(&cfg.addr).await {
            Ok(listener) => {
                info!("[{}] SOCKS4 listening on {}", index, cfg.addr);
                let server = Socks4Server::new(Arc::clone(&dialer))
                    .with_cipher(LocalCipher::new(&cfg.crypto_method, &cfg.crypto_password));
                tokio::spawn(async move {
                    if let Err(e) = server.run(listener).await {
                        error!("SOCKS4 listener terminated: {}", e);
                    }
                });
                started += 1;
            }
            Err(e) => error!("[{}] SOCKS4 bind {} failed: {}", index, cfg.addr, e),
        }
    }

    if let Some(cfg) = &proxy.http {
        match TcpListener::bind(&cfg.addr).await {
            Ok(listener) => {
                info!("[{}] HTTP proxy listening on {}", index, cfg.addr);
                let server = HttpServer::new(Arc::clone(&dialer))
                    .with_cipher(LocalCipher::new(&cfg.crypto_method, &cfg.crypto_password));
                tokio::spawn(async move {
                    if let Err(e) = server.run(listener).await {
                        error!("HTTP listener terminated: {}", e);
                    }
                });
                started += 1;
            }
            Err(e) => error!("[{}] HTTP bind {} failed: {}", index, cfg.addr, e),
        }
    }

    started
}

/// Command line arguments
struct Args {
    config: Option<PathBuf>,
    gen_config: bool,
    version: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut config = None;
        let mut gen_config = false;
        let mut version = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-c" | "--config" => {
                    if i + 1 < args.len() {
                        config = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--gen-config" => gen_config = true,
                "-v" | "--version" => version = true,
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                arg if !arg.starts_with('-') && config.is_none() => {
                    // Positional argument: treat as config file
                    config = Some(PathBuf::from(arg));
                }
                _ => {}
            }
            i += 1;
        }

        Self {
            config,
            gen_config,
            version,
        }
    }
}

fn print_help() {
    println!(
        r#"socksd - a local multi-protocol proxy daemon

USAGE:
    socksd [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to configuration file
    --gen-config            Print an example configuration
    -v, --version           Print version information
    -h, --help              Print help information

EXAMPLES:
    socksd -c socksd.json
    socksd --gen-config > socksd.json

Listeners speak SOCKS4, SOCKS5 and HTTP (CONNECT and plain proxy
requests). Each front forwards either directly or through its configured
upstream proxies (socks5 / shadowsocks), optionally stream-cipher
encrypted (rc4, des, chacha20)."#
    );
}

fn print_version() {
    println!("socksd v{}", env!("CARGO_PKG_VERSION"));
}
