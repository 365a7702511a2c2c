//! Chat broker server example
//!
//! Run with: cargo run --example chat_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example chat_server                    # binds to 0.0.0.0:12346
//!   cargo run --example chat_server localhost          # binds to 127.0.0.1:12346
//!   cargo run --example chat_server 127.0.0.1:4000     # binds to 127.0.0.1:4000
//!
//! Then connect one or more consoles:
//!   cargo run --example chat_client localhost:12346

use std::net::SocketAddr;
use std::sync::Arc;

use chat_broker::server::config::DEFAULT_PORT;
use chat_broker::{Broker, BrokerConfig, BrokerServer, ServerConfig};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:12346
/// - "127.0.0.1" -> 127.0.0.1:12346
/// - "127.0.0.1:4000" -> 127.0.0.1:4000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: chat_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:{})", DEFAULT_PORT);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => ServerConfig::with_addr(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Starting chat broker on {}", config.bind_addr);

    let broker = Arc::new(Broker::with_config(BrokerConfig::default()));
    let server = BrokerServer::with_broker(config, Arc::clone(&broker));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    let stats = broker.stats();
    broker.shutdown().await;
    println!(
        "Stats: joins={} leaves={} reaped={} published={} delivered={} dropped={}",
        stats.joins, stats.leaves, stats.reaped, stats.published, stats.delivered, stats.dropped,
    );

    Ok(())
}
