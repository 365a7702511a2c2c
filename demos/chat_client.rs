//! Interactive chat console
//!
//! Run with: cargo run --example chat_client [SERVER_ADDR]
//!
//! Examples:
//!   cargo run --example chat_client                    # connects to 127.0.0.1:12346
//!   cargo run --example chat_client localhost:4000     # connects to localhost:4000
//!
//! Type a line to broadcast it to everyone else. Your own lines are not
//! echoed back. `exit` or `/exit` leaves.

use std::io::Write;
use std::sync::Arc;

use chat_broker::error::Error;
use chat_broker::{BrokerClient, ClientConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

const POLL_TIMEOUT_MS: i64 = 25_000;
const POLL_MAX_BATCH: i64 = 32;

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(addr) => ClientConfig::new(addr),
        None => ClientConfig::default(),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt("Enter your ID: ");
    let identity = match lines.next_line().await? {
        Some(line) if !line.trim().is_empty() => line.trim().to_string(),
        _ => "anonymous".to_string(),
    };

    let client = match BrokerClient::connect(config).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            println!("dial error: {}", e);
            return Ok(());
        }
    };

    if let Err(e) = client.join(&identity).await {
        println!("join error: {}", e);
        return Ok(());
    }

    println!("Joined. Type messages. Type 'exit' to quit.");
    println!("Note: no self-echo (your messages won't be shown back to you).");

    let poller = {
        let client = Arc::clone(&client);
        let identity = identity.clone();
        tokio::spawn(async move {
            loop {
                match client.poll(&identity, POLL_TIMEOUT_MS, POLL_MAX_BATCH).await {
                    Ok(messages) => {
                        for message in messages {
                            println!("\n{}", message);
                            prompt("> ");
                        }
                    }
                    Err(Error::Timeout(_)) => continue,
                    Err(Error::Broker(e)) if e.is_terminal() => {
                        println!("\n{}", e);
                        break;
                    }
                    Err(e) => {
                        println!("\nPoll error: {}", e);
                        break;
                    }
                }
            }
        })
    };

    loop {
        prompt("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();

        if text.is_empty() {
            continue;
        }
        if text == "exit" || text == "/exit" {
            println!("bye!");
            break;
        }

        if let Err(e) = client.send(&identity, text).await {
            println!("send error: {}", e);
        }
    }

    poller.abort();
    let _ = client.leave(&identity).await;

    Ok(())
}
