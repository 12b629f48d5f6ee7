mod cli;
mod client;
mod error;
mod node;
mod protocol;
mod relay;
mod storage;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use node::{Event, NodeHandle, Outgoing, Role};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("partyline=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Host {
            bind,
            port,
            name,
            downloads,
        } => {
            let addr: SocketAddr = format!("{bind}:{port}")
                .parse()
                .context("invalid bind address")?;
            let handle = relay::start(addr, &name, PathBuf::from(downloads)).await?;
            println!("📡 Hosting on {}. Waiting for peers...", handle.local_addr());
            run_frontend(handle).await?;
        }
        Commands::Connect {
            addr,
            port,
            name,
            downloads,
        } => {
            let remote = resolve(&addr, port).await?;
            let handle = client::connect(remote, &name, PathBuf::from(downloads)).await?;
            println!("🔌 Connected to {remote}");
            run_frontend(handle).await?;
        }
    }

    Ok(())
}

async fn resolve(addr: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host(format!("{addr}:{port}"))
        .await
        .with_context(|| format!("cannot resolve {addr}"))?
        .next()
        .with_context(|| format!("no usable address for {addr}"))
}

/// The terminal front-end: the "external collaborator" the core talks to.
/// Lines from stdin become send requests; events from the core get printed.
/// Nothing in here touches sockets or the registry.
async fn run_frontend(mut handle: NodeHandle) -> Result<()> {
    println!("Type to chat. /file <path> shares a file, /quit leaves.");
    if handle.role() == Role::Host {
        println!("Everything you send is relayed to every connected peer.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = handle.next_event() => {
                match event {
                    Some(event) => render_event(event),
                    None => break,
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    handle.shutdown();
                    break;
                } else if let Some(path) = line.strip_prefix("/file ") {
                    handle.request(Outgoing::SendFile(expand_path(path.trim())));
                } else if line.starts_with('/') {
                    println!("Unknown command: {line}");
                } else {
                    handle.request(Outgoing::Chat(line.to_string()));
                }
            }
        }
    }

    Ok(())
}

fn render_event(event: Event) {
    match event {
        Event::Status(text) => println!("• {text}"),
        Event::SendReady => println!("✅ Connected — messages and files will be delivered"),
        Event::Chat { sender, body } => println!("{sender}: {body}"),
        Event::FileReceived {
            filename,
            size,
            path,
        } => println!("📁 {filename} ({size} bytes) saved to {}", path.display()),
        Event::Error(e) => eprintln!("❌ {}: {e}", e.kind()),
    }
}

fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut buf = PathBuf::from(home);
            buf.push(stripped);
            return buf;
        }
    }
    PathBuf::from(path)
}
