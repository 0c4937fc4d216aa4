use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use kdt::constants::{DEFAULT_DATA_DIR, WORKER_THREADS};
use kdt::kademlia::{Console, Node, NodeConfig, Protocol, HELP};
use kdt::net::{Host, Network, NetworkConfig};
use kdt::store::SledStore;

#[derive(Parser, Debug)]
#[command(name = "kdt")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interface to listen on, such as "IPv4/TCP 0.0.0.0:19002".
    #[arg(short, long, env = "KDT_INTERFACE", default_value = "IPv6/TCP [::]:0")]
    interface: Host,

    /// Peer to join on startup.
    #[arg(short, long, env = "KDT_PEER")]
    peer: Option<Host>,

    /// Directory holding the node's persistent store.
    #[arg(short, long, env = "KDT_DATA", default_value = DEFAULT_DATA_DIR)]
    data: PathBuf,

    #[arg(short, long, env = "KDT_THREADS", default_value_t = WORKER_THREADS)]
    threads: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .init();

    let store = Arc::new(
        SledStore::open(&args.data)
            .with_context(|| format!("failed to open store at {}", args.data.display()))?,
    );
    let network = Arc::new(
        Network::open(args.interface, &NetworkConfig::default())
            .with_context(|| format!("failed to open {}", args.interface))?,
    );
    let protocol = Arc::new(
        Protocol::new(Arc::clone(&store), Arc::clone(&network))
            .context("failed to initialize protocol")?,
    );

    let config = NodeConfig {
        threads: args.threads,
        ..NodeConfig::default()
    };
    let node = Node::start(Arc::clone(&protocol), &config).context("failed to start node")?;

    if let Some(peer) = args.peer {
        if let Err(e) = protocol.join(&peer) {
            warn!("Failed to join {}: {}", peer, e);
        }
    }

    info!("{}", HELP);
    let console = Console::new(Arc::clone(&protocol));
    let mut exited = false;
    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read console input")?;
        if !console.handle_line(&line) {
            exited = true;
            break;
        }
    }
    if !exited {
        // Without a console, keep serving until the process is stopped.
        while node.is_running() {
            thread::sleep(Duration::from_secs(1));
        }
    }

    node.shutdown();
    drop(console);
    drop(node);
    network.close();
    drop(protocol);

    match Arc::try_unwrap(store) {
        Ok(store) => store.close().context("failed to flush store")?,
        Err(_) => warn!("Store still in use, skipping final flush"),
    }
    Ok(())
}
