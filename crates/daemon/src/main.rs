/// hiddenmesh daemon
///
/// Runs a router node that:
/// - Answers and relays hidden service lookups in the DHT
/// - Relays onion frames for paths through it
/// - Hosts the hidden services listed in its services file

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use hiddenmesh_common::{MeshError, NodeConfig};
use hiddenmesh_core::{
    Crypto, DalekCrypto, Router, RouterIdentity, ServiceIdentity, ServicesConfig, SystemClock,
    ThreadPool,
};

const CONFIG_FILE: &str = "hiddenmesh.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("help") | Some("--help") | Some("-h") => {
            print_help();
            Ok(())
        }
        Some("version") | Some("--version") | Some("-v") => {
            println!("hiddenmesh daemon v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some("keygen") => {
            init_logging(false);
            let file = args
                .get(2)
                .ok_or_else(|| anyhow!("keygen needs a key file path"))?;
            keygen(Path::new(file))
        }
        None | Some("run") => {
            let config = load_config(&PathBuf::from(CONFIG_FILE))?;
            init_logging(config.verbose);
            run(config).await
        }
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Run with 'help' to see available commands");
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .init();
}

/// Load the node config, writing the defaults out on first run
fn load_config(path: &Path) -> hiddenmesh_common::Result<NodeConfig> {
    if path.exists() {
        return NodeConfig::from_file(path)
            .map_err(|e| MeshError::config(format!("{}: {}", path.display(), e)));
    }

    let config = NodeConfig::default();
    if let Err(e) = config.to_file(path) {
        eprintln!("Failed to save default config: {}", e);
    }
    Ok(config)
}

/// Create a hidden service key file, or show the address of an existing one
fn keygen(path: &Path) -> Result<()> {
    let crypto = DalekCrypto::new();
    let mut identity = ServiceIdentity::default();
    identity
        .ensure_keys(path, &crypto)
        .map_err(|e| MeshError::key_file(format!("{}: {}", path.display(), e)))?;

    println!("{}", identity.address().to_hostname());
    Ok(())
}

async fn run(config: NodeConfig) -> Result<()> {
    info!("Starting hiddenmesh daemon v{}", env!("CARGO_PKG_VERSION"));

    let crypto: Arc<dyn Crypto> = Arc::new(DalekCrypto::new());
    let identity_path = config.identity_path();
    let identity = RouterIdentity::ensure(&identity_path, crypto.as_ref())
        .map_err(|e| MeshError::key_file(format!("{}: {}", identity_path.display(), e)))?;
    let pool = Arc::new(ThreadPool::new(config.worker_threads, "hiddenmesh-worker")?);

    let mut router = Router::new(
        identity,
        crypto,
        Arc::new(SystemClock),
        pool.clone(),
        config.lookup_timeout_ms,
    );

    match &config.services_file {
        Some(file) => {
            let services = ServicesConfig::load(Path::new(file))
                .map_err(|e| MeshError::config(e.to_string()))?;
            for section in &services.services {
                router
                    .services_mut()
                    .add_endpoint(section)
                    .map_err(|e| MeshError::service(format!("{}: {}", section.name, e)))?;
            }
        }
        None => info!("No services file configured, running as a relay only"),
    }

    print_status(&router);
    info!("Router is running. Press Ctrl+C to stop.");

    let mut interval = tokio::time::interval(config.tick_interval());
    loop {
        tokio::select! {
            _ = interval.tick() => {
                router.tick();
                for result in router.take_finished_lookups() {
                    if result.intro_sets.is_empty() {
                        warn!("Lookup {} found nothing", result.txid);
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    info!("Shutdown signal received");
    pool.stop();
    pool.join();
    info!("Router stopped");
    Ok(())
}

fn print_status(router: &Router) {
    println!("\n========================================");
    println!("         hiddenmesh Router Status");
    println!("========================================");
    println!("Router ID:        {}", router.router_id().to_hex());
    println!("Hidden services:  {}", router.services().len());
    for name in router.services().names() {
        if let Some(endpoint) = router.services().endpoint(name) {
            println!("  {:<14}  {}", name, endpoint.address().to_hostname());
        }
    }
    println!("========================================\n");
}

fn print_help() {
    println!("hiddenmesh daemon - onion routing node with hidden services");
    println!();
    println!("USAGE:");
    println!("    hiddenmesh-daemon [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    run             Run the router (default)");
    println!("    keygen <file>   Create a hidden service key file and print its address");
    println!("    help            Show this help message");
    println!("    version         Show version information");
    println!();
    println!("CONFIGURATION:");
    println!("    Node settings are read from ./{} (written with defaults", CONFIG_FILE);
    println!("    on first run). Hidden services are listed in the file named by");
    println!("    `services_file`, one table per service:");
    println!();
    println!("        [web]");
    println!("        keyfile = \"web.key\"");
    println!("        tag = \"blog\"");
}
