mod config;

use clap::{Parser, Subcommand};
use config::LauncherConfig;
use std::path::PathBuf;
use tcn_core::{
    ClusterManager, ClusterReadyState, DaemonExit, InitClusterOperation, KeyType, NetworkPreset,
    RunClusterOperation,
};
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "tcn")]
#[command(about = "Provision and launch a local multi-node test cluster")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Number of nodes [default: 5]
    #[arg(short = 'n', long = "nodes", global = true)]
    nodes: Option<usize>,

    /// Cluster root directory [default: .tcn]
    #[arg(short = 'p', long = "path", global = true)]
    path: Option<PathBuf>,

    /// Optional configuration file
    #[arg(long = "conf", global = true)]
    conf: Option<String>,

    /// Network preset: local or container
    #[arg(long)]
    preset: Option<NetworkPreset>,

    /// Identity key type: rsa or ed25519
    #[arg(long = "key-type")]
    key_type: Option<KeyType>,

    /// RSA key size in bits
    #[arg(long)]
    bits: Option<usize>,

    /// Daemon binary, looked up on PATH unless it contains a separator
    #[arg(long = "daemon-bin")]
    daemon_bin: Option<String>,

    /// Initialize the cluster, then exit without starting daemons
    #[arg(long = "init-only")]
    init_only: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every node's peer id and ports from its persisted configuration
    Status,
}

impl Cli {
    fn apply(&self, mut cfg: LauncherConfig) -> LauncherConfig {
        if let Some(nodes) = self.nodes {
            cfg.nodes = nodes;
        }
        if let Some(path) = &self.path {
            cfg.root = path.clone();
        }
        if let Some(preset) = self.preset {
            cfg.preset = preset;
        }
        if let Some(key_type) = self.key_type {
            cfg.identity.key_type = key_type;
        }
        if let Some(bits) = self.bits {
            cfg.identity.bits = bits;
        }
        if let Some(binary) = &self.daemon_bin {
            cfg.daemon.binary = binary.clone();
        }
        cfg
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tcn=info,tcn_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let cfg = match LauncherConfig::load(cli.conf.as_deref()) {
        Ok(cfg) => cli.apply(cfg),
        Err(error) => {
            tracing::error!("Failed to load config: {}", error);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Status) => run_status(cfg),
        None => run_cluster(cfg, cli.init_only).await,
    }
}

async fn run_cluster(cfg: LauncherConfig, init_only: bool) {
    let manager = ClusterManager::new(cfg.root.clone(), cfg.layout());
    let init_operation = InitClusterOperation::new(manager);

    let init_result = match init_operation.run(cfg.init_request()).await {
        Ok(result) => result,
        Err(error) => {
            tracing::error!("Initialization failed: {}", error);
            std::process::exit(1);
        }
    };

    match init_result.state {
        ClusterReadyState::Initialized => tracing::info!(
            "Initialized {} nodes at {:?}",
            init_result.repos.len(),
            cfg.root
        ),
        ClusterReadyState::Reused => tracing::info!(
            "Reusing {} existing nodes at {:?}",
            init_result.repos.len(),
            cfg.root
        ),
    }

    if init_only {
        tracing::info!("Initialization completed (init-only mode)");
        return;
    }

    let run_operation = RunClusterOperation::new(cfg.daemon_spec(), cfg.stop_timeout());
    let run_result = match run_operation
        .run(&init_result.repos, shutdown_signal())
        .await
    {
        Ok(result) => result,
        Err(error) => {
            tracing::error!("Failed to start cluster: {}", error);
            std::process::exit(1);
        }
    };

    for exit in &run_result.exits {
        print_exit(exit);
    }
}

fn print_exit(exit: &DaemonExit) {
    println!("---- node {} ({}) ----", exit.index, exit.repo_path.display());
    println!("STDOUT:");
    println!("{}", exit.stdout);
    println!("STDERR:");
    println!("{}", exit.stderr);
    println!("exit status: {}", exit.outcome);
}

fn run_status(cfg: LauncherConfig) {
    let manager = ClusterManager::new(cfg.root.clone(), cfg.layout());
    let nodes = match manager.describe() {
        Ok(nodes) => nodes,
        Err(error) => {
            tracing::error!("Failed to read cluster at {:?}: {}", cfg.root, error);
            std::process::exit(1);
        }
    };

    for node in nodes {
        println!(
            "{}\t{}\tswarm={}\tapi={}\tgateway={}\t{}",
            node.index,
            node.peer_id,
            format_port(node.swarm_port),
            format_port(node.api_port),
            format_port(node.gateway_port),
            node.repo.display()
        );
    }
}

fn format_port(port: Option<u16>) -> String {
    port.map(|port| port.to_string())
        .unwrap_or_else(|| "-".to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", error);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(error) => tracing::error!("failed to install SIGTERM handler: {}", error),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, stopping cluster"),
        _ = terminate => tracing::info!("received SIGTERM, stopping cluster"),
    }
}
