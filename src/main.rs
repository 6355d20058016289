//! OceanStor Provisioner
//!
//! Command-line front end for the block volume lifecycle. Each invocation
//! logs in to the configured array, runs one operation, prints its result as
//! JSON and logs out.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use oceanstor_provisioner::config::{ensure_instance_id, DEFAULT_CONFIG_PATH};
use oceanstor_provisioner::{
    ArrayClient, BlockDeviceApi, Error, HostScanner, HttpFleetInventory, InventoryConfig,
    OceanStorBlockDevice, ProvisionerConfig, RestSession, Result, ScannerConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// OceanStor Provisioner - block volume lifecycle for OceanStor arrays
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the XML configuration file
    #[arg(long, env = "OCEANSTOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Cluster ID embedded in volume names
    #[arg(long, env = "CLUSTER_ID")]
    cluster_id: String,

    /// Fleet inventory URL listing instances
    #[arg(long, env = "INVENTORY_URL")]
    inventory_url: Option<String>,

    /// Metadata URL returning this host's hostname
    #[arg(long, env = "HOSTNAME_URL")]
    hostname_url: Option<String>,

    /// Filesystem root for host discovery
    #[arg(long, env = "HOST_ROOT", default_value = "/")]
    host_root: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a volume for a dataset
    Create {
        #[arg(long)]
        dataset_id: Uuid,
        /// Size in bytes
        #[arg(long)]
        size: u64,
    },
    /// Destroy a volume
    Destroy { blockdevice_id: String },
    /// Attach a volume to a node
    Attach {
        blockdevice_id: String,
        /// Node identifier; defaults to this host's instance ID
        #[arg(long)]
        node: Option<String>,
    },
    /// Detach a volume from its node
    Detach { blockdevice_id: String },
    /// List the volumes of this cluster
    List,
    /// Print the local device path of an attached volume
    DevicePath { blockdevice_id: String },
    /// Print this host's instance ID
    InstanceId,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting OceanStor Provisioner");
    info!("  Version: {}", oceanstor_provisioner::VERSION);
    info!("  Config: {}", args.config.display());
    info!("  Cluster: {}", args.cluster_id);

    let config = ProvisionerConfig::load(&args.config)?;

    let session = Arc::new(RestSession::new(config.session_config())?);
    session.login().await?;

    let host = Arc::new(HostScanner::new(ScannerConfig {
        root: args.host_root.clone(),
        ..Default::default()
    }));
    let mut driver = OceanStorBlockDevice::new(
        config,
        args.cluster_id.clone(),
        ArrayClient::new(session.clone()),
        host,
    );
    if let Some(url) = &args.inventory_url {
        let inventory = HttpFleetInventory::new(InventoryConfig {
            instances_url: url.clone(),
            hostname_url: args.hostname_url.clone(),
            ..Default::default()
        })?;
        driver = driver.with_inventory(Arc::new(inventory));
    }

    let outcome = run(&args, &driver).await;

    if let Err(e) = session.logout().await {
        warn!("Logout failed: {}", e);
    }

    outcome
}

async fn run(args: &Args, driver: &OceanStorBlockDevice) -> Result<()> {
    match &args.command {
        Command::Create { dataset_id, size } => {
            print_json(&driver.create_volume(*dataset_id, *size).await?)
        }
        Command::Destroy { blockdevice_id } => {
            driver.destroy_volume(blockdevice_id).await?;
            info!("Destroyed volume {}", blockdevice_id);
            Ok(())
        }
        Command::Attach {
            blockdevice_id,
            node,
        } => {
            let node = match node {
                Some(node) => node.clone(),
                None => instance_id(args, driver).await?,
            };
            print_json(&driver.attach_volume(blockdevice_id, &node).await?)
        }
        Command::Detach { blockdevice_id } => {
            driver.detach_volume(blockdevice_id).await?;
            info!("Detached volume {}", blockdevice_id);
            Ok(())
        }
        Command::List => print_json(&driver.list_volumes().await?),
        Command::DevicePath { blockdevice_id } => {
            let path = driver.get_device_path(blockdevice_id).await?;
            println!("{}", path.display());
            Ok(())
        }
        Command::InstanceId => {
            println!("{}", instance_id(args, driver).await?);
            Ok(())
        }
    }
}

/// This host's identity, generated and persisted on first use
async fn instance_id(args: &Args, driver: &OceanStorBlockDevice) -> Result<String> {
    match driver.compute_instance_id().await? {
        Some(id) => Ok(id),
        None => ensure_instance_id(&args.config),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "rustls=warn"] {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("{}", Error::Configuration(format!("log directive {}: {}", directive, e))),
        }
    }

    // Logs go to stderr so command output stays parseable.
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
