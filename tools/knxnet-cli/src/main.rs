//! KNXnet/IP CLI tool
//!
//! A command-line interface for discovering gateways, requesting their
//! descriptions, testing connect exchanges, and running a discoverable
//! server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use knxnet_core::{DEFAULT_PORT, MULTICAST_ADDRESS};
use knxnet_device::{
    factory, ConfigFile, DeviceIdentity, DeviceRole, IpScanner, IpServer, MulticastConfig,
    UdpDevice, UdpDeviceSettings,
};

#[derive(Parser)]
#[command(name = "knxnet")]
#[command(about = "KNXnet/IP CLI - discover, describe and connect to gateways")]
#[command(version)]
struct Cli {
    /// Local address to bind
    #[arg(short, long, default_value = "0.0.0.0")]
    local: String,

    /// Local port to bind (0 = ephemeral)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover gateways on the network via multicast search
    Discover {
        /// Discovery timeout in seconds
        #[arg(short, long, default_value = "5")]
        timeout: u64,

        /// Multicast group to search
        #[arg(long, default_value = MULTICAST_ADDRESS)]
        group: String,

        /// Multicast port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        group_port: u16,
    },

    /// Request the description of one gateway
    Describe {
        /// Gateway address (ip:port)
        target: SocketAddr,

        /// Seconds to wait for the response
        #[arg(short, long, default_value = "5")]
        timeout: u64,
    },

    /// Run a connect exchange against one gateway
    Connect {
        /// Gateway address (ip:port)
        target: SocketAddr,

        /// Seconds to wait for the response
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Run a discoverable server answering SearchRequests
    Serve {
        /// Config file with device descriptors (overrides the flags below)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Friendly name to announce
        #[arg(short, long, default_value = "SMARTHOMEKNX.DE")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = UdpDeviceSettings {
        ip_address: cli.local.clone(),
        port: cli.port,
        multicast: None,
        search_timeout_ms: 10_000,
        identity: DeviceIdentity::default(),
    };

    match cli.command {
        Commands::Discover {
            timeout,
            group,
            group_port,
        } => {
            println!("Searching {}:{} ...", group, group_port);
            let scanner = IpScanner::new(
                "knxnet-cli",
                UdpDeviceSettings {
                    multicast: Some(MulticastConfig {
                        ip_address: group,
                        port: group_port,
                    }),
                    ..settings
                },
            );
            scanner.power_on().await?;
            scanner.search(Some(Duration::from_secs(timeout))).await?;
            tokio::time::sleep(Duration::from_secs(timeout)).await;

            let servers = scanner.servers();
            scanner.power_off();
            if servers.is_empty() {
                println!("No gateways found.");
            } else {
                println!("\nFound {} gateway(s):\n", servers.len());
                for server in servers {
                    println!(
                        "  {}:{}  {}  (serial {}){}",
                        server.ip_address,
                        server.port,
                        server.friendly_name,
                        server.serial_number,
                        if server.described { "  [described]" } else { "" }
                    );
                }
            }
        }

        Commands::Describe { target, timeout } => {
            let device = UdpDevice::new("knxnet-cli", settings, DeviceRole::Client);
            device.set_description_response_callback(Arc::new(|_request, _response, message| {
                match message.to_yaml() {
                    Ok(yaml) => println!("{yaml}"),
                    Err(e) => eprintln!("can't render description: {e}"),
                }
            }));
            device.start_listener().await?;
            device.trigger_description_request(target).await?;
            tokio::time::sleep(Duration::from_secs(timeout)).await;
            device.stop_listener();
        }

        Commands::Connect { target, timeout } => {
            let device = UdpDevice::new("knxnet-cli", settings, DeviceRole::Client);
            device.start_listener().await?;
            let outcome = device
                .connect(target, Some(Duration::from_secs(timeout)))
                .await?;
            device.stop_listener();
            if outcome.is_success() {
                println!("Connected: channel {}", outcome.channel_id);
            } else {
                println!(
                    "Rejected with status {:#04x}: {}",
                    outcome.status,
                    outcome.reason()
                );
            }
        }

        Commands::Serve { config, name } => {
            if let Some(path) = config {
                let config = ConfigFile::load(&path)?;
                let devices = factory::build_all(&config)?;
                for device in &devices {
                    device.power_on().await?;
                    println!("Started {}", device.id());
                }
                tokio::signal::ctrl_c().await?;
                for device in &devices {
                    device.power_off().await;
                }
            } else {
                let server = IpServer::new(
                    "knxnet-cli",
                    UdpDeviceSettings {
                        multicast: Some(MulticastConfig::default()),
                        identity: DeviceIdentity {
                            friendly_name: name,
                            ..DeviceIdentity::default()
                        },
                        ..settings
                    },
                );
                server.power_on().await?;
                println!("Serving on {} (ctrl-c to stop)", server.local_addr()?);
                tokio::signal::ctrl_c().await?;
                server.power_off();
            }
        }
    }

    Ok(())
}
