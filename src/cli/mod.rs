//! CLI interface for Crossbar.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Crossbar - SW-P-08 broadcast router control service
#[derive(Parser, Debug)]
#[command(
    name = "crossbar",
    author,
    version,
    about = "SW-P-08 (Pro-Bel) broadcast router control service",
    long_about = r#"
Crossbar drives a broadcast video/audio matrix router over the SW-P-08
serial control protocol:

  - TCP or RS-232/RS-422 serial link to the router frame
  - ACK/NAK link layer with bounded retransmission
  - Crosspoint tally cache rebuilt by dump reconciliation on reconnect
  - WebSocket fan-out for concurrent control clients

QUICK START:
  Serve:   crossbar serve
  Serial:  crossbar serve --transport serial --serial-path /dev/ttyUSB0
  Config:  crossbar config init
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the router link and client fan-out
    Serve(ServeArgs),

    /// Validate the configuration and try the router endpoint
    Check(CheckArgs),

    /// Manage configuration files
    Config(ConfigArgs),
}

/// Serve command arguments. Flags override the configuration file.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Transport to the router (tcp or serial)
    #[arg(long)]
    pub transport: Option<crate::transport::TransportKind>,

    /// Router TCP host
    #[arg(long)]
    pub tcp_host: Option<String>,

    /// Router TCP port
    #[arg(long)]
    pub tcp_port: Option<u16>,

    /// Serial device path
    #[arg(long)]
    pub serial_path: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    pub serial_baud: Option<u32>,

    /// Client fan-out listen address
    #[arg(long)]
    pub listen: Option<std::net::SocketAddr>,

    /// Do not connect to the router at startup
    #[arg(long)]
    pub no_auto_connect: bool,
}

/// Check command arguments
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Also open the router transport to prove the endpoint is reachable
    #[arg(long)]
    pub probe: bool,
}

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Target path (defaults to the platform config directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Print the default configuration path
    Path,
}
