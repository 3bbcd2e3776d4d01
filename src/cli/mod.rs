pub mod app;

pub use app::Config;

use clap::{Parser, Subcommand};

/// Command line interface for the edgelink demo node.
#[derive(Parser)]
#[command(name = "edgelink", about = "Broker-less edge transport node for tensor payloads")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a listening node that echoes received payloads back
    Serve {
        /// Bind address, e.g. 127.0.0.1:5100 (defaults to the config file)
        #[arg(long)]
        bind: Option<String>,
        /// Capability string advertised to connecting peers
        #[arg(long)]
        caps: Option<String>,
    },
    /// Connect to a node and push payloads to it
    Connect {
        /// Target address, e.g. 127.0.0.1:5100
        #[arg(long)]
        address: String,
        /// Payload strings, each sent as a single-buffer request
        #[arg(long = "send")]
        send: Vec<String>,
    },
    /// Node configuration file handling
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration
    Show,
}
