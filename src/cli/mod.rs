//! Command-line interface definitions for the `flotilla` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `flotilla` binary.
#[derive(Debug, Parser)]
#[command(
    name = "flotilla",
    about = "Provision and reap OpenStack agent servers owned by one orchestrator",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// List networks by name.
    #[command(name = "networks", about = "List networks by name")]
    Networks,
    /// List images by name.
    #[command(name = "images", about = "List images by name")]
    Images,
    /// List flavors by name.
    #[command(name = "flavors", about = "List flavors by name")]
    Flavors,
    /// List running servers owned by this orchestrator.
    #[command(name = "nodes", about = "List running servers owned by this orchestrator")]
    Nodes,
    /// Show one server.
    #[command(name = "show", about = "Show one server")]
    Show(ServerArg),
    /// Boot a server and wait until it is active.
    #[command(name = "boot", about = "Boot a server and wait until it is active")]
    Boot(BootCommand),
    /// Destroy a server and release its floating IPs.
    #[command(name = "destroy", about = "Destroy a server and release its floating IPs")]
    Destroy(ServerArg),
    /// Destroy every running server owned by this orchestrator.
    #[command(
        name = "sweep",
        about = "Destroy every running server owned by this orchestrator"
    )]
    Sweep,
}

/// Positional server identifier.
#[derive(Debug, Args)]
pub(crate) struct ServerArg {
    /// Server id.
    #[arg(value_name = "ID")]
    pub(crate) id: String,
}

/// Arguments for the `flotilla boot` subcommand.
#[derive(Debug, Args)]
pub(crate) struct BootCommand {
    /// Image id to boot from.
    #[arg(long, value_name = "IMAGE_ID")]
    pub(crate) image: String,
    /// Flavor id.
    #[arg(long, value_name = "FLAVOR_ID")]
    pub(crate) flavor: String,
    /// Network to attach; repeat for several.
    #[arg(long = "network", value_name = "NETWORK_ID")]
    pub(crate) networks: Vec<String>,
    /// Server name. A unique `flotilla-` name is generated when omitted.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Key pair injected into the guest.
    #[arg(long, value_name = "KEY")]
    pub(crate) key_name: Option<String>,
    /// Override the configured boot timeout.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) timeout_secs: Option<u64>,
    /// Allocate and attach a floating IP once the server is active.
    #[arg(long)]
    pub(crate) floating_ip: bool,
}
