//! Binary entry point for the Flotilla CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uuid::Uuid;

use flotilla::{
    AssignmentError, ConfigError, Flavor, Image, Janitor, JanitorConfig, JanitorError, Network,
    Openstack, OpenstackConfig, OpenstackError, RequestError, Server, ServerRequest,
    public_address,
};

use cli::{BootCommand, Cli};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid boot request: {0}")]
    Request(#[from] RequestError),
    #[error(transparent)]
    Openstack(#[from] OpenstackError),
    #[error("janitor failed: {0}")]
    Janitor(#[from] JanitorError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli, &mut io::stdout()).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli, out: &mut impl Write) -> Result<(), CliError> {
    let config = OpenstackConfig::load_without_cli_args()?;
    let credentials = config.credentials()?;
    let fingerprint = config.fingerprint()?;
    let session = Openstack::connect(&credentials, fingerprint, config.poll_interval()).await?;

    match cli {
        Cli::Networks => {
            for network in session.get_sorted_networks().await? {
                writeln!(out, "{}", render_network(&network))?;
            }
        }
        Cli::Images => {
            for image in session.get_sorted_images().await? {
                writeln!(out, "{}", render_image(&image))?;
            }
        }
        Cli::Flavors => {
            for flavor in session.get_sorted_flavors().await? {
                writeln!(out, "{}", render_flavor(&flavor))?;
            }
        }
        Cli::Nodes => {
            for server in session.get_running_nodes().await? {
                writeln!(out, "{}", render_server(&server))?;
            }
        }
        Cli::Show(arg) => {
            let server = session.get_server_by_id(&arg.id).await?;
            writeln!(out, "{}", render_server(&server))?;
        }
        Cli::Boot(args) => {
            let server = boot(&session, &config, args).await?;
            writeln!(out, "{}", render_server(&server))?;
        }
        Cli::Destroy(arg) => {
            let server = session.get_server_by_id(&arg.id).await?;
            session.destroy_server(&server).await?;
            info!(server_id = %server.id, "Server destroyed");
        }
        Cli::Sweep => {
            let janitor_config = JanitorConfig {
                settle_interval: config.poll_interval(),
                ..JanitorConfig::default()
            };
            let summary = Janitor::new(&session, janitor_config).sweep().await?;
            writeln!(
                out,
                "janitor sweep complete: destroyed_servers={}",
                summary.destroyed_servers
            )?;
        }
    }
    Ok(())
}

async fn boot(
    session: &Openstack,
    config: &OpenstackConfig,
    args: BootCommand,
) -> Result<Server, CliError> {
    let name = args
        .name
        .unwrap_or_else(|| format!("flotilla-{}", Uuid::new_v4().simple()));
    let request = args
        .networks
        .into_iter()
        .fold(ServerRequest::builder(), |builder, network| {
            builder.network_id(network)
        })
        .name(name)
        .image_id(args.image)
        .flavor_id(args.flavor)
        .key_name(args.key_name)
        .build()?;
    let timeout = args
        .timeout_secs
        .map_or_else(|| config.boot_timeout(), Duration::from_secs);

    let server = session.boot_and_wait_active(request, timeout).await?;
    info!(server_id = %server.id, server = %server.name, "Server active");
    if !args.floating_ip {
        return Ok(server);
    }

    if let Err(err) = session.assign_floating_ip(&server).await {
        warn!(server_id = %server.id, %err, "Floating IP assignment failed, destroying server");
        return Err(discard_server(session, &server, err).await.into());
    }
    Ok(session.update_info(&server).await?)
}

async fn discard_server(
    session: &Openstack,
    server: &Server,
    err: AssignmentError,
) -> OpenstackError {
    let primary = OpenstackError::from(err);
    match session.destroy_server(server).await {
        Ok(()) => primary,
        Err(teardown) => primary.with_teardown(teardown),
    }
}

fn render_network(network: &Network) -> String {
    format!(
        "{}\t{}\t{}",
        network.id,
        network.name,
        network.status.as_deref().unwrap_or("-")
    )
}

fn render_image(image: &Image) -> String {
    format!(
        "{}\t{}\t{}",
        image.id,
        image.name,
        image.status.as_deref().unwrap_or("-")
    )
}

fn render_flavor(flavor: &Flavor) -> String {
    format!(
        "{}\t{}\t{} vCPU\t{} MiB\t{} GiB",
        flavor.id, flavor.name, flavor.vcpus, flavor.ram_mb, flavor.disk_gb
    )
}

fn render_server(server: &Server) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        server.id,
        server.name,
        server.status,
        public_address(server).unwrap_or("-")
    )
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
