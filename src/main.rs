use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use dockhand::app::{handle_fatal_error, initialize_app, AppConfig};
use dockhand::docker::{DockerClient, EventFilter};
use dockhand::{DockhandError, ErrorCode};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Environment variable holding the registry password for `login`
const ENV_REGISTRY_PASSWORD: &str = "DOCKHAND_REGISTRY_PASSWORD";

/// Manage Docker containers, swarm services and nodes through the docker CLI
#[derive(Parser)]
#[command(name = "dockhand", version)]
#[command(about = "Drive Docker swarm services, nodes and containers with JSON output", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage swarm services
    Service {
        #[command(subcommand)]
        command: ServiceCommands,
    },
    /// Inspect swarm nodes
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },
    /// Inspect containers on this host
    Container {
        #[command(subcommand)]
        command: ContainerCommands,
    },
    /// Stream docker events as JSON lines until interrupted
    Events {
        /// Only events of this type (container, service, node, ...)
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Additional filters in key=value form
        #[arg(short, long)]
        filter: Vec<String>,
        /// Replay events since this timestamp or duration
        #[arg(long)]
        since: Option<String>,
    },
    /// Pull and prune images
    Image {
        #[command(subcommand)]
        command: ImageCommands,
    },
    /// Log in to a registry
    Login {
        /// Registry host; a name without a dot means Docker Hub
        #[arg(default_value = "")]
        registry: String,
        #[arg(short, long)]
        username: String,
        /// Read the password from stdin instead of DOCKHAND_REGISTRY_PASSWORD
        #[arg(long)]
        password_stdin: bool,
    },
    /// Print the docker server version
    Version,
}

#[derive(Subcommand)]
enum ServiceCommands {
    /// List services
    Ls,
    /// List the tasks of a service with their history
    Ps { name: String },
    /// Show the full service definition
    Inspect { name: String },
    /// Show recent service logs
    Logs {
        name: String,
        #[arg(short = 'n', long, default_value = "100")]
        tail: u32,
    },
    /// Remove a service
    Rm { name: String },
    /// Force a rolling restart
    Restart { name: String },
    /// Change the number of replicas
    Scale { name: String, replicas: u32 },
    /// Roll out a new image
    UpdateImage {
        name: String,
        image: String,
        /// Also change the number of replicas
        #[arg(long)]
        replicas: Option<u32>,
    },
}

#[derive(Subcommand)]
enum NodeCommands {
    /// List swarm nodes
    Ls,
    /// Show host details and labels of a node
    Info { name: String },
}

#[derive(Subcommand)]
enum ContainerCommands {
    /// Show the full container definition
    Inspect { id: String },
    /// Show recent container logs
    Logs {
        id: String,
        #[arg(short = 'n', long, default_value = "100")]
        tail: u32,
    },
    /// Sample resource usage once
    Stats { ids: Vec<String> },
    /// Check whether a container with this name exists
    Exists { id: String },
}

#[derive(Subcommand)]
enum ImageCommands {
    /// Pull an image
    Pull { image: String },
    /// Remove dangling images and prune build cache
    Prune,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        return;
    };

    let app = AppConfig::new(cli.verbose).with_config_path(cli.config);
    let result = match initialize_app(&app) {
        Ok(client) => run(client, command).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        handle_fatal_error(e, cli.verbose);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

fn not_found(kind: &str, name: &str) -> anyhow::Error {
    DockhandError::other(format!("No such {}: {}", kind, name)).into()
}

async fn run(client: DockerClient, command: Commands) -> Result<()> {
    match command {
        Commands::Service { command } => run_service(&client, command).await,
        Commands::Node { command } => run_node(&client, command).await,
        Commands::Container { command } => run_container(&client, command).await,
        Commands::Events {
            event_type,
            filter,
            since,
        } => run_events(&client, event_type, filter, since).await,
        Commands::Image { command } => match command {
            ImageCommands::Pull { image } => {
                print_lines(&client.images.pull(&image).await?);
                Ok(())
            }
            ImageCommands::Prune => {
                print_lines(&client.images.clear().await?);
                Ok(())
            }
        },
        Commands::Login {
            registry,
            username,
            password_stdin,
        } => {
            let password = read_password(password_stdin).await?;
            client.hub.login(&registry, &username, &password).await?;
            Ok(())
        }
        Commands::Version => {
            println!("{}", client.version().await);
            Ok(())
        }
    }
}

async fn run_service(client: &DockerClient, command: ServiceCommands) -> Result<()> {
    let service = &client.service;
    match command {
        ServiceCommands::Ls => print_json(&service.list().await?),
        ServiceCommands::Ps { name } => print_json(&service.ps(&name).await?),
        ServiceCommands::Inspect { name } => match service.inspect(&name).await? {
            Some(inspect) => print_json(&inspect),
            None => Err(not_found("service", &name)),
        },
        ServiceCommands::Logs { name, tail } => {
            print_lines(&service.logs(&name, tail).await?);
            Ok(())
        }
        ServiceCommands::Rm { name } => Ok(service.delete(&name).await?),
        ServiceCommands::Restart { name } => Ok(service.restart(&name).await?),
        ServiceCommands::Scale { name, replicas } => {
            Ok(service.set_replicas(&name, replicas).await?)
        }
        ServiceCommands::UpdateImage {
            name,
            image,
            replicas,
        } => match replicas {
            Some(replicas) => Ok(service
                .set_image_and_replicas(&name, &image, replicas)
                .await?),
            None => Ok(service.set_image(&name, &image).await?),
        },
    }
}

async fn run_node(client: &DockerClient, command: NodeCommands) -> Result<()> {
    match command {
        NodeCommands::Ls => print_json(&client.node.list().await?),
        NodeCommands::Info { name } => print_json(&client.node.info(&name).await?),
    }
}

async fn run_container(client: &DockerClient, command: ContainerCommands) -> Result<()> {
    let container = &client.container;
    match command {
        ContainerCommands::Inspect { id } => match container.inspect(&id).await? {
            Some(inspect) => print_json(&inspect),
            None => Err(not_found("container", &id)),
        },
        ContainerCommands::Logs { id, tail } => {
            print_lines(&container.logs(&id, tail).await?);
            Ok(())
        }
        ContainerCommands::Stats { ids } => print_json(&container.stats(&ids).await?),
        ContainerCommands::Exists { id } => {
            println!("{}", container.exists(&id).await?);
            Ok(())
        }
    }
}

async fn run_events(
    client: &DockerClient,
    event_type: Option<String>,
    filters: Vec<String>,
    since: Option<String>,
) -> Result<()> {
    let mut filter = EventFilter::new();
    if let Some(event_type) = event_type {
        filter = filter.event_type(event_type);
    }
    for raw in filters {
        let (key, value) = raw
            .split_once('=')
            .with_context(|| format!("Filter '{}' is not in key=value form", raw))?;
        filter = filter.with(key, value);
    }
    if let Some(since) = since {
        filter = filter.since(since);
    }

    let token = CancellationToken::new();
    let mut stream = client.events.watch(&filter, token.clone());

    loop {
        tokio::select! {
            event = stream.next_event() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !token.is_cancelled() => {
                debug!("Interrupted, stopping docker events");
                token.cancel();
            }
        }
    }

    let exit = stream.exit().wait().await;
    debug!("docker events ended with {:?}", exit.status);
    if token.is_cancelled() || exit.status.success() {
        return Ok(());
    }

    let mut message = format!("docker events exited with code {}", exit.code());
    if !exit.stderr.is_empty() {
        message = format!("{}:\n{}", message, exit.stderr.join("\n"));
    }
    Err(DockhandError::execution_with_code(
        ErrorCode::EXEC_SUBPROCESS_FAILED,
        message,
        Some("docker events".to_string()),
    )
    .with_exit_code(exit.code())
    .into())
}

async fn read_password(from_stdin: bool) -> Result<String> {
    if !from_stdin {
        return Ok(std::env::var(ENV_REGISTRY_PASSWORD).unwrap_or_default());
    }

    use tokio::io::AsyncReadExt;
    let mut password = String::new();
    tokio::io::stdin()
        .read_to_string(&mut password)
        .await
        .context("Failed to read password from stdin")?;
    Ok(password.trim_end_matches(['\r', '\n']).to_string())
}
