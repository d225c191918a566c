//! armada CLI - multi-cluster kind environments for networking tests

use anyhow::Result;
use armada::commands::Workspace;
use armada::commands::create::CreateOptions;
use armada::config::{CniKind, Settings};
use armada::utils::duration::parse_duration;
use armada::utils::errors::display_error;
use armada::utils::logger::{self, LoggingConfig};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "armada")]
#[command(author, version, about = "Create multi-cluster kind environments for cross-cluster networking tests", long_about = None)]
struct Cli {
    /// Verbose output (can be used multiple times: -v, -vv)
    /// -v: DEBUG, -vv: TRACE
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create resources
    Create {
        #[command(subcommand)]
        command: CreateCommands,
    },

    /// Destroy resources
    Destroy {
        #[command(subcommand)]
        command: DestroyCommands,
    },

    /// Deploy debug workloads to clusters
    Deploy {
        #[command(subcommand)]
        command: DeployCommands,
    },

    /// Export cluster diagnostics
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },

    /// Load resources into clusters
    Load {
        #[command(subcommand)]
        command: LoadCommands,
    },

    /// Check prerequisites
    Check,

    /// Print an example configuration file
    Config,

    /// Generate shell completion scripts
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CreateCommands {
    /// Create multiple kind clusters in parallel
    Clusters(CreateClustersArgs),
}

#[derive(Args)]
#[command(group = clap::ArgGroup::new("cni").multiple(false))]
struct CreateClustersArgs {
    /// Number of clusters to create (default from config: 2)
    #[arg(short, long = "num")]
    num: Option<u32>,

    /// Node image, e.g. kindest/node:v1.16.3
    #[arg(short, long)]
    image: Option<String>,

    /// Deploy weave CNI
    #[arg(long, group = "cni")]
    weave: bool,

    /// Deploy flannel CNI
    #[arg(long, group = "cni")]
    flannel: bool,

    /// Deploy calico CNI
    #[arg(long, group = "cni")]
    calico: bool,

    /// Deploy tiller
    #[arg(long)]
    tiller: bool,

    /// Give every cluster the same pod and service subnets
    #[arg(long)]
    overlap: bool,

    /// Keep node containers when creation fails
    #[arg(long, default_value_t = true, num_args = 0..=1, default_missing_value = "true", action = clap::ArgAction::Set)]
    retain: bool,

    /// Control-plane readiness wait, e.g. 5m (default CNI only)
    #[arg(short, long, value_parser = parse_duration)]
    wait: Option<Duration>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl CreateClustersArgs {
    fn cni(&self) -> CniKind {
        if self.weave {
            CniKind::Weave
        } else if self.flannel {
            CniKind::Flannel
        } else if self.calico {
            CniKind::Calico
        } else {
            CniKind::Default
        }
    }
}

#[derive(Subcommand)]
enum DestroyCommands {
    /// Destroy clusters; all known clusters when none are given
    Clusters {
        /// Comma-separated cluster names
        #[arg(short, long, value_delimiter = ',')]
        cluster: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DeployCommands {
    /// Deploy the netshoot DaemonSet
    Netshoot {
        /// Run netshoot in the host network namespace
        #[arg(long)]
        host_network: bool,

        /// Comma-separated cluster names
        #[arg(short, long, value_delimiter = ',')]
        cluster: Vec<String>,
    },

    /// Deploy the nginx-demo DaemonSet and Service
    NginxDemo {
        /// Comma-separated cluster names
        #[arg(short, long, value_delimiter = ',')]
        cluster: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ExportCommands {
    /// Export node logs to output/logs/<cluster>
    Logs {
        /// Comma-separated cluster names
        #[arg(short, long, value_delimiter = ',')]
        cluster: Vec<String>,
    },
}

#[derive(Subcommand)]
enum LoadCommands {
    /// Load local docker images into clusters
    DockerImages {
        /// Comma-separated cluster names
        #[arg(short, long, value_delimiter = ',')]
        cluster: Vec<String>,

        /// Comma-separated image names
        #[arg(short, long, value_delimiter = ',')]
        image: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let debug = matches!(
        &cli.command,
        Commands::Create {
            command: CreateCommands::Clusters(args)
        } if args.debug
    );
    let logging = LoggingConfig::new(cli.verbose, debug);
    logger::init(&logging);

    if let Err(e) = run(cli.command, logging).await {
        display_error(&e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, logging: LoggingConfig) -> Result<()> {
    match command {
        Commands::Create {
            command: CreateCommands::Clusters(args),
        } => {
            let workspace = Workspace::new(Settings::load(), logging)?;
            let options = CreateOptions {
                num_clusters: args.num,
                image: args.image.clone(),
                cni: args.cni(),
                tiller: args.tiller,
                overlap: args.overlap,
                retain: args.retain,
                wait: args.wait,
            };
            armada::commands::create::create_clusters(&workspace, options).await
        }
        Commands::Destroy {
            command: DestroyCommands::Clusters { cluster },
        } => {
            let workspace = Workspace::new(Settings::load(), logging)?;
            armada::commands::destroy::destroy_clusters(&workspace, &cluster).await
        }
        Commands::Deploy { command } => {
            let workspace = Workspace::new(Settings::load(), logging)?;
            match command {
                DeployCommands::Netshoot {
                    host_network,
                    cluster,
                } => armada::commands::deploy::deploy_netshoot(&workspace, &cluster, host_network).await,
                DeployCommands::NginxDemo { cluster } => {
                    armada::commands::deploy::deploy_nginx_demo(&workspace, &cluster).await
                }
            }
        }
        Commands::Export {
            command: ExportCommands::Logs { cluster },
        } => {
            let workspace = Workspace::new(Settings::load(), logging)?;
            armada::commands::export::export_logs(&workspace, &cluster).await
        }
        Commands::Load {
            command: LoadCommands::DockerImages { cluster, image },
        } => {
            let workspace = Workspace::new(Settings::load(), logging)?;
            armada::commands::load::load_images(&workspace, &cluster, &image).await
        }
        Commands::Check => armada::commands::check::check_prerequisites(),
        Commands::Config => handle_config_command(),
        Commands::Completion { shell } => handle_completion_command(shell),
        Commands::Version => handle_version_command(),
    }
}

fn handle_config_command() -> Result<()> {
    print!("{}", Settings::example_config()?);
    Ok(())
}

fn handle_completion_command(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "armada", &mut io::stdout());
    Ok(())
}

fn handle_version_command() -> Result<()> {
    println!("armada {}", env!("CARGO_PKG_VERSION"));
    println!("Multi-cluster kind environments for cross-cluster networking tests");
    Ok(())
}
