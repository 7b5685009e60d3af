mod commands;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use kubecube::history::History;
use kubecube::settings::{self, Settings};

/// kubectl config manipulation tools
#[derive(Parser, Debug)]
#[command(name = "cube", version, about)]
struct Cli {
    /// Kubeconfig to work on [default: ~/.kube/config]
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Directory for cached remote files and history [default: ~/.config/cube]
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Log more (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add remote cluster to kube config
    Add(AddArgs),
    /// Delete remote cluster from kube config
    Del(DelArgs),
    /// List merged clusters with their ssh forwarding command
    #[command(alias = "ls")]
    List(ListArgs),
    /// Print, run or stop the ssh port forwarding for a merged cluster
    Forward(ForwardArgs),
    /// Show local kubectl config
    Show,
    /// Show cube commands history
    History(HistoryArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Remote user
    #[arg(long, default_value = "core")]
    pub remote_user: String,
    /// Remote master private ip
    #[arg(long)]
    pub remote_ip: String,
    /// Local forwarding port [default: next free port in 7001-7100]
    #[arg(long)]
    pub local_port: Option<u32>,
    /// Ssh jump server, e.g. user@jump
    #[arg(long, env = "SSH_VIA")]
    pub ssh_via: Option<String>,
    /// Cluster name suffix
    #[arg(long, default_value = "")]
    pub name_suffix: String,
    /// Validate and print the result without writing the kubeconfig
    #[arg(long)]
    pub dry_run: bool,
    /// Merge even if the cluster looks merged already. Names must still be unique
    #[arg(long)]
    pub force: bool,
    /// Print ssh forwarding command and exit
    #[arg(long)]
    pub print_ssh_forwarding: bool,
    /// Copy the current kubeconfig aside before overwriting it
    #[arg(long)]
    pub backup: bool,
}

#[derive(Args, Debug)]
pub struct DelArgs {
    /// Part of the context name to delete
    #[arg(long, short)]
    pub name: String,
    /// Delete every matching context
    #[arg(long)]
    pub all: bool,
    /// Print the result without writing the kubeconfig
    #[arg(long)]
    pub dry_run: bool,
    /// Copy the current kubeconfig aside before overwriting it
    #[arg(long)]
    pub backup: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Cluster name pattern, default list all
    #[arg(long, short)]
    pub filter: Option<String>,
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
    #[arg(long, env = "SSH_VIA")]
    pub ssh_via: Option<String>,
}

#[derive(Args, Debug)]
pub struct ForwardArgs {
    /// Cluster name or suffix
    pub name: String,
    /// Start the forwarding instead of printing it
    #[arg(long, conflicts_with = "stop")]
    pub run: bool,
    /// Kill a running forwarding started by --run
    #[arg(long)]
    pub stop: bool,
    #[arg(long, env = "SSH_VIA")]
    pub ssh_via: Option<String>,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Drop records from this index on
    #[arg(long)]
    pub delete_from: Option<u64>,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "cube=info,kubecube=info",
        1 => "cube=debug,kubecube=debug",
        _ => "cube=trace,kubecube=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let home = settings::home_dir()?;
    let state_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| settings::default_state_dir(&home));

    let mut settings = Settings::new(&home, &state_dir);
    if let Some(path) = &cli.kubeconfig {
        settings.kubeconfig = path.clone();
    }

    Ok(settings)
}

fn record_history(settings: &Settings) {
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    if let Err(err) = History::new(&settings.history).append(&command_line) {
        warn!("failed to write history, err: {err}");
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = load_settings(&cli)?;

    match cli.command {
        Command::Add(args) => {
            record_history(&settings);
            settings.ssh_via = args.ssh_via.clone();
            commands::add(&settings, args)
        }
        Command::Del(args) => {
            record_history(&settings);
            commands::del(&settings, args)
        }
        Command::List(args) => {
            settings.ssh_via = args.ssh_via.clone();
            commands::list(&settings, args)
        }
        Command::Forward(args) => {
            settings.ssh_via = args.ssh_via.clone();
            commands::forward(&settings, args)
        }
        Command::Show => commands::show(&settings),
        Command::History(args) => commands::history(&settings, args),
    }
}
