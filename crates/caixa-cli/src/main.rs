use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use caixa_connect::{run_route, ConnectorRegistry, RouteConfig};
use caixa_core::{MessageBox, MessageBoxConfig, MessageStatus};

#[derive(Parser)]
#[command(name = "caixa", about = "Caixa message box CLI")]
struct Cli {
    /// Message box data directory
    #[arg(long, default_value = "caixa-data", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a transport route once: debatch the source, drain every destination
    Run {
        /// Route definition (TOML)
        #[arg(long)]
        config: PathBuf,
    },

    /// List messages on an interface by status
    Inspect {
        /// Interface (route) name
        interface: String,

        /// Which lifecycle status to show
        #[arg(long, value_enum, default_value = "error")]
        status: StatusArg,
    },

    /// Return quarantined (Error) messages on an interface to Pending
    Requeue {
        /// Interface (route) name
        interface: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    InProgress,
    Processed,
    Error,
}

impl From<StatusArg> for MessageStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => MessageStatus::Pending,
            StatusArg::InProgress => MessageStatus::InProgress,
            StatusArg::Processed => MessageStatus::Processed,
            StatusArg::Error => MessageStatus::Error,
        }
    }
}

fn open_box(data_dir: &PathBuf, config: MessageBoxConfig) -> MessageBox {
    match MessageBox::open(data_dir, config) {
        Ok(mbox) => mbox,
        Err(e) => {
            eprintln!("Error: cannot open message box at {}: {e}", data_dir.display());
            process::exit(1);
        }
    }
}

fn cmd_run(data_dir: &PathBuf, config_path: &PathBuf) {
    let route = match RouteConfig::load(config_path) {
        Ok(route) => route,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let mbox = open_box(data_dir, route.messagebox.clone());
    let registry = ConnectorRegistry::builtin();

    info!(interface = %route.interface, "starting transport run");
    match run_route(&mbox, &route, &registry) {
        Ok(summary) => {
            println!(
                "Debatched {} messages on \"{}\"",
                summary.message_ids.len(),
                route.interface
            );
            for (subscriber, report) in &summary.sinks {
                println!(
                    "  {subscriber}: {} processed, {} failed, {} removed",
                    report.processed, report.failed, report.removed
                );
            }
        }
        Err(e) => {
            eprintln!("Error: transport run failed: {e}");
            process::exit(1);
        }
    }
}

fn cmd_inspect(data_dir: &PathBuf, interface: &str, status: MessageStatus) {
    let mbox = open_box(data_dir, MessageBoxConfig::default());
    match mbox.store().read(interface, status) {
        Ok(messages) if messages.is_empty() => {
            println!("No {status:?} messages on \"{interface}\"");
        }
        Ok(messages) => {
            for msg in &messages {
                let error = msg.error_message.as_deref().unwrap_or("-");
                println!(
                    "{}  created_at={}  adapter={}  error={}",
                    msg.id, msg.created_at, msg.producing_adapter_name, error
                );
            }
            println!("{} message(s)", messages.len());
        }
        Err(e) => {
            eprintln!("Error: cannot read messages: {e}");
            process::exit(1);
        }
    }
}

fn cmd_requeue(data_dir: &PathBuf, interface: &str) {
    let mbox = open_box(data_dir, MessageBoxConfig::default());
    match mbox.leases().requeue_errors(interface) {
        Ok(count) => println!("Re-queued {count} message(s) on \"{interface}\""),
        Err(e) => {
            eprintln!("Error: requeue failed: {e}");
            process::exit(1);
        }
    }
}

fn main() {
    caixa_core::telemetry::init_tracing("info");

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => cmd_run(&cli.data_dir, &config),
        Commands::Inspect { interface, status } => {
            cmd_inspect(&cli.data_dir, &interface, status.into())
        }
        Commands::Requeue { interface } => cmd_requeue(&cli.data_dir, &interface),
    }
}
