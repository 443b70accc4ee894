//! Regression Test Control - Daemon
//!
//! Polls the traffic-light status of the test machines, watches the
//! progress of every running test category and offers one-shot commands
//! for scans and configuration edits.

#![forbid(unsafe_code)]

mod commands;
mod events;
mod probe;
mod sink;
mod status_poller;
mod watch;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rtc_common::{
    CategoryErrorIndex, ConfigField, ControllingEdit, EnvParser, FaultOverviewScanner,
    HostAvailabilityRegistry, HostId, MountedShare, RemoteFileClient, RtcConfig, ScanSettings,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use events::EventBus;

#[derive(Parser)]
#[command(name = "rtcd")]
#[command(author, version, about = "RTC daemon - test machine status and progress")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "RTC_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Also write a daily rolling log file into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll host status and watch category progress until Ctrl-C
    Run,
    /// Scan a host's overview logs and print the error index
    Scan {
        #[arg(long)]
        host: HostId,
    },
    /// Set one field in a host's configuration file
    Edit {
        #[arg(long)]
        host: HostId,
        /// Remote path of the configuration file
        #[arg(long)]
        file: String,
        /// prefix, build, day, month, year or category
        #[arg(long)]
        field: ConfigField,
        #[arg(long)]
        value: String,
    },
    /// Show or change the controlling file
    Controlling {
        #[arg(long)]
        day: Option<String>,
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        build: Option<String>,
        #[arg(long)]
        update: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Evaluate the progress of one category once
    Progress {
        #[arg(long)]
        host: HostId,
        #[arg(long)]
        category: String,
    },
    /// Probe the traffic-light status of a host
    Status {
        #[arg(long)]
        host: HostId,
    },
    /// Print a configuration file with all defaults
    SampleConfig,
}

/// Shared state for all commands.
#[derive(Clone)]
pub struct DaemonContext {
    pub config: RtcConfig,
    pub client: RemoteFileClient<MountedShare>,
    pub scanner: FaultOverviewScanner<MountedShare>,
    pub events: EventBus,
}

impl DaemonContext {
    fn new(config: RtcConfig, env: &mut EnvParser) -> Result<Self> {
        let client = RemoteFileClient::new(
            MountedShare::new(),
            HostAvailabilityRegistry::new(),
            config.credentials(env),
        );
        let settings = ScanSettings::from_config(&config).context("Invalid scan settings")?;
        let scanner = FaultOverviewScanner::new(client.clone(), settings, CategoryErrorIndex::new());
        Ok(Self {
            config,
            client,
            scanner,
            events: EventBus::default(),
        })
    }
}

fn init_logging(cli: &Cli, config: &RtcConfig) -> Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "rtcd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Command::SampleConfig) {
        commands::sample_config();
        return Ok(());
    }

    let mut env = EnvParser::new();
    let config = RtcConfig::load(cli.config.as_deref(), &mut env).context("Failed to load configuration")?;
    let _guard = init_logging(&cli, &config)?;
    info!("Starting RTC daemon v{}", env!("CARGO_PKG_VERSION"));

    let ctx = DaemonContext::new(config, &mut env)?;

    match cli.command {
        Command::Run => commands::run(&ctx).await,
        Command::Scan { host } => commands::scan(&ctx, host).await,
        Command::Edit {
            host,
            file,
            field,
            value,
        } => commands::edit(&ctx, host, file, field, value).await,
        Command::Controlling {
            day,
            month,
            year,
            build,
            update,
            prefix,
        } => {
            let edit = ControllingEdit {
                day,
                month,
                year,
                build,
                update,
                prefix,
            };
            commands::controlling(&ctx, edit).await
        }
        Command::Progress { host, category } => commands::progress(&ctx, host, category).await,
        Command::Status { host } => commands::status(&ctx, host).await,
        Command::SampleConfig => Ok(()),
    }
}
