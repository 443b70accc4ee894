//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rtc_common::{
    Access, CategoryCatalog, ConfigField, ConfigLineEditor, ControllingEdit, FaultOverviewScanner,
    HostId, JsonCountSource, PollState, ProgressTracker, RtcConfig, ShareTransport, WatchMode,
};
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::DaemonContext;
use crate::probe::{StatusFileProbe, TrafficLightProbe};
use crate::sink::JsonReportSink;
use crate::status_poller::StatusPoller;
use crate::watch::{ProgressPollLoop, WatchHandle, WatchSettings};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn scan(ctx: &DaemonContext, host: HostId) -> Result<()> {
    let entry = ctx
        .scanner
        .read_overview(&host)
        .await
        .with_context(|| format!("Overview scan of {host} failed"))?;
    print_json(&entry)
}

pub async fn edit(
    ctx: &DaemonContext,
    host: HostId,
    file: String,
    field: ConfigField,
    value: String,
) -> Result<()> {
    let editor = ConfigLineEditor::new(ctx.client.clone());
    let outcome = editor
        .edit(Access::vm(&host), &file, field, &value)
        .await
        .with_context(|| format!("Editing {field} in {file} failed"))?;
    print_json(&outcome)
}

pub async fn controlling(ctx: &DaemonContext, edit: ControllingEdit) -> Result<()> {
    let editor = ConfigLineEditor::new(ctx.client.clone());
    let path = &ctx.config.paths.controlling_file;
    if edit.is_empty() {
        let snapshot = editor.read_controlling(path).await?;
        return print_json(&snapshot);
    }

    let report = editor
        .edit_controlling(path, &edit)
        .await
        .with_context(|| format!("Editing controlling file {path} failed"))?;
    for message in report.messages() {
        eprintln!("{message}");
    }
    print_json(&report)
}

pub async fn progress(ctx: &DaemonContext, host: HostId, category: String) -> Result<()> {
    let tracker = ProgressTracker::new(
        ctx.scanner.clone(),
        JsonCountSource::new(&ctx.config.paths.count_dir),
    );
    let mut state = PollState::new(host, category);
    let progress = tracker.tick(&mut state).await;
    print_json(&progress)
}

pub async fn status(ctx: &DaemonContext, host: HostId) -> Result<()> {
    let probe = TrafficLightProbe::new(ctx.scanner.clone(), &ctx.config.paths.activity_marker);
    let light = probe.probe(&host).await;
    print_json(&json!({
        "host": host,
        "status": light,
        "availability": light.availability(),
    }))
}

pub fn sample_config() {
    print!("{}", RtcConfig::sample_toml());
}

/// A category to watch and, in notify mode, the file to watch for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub host: HostId,
    pub category: String,
    pub overview: String,
}

/// Categories of `host`'s installed module: the declared list from the
/// test sources, or the category folders present in the result directory
/// when nothing is declared.
pub async fn watch_targets<T: ShareTransport>(
    scanner: &FaultOverviewScanner<T>,
    catalog: &CategoryCatalog<T>,
    host: &HostId,
) -> Result<Vec<WatchTarget>> {
    let version = scanner.read_system_version(host).await?;
    let version_dir = scanner.version_dir(host, &version);

    let mut categories = match catalog.discover(host, &version.module).await {
        Ok(categories) => categories,
        Err(err) => {
            warn!(host = %host, module = %version.module, "Category declaration unavailable: {}", err);
            Vec::new()
        }
    };
    if categories.is_empty() {
        categories = scanner.list_categories(host, &version_dir).await?;
    }

    Ok(categories
        .into_iter()
        .map(|category| WatchTarget {
            host: host.clone(),
            overview: scanner.overview_path(&version_dir, &category),
            category,
        })
        .collect())
}

/// Run the status poller and one progress watch per category until Ctrl-C.
pub async fn run(ctx: &DaemonContext) -> Result<()> {
    let config = &ctx.config;
    let settings = WatchSettings::from_config(&config.polling);

    let printer = spawn_event_printer(ctx);

    let poller = StatusPoller::new(
        TrafficLightProbe::new(ctx.scanner.clone(), &config.paths.activity_marker),
        config.polling.status_interval(),
        ctx.events.clone(),
    );
    for host in &config.hosts.tracked {
        poller.track(host.clone()).await;
    }
    let poller_task = poller.start();

    let poll_loop = ProgressPollLoop::new(
        Arc::new(ProgressTracker::new(
            ctx.scanner.clone(),
            JsonCountSource::new(&config.paths.count_dir),
        )),
        Arc::new(StatusFileProbe::new(&ctx.client, &config.paths.busy_status_dir)),
        Arc::new(JsonReportSink::new(
            &config.paths.report_dir,
            ctx.scanner.index().clone(),
            &config.scan.informational_pattern,
        )),
        ctx.events.clone(),
        settings.clone(),
    );
    let catalog = CategoryCatalog::new(
        ctx.client.clone(),
        &config.paths.test_source_dir,
        &config.paths.declaration_file,
    );

    let mut watches: Vec<WatchHandle> = Vec::new();
    for host in &config.hosts.tracked {
        let targets = match watch_targets(&ctx.scanner, &catalog, host).await {
            Ok(targets) => targets,
            Err(err) => {
                warn!(host = %host, "No progress watches for host: {:#}", err);
                continue;
            }
        };
        for target in targets {
            let watch_path =
                (settings.mode == WatchMode::Notify).then(|| PathBuf::from(&target.overview));
            watches.push(poll_loop.spawn(PollState::new(target.host, target.category), watch_path));
        }
    }
    info!(
        hosts = config.hosts.tracked.len(),
        watches = watches.len(),
        "Daemon running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    poller.stop().await;
    for watch in &watches {
        watch.stop();
    }
    for watch in watches {
        watch.join().await;
    }
    poller_task.abort();
    printer.abort();
    Ok(())
}

fn spawn_event_printer(ctx: &DaemonContext) -> JoinHandle<()> {
    let mut rx = ctx.events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(line) => println!("{line}"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Event output lagged, {} events dropped", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
