use std::{
    io::{self, BufRead},
    path::PathBuf,
    thread,
};

use anyhow::{Context, Result};
use clap::Parser;
use remote_control::EndpointAddress;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use visualiser_core::{
    load_settings, BackendEvent, EventFeed, HeadlessBackend, HookResult, RemoteControlSource,
    Visualiser,
};

mod demo;

use demo::{Axes, Camera, FrameCounter, AXES};

/// Headless visualiser host. Each line read from stdin is pressed as one key;
/// end of input closes the application.
#[derive(Parser, Debug)]
#[command(name = "visualiser")]
struct Args {
    /// Settings file; defaults to an optional `visualiser.toml`.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    title: Option<String>,
    /// Serve remote control on `tcp://host:port` or `unix:///path`.
    #[arg(long)]
    remote: Option<String>,
    #[arg(long)]
    no_default_plugins: bool,
    /// Refresh the frame counter every this many ticks.
    #[arg(long, default_value_t = 100_000)]
    frames_every: u64,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let mut config = load_settings(args.config.as_deref()).context("failed to load settings")?;
    if let Some(title) = args.title {
        config.title = title;
    }
    if args.no_default_plugins {
        config.auto_add_default_plugins = false;
    }
    let endpoint = match args.remote {
        Some(raw) => Some(raw.parse::<EndpointAddress>()?),
        None => config
            .remote
            .as_ref()
            .map(|remote| remote.endpoint())
            .transpose()?
            .flatten(),
    };

    let (backend, feed) = HeadlessBackend::new();
    let visualiser = Visualiser::new(config, backend);
    visualiser.register_plugin(Axes::default(), &[])?;
    visualiser.register_plugin(Camera::default(), &[AXES])?;
    visualiser.register_plugin(FrameCounter::new(args.frames_every), &[])?;

    let weak = visualiser.downgrade();
    let print_help = move || -> HookResult {
        if let Some(visualiser) = weak.upgrade() {
            println!("\n{}\n", visualiser.current_help());
        }
        Ok(())
    };
    visualiser.hooks().init_finished.add_hook(print_help.clone());
    visualiser.hooks().post_keypress.add_hook(print_help);

    if let Some(endpoint) = endpoint {
        let (bound_tx, bound_rx) = crossbeam_channel::bounded(1);
        visualiser.register_datasource(
            RemoteControlSource::listening(endpoint).report_address_to(bound_tx),
        );
        thread::Builder::new()
            .name("endpoint-report".into())
            .spawn(move || {
                if let Ok(address) = bound_rx.recv() {
                    println!("remote control listening on {address}");
                }
            })?;
    }

    spawn_stdin_keys(feed)?;
    info!(title = %visualiser.title(), "starting visualiser");
    visualiser.run()?;

    let failures = visualiser.plugin_failures();
    for failure in &failures {
        warn!(plugin = %failure.plugin, reason = %failure.reason, "plugin was not built");
    }
    Ok(())
}

fn spawn_stdin_keys(feed: EventFeed) -> io::Result<()> {
    thread::Builder::new()
        .name("stdin-keys".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                let key = line.trim();
                if key.is_empty() {
                    continue;
                }
                if !feed.key_press(key) {
                    return;
                }
            }
            feed.send(BackendEvent::Close);
        })?;
    Ok(())
}
