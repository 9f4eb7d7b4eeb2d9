//! Attendance terminal binary.
//!
//! `timeclock run` starts the kiosk; `timeclock reader` polls the tag reader
//! and writes card events to stdout as JSON lines, one per tag. By default
//! `run` spawns `reader` as a child process and consumes its output. Stdin
//! lines starting with `@` are passed on to the reader as simulated tags.
//!
//! Usage:
//!   timeclock run --simulate                   # stdin: "@04ABCDEF" presents a tag
//!   timeclock run --simulate --reader inline   # reader task in the kiosk process
//!   printf '04ABCDEF\n' | timeclock reader --simulate

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use timeclock_core::{Config, ConfigStore};
use timeclock_hardware::mock::{MockTagDevice, MockTagHandle, feed_lines, parse_sim_line};
use timeclock_hardware::{
    EventSender, ProcessBridge, StopHandle, TagReader, event_channel, write_event,
};
use timeclock_kiosk::{
    BacklightWriter, CommandCapture, ConsoleView, Input, Intervals, KioskSettings, Orchestrator,
    Runtime, TokenManager,
};
use timeclock_network::{ApiClient, ApiClientConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStdin;
use tokio::sync::mpsc;
use tracing::{Instrument, info, info_span, warn};
use tracing_subscriber::EnvFilter;

const CONSOLE_WIDTH: usize = 60;

const NO_HARDWARE: &str = "this build has no tag reader hardware driver; use --simulate";

/// Attendance terminal
#[derive(Parser, Debug)]
#[command(name = "timeclock", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the kiosk
    Run {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where the tag reader runs
        #[arg(long, value_enum, default_value_t = ReaderMode::Process)]
        reader: ReaderMode,

        /// Simulate tags: stdin lines "@UIDHEX [SECTORHEX]" present a tag
        #[arg(long)]
        simulate: bool,
    },

    /// Poll the tag reader and write card events to stdout
    Reader {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Read "UIDHEX [SECTORHEX]" lines from stdin instead of hardware
        #[arg(long)]
        simulate: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ReaderMode {
    /// `timeclock reader` child process
    Process,
    /// Task inside the kiosk process
    Inline,
}

/// Reader side of a running kiosk.
enum ReaderSide {
    Inline(StopHandle),
    Process(ProcessBridge),
}

/// Destination of simulated tag lines.
enum TagInput {
    Inline(MockTagHandle),
    Process(ChildStdin),
}

impl TagInput {
    /// Present the tag described by `scan` ("UIDHEX [SECTORHEX]").
    ///
    /// Lines are validated here so the reader process only sees tags.
    async fn present(&mut self, scan: &str) -> Result<()> {
        let Some(tag) = parse_sim_line(scan)? else {
            return Ok(());
        };
        match self {
            TagInput::Inline(handle) => handle.present_tag(tag).await?,
            TagInput::Process(stdin) => {
                stdin.write_all(format!("{}\n", scan.trim()).as_bytes()).await?;
                stdin.flush().await?;
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the reader's event stream, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            reader,
            simulate,
        } => {
            let path = config.as_deref();
            let config = Config::load(path).context("loading configuration")?;
            let span = info_span!("timeclock", terminal = config.api.terminal);
            run_kiosk(config, path, reader, simulate).instrument(span).await
        }
        Command::Reader { config, simulate } => {
            let config = Config::load(config.as_deref()).context("loading configuration")?;
            let span = info_span!("timeclock", terminal = config.api.terminal);
            run_reader(config, simulate).instrument(span).await
        }
    }
}

async fn run_kiosk(
    config: Config,
    config_path: Option<&Path>,
    mode: ReaderMode,
    simulate: bool,
) -> Result<()> {
    info!(
        version = timeclock_core::VERSION,
        base_url = %config.api.base_url,
        reader = ?mode,
        simulate,
        "kiosk starting"
    );

    let client = ApiClient::new(ApiClientConfig {
        base_url: config.api.base_url.clone(),
        timeout: config.timing.request_timeout(),
    })
    .context("creating API client")?;
    let settings = KioskSettings::from_config(&config).context("reading kiosk settings")?;
    let tokens = TokenManager::new(&config.api.username, &config.api.password);
    let view = ConsoleView::new(std::io::stdout(), CONSOLE_WIDTH);
    let orchestrator = Orchestrator::new(settings, tokens, Box::new(view));

    let backlight = BacklightWriter::new(&config.terminal.backlight_path);
    backlight.apply(&config.terminal.brightness.to_string());
    let mut store = ConfigStore::new(config.clone());
    store.add_callback("terminal", "brightness", move |value| {
        backlight.apply(value);
    });

    let (events_tx, events_rx) = event_channel();
    let (reader, tags) = start_reader(&config, config_path, mode, simulate, events_tx)?;

    let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_stdin(inputs_tx, tags).in_current_span());

    let runtime = Runtime::new(orchestrator, client, events_rx, store)
        .with_intervals(Intervals::from_config(&config))
        .with_inputs(inputs_rx)
        .with_capture(CommandCapture::new());
    let orchestrator = runtime.run(shutdown_signal()).await;
    info!(state = %orchestrator.state(), "kiosk stopped");

    match reader {
        ReaderSide::Inline(stop) => stop.stop(),
        ReaderSide::Process(bridge) => bridge.shutdown().await.context("stopping reader process")?,
    }
    Ok(())
}

fn start_reader(
    config: &Config,
    config_path: Option<&Path>,
    mode: ReaderMode,
    simulate: bool,
    events: EventSender,
) -> Result<(ReaderSide, TagInput)> {
    if !simulate {
        bail!(NO_HARDWARE);
    }

    match mode {
        ReaderMode::Inline => {
            let (device, handle) = MockTagDevice::with_name("simulated".to_string());
            let reader = TagReader::new(device.into()).with_debounce(config.timing.debounce());
            let stop = reader.stop_handle();
            tokio::spawn(
                async move {
                    match reader.run(events).await {
                        Ok(exit) => info!(?exit, "reader stopped"),
                        Err(e) => warn!(error = %e, "reader failed"),
                    }
                }
                .in_current_span(),
            );
            Ok((ReaderSide::Inline(stop), TagInput::Inline(handle)))
        }
        ReaderMode::Process => {
            let exe = std::env::current_exe().context("locating the timeclock binary")?;
            let mut command = tokio::process::Command::new(exe);
            command.arg("reader").arg("--simulate");
            if let Some(path) = config_path {
                command.arg("--config").arg(path);
            }
            let mut bridge =
                ProcessBridge::spawn_piped(command, events).context("starting reader process")?;
            let stdin = bridge.take_stdin().context("reader stdin not piped")?;
            Ok((ReaderSide::Process(bridge), TagInput::Process(stdin)))
        }
    }
}

/// Forward operator input from stdin.
///
/// Lines starting with `@` present a simulated tag.
async fn read_stdin(inputs: mpsc::UnboundedSender<Input>, mut tags: TagInput) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };

        if let Some(scan) = line.trim().strip_prefix('@') {
            if let Err(e) = tags.present(scan).await {
                warn!(line = %line, error = %e, "simulated tag not delivered");
            }
            continue;
        }

        match Input::parse(&line) {
            Some(input) => {
                if inputs.send(input).is_err() {
                    break;
                }
            }
            None => warn!(line = %line, "unknown command"),
        }
    }
}

async fn run_reader(config: Config, simulate: bool) -> Result<()> {
    if !simulate {
        bail!(NO_HARDWARE);
    }

    let (device, handle) = MockTagDevice::with_name("simulated".to_string());
    let (events_tx, mut events_rx) = event_channel();
    let reader = TagReader::new(device.into()).with_debounce(config.timing.debounce());
    let stop = reader.stop_handle();
    let reader_task = tokio::spawn(reader.run(events_tx).in_current_span());

    tokio::spawn(
        async move {
            match feed_lines(BufReader::new(tokio::io::stdin()), &handle).await {
                Ok(count) => info!(tags = count, "simulation input closed"),
                Err(e) => warn!(error = %e, "simulation input failed"),
            }
        }
        .in_current_span(),
    );

    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(event) => write_event(&mut stdout, &event).await.context("writing card event")?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received");
                stop.stop();
                break;
            }
        }
    }

    match reader_task.await.context("reader task panicked")? {
        Ok(exit) => info!(?exit, "reader stopped"),
        Err(e) if e.is_disconnected() => info!("simulated reader closed"),
        Err(e) => return Err(e).context("tag reader failed"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("ctrl-c received");
}
