//! strand - audio-reactive LED strip visualizer
//!
//! Captures the microphone, renders the selected effect and hands every
//! frame to a pixel sink. Runtime control is a small command console on
//! stdin; logs go to stderr so stdout can carry pixel data.

mod cli;
mod console;
mod sink;

use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{select, Receiver};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use strand_audio::{input_devices, CaptureContext, NullSink, PipelineCommand, PipelineEvent, PixelSink};
use strand_config::Config;

use crate::cli::{Cli, Output};
use crate::console::{ConsoleCommand, HELP};
use crate::sink::HexLineSink;

/// How often the host loop wakes up without events
const IDLE_TICK: Duration = Duration::from_millis(250);

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if cli.list_devices {
        for (index, name) in input_devices()?.iter().enumerate() {
            println!("{:>3}  {}", index, name);
        }
        return Ok(());
    }

    let mut settings = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    cli.apply_to(&mut settings);
    settings.validate()?;

    let sink: Box<dyn PixelSink> = match cli.output {
        Output::Null => Box::new(NullSink),
        Output::Stdout => Box::new(HexLineSink::stdout()),
    };

    let mut context = CaptureContext::new(settings, sink);
    context.show_fps(cli.show_fps);
    context.start()?;

    let console = console::spawn()?;
    tracing::info!("{}", HELP);

    let result = run(&mut context, &console);
    context.stop();
    result
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into()));

    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
    {
        eprintln!("failed to initialise logging: {err}");
    }
}

/// Host loop: console commands in, pipeline events out
fn run(context: &mut CaptureContext, console: &Receiver<ConsoleCommand>) -> anyhow::Result<()> {
    let closed = crossbeam_channel::never();
    let mut console_open = true;
    loop {
        let events = context.events().clone();
        let commands = if console_open { console } else { &closed };
        select! {
            recv(commands) -> msg => {
                match msg {
                    Ok(cmd) => {
                        if !handle_command(context, cmd)? {
                            return Ok(());
                        }
                    }
                    Err(_) => console_open = false,
                }
            }
            recv(events) -> msg => {
                if let Ok(event) = msg {
                    if !handle_event(event)? {
                        return Ok(());
                    }
                }
            }
            default(IDLE_TICK) => {
                if !context.is_running() && context.events().is_empty() {
                    anyhow::bail!("capture stopped unexpectedly");
                }
            }
        }
    }
}

/// Returns false when the host should exit
fn handle_command(context: &mut CaptureContext, cmd: ConsoleCommand) -> anyhow::Result<bool> {
    let outcome = match cmd {
        ConsoleCommand::Pipeline(PipelineCommand::SetFrequencyRange { min, max }) => {
            context.set_frequency_range(min, max)
        }
        ConsoleCommand::Pipeline(PipelineCommand::SetNumBands(n)) => context.set_num_bands(n),
        ConsoleCommand::Pipeline(PipelineCommand::SetNumPixels(n)) => context.set_num_pixels(n),
        ConsoleCommand::Pipeline(PipelineCommand::SetVolumeThreshold(v)) => context.set_volume_threshold(v),
        ConsoleCommand::Pipeline(cmd) => context.send(cmd),
        ConsoleCommand::Device(index) => {
            let previous = context.settings().device_index;
            if let Err(e) = context.swap_device(index) {
                tracing::warn!("Cannot switch input device: {}", e);
                context.swap_device(previous)?;
            }
            Ok(())
        }
        ConsoleCommand::Status => {
            log_status(context);
            Ok(())
        }
        ConsoleCommand::Help => {
            tracing::info!("{}", HELP);
            Ok(())
        }
        ConsoleCommand::Quit => return Ok(false),
    };

    if let Err(e) = outcome {
        tracing::warn!("{}", e);
    }
    Ok(true)
}

/// Returns false when the host should exit
fn handle_event(event: PipelineEvent) -> anyhow::Result<bool> {
    match event {
        PipelineEvent::Fatal(message) => anyhow::bail!("audio capture failed: {}", message),
        // Device swaps stop the old thread; a dead context is caught by the idle check
        PipelineEvent::Stopped => Ok(true),
        PipelineEvent::Reconfigured { rebuilt_filterbank } => {
            tracing::debug!("Configuration applied (filterbank rebuilt: {})", rebuilt_filterbank);
            Ok(true)
        }
        // Already logged by the capture thread
        PipelineEvent::Overflow { .. } | PipelineEvent::ConfigRejected(_) => Ok(true),
    }
}

fn log_status(context: &CaptureContext) {
    let diag = context.diagnostics();
    let settings = &diag.settings;
    let loudest = diag
        .bands
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);

    tracing::info!(
        "effect {} | {:.1} fps (target {}) | {} overflows | {} sink failures | {} filterbank rebuilds | {}",
        diag.effect_name(),
        diag.fps,
        settings.fps,
        diag.overflow_count,
        diag.sink_failures,
        diag.filterbank_rebuilds,
        if diag.silent { "silent".to_string() } else { format!("loudest band {}", loudest) }
    );
    tracing::info!(
        "{:.0}-{:.0} Hz, {} bands, {} pixels, threshold {:.1e}, device {}",
        settings.min_frequency,
        settings.max_frequency,
        settings.num_bands,
        settings.num_pixels,
        settings.min_volume_threshold,
        settings
            .device_index
            .map_or_else(|| "default".to_string(), |i| i.to_string())
    );
}
