//! Cadence: a fixed-rate frame loop around the shared scheduler.
//!
//! Registers a handful of demonstration targets, ticks the shared
//! scheduler with the measured frame time until `--frames` frames have run
//! (or Ctrl-C), then prints the scheduler and demo statistics as JSON.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use cadence_scheduler::{SchedulerConfig, SchedulerStats, get_shared, init_shared, purge_shared};
use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod demo;

use demo::{Demo, DemoReport};

#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Drive the frame scheduler at a fixed rate", long_about = None)]
struct Cli {
    /// Target frames per second
    #[arg(long, env = "CADENCE_FPS", default_value = "60",
          value_parser = clap::value_parser!(u32).range(1..=1000))]
    fps: u32,

    /// Number of frames to run; 0 runs until interrupted
    #[arg(long, env = "CADENCE_FRAMES", default_value = "300")]
    frames: u64,

    /// Time scale, overriding the config file
    #[arg(long, env = "CADENCE_TIME_SCALE")]
    time_scale: Option<f32>,

    /// Scheduler config as JSON
    #[arg(long, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between heartbeat timer firings
    #[arg(long, default_value = "1.0")]
    heartbeat: f32,

    /// Seconds before the one-shot fuse timer fires
    #[arg(long, default_value = "0.5")]
    fuse: f32,
}

#[derive(Serialize)]
struct Summary {
    frames: u64,
    elapsed_secs: f64,
    scheduler: SchedulerStats,
    demo: DemoReport,
}

fn load_config(cli: &Cli) -> Result<SchedulerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
            SchedulerConfig::from_json_str(&json).into_diagnostic()?
        }
        None => SchedulerConfig::default(),
    };

    if let Some(time_scale) = cli.time_scale {
        config.time_scale = time_scale;
    }
    config.validate().into_diagnostic()?;
    Ok(config)
}

/// Tick the shared scheduler once per interval until done. Returns the
/// number of frames run.
async fn run_frames(fps: u32, frames: u64) -> u64 {
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last = Instant::now();
    let mut frame = 0;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!(frame, "received shutdown signal");
                break;
            }

            _ = interval.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last).as_secs_f32();
                last = now;

                get_shared().tick(dt);
                frame += 1;

                if frames != 0 && frame >= frames {
                    break;
                }
            }
        }
    }

    frame
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "cadence=info,cadence_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Start from a clean slot so the config always applies
    purge_shared();
    let scheduler = init_shared(config).into_diagnostic()?;
    let demo = Demo::install(&scheduler, cli.heartbeat, cli.fuse);
    info!(fps = cli.fps, frames = cli.frames, ?scheduler, "starting frame loop");

    let started = Instant::now();
    let frames = run_frames(cli.fps, cli.frames).await;

    let summary = Summary {
        frames,
        elapsed_secs: started.elapsed().as_secs_f64(),
        scheduler: scheduler.stats(),
        demo: demo.report(&scheduler),
    };
    println!("{}", serde_json::to_string_pretty(&summary).into_diagnostic()?);

    drop(demo);
    purge_shared();
    Ok(())
}
