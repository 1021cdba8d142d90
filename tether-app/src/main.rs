//! Tethered capture demo.
//!
//! Drives a simulated camera through connect, capture, a short live view
//! session and teardown.
//!
//! Usage: `tether [config.json]`

mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_engine::{ErrorReporter, TetherContext};
use tether_sdk::SimulatedSdk;
use tether_types::TetherEvent;

/// Live view polling rate of the demo.
const LIVE_VIEW_INTERVAL: Duration = Duration::from_millis(100);

/// Frames requested before live view is stopped.
const LIVE_VIEW_POLLS: usize = 30;

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "tether=debug,tether_engine=debug,tether_sdk=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();
}

fn main() -> Result<()> {
    init_logging();
    info!("Tether starting");

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = config::load_config(config_path.as_deref());
    std::fs::create_dir_all(&config.download_dir).with_context(|| {
        format!(
            "Failed to create download directory {}",
            config.download_dir.display()
        )
    })?;

    let sdk = Arc::new(SimulatedSdk::with_cameras(1));
    let reporter = ErrorReporter::new(|message| eprintln!("camera error: {message}"));
    let context = TetherContext::new(sdk.clone(), config, reporter);
    context.set_event_listener(|event| match event {
        TetherEvent::ImageSaved { path } => info!(path = %path.display(), "Image saved"),
        TetherEvent::StateChanged {
            camera,
            previous,
            current,
        } => info!(camera, %previous, %current, "Camera state changed"),
    });
    context.start()?;

    let registry = context.enumerate();
    if registry.is_empty() {
        context.stop();
        return Ok(());
    }

    registry.select_by_id(0)?;
    context.executor().flush()?;
    let camera = registry.selected().context("Camera 0 could not be selected")?;

    let frames = Arc::new(AtomicUsize::new(0));
    let frame_count = Arc::clone(&frames);
    camera.set_frame_consumer(move |frame| {
        frame_count.fetch_add(1, Ordering::Relaxed);
        info!(
            sequence = frame.sequence,
            width = frame.width,
            height = frame.height,
            bytes = frame.len(),
            latency_us = frame.captured_at.elapsed().as_micros() as u64,
            "Live view frame"
        );
    });

    camera.shoot()?;
    camera.start_live_view()?;

    let ticker = crossbeam_channel::tick(LIVE_VIEW_INTERVAL);
    for _ in 0..LIVE_VIEW_POLLS {
        ticker.recv()?;
        camera.poll_live_view()?;
    }

    camera.stop_live_view()?;
    registry.teardown()?;
    context.stop();

    if sdk.released_access_count() > 0 {
        warn!(count = sdk.released_access_count(), "Released handles were used");
    }
    info!(
        frames = frames.load(Ordering::Relaxed),
        calls = sdk.calls().len(),
        "Tether finished"
    );
    Ok(())
}
