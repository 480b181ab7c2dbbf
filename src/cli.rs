// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for RAW capture
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Capturing a single DNG
//! - An interactive capture loop

use rawcapture::backends::camera::{
    CameraBackend, Size, VirtualSensorBackend, VirtualSensorConfig,
};
use rawcapture::constants::{FALLBACK_SENSOR_SIZE, timing};
use rawcapture::pipelines::photo::{DngCreator, SavedPhoto};
use rawcapture::storage::{PhotoStorage, StorageMode};
use rawcapture::{Config, RawCaptureScreen, ScreenEvent};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{debug, info};

/// Options shared by `capture` and `run`
pub struct CaptureOptions {
    pub camera: Option<String>,
    pub output: Option<PathBuf>,
    pub sensor_size: Option<(u32, u32)>,
    pub storage: Option<StorageMode>,
}

/// Input from the terminal during `run`
enum Input {
    Capture,
    Quit,
}

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let backend = VirtualSensorBackend::new(VirtualSensorConfig::default());
    let ids = backend.camera_ids()?;

    if ids.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for id in ids {
        let characteristics = backend.characteristics(&id)?;
        let size = characteristics
            .pixel_array_size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown size".to_string());
        println!("  [{}] {}", id, characteristics.unique_model());
        println!(
            "      RAW16 {}  CFA {:?}  levels {}-{}  rotation {}",
            size,
            characteristics.cfa_pattern,
            characteristics.black_level,
            characteristics.white_level,
            characteristics.orientation
        );
        println!();
    }

    Ok(())
}

/// Capture one DNG and exit
pub fn capture_photo(options: CaptureOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&options);
    let backend = build_backend(&options);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (mut screen, mut events) = new_screen(config, &backend);
    screen.start()?;
    screen.surface_available(RawCaptureScreen::preview_surface())?;

    let result = runtime.block_on(async {
        wait_until_ready(&screen, &backend, &mut events).await?;
        screen.capture()?;
        wait_for_photo(&mut events).await
    });
    screen.stop();

    let photo = result?;
    println!("Photo saved: {}", describe(&photo));
    Ok(())
}

/// Preview until the user quits; every Enter captures a DNG
pub fn run_interactive(options: CaptureOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&options);
    let backend = build_backend(&options);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (input_tx, mut input_rx) = tokio::sync::mpsc::unbounded_channel();
    let ctrlc_tx = input_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Input::Quit);
    })?;

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let input = match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("q") => Input::Quit,
                Ok(_) => Input::Capture,
                Err(_) => Input::Quit,
            };
            let quit = matches!(input, Input::Quit);
            if input_tx.send(input).is_err() || quit {
                return;
            }
        }
        let _ = input_tx.send(Input::Quit);
    });

    let (mut screen, mut events) = new_screen(config, &backend);
    screen.start()?;
    screen.surface_available(RawCaptureScreen::preview_surface())?;
    println!("Press Enter to capture, q then Enter (or Ctrl+C) to quit.");

    let result: Result<(), Box<dyn std::error::Error>> = runtime.block_on(async {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => report_event(&event, &screen, &backend)?,
                    None => break,
                },
                input = input_rx.recv() => match input {
                    Some(Input::Capture) => {
                        if let Err(e) = screen.capture() {
                            println!("{}", e);
                        }
                    }
                    Some(Input::Quit) | None => break,
                },
            }
        }
        Ok(())
    });

    println!("Stopping camera...");
    screen.stop();
    result
}

fn build_config(options: &CaptureOptions) -> Config {
    let mut config = Config::load();
    if let Some(camera) = &options.camera {
        config.camera_id = Some(camera.clone());
    }
    if let Some(output) = &options.output {
        config.output_dir = Some(output.clone());
    }
    if let Some(storage) = options.storage {
        config.storage_mode = storage;
    }
    debug!(?config, "Effective configuration");
    config
}

fn build_backend(options: &CaptureOptions) -> Arc<VirtualSensorBackend> {
    let size = options
        .sensor_size
        .map(Size::from)
        .unwrap_or_else(|| Size::from(FALLBACK_SENSOR_SIZE));
    Arc::new(VirtualSensorBackend::new(VirtualSensorConfig {
        pixel_array_size: Some(size),
        ..Default::default()
    }))
}

fn new_screen(
    config: Config,
    backend: &Arc<VirtualSensorBackend>,
) -> (RawCaptureScreen, UnboundedReceiver<ScreenEvent>) {
    let storage = PhotoStorage::from_config(&config);
    info!(mode = %storage.mode(), dir = %storage.direct_dir().display(), "Storage selected");
    RawCaptureScreen::new(
        config,
        Arc::clone(backend) as Arc<dyn CameraBackend>,
        storage,
        Arc::new(DngCreator::new()),
    )
}

/// Print an event; answers permission requests on the user's behalf
fn report_event(
    event: &ScreenEvent,
    screen: &RawCaptureScreen,
    backend: &VirtualSensorBackend,
) -> Result<(), Box<dyn std::error::Error>> {
    match event {
        ScreenEvent::PermissionRequested => {
            println!("Granting camera permission");
            backend.set_permission(true);
            screen.permission_result(true)?;
        }
        ScreenEvent::CameraOpened {
            camera_id,
            raw_size,
        } => println!("Camera {} opened, RAW {}", camera_id, raw_size),
        ScreenEvent::SessionConfigured => println!("Camera ready"),
        ScreenEvent::PhotoSaved(photo) => println!("Photo saved: {}", describe(photo)),
        ScreenEvent::FrameDropped { width, height } => {
            println!("Dropped {}x{} frame without capture metadata", width, height)
        }
        ScreenEvent::Notification(message) => println!("{}", message),
        ScreenEvent::CaptureStarted { request_id } => debug!(request_id, "Capture started"),
        ScreenEvent::CameraClosed => println!("Camera closed"),
        ScreenEvent::OpenFailed { reason }
        | ScreenEvent::SessionFailed { reason }
        | ScreenEvent::CameraLost { reason }
        | ScreenEvent::CaptureFailed { reason } => println!("Error: {}", reason),
        ScreenEvent::Timeout(operation) => println!("Timed out waiting for {}", operation),
    }
    Ok(())
}

async fn wait_until_ready(
    screen: &RawCaptureScreen,
    backend: &VirtualSensorBackend,
    events: &mut UnboundedReceiver<ScreenEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    let deadline = Instant::now() + timing::CLI_SESSION_WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| "Timed out waiting for the camera")?
            .ok_or("Camera worker stopped")?;
        match event {
            ScreenEvent::SessionConfigured => return Ok(()),
            ScreenEvent::OpenFailed { reason }
            | ScreenEvent::SessionFailed { reason }
            | ScreenEvent::CameraLost { reason } => return Err(reason.into()),
            ScreenEvent::Timeout(operation) => {
                return Err(format!("Timed out waiting for {}", operation).into());
            }
            other => report_event(&other, screen, backend)?,
        }
    }
}

async fn wait_for_photo(
    events: &mut UnboundedReceiver<ScreenEvent>,
) -> Result<SavedPhoto, Box<dyn std::error::Error>> {
    let deadline = Instant::now() + timing::CLI_CAPTURE_WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| "Timed out waiting for the photo")?
            .ok_or("Camera worker stopped")?;
        match event {
            ScreenEvent::PhotoSaved(photo) => return Ok(photo),
            ScreenEvent::CaptureFailed { reason } | ScreenEvent::CameraLost { reason } => {
                return Err(reason.into());
            }
            ScreenEvent::Timeout(operation) => {
                return Err(format!("Timed out waiting for {}", operation).into());
            }
            other => debug!(event = ?other, "Waiting for photo"),
        }
    }
}

fn describe(photo: &SavedPhoto) -> String {
    let location = photo
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| photo.target.to_string());
    format!(
        "{} ({}x{}, {} bytes)",
        location, photo.width, photo.height, photo.bytes
    )
}
