// SPDX-License-Identifier: MPL-2.0

//! RawCapture - RAW sensor capture to DNG
//!
//! Opens a camera, streams a preview and, on request, captures one RAW
//! sensor frame and stores it with its capture metadata as a DNG file.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`app`]: Screen lifecycle and the camera worker's command handlers
//! - [`backends`]: Camera service abstraction and the virtual sensor
//! - [`pipelines`]: Still capture, frame/metadata pairing and DNG encoding
//! - [`storage`]: Media catalog and direct file output
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! let backend = Arc::new(VirtualSensorBackend::new(Default::default()));
//! let (mut screen, events) = RawCaptureScreen::new(
//!     Config::default(),
//!     backend,
//!     PhotoStorage::direct(dir),
//!     Arc::new(DngCreator::new()),
//! );
//! screen.start()?;
//! screen.surface_available(RawCaptureScreen::preview_surface())?;
//! // ... wait for ScreenEvent::SessionConfigured
//! screen.capture()?;
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use app::{RawCaptureScreen, ScreenEvent};
pub use config::Config;
pub use errors::{AppError, AppResult};
