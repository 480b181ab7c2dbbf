// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera capture
//!
//! The backend layer abstracts the platform camera service, providing a
//! consistent API regardless of where frames come from:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  App Layer                   │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │ Session manager  │  │   RAW queue     │  │
//! │  │  + worker        │  │  (capacity 5)   │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! │  ┌──────────────────────────────────────┐   │
//! │  │   CameraBackend (virtual sensor)     │   │
//! │  └──────────────────────────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Camera traits, session manager, frame queue and worker

pub mod camera;
