// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │  RAW16 frame │ ──▶ │  Photo Pipeline   │ ──▶ │   DNG file   │
//! │  + metadata  │     │  - pairing        │     │ (catalog or  │
//! │              │     │  - DNG encoding   │     │  directory)  │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! - [`photo`]: still capture, frame/metadata pairing and DNG output

pub mod photo;
