// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use rawcapture::constants::*;

#[test]
fn test_frame_queue_capacity() {
    assert_eq!(FRAME_QUEUE_CAPACITY, 5);
}

#[test]
fn test_fallback_sensor_size() {
    assert_eq!(FALLBACK_SENSOR_SIZE, (4000, 3000));
}

#[test]
fn test_dng_naming() {
    assert_eq!(DNG_MIME_TYPE, "image/x-adobe-dng");
    assert_eq!(DNG_EXTENSION, "dng");
    assert_eq!(RAW_FILE_PREFIX, "raw_image");
}

#[test]
fn test_cli_waits_cover_capture() {
    assert!(timing::CLI_CAPTURE_WAIT >= timing::CLI_SESSION_WAIT);
    assert!(timing::PREVIEW_FRAME_INTERVAL < timing::CLI_SESSION_WAIT);
}

#[test]
fn test_virtual_sensor_levels() {
    assert!(sensor::VIRTUAL_BLACK_LEVEL < sensor::VIRTUAL_WHITE_LEVEL);
}
