// SPDX-License-Identifier: GPL-3.0-only

//! DNG encoding of RAW sensor frames
//!
//! Produces a single-IFD CFA DNG: 16-bit uncompressed Bayer samples in one
//! strip, plus the camera description and per-shot exposure metadata needed
//! by raw developers to render the file.

use crate::backends::camera::{AeMode, CameraCharacteristics, CaptureResult, RawFrame};
use crate::constants::sensor;
use crate::errors::CaptureError;
use dng::ifd::{Ifd, IfdValue, Offsets};
use dng::tags::ifd as tiff_tags;
use dng::{DngWriter, FileType};
use std::io::{Cursor, Write};
use std::sync::Arc;
use tracing::debug;

/// TIFF PhotometricInterpretation for colour filter array data
const PHOTOMETRIC_CFA: u16 = 32803;

/// Fixed-point scale for ColorMatrix1 entries
const COLOR_MATRIX_SCALE: i32 = 10_000;

/// Borrowed view of a RAW16 frame to encode
#[derive(Debug, Clone, Copy)]
pub struct RawSamples<'a> {
    pub width: u32,
    pub height: u32,
    /// Row-major CFA samples
    pub data: &'a [u16],
}

impl<'a> From<&'a RawFrame> for RawSamples<'a> {
    fn from(frame: &'a RawFrame) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            data: frame.data(),
        }
    }
}

/// Serializes a frame and its metadata to DNG bytes
pub trait DngEncoder: Send + Sync {
    /// Encode and write the complete file to `out`, returning bytes written
    fn write_dng(
        &self,
        samples: RawSamples<'_>,
        result: &CaptureResult,
        characteristics: &CameraCharacteristics,
        out: &mut dyn Write,
    ) -> Result<u64, CaptureError>;
}

/// [`DngEncoder`] backed by the `dng` crate
#[derive(Debug, Clone)]
pub struct DngCreator {
    software: String,
}

impl DngCreator {
    pub fn new() -> Self {
        Self {
            software: format!("RawCapture {}", env!("GIT_VERSION")),
        }
    }

    fn build_ifd(
        &self,
        samples: RawSamples<'_>,
        result: &CaptureResult,
        characteristics: &CameraCharacteristics,
    ) -> Ifd {
        let RawSamples { width, height, .. } = samples;
        let mut ifd = Ifd::default();

        // Main image, full resolution
        ifd.insert(tiff_tags::NewSubfileType, IfdValue::Long(0));
        ifd.insert(tiff_tags::ImageWidth, IfdValue::Long(width));
        ifd.insert(tiff_tags::ImageLength, IfdValue::Long(height));
        ifd.insert(tiff_tags::BitsPerSample, IfdValue::Short(16));
        ifd.insert(tiff_tags::Compression, IfdValue::Short(1));
        ifd.insert(
            tiff_tags::PhotometricInterpretation,
            IfdValue::Short(PHOTOMETRIC_CFA),
        );
        ifd.insert(tiff_tags::SamplesPerPixel, IfdValue::Short(1));
        ifd.insert(tiff_tags::RowsPerStrip, IfdValue::Long(height));
        ifd.insert(tiff_tags::PlanarConfiguration, IfdValue::Short(1));
        ifd.insert(
            tiff_tags::Orientation,
            IfdValue::Short(characteristics.orientation.tiff_orientation()),
        );

        ifd.insert(tiff_tags::Make, IfdValue::Ascii(characteristics.make.clone()));
        ifd.insert(
            tiff_tags::Model,
            IfdValue::Ascii(characteristics.model.clone()),
        );
        ifd.insert(tiff_tags::Software, IfdValue::Ascii(self.software.clone()));
        ifd.insert(
            tiff_tags::DateTime,
            IfdValue::Ascii(chrono::Local::now().format("%Y:%m:%d %H:%M:%S").to_string()),
        );

        ifd.insert(tiff_tags::DNGVersion, bytes(&[1, 4, 0, 0]));
        ifd.insert(tiff_tags::DNGBackwardVersion, bytes(&[1, 3, 0, 0]));
        ifd.insert(
            tiff_tags::UniqueCameraModel,
            IfdValue::Ascii(characteristics.unique_model()),
        );

        // 2x2 Bayer mosaic
        ifd.insert(
            tiff_tags::CFARepeatPatternDim,
            IfdValue::List(vec![IfdValue::Short(2), IfdValue::Short(2)]),
        );
        ifd.insert(
            tiff_tags::CFAPattern,
            bytes(&characteristics.cfa_pattern.colors()),
        );
        ifd.insert(
            tiff_tags::BlackLevel,
            IfdValue::Short(characteristics.black_level),
        );
        ifd.insert(
            tiff_tags::WhiteLevel,
            IfdValue::Long(u32::from(characteristics.white_level)),
        );

        ifd.insert(
            tiff_tags::ColorMatrix1,
            IfdValue::List(
                characteristics
                    .color_matrix
                    .iter()
                    .flatten()
                    .map(|v| {
                        IfdValue::SRational(
                            (v * COLOR_MATRIX_SCALE as f32).round() as i32,
                            COLOR_MATRIX_SCALE,
                        )
                    })
                    .collect(),
            ),
        );
        ifd.insert(
            tiff_tags::CalibrationIlluminant1,
            IfdValue::Short(sensor::ILLUMINANT_D65),
        );
        let neutral = result.as_shot_neutral.unwrap_or([1.0, 1.0, 1.0]);
        ifd.insert(
            tiff_tags::AsShotNeutral,
            IfdValue::List(
                neutral
                    .iter()
                    .map(|v| {
                        let numerator = (v.max(0.0) * 1_000_000.0).round() as u32;
                        let g = gcd(numerator, 1_000_000);
                        IfdValue::Rational(numerator / g, 1_000_000 / g)
                    })
                    .collect(),
            ),
        );

        if let Some(exposure_ns) = result.exposure_time_ns {
            // Microsecond precision, e.g. 16_666_667 ns -> 16667/1000000
            let numerator = u32::try_from(exposure_ns / 1_000).unwrap_or(u32::MAX);
            let denominator = 1_000_000u32;
            let g = gcd(numerator, denominator);
            ifd.insert(
                tiff_tags::ExposureTime,
                IfdValue::Rational(numerator / g, denominator / g),
            );
        }
        if let Some(iso) = result.sensitivity_iso {
            ifd.insert(
                tiff_tags::ISOSpeedRatings,
                IfdValue::Short(iso.min(65535) as u16),
            );
        }
        ifd.insert(
            tiff_tags::ExposureProgram,
            IfdValue::Short(exposure_program(result.ae_mode)),
        );
        if let Some(diopters) = result.focus_distance {
            ifd.insert(tiff_tags::SubjectDistance, subject_distance(diopters));
        }

        ifd
    }
}

/// EXIF `ExposureProgram`: 1 = manual, 2 = normal program
fn exposure_program(ae_mode: AeMode) -> u16 {
    match ae_mode {
        AeMode::Off => 1,
        AeMode::On => 2,
    }
}

/// EXIF `SubjectDistance` in millimetre precision from a focus distance in
/// diopters; 0 diopters is infinity (`0xFFFFFFFF/1`)
fn subject_distance(diopters: f32) -> IfdValue {
    if diopters <= 0.0 {
        return IfdValue::SRational(-1, 1);
    }
    let millimetres = (1000.0 / diopters).round().min(i32::MAX as f32) as i32;
    let g = gcd(millimetres as u32, 1000) as i32;
    IfdValue::SRational(millimetres / g, 1000 / g)
}

impl Default for DngCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl DngEncoder for DngCreator {
    fn write_dng(
        &self,
        samples: RawSamples<'_>,
        result: &CaptureResult,
        characteristics: &CameraCharacteristics,
        out: &mut dyn Write,
    ) -> Result<u64, CaptureError> {
        let RawSamples {
            width,
            height,
            data,
        } = samples;
        if width == 0 || height == 0 {
            return Err(CaptureError::Encode(format!(
                "invalid frame dimensions {}x{}",
                width, height
            )));
        }
        let pixel_count = width as usize * height as usize;
        if data.len() < pixel_count {
            return Err(CaptureError::Encode(format!(
                "frame holds {} samples, {}x{} needs {}",
                data.len(),
                width,
                height,
                pixel_count
            )));
        }

        let strip = little_endian_bytes(&data[..pixel_count]);
        let strip_len = u32::try_from(strip.len())
            .map_err(|_| CaptureError::Encode("frame too large for a single strip".into()))?;

        struct StripData {
            data: Vec<u8>,
        }

        impl Offsets for StripData {
            fn size(&self) -> u32 {
                self.data.len() as u32
            }

            fn write(&self, writer: &mut dyn Write) -> std::io::Result<()> {
                writer.write_all(&self.data)
            }
        }

        let mut ifd = self.build_ifd(samples, result, characteristics);
        let offsets: Arc<dyn Offsets + Send + Sync> = Arc::new(StripData { data: strip });
        ifd.insert(tiff_tags::StripOffsets, IfdValue::Offsets(offsets));
        ifd.insert(tiff_tags::StripByteCounts, IfdValue::Long(strip_len));

        let mut buffer = Vec::new();
        DngWriter::write_dng(Cursor::new(&mut buffer), true, FileType::Dng, vec![ifd])
            .map_err(|e| CaptureError::Encode(format!("{:?}", e)))?;

        out.write_all(&buffer)?;
        out.flush()?;
        debug!(width, height, bytes = buffer.len(), "DNG written");
        Ok(buffer.len() as u64)
    }
}

fn bytes(values: &[u8]) -> IfdValue {
    IfdValue::List(values.iter().map(|b| IfdValue::Byte(*b)).collect())
}

/// RAW16 samples as little-endian bytes
fn little_endian_bytes(samples: &[u16]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        bytemuck::cast_slice::<u16, u8>(samples).to_vec()
    } else {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Calculate greatest common divisor using Euclidean algorithm
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}
