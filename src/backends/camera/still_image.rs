// SPDX-License-Identifier: GPL-3.0-only

//! Still image repeated as a live stream
//!
//! Useful without a webcam: the image is decoded and scaled once, then
//! copied into a pooled buffer for every frame.

use super::{FrameSource, Pacer, pool_failure};
use crate::constants::pool::ACQUIRE_TIMEOUT_MS;
use crate::errors::CaptureError;
use crate::media::{Frame, FrameFormat, FramePool, PixelFormat};
use crate::plugins::builtin::image::load_rgba;
use ::image::RgbaImage;
use ::image::imageops::{self, FilterType};
use std::path::Path;
use std::time::{Duration, Instant};

pub struct StillImageSource {
    format: FrameFormat,
    /// Pixels already in the output layout
    pixels: Vec<u8>,
    pacer: Pacer,
}

impl StillImageSource {
    /// Load `path`; with `size` the image is stretched to that size
    pub fn open(path: &Path, size: Option<(u32, u32)>, fps: u32) -> Result<Self, CaptureError> {
        let image = load_rgba(path).map_err(CaptureError::Fatal)?;
        Ok(Self::from_image(image, size, Some(fps)))
    }

    pub fn from_image(image: RgbaImage, size: Option<(u32, u32)>, fps: Option<u32>) -> Self {
        let image = match size {
            Some((width, height)) if (width, height) != image.dimensions() => {
                imageops::resize(&image, width.max(1), height.max(1), FilterType::Triangle)
            }
            _ => image,
        };
        Self {
            format: FrameFormat::new(image.width(), image.height(), PixelFormat::Rgba8),
            pixels: image.into_raw(),
            pacer: Pacer::new(fps),
        }
    }
}

impl FrameSource for StillImageSource {
    fn format(&self) -> FrameFormat {
        self.format
    }

    fn next_frame(&mut self, pool: &FramePool) -> Result<Frame, CaptureError> {
        self.pacer.wait();
        let mut frame = pool
            .acquire_timeout(self.format, Duration::from_millis(ACQUIRE_TIMEOUT_MS))
            .map_err(pool_failure)?;
        frame.data_mut().copy_from_slice(&self.pixels);
        frame.set_captured_at(Instant::now());
        Ok(frame)
    }
}
