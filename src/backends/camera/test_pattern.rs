// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic source: scrolling colour bars

use super::{FrameSource, Pacer, pool_failure};
use crate::constants::pool::ACQUIRE_TIMEOUT_MS;
use crate::errors::CaptureError;
use crate::media::{Frame, FrameFormat, FramePool};
use std::time::{Duration, Instant};
use tracing::debug;

const BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

/// Colour bars that shift one pixel per frame, paced at the target fps
pub struct TestPatternSource {
    format: FrameFormat,
    pacer: Pacer,
    produced: u64,
    limit: Option<u64>,
}

impl TestPatternSource {
    pub fn new(format: FrameFormat, fps: u32) -> Self {
        Self {
            format,
            pacer: Pacer::new(Some(fps)),
            produced: 0,
            limit: None,
        }
    }

    /// Produce frames as fast as they are pulled
    pub fn unpaced(format: FrameFormat) -> Self {
        Self {
            format,
            pacer: Pacer::new(None),
            produced: 0,
            limit: None,
        }
    }

    /// End the stream after `frames` frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    fn paint(&self, frame: &mut Frame) {
        let format = frame.format();
        let [r, g, b, a] = format.pixel_format.channel_offsets();
        let width = format.width.max(1) as usize;
        let bar_width = width.div_ceil(BARS.len()).max(1);
        let shift = self.produced as usize;
        let stride = format.stride();

        for (y, row) in frame.data_mut().chunks_exact_mut(stride).enumerate() {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let bar = ((x + shift) % width) / bar_width;
                let [cr, cg, cb] = BARS[bar.min(BARS.len() - 1)];
                // Darken the bottom quarter so vertical flips are visible
                let shade = if y * 4 >= format.height as usize * 3 { 2 } else { 1 };
                px[r] = cr / shade;
                px[g] = cg / shade;
                px[b] = cb / shade;
                px[a] = 255;
            }
        }
    }
}

impl FrameSource for TestPatternSource {
    fn format(&self) -> FrameFormat {
        self.format
    }

    fn next_frame(&mut self, pool: &FramePool) -> Result<Frame, CaptureError> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            debug!(frames = self.produced, "Test pattern finished");
            return Err(CaptureError::EndOfStream);
        }
        self.pacer.wait();

        let mut frame = pool
            .acquire_timeout(self.format, Duration::from_millis(ACQUIRE_TIMEOUT_MS))
            .map_err(pool_failure)?;
        self.paint(&mut frame);
        frame.set_captured_at(Instant::now());
        self.produced += 1;
        Ok(frame)
    }
}
