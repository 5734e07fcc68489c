// SPDX-License-Identifier: GPL-3.0-only

//! Frame sources

pub mod still_image;
pub mod test_pattern;
#[cfg(feature = "gstreamer")]
pub mod v4l2;

pub use still_image::StillImageSource;
pub use test_pattern::TestPatternSource;
#[cfg(feature = "gstreamer")]
pub use v4l2::V4l2Source;

use crate::errors::CaptureError;
use crate::media::{Frame, FrameFormat, FramePool};
use std::time::{Duration, Instant};

/// Capture collaborator
///
/// `next_frame` blocks until the next frame is available and returns it in
/// a buffer drawn from `pool`. The engine assigns sequence numbers; sources
/// only stamp the capture instant. [`CaptureError::Transient`] is retried
/// once; a failed retry or any other error ends the stream.
pub trait FrameSource: Send {
    /// Format of the frames this source produces
    fn format(&self) -> FrameFormat;

    fn next_frame(&mut self, pool: &FramePool) -> Result<Frame, CaptureError>;

    /// Release the device; called once when the engine stops
    fn stop(&mut self) {}
}

/// Frame-rate limiter for sources that produce frames on demand
#[derive(Debug, Clone)]
pub(crate) struct Pacer {
    interval: Option<Duration>,
    next: Option<Instant>,
}

impl Pacer {
    pub fn new(fps: Option<u32>) -> Self {
        Self {
            interval: fps.map(crate::constants::frame_budget),
            next: None,
        }
    }

    /// Sleep until the next frame is due
    pub fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        let due = self.next.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        // Do not try to catch up after a stall
        self.next = Some(due.max(now) + interval);
    }
}

/// Capture cannot continue without buffers
pub(crate) fn pool_failure(e: crate::errors::PoolError) -> CaptureError {
    CaptureError::Fatal(e.to_string())
}
