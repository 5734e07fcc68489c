// SPDX-License-Identifier: GPL-3.0-only

//! Frame sinks: where composited frames go
//!
//! ```text
//! Composited frames (RGBA / BGRA)
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ GStreamer Sink   │  ← appsrc → videoconvert → pipewiresink | v4l2sink
//! └──────────────────┘
//!        │
//!        ▼
//!   Video Apps (Zoom, Teams, OBS, ...)
//! ```

#[cfg(feature = "gstreamer")]
mod pipeline;

#[cfg(feature = "gstreamer")]
pub use pipeline::{OutputTarget, VirtualCameraPipeline};

use crate::errors::PublishError;
use crate::media::{Frame, FrameFormat};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Publish collaborator
///
/// A failed publish is logged and counted by the engine; the frame is
/// released either way and the stream continues.
pub trait FrameSink: Send {
    fn publish(&mut self, frame: &Frame) -> Result<(), PublishError>;

    /// Flush and close the output; called once when the engine stops
    fn stop(&mut self) {}
}

/// Discards frames, counting them
///
/// With an expected format, frames of any other format are rejected.
#[derive(Debug, Default)]
pub struct NullSink {
    published: Arc<AtomicU64>,
    expected: Option<FrameFormat>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expecting(format: FrameFormat) -> Self {
        Self {
            expected: Some(format),
            ..Self::default()
        }
    }

    /// Shared counter of accepted frames
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.published)
    }
}

impl FrameSink for NullSink {
    fn publish(&mut self, frame: &Frame) -> Result<(), PublishError> {
        if let Some(expected) = self.expected
            && expected != frame.format()
        {
            return Err(PublishError::FormatMismatch {
                expected: expected.to_string(),
                got: frame.format().to_string(),
            });
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_counts_and_checks_format() {
        let mut sink = NullSink::expecting(FrameFormat::rgba(4, 4));
        let counter = sink.counter();
        sink.publish(&Frame::new(FrameFormat::rgba(4, 4))).unwrap();
        assert!(matches!(
            sink.publish(&Frame::new(FrameFormat::rgba(2, 2))),
            Err(PublishError::FormatMismatch { .. })
        ));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
