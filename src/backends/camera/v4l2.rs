// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 webcam capture through GStreamer
//!
//! `v4l2src ! videoconvert ! videoscale ! video/x-raw,format=RGBA ! appsink`

use super::{FrameSource, pool_failure};
use crate::constants::pool::ACQUIRE_TIMEOUT_MS;
use crate::errors::CaptureError;
use crate::media::{Frame, FrameFormat, FramePool};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Wait for one sample before reporting a transient failure
const PULL_TIMEOUT_MS: u64 = 1_000;

pub struct V4l2Source {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    format: FrameFormat,
}

impl V4l2Source {
    /// Open `/dev/video{device}` at the requested size and rate
    pub fn open(device: u32, width: u32, height: u32, fps: u32) -> Result<Self, CaptureError> {
        info!(device, width, height, fps, "Opening V4L2 capture pipeline");

        gstreamer::init()
            .map_err(|e| CaptureError::Fatal(format!("GStreamer init failed: {}", e)))?;

        let pipeline_str = format!(
            "v4l2src device=/dev/video{device} ! videoconvert ! videoscale ! videorate ! \
             video/x-raw,format=RGBA,width={width},height={height},framerate={fps}/1 ! \
             appsink name=sink max-buffers=2 drop=true sync=false"
        );
        debug!(pipeline = %pipeline_str, "Capture pipeline");

        let pipeline = gstreamer::parse::launch(&pipeline_str)
            .map_err(|e| CaptureError::Fatal(format!("Failed to create pipeline: {}", e)))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| CaptureError::Fatal("Failed to downcast to Pipeline".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CaptureError::Fatal("Failed to find appsink".into()))?
            .downcast::<AppSink>()
            .map_err(|_| CaptureError::Fatal("Failed to downcast to AppSink".into()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CaptureError::Fatal(format!("Failed to start pipeline: {:?}", e)))?;

        let (result, _state, _pending) = pipeline.state(gstreamer::ClockTime::from_seconds(5));
        if result.is_err() {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CaptureError::Fatal(format!(
                "camera /dev/video{device} failed to reach Playing state"
            )));
        }

        info!("V4L2 capture pipeline started");
        Ok(Self {
            pipeline,
            appsink,
            format: FrameFormat::rgba(width, height),
        })
    }
}

impl FrameSource for V4l2Source {
    fn format(&self) -> FrameFormat {
        self.format
    }

    fn next_frame(&mut self, pool: &FramePool) -> Result<Frame, CaptureError> {
        let Some(sample) = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_mseconds(PULL_TIMEOUT_MS))
        else {
            if self.appsink.is_eos() {
                return Err(CaptureError::Disconnected);
            }
            return Err(CaptureError::Transient("no frame within timeout".into()));
        };

        let buffer = sample
            .buffer()
            .ok_or_else(|| CaptureError::Transient("No buffer in sample".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| CaptureError::Transient("Failed to map buffer".into()))?;

        // Rows may be padded; the negotiated caps carry the real stride
        let row = self.format.stride();
        let src_stride = sample
            .caps()
            .and_then(|caps| VideoInfo::from_caps(caps).ok())
            .and_then(|info| info.stride().first().copied())
            .map_or(row, |stride| stride.max(0) as usize)
            .max(row);
        let height = self.format.height as usize;
        let src = map.as_slice();
        let needed = src_stride * height.saturating_sub(1) + row;
        if src.len() < needed {
            warn!(got = src.len(), needed, "Short capture buffer");
            return Err(CaptureError::Transient("short capture buffer".into()));
        }

        let mut frame = pool
            .acquire_timeout(self.format, Duration::from_millis(ACQUIRE_TIMEOUT_MS))
            .map_err(pool_failure)?;
        for (y, dst) in frame.data_mut().chunks_exact_mut(row).enumerate() {
            let start = y * src_stride;
            dst.copy_from_slice(&src[start..start + row]);
        }
        frame.set_captured_at(Instant::now());
        Ok(frame)
    }

    fn stop(&mut self) {
        debug!("Stopping V4L2 capture pipeline");
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            error!(?e, "Failed to stop capture pipeline");
        }
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}
