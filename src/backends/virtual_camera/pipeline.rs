// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer pipeline for virtual camera output
//!
//! Creates a pipeline that:
//! 1. Receives composited RGBA/BGRA frames (via appsrc)
//! 2. Converts format as needed (via videoconvert)
//! 3. Outputs to a PipeWire virtual camera node or a v4l2loopback device

use super::FrameSink;
use crate::constants::virtual_camera::{NODE_DESCRIPTION, NODE_NAME, PUSH_LOG_INTERVAL};
use crate::errors::PublishError;
use crate::media::{Frame, FrameFormat};
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use tracing::{debug, error, info, warn};

/// Where the virtual camera appears
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// PipeWire video source node
    PipeWire,
    /// v4l2loopback device path, e.g. `/dev/video10`
    V4l2Loopback(String),
}

/// Virtual camera GStreamer pipeline
pub struct VirtualCameraPipeline {
    pipeline: gstreamer::Pipeline,
    appsrc: AppSrc,
    format: FrameFormat,
    pushed: u64,
    stopped: bool,
}

fn init_error(msg: String) -> PublishError {
    PublishError::Rejected(msg)
}

impl VirtualCameraPipeline {
    /// Create a pipeline accepting frames of `format` at `fps`
    pub fn new(format: FrameFormat, fps: u32, target: &OutputTarget) -> Result<Self, PublishError> {
        info!(%format, fps, ?target, "Creating virtual camera pipeline");

        gstreamer::init().map_err(|e| init_error(format!("GStreamer init failed: {}", e)))?;

        let pipeline = gstreamer::Pipeline::new();

        // appsrc: receives composited frames from the engine
        let appsrc = gstreamer::ElementFactory::make("appsrc")
            .name("virtual_camera_src")
            .build()
            .map_err(|e| init_error(format!("Failed to create appsrc: {}", e)))?;

        // videoconvert: handles format negotiation between appsrc and the sink
        let videoconvert = gstreamer::ElementFactory::make("videoconvert")
            .name("virtual_camera_convert")
            .build()
            .map_err(|e| init_error(format!("Failed to create videoconvert: {}", e)))?;

        let sink = match target {
            OutputTarget::PipeWire => {
                let sink = gstreamer::ElementFactory::make("pipewiresink")
                    .name("virtual_camera_sink")
                    .build()
                    .map_err(|e| init_error(format!("Failed to create pipewiresink: {}", e)))?;
                // "provide" mode creates a video source other applications can use;
                // media.role = "Camera" lets xdg-desktop-portal list it as a camera
                sink.set_property_from_str("mode", "provide");
                let stream_props = gstreamer::Structure::builder("props")
                    .field("media.class", "Video/Source")
                    .field("media.role", "Camera")
                    .field("node.name", NODE_NAME)
                    .field("node.description", NODE_DESCRIPTION)
                    .build();
                sink.set_property("stream-properties", &stream_props);
                sink
            }
            OutputTarget::V4l2Loopback(device) => gstreamer::ElementFactory::make("v4l2sink")
                .name("virtual_camera_sink")
                .property("device", device.as_str())
                .property("sync", false)
                .build()
                .map_err(|e| init_error(format!("Failed to create v4l2sink: {}", e)))?,
        };

        let appsrc = appsrc
            .downcast::<AppSrc>()
            .map_err(|_| init_error("Failed to downcast to AppSrc".into()))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", format.pixel_format.to_gst_format_string())
            .field("width", format.width as i32)
            .field("height", format.height as i32)
            .field("framerate", gstreamer::Fraction::new(fps.max(1) as i32, 1))
            .build();

        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gstreamer::Format::Time);
        appsrc.set_is_live(true);
        appsrc.set_do_timestamp(true);

        pipeline
            .add_many([appsrc.upcast_ref(), &videoconvert, &sink])
            .map_err(|e| init_error(format!("Failed to add elements: {}", e)))?;

        gstreamer::Element::link_many([appsrc.upcast_ref(), &videoconvert, &sink])
            .map_err(|e| init_error(format!("Failed to link elements: {}", e)))?;

        info!("Virtual camera pipeline created (appsrc -> videoconvert -> sink)");

        Ok(Self {
            pipeline,
            appsrc,
            format,
            pushed: 0,
            stopped: false,
        })
    }

    /// Start the pipeline
    pub fn start(&self) -> Result<(), PublishError> {
        debug!("Starting virtual camera pipeline");

        self.pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| init_error(format!("Failed to start pipeline: {}", e)))?;

        // Wait for state change to complete
        let (result, _state, _pending) = self.pipeline.state(gstreamer::ClockTime::from_seconds(5));
        if result.is_err() {
            return Err(init_error("Pipeline failed to reach Playing state".into()));
        }

        info!("Virtual camera pipeline started");
        Ok(())
    }
}

impl FrameSink for VirtualCameraPipeline {
    fn publish(&mut self, frame: &Frame) -> Result<(), PublishError> {
        if self.stopped {
            return Err(PublishError::NotStarted);
        }
        if frame.format() != self.format {
            return Err(PublishError::FormatMismatch {
                expected: self.format.to_string(),
                got: frame.format().to_string(),
            });
        }

        let data = frame.data();
        let mut buffer = gstreamer::Buffer::with_size(data.len())
            .map_err(|e| PublishError::Rejected(format!("Failed to create buffer: {}", e)))?;
        {
            let buffer_ref = buffer.get_mut().ok_or_else(|| {
                PublishError::Rejected("Failed to get mutable buffer reference".into())
            })?;
            let mut map = buffer_ref
                .map_writable()
                .map_err(|e| PublishError::Rejected(format!("Failed to map buffer: {}", e)))?;
            map.copy_from_slice(data);
        }

        match self.appsrc.push_buffer(buffer) {
            Ok(_) => {
                self.pushed += 1;
                if self.pushed % PUSH_LOG_INTERVAL == 0 {
                    debug!(frames = self.pushed, "Virtual camera frames pushed");
                }
                Ok(())
            }
            Err(e) => {
                warn!(?e, "Failed to push frame to virtual camera");
                Err(PublishError::Rejected(format!("Failed to push frame: {:?}", e)))
            }
        }
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        debug!("Stopping virtual camera pipeline");
        self.stopped = true;

        // Send EOS to gracefully stop
        if let Err(e) = self.appsrc.end_of_stream() {
            warn!(?e, "Failed to send EOS");
        }
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            error!(?e, "Failed to stop virtual camera pipeline");
        }
        info!(frames = self.pushed, "Virtual camera pipeline stopped");
    }
}

impl Drop for VirtualCameraPipeline {
    fn drop(&mut self) {
        debug!("Dropping virtual camera pipeline");
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            error!(?e, "Failed to set pipeline to Null on drop");
        }
    }
}
