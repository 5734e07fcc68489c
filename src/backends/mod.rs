// SPDX-License-Identifier: GPL-3.0-only

//! Capture and publish collaborators
//!
//! The engine only sees two traits: a [`camera::FrameSource`] it pulls raw
//! frames from and a [`virtual_camera::FrameSink`] it pushes composited
//! frames to.
//!
//! ```text
//! ┌──────────────────────┐      ┌────────────┐      ┌────────────────────────┐
//! │ FrameSource          │      │            │      │ FrameSink              │
//! │  test pattern        │ ───▶ │   engine   │ ───▶ │  null (counts frames)  │
//! │  still image         │      │            │      │  virtual camera (gst)  │
//! │  V4L2 camera (gst)   │      └────────────┘      └────────────────────────┘
//! └──────────────────────┘
//! ```
//!
//! The GStreamer-backed implementations are behind the `gstreamer` cargo
//! feature.

pub mod camera;
pub mod virtual_camera;
