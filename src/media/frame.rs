// SPDX-License-Identifier: GPL-3.0-only

//! Frame and pixel format types shared by capture, plugins and publish

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Pixel layout of a frame buffer
///
/// Both layouts are packed, 4 bytes per pixel, straight (non-premultiplied)
/// alpha. Overlays never change the layout of the frame they draw on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// R G B A byte order
    #[default]
    Rgba8,
    /// B G R A byte order (common native output of capture drivers)
    Bgra8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(&self) -> usize {
        4
    }

    /// Byte offsets of the R, G, B and A channels within one pixel
    pub const fn channel_offsets(&self) -> [usize; 4] {
        match self {
            PixelFormat::Rgba8 => [0, 1, 2, 3],
            PixelFormat::Bgra8 => [2, 1, 0, 3],
        }
    }

    /// GStreamer video/x-raw format string
    pub fn to_gst_format_string(&self) -> &'static str {
        match self {
            PixelFormat::Rgba8 => "RGBA",
            PixelFormat::Bgra8 => "BGRA",
        }
    }

    /// Parse format from GStreamer format string
    pub fn from_gst_format(format: &str) -> Option<Self> {
        match format {
            "RGBA" | "RGBx" => Some(PixelFormat::Rgba8),
            "BGRA" | "BGRx" => Some(PixelFormat::Bgra8),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_gst_format_string())
    }
}

/// Geometry and layout of a frame; pooled buffers are only reused for an
/// identical format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl FrameFormat {
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            pixel_format,
        }
    }

    pub fn rgba(width: u32, height: u32) -> Self {
        Self::new(width, height, PixelFormat::Rgba8)
    }

    /// Bytes per row (frames are tightly packed, no padding)
    pub fn stride(&self) -> usize {
        self.width as usize * self.pixel_format.bytes_per_pixel()
    }

    /// Total buffer size in bytes
    pub fn byte_len(&self) -> usize {
        self.stride() * self.height as usize
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.pixel_format)
    }
}

/// A single video frame
///
/// A frame is owned by exactly one pipeline stage at a time and moves on
/// handoff; it is deliberately not `Clone`. Frames drawn from a
/// [`FramePool`](super::FramePool) carry a lease and must go back through
/// `FramePool::release`. Frames without a lease are transient and simply
/// dropped.
#[derive(Debug)]
pub struct Frame {
    format: FrameFormat,
    data: Vec<u8>,
    sequence: u64,
    captured_at: Instant,
    lease: Option<u64>,
}

impl Frame {
    /// Allocate a zeroed transient frame
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            data: vec![0; format.byte_len()],
            sequence: 0,
            captured_at: Instant::now(),
            lease: None,
        }
    }

    /// Wrap raw pixel data as a transient frame
    ///
    /// Returns `None` if the data length does not match the format.
    pub fn from_raw(format: FrameFormat, data: Vec<u8>) -> Option<Self> {
        if data.len() != format.byte_len() {
            return None;
        }
        Some(Self {
            format,
            data,
            sequence: 0,
            captured_at: Instant::now(),
            lease: None,
        })
    }

    /// Frame backed by a pool slot
    pub(crate) fn leased(format: FrameFormat, data: Vec<u8>, lease: u64) -> Self {
        Self {
            format,
            data,
            sequence: 0,
            captured_at: Instant::now(),
            lease: Some(lease),
        }
    }

    /// Split a frame into its buffer and lease (used by the pool on release)
    pub(crate) fn into_parts(self) -> (FrameFormat, Vec<u8>, Option<u64>) {
        (self.format, self.data, self.lease)
    }

    pub(crate) fn lease(&self) -> Option<u64> {
        self.lease
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format.pixel_format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn set_captured_at(&mut self, at: Instant) {
        self.captured_at = at;
    }

    /// Whether the frame belongs to a pool slot
    pub fn is_pooled(&self) -> bool {
        self.lease.is_some()
    }

    /// RGBA value of a pixel, regardless of the frame's byte order
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.format.width || y >= self.format.height {
            return None;
        }
        let idx = y as usize * self.format.stride() + x as usize * 4;
        let [r, g, b, a] = self.format.pixel_format.channel_offsets();
        let px = &self.data[idx..idx + 4];
        Some([px[r], px[g], px[b], px[a]])
    }

    /// Fill every pixel with an RGBA colour
    pub fn fill(&mut self, rgba: [u8; 4]) {
        let offsets = self.format.pixel_format.channel_offsets();
        for px in self.data.chunks_exact_mut(4) {
            for (channel, offset) in offsets.iter().enumerate() {
                px[*offset] = rgba[channel];
            }
        }
    }

    /// Copy pixels and frame metadata from another frame of the same format
    ///
    /// Returns `false` (and copies nothing) on a format mismatch.
    pub fn copy_from(&mut self, other: &Frame) -> bool {
        if self.format != other.format {
            return false;
        }
        self.data.copy_from_slice(&other.data);
        self.sequence = other.sequence;
        self.captured_at = other.captured_at;
        true
    }

    /// Detached copy (no lease) safe to keep beyond the pipeline
    pub fn to_detached(&self) -> Frame {
        Frame {
            format: self.format,
            data: self.data.clone(),
            sequence: self.sequence,
            captured_at: self.captured_at,
            lease: None,
        }
    }
}
