// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `FramePool::acquire` does once every pooled buffer is leased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMode {
    /// Block until a buffer is released (bounded backpressure)
    #[default]
    Backpressure,
    /// Hand out a transient buffer that lives outside the pool
    Overflow,
}

impl PoolMode {
    pub const ALL: [PoolMode; 2] = [PoolMode::Backpressure, PoolMode::Overflow];

    /// Get display name for the mode
    pub fn display_name(&self) -> &'static str {
        match self {
            PoolMode::Backpressure => "backpressure",
            PoolMode::Overflow => "overflow",
        }
    }
}

/// How the compositing engine sheds load while over its frame budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradePolicy {
    /// Release stale captured frames without compositing them
    #[default]
    DropOldest,
    /// Drop stale frames and also bypass the most expensive plugin(s)
    SkipSlowest,
}

impl DegradePolicy {
    pub const ALL: [DegradePolicy; 2] = [DegradePolicy::DropOldest, DegradePolicy::SkipSlowest];

    /// Get display name for the policy
    pub fn display_name(&self) -> &'static str {
        match self {
            DegradePolicy::DropOldest => "drop-oldest",
            DegradePolicy::SkipSlowest => "skip-slowest",
        }
    }
}

/// Per-frame time budget for a target frame rate
///
/// A zero fps is treated as 1 fps so the budget is always finite.
pub fn frame_budget(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

/// Camera defaults
pub mod camera {
    pub const DEFAULT_WIDTH: u32 = 1280;
    pub const DEFAULT_HEIGHT: u32 = 720;
    pub const DEFAULT_FPS: u32 = 30;
    pub const DEFAULT_DEVICE: u32 = 0;
}

/// Frame buffer pool defaults
pub mod pool {
    /// Capture frame + stage copy + replaced frame, with headroom for publish
    pub const DEFAULT_CAPACITY: usize = 8;

    /// Smallest usable pool: the captured frame, its stage copy and the
    /// output of a plugin that replaces the frame
    pub const MIN_CAPACITY: usize = 3;

    /// Backpressure wait used by the engine before reporting exhaustion
    pub const ACQUIRE_TIMEOUT_MS: u64 = 2_000;
}

/// Compositing engine tuning
pub mod engine {
    /// Consecutive in-budget frames needed to leave Degraded
    pub const RECOVERY_FRAMES: u32 = 3;

    /// Upper bound on stale frames dropped per iteration while degraded
    pub const MAX_DROPS_PER_FRAME: u32 = 2;

    /// Rolling window for frame-time statistics
    pub const STATS_WINDOW: usize = 120;

    /// Sleep granularity while paused
    pub const PAUSE_POLL_MS: u64 = 100;

    /// Log a frame summary every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 300;
}

/// Control plane defaults
pub mod control {
    /// Control Bus capacity; producers block (threads) or await (tasks) when full
    pub const BUS_CAPACITY: usize = 64;

    /// Config file modification-time polling interval
    pub const WATCH_INTERVAL_MS: u64 = 500;

    /// Bounded wait for event producers during shutdown
    pub const JOIN_TIMEOUT_MS: u64 = 2_000;

    /// Key polling granularity of the hotkey listener
    pub const KEY_POLL_MS: u64 = 100;
}

/// Overlay rendering defaults
pub mod overlay {
    /// Side length of the embedded bitmap glyphs
    pub const GLYPH_SIZE: u32 = 8;

    /// Padding around text backgrounds, in pixels
    pub const TEXT_PADDING: u32 = 5;

    pub const DEFAULT_TEXT_SCALE: u32 = 2;
    pub const DEFAULT_CLOCK_FORMAT: &str = "%H:%M:%S";
    pub const DEFAULT_CPU_INTERVAL_SECS: f64 = 2.0;
    pub const DEFAULT_TAIL_LINES: usize = 10;
}

/// Virtual camera output
pub mod virtual_camera {
    pub const NODE_NAME: &str = "overlaycam-virtual";
    pub const NODE_DESCRIPTION: &str = "OverlayCam (Virtual)";

    /// Frames between "frames pushed" debug logs
    pub const PUSH_LOG_INTERVAL: u64 = 100;
}
