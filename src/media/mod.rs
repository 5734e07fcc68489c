// SPDX-License-Identifier: GPL-3.0-only

//! Frame buffers and the pool that recycles them

pub mod frame;
pub mod pool;

pub use frame::{Frame, FrameFormat, PixelFormat};
pub use pool::{FramePool, PoolStats};
