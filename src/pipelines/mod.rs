// SPDX-License-Identifier: GPL-3.0-only

//! The real-time compositing pipeline
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ FrameSource  │ ──▶ │ CompositingEngine │ ──▶ │  FrameSink   │
//! │  (capture)   │     │  - chain snapshot │     │  (publish)   │
//! │              │     │  - apply_all      │     │              │
//! │              │     │  - time budget    │     │              │
//! └──────────────┘     └─────────▲─────────┘     └──────────────┘
//!                                │ watch<Arc<PluginChain>>
//! ┌──────────────┐     ┌─────────┴─────────┐
//! │  Producers   │ ──▶ │  Bus consumer     │
//! │ hotkeys,     │ bus │  - stamp order    │
//! │ config watch │     │  - ChainEditor    │
//! └──────────────┘     └───────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`engine`]: the per-frame loop and its degrade policy
//! - [`frame_loop`]: thread lifecycle shared by the engine and hotkeys
//! - [`orchestrator`]: start, control consumption and shutdown
//! - [`reconfigure`]: last-writer-wins chain edits
//! - [`stats`]: observable engine state

pub mod engine;
pub mod frame_loop;
pub mod orchestrator;
pub mod reconfigure;
pub mod stats;

pub use engine::{CompositingEngine, EngineConfig};
pub use orchestrator::{PipelineHandle, ShutdownReport, start};
pub use reconfigure::{ChainEditor, EditOutcome};
pub use stats::{EngineState, EngineStatus, FrameCounters, FrameTimes, PluginCost, StateHandle};
