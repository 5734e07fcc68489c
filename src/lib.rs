// SPDX-License-Identifier: GPL-3.0-only

//! OverlayCam - live overlay compositing for a virtual camera
//!
//! Pulls frames from a camera, runs them through an ordered, hot-reloadable
//! chain of overlay plugins under a per-frame time budget and publishes the
//! result as a virtual camera.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`media`]: frames and the frame buffer pool
//! - [`plugins`]: the plugin trait, registry, built-in overlays and the
//!   versioned plugin chain
//! - [`pipelines`]: compositing engine, chain reconfiguration and the
//!   orchestrator
//! - [`control`]: the Control Bus and its producers (hotkeys, config watcher)
//! - [`backends`]: capture sources and virtual camera sinks
//! - [`config`]: JSON configuration
//!
//! # Example
//!
//! ```ignore
//! let config = JsonConfigSource::new(path).load()?;
//! let registry = Arc::new(PluginRegistry::with_builtins());
//! let source = TestPatternSource::new(FrameFormat::rgba(1280, 720), 30);
//! let mut pipeline = pipelines::start(&config, registry, Box::new(source), Box::new(NullSink::new()))?;
//! pipeline.toggle("clock", None).await?;
//! let report = pipeline.shutdown().await;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod control;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod plugins;

// Re-export commonly used types
pub use config::{Config, ConfigSource, JsonConfigSource};
pub use errors::{AppError, AppResult};
pub use media::{Frame, FrameFormat, FramePool, PixelFormat};
pub use pipelines::{EngineState, EngineStatus, PipelineHandle, ShutdownReport};
pub use plugins::{Plugin, PluginChain, PluginRegistry, PluginSpec};
