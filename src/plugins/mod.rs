// SPDX-License-Identifier: GPL-3.0-only

//! Overlay plugins
//!
//! A plugin is a unit that takes a frame and draws on it. Plugins are
//! created by a [`PluginRegistry`] from a [`PluginSpec`] and bound into an
//! immutable, versioned [`PluginChain`]. The compositing engine runs the
//! chain once per frame.
//!
//! ```text
//! PluginSpec[] ──build──▶ PluginChain(vN) ──ChainHandle::commit──▶ engine
//!                              │
//!                 Plugin::apply(frame, ctx) per enabled entry
//! ```

pub mod builtin;
pub mod chain;
pub mod draw;
pub mod options;
pub mod registry;

pub use chain::{
    ChainContext, ChainHandle, ChainOutcome, ChainReader, PluginChain, PluginSpec, StageRecord,
    StageResult,
};
pub use options::{OptionField, OptionKind, OptionValue, PluginOptions};
pub use registry::{PluginDescriptor, PluginRegistry};

use crate::errors::PluginError;
use crate::media::{Frame, FramePool};
use std::time::Duration;

/// What a plugin produced for its stage
#[derive(Debug)]
pub enum StageOutput {
    /// The frame passed to `apply` now holds the result
    InPlace,
    /// A new frame of the same format (usually acquired from
    /// [`ApplyContext::pool`]) replaces the input
    Replaced(Frame),
}

/// Per-call context handed to [`Plugin::apply`]
pub struct ApplyContext<'a> {
    /// Options of the instance being applied
    pub options: &'a PluginOptions,
    /// Pool to draw replacement frames from
    pub pool: &'a FramePool,
    /// Sequence number of the frame being composited
    pub sequence: u64,
    /// Backpressure wait allowed for pool acquisitions
    pub acquire_timeout: Duration,
}

impl ApplyContext<'_> {
    /// Acquire a blank frame of the same format as `like`
    pub fn acquire_like(&self, like: &Frame) -> Result<Frame, PluginError> {
        let mut frame = self
            .pool
            .acquire_timeout(like.format(), self.acquire_timeout)
            .map_err(|e| PluginError::render(e.to_string()))?;
        frame.set_sequence(like.sequence());
        frame.set_captured_at(like.captured_at());
        Ok(frame)
    }
}

/// A frame transformation registered under a plugin kind
///
/// `apply` may run on the engine thread while a newer chain is being built
/// on the control task, so instances must be `Send + Sync`. Plugins that
/// keep state across frames hold it behind interior mutability and report
/// it through [`is_stateful`](Plugin::is_stateful); everyone else must be
/// deterministic for an identical frame and options.
pub trait Plugin: Send + Sync {
    fn apply(&self, frame: &mut Frame, ctx: &ApplyContext<'_>) -> Result<StageOutput, PluginError>;

    fn is_stateful(&self) -> bool {
        false
    }
}

impl<F> Plugin for F
where
    F: Fn(&mut Frame, &ApplyContext<'_>) -> Result<StageOutput, PluginError> + Send + Sync,
{
    fn apply(&self, frame: &mut Frame, ctx: &ApplyContext<'_>) -> Result<StageOutput, PluginError> {
        self(frame, ctx)
    }
}

/// Box a closure as a stateless plugin
pub fn from_fn<F>(f: F) -> Box<dyn Plugin>
where
    F: Fn(&mut Frame, &ApplyContext<'_>) -> Result<StageOutput, PluginError>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}
