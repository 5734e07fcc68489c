// SPDX-License-Identifier: GPL-3.0-only

//! Built-in overlay plugins
//!
//! | Kind     | Effect                                         | Output   |
//! |----------|------------------------------------------------|----------|
//! | `text`   | static label                                   | in place |
//! | `clock`  | current time (chrono strftime)                 | in place |
//! | `image`  | alpha-composited picture (alias `overlay`)     | in place |
//! | `shape`  | filled rectangle                               | in place |
//! | `tlp`    | Traffic Light Protocol badge                   | in place |
//! | `cpu`    | system CPU usage (sysinfo)                     | in place |
//! | `tail`   | last lines of a text file                      | in place |
//! | `filter` | whole-frame colour filter                      | mixed    |
//! | `crop`   | centre zoom, scaled back to the frame size     | replaced |

pub mod clock;
pub mod cpu;
pub mod crop;
pub mod filter;
pub mod image;
pub mod shape;
pub mod tail;
pub mod text;
pub mod tlp;

use super::draw::Rgba;
use super::options::{OptionField, OptionKind, PluginOptions};
use super::registry::PluginRegistry;
use crate::constants::overlay::DEFAULT_TEXT_SCALE;
use crate::errors::PluginError;
use std::time::Duration;

/// Options shared by every text-drawing overlay
pub(crate) const LABEL_FIELDS: [OptionField; 5] = [
    OptionField::optional("x", OptionKind::Integer),
    OptionField::optional("y", OptionKind::Integer),
    OptionField::optional("scale", OptionKind::Integer),
    OptionField::optional("color", OptionKind::Color),
    OptionField::optional("background", OptionKind::Color),
];

/// Label schema plus kind-specific fields
pub(crate) fn label_schema(extra: &[OptionField]) -> Vec<OptionField> {
    LABEL_FIELDS.iter().chain(extra).copied().collect()
}

/// Where and how a text overlay draws
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LabelStyle {
    pub x: i64,
    pub y: i64,
    pub scale: u32,
    pub color: Rgba,
    pub background: Option<Rgba>,
}

impl LabelStyle {
    pub const fn at(x: i64, y: i64) -> Self {
        Self {
            x,
            y,
            scale: DEFAULT_TEXT_SCALE,
            color: Rgba::WHITE,
            background: None,
        }
    }

    pub const fn with_color(mut self, color: Rgba) -> Self {
        self.color = color;
        self
    }

    pub const fn with_background(mut self, background: Rgba) -> Self {
        self.background = Some(background);
        self
    }

    pub const fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    /// Override the defaults with whatever the options specify
    pub fn from_options(
        options: &PluginOptions,
        defaults: LabelStyle,
    ) -> Result<Self, PluginError> {
        let scale = options.unsigned("scale")?.unwrap_or(defaults.scale);
        if scale == 0 {
            return Err(PluginError::invalid("scale", "must be at least 1"));
        }
        Ok(Self {
            x: options.integer("x")?.unwrap_or(defaults.x),
            y: options.integer("y")?.unwrap_or(defaults.y),
            scale,
            color: options.color("color")?.unwrap_or(defaults.color),
            background: options.color("background")?.or(defaults.background),
        })
    }
}

/// `update_interval` in seconds, rejecting negative, NaN and out-of-range values
pub(crate) fn update_interval(
    options: &PluginOptions,
    default_secs: f64,
) -> Result<Duration, PluginError> {
    let secs = options.float("update_interval")?.unwrap_or(default_secs);
    Duration::try_from_secs_f64(secs).map_err(|_| {
        PluginError::invalid("update_interval", "must be a non-negative number of seconds")
    })
}

/// Register every built-in kind (and the `overlay` alias) with `registry`
pub fn register_all(registry: &mut PluginRegistry) {
    registry.register(text::descriptor());
    registry.register(clock::descriptor());
    registry.register(image::descriptor());
    registry.register(shape::descriptor());
    registry.register(tlp::descriptor());
    registry.register(cpu::descriptor());
    registry.register(tail::descriptor());
    registry.register(filter::descriptor());
    registry.register(crop::descriptor());
    registry.alias("overlay", "image");
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::constants::PoolMode;
    use crate::media::{Frame, FrameFormat, FramePool};
    use crate::plugins::{ApplyContext, PluginOptions};
    use std::time::Duration;

    pub fn black(width: u32, height: u32) -> Frame {
        let mut frame = Frame::new(FrameFormat::rgba(width, height));
        frame.fill([0, 0, 0, 255]);
        frame
    }

    pub fn pool() -> FramePool {
        FramePool::new(4, PoolMode::Overflow)
    }

    pub fn ctx<'a>(options: &'a PluginOptions, pool: &'a FramePool) -> ApplyContext<'a> {
        ApplyContext {
            options,
            pool,
            sequence: 0,
            acquire_timeout: Duration::from_millis(50),
        }
    }

    /// Pixels that are no longer black
    pub fn lit(frame: &Frame) -> usize {
        frame
            .data()
            .chunks_exact(4)
            .filter(|px| px[0] != 0 || px[1] != 0 || px[2] != 0)
            .count()
    }
}
