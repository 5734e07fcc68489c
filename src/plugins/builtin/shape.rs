// SPDX-License-Identifier: GPL-3.0-only

//! Filled rectangle, e.g. a lower-third bar behind other labels

use crate::errors::PluginError;
use crate::media::Frame;
use crate::plugins::draw::{Rgba, fill_rect};
use crate::plugins::options::{OptionField, OptionKind};
use crate::plugins::{ApplyContext, Plugin, PluginDescriptor, PluginOptions, StageOutput};

const SCHEMA: [OptionField; 5] = [
    OptionField::optional("x", OptionKind::Integer),
    OptionField::optional("y", OptionKind::Integer),
    OptionField::required("width", OptionKind::Integer),
    OptionField::required("height", OptionKind::Integer),
    OptionField::optional("color", OptionKind::Color),
];

pub struct ShapePlugin {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    color: Rgba,
}

impl ShapePlugin {
    pub fn from_options(options: &PluginOptions) -> Result<Self, PluginError> {
        Ok(Self {
            x: options.integer("x")?.unwrap_or(0),
            y: options.integer("y")?.unwrap_or(0),
            width: options
                .unsigned("width")?
                .ok_or_else(|| PluginError::invalid("width", "required option missing"))?,
            height: options
                .unsigned("height")?
                .ok_or_else(|| PluginError::invalid("height", "required option missing"))?,
            color: options.color("color")?.unwrap_or(Rgba::SHADE),
        })
    }
}

impl Plugin for ShapePlugin {
    fn apply(
        &self,
        frame: &mut Frame,
        _ctx: &ApplyContext<'_>,
    ) -> Result<StageOutput, PluginError> {
        fill_rect(frame, self.x, self.y, self.width, self.height, self.color);
        Ok(StageOutput::InPlace)
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new("shape", "Filled rectangle", &SCHEMA, |options| {
        Ok(Box::new(ShapePlugin::from_options(options)?))
    })
}
