// SPDX-License-Identifier: GPL-3.0-only

//! Static text label

use super::{LabelStyle, label_schema};
use crate::errors::PluginError;
use crate::media::Frame;
use crate::plugins::draw::draw_label;
use crate::plugins::options::{OptionField, OptionKind};
use crate::plugins::{ApplyContext, Plugin, PluginDescriptor, PluginOptions, StageOutput};

pub struct TextPlugin {
    text: String,
    style: LabelStyle,
}

impl TextPlugin {
    pub fn from_options(options: &PluginOptions) -> Result<Self, PluginError> {
        Ok(Self {
            text: options.required_text("text")?.to_string(),
            style: LabelStyle::from_options(options, LabelStyle::at(10, 10))?,
        })
    }
}

impl Plugin for TextPlugin {
    fn apply(
        &self,
        frame: &mut Frame,
        _ctx: &ApplyContext<'_>,
    ) -> Result<StageOutput, PluginError> {
        let LabelStyle {
            x,
            y,
            scale,
            color,
            background,
        } = self.style;
        draw_label(frame, x, y, &self.text, scale, color, background);
        Ok(StageOutput::InPlace)
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(
        "text",
        "Static text label",
        &label_schema(&[OptionField::required("text", OptionKind::Text)]),
        |options| Ok(Box::new(TextPlugin::from_options(options)?)),
    )
}
