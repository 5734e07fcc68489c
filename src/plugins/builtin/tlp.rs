// SPDX-License-Identifier: GPL-3.0-only

//! Traffic Light Protocol classification badge
//!
//! Draws `TLP:<LEVEL>` in the level's colour on a black box. Unknown levels
//! fall back to CLEAR, the most permissive marking.

use crate::constants::overlay::DEFAULT_TEXT_SCALE;
use crate::errors::PluginError;
use crate::media::Frame;
use crate::plugins::draw::{Rgba, draw_text, fill_rect, text_size};
use crate::plugins::options::{OptionField, OptionKind};
use crate::plugins::{ApplyContext, Plugin, PluginDescriptor, PluginOptions, StageOutput};
use tracing::warn;

const SCHEMA: [OptionField; 5] = [
    OptionField::optional("level", OptionKind::Text),
    OptionField::optional("x", OptionKind::Integer),
    OptionField::optional("y", OptionKind::Integer),
    OptionField::optional("scale", OptionKind::Integer),
    OptionField::optional("padding", OptionKind::Integer),
];

const DEFAULT_PADDING: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlpLevel {
    Red,
    Amber,
    Green,
    #[default]
    Clear,
}

impl TlpLevel {
    pub const ALL: [TlpLevel; 4] = [
        TlpLevel::Red,
        TlpLevel::Amber,
        TlpLevel::Green,
        TlpLevel::Clear,
    ];

    /// Case-insensitive parse; anything unrecognised is CLEAR
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "RED" => TlpLevel::Red,
            "AMBER" => TlpLevel::Amber,
            "GREEN" => TlpLevel::Green,
            "CLEAR" => TlpLevel::Clear,
            other => {
                warn!(level = other, "Unknown TLP level, using CLEAR");
                TlpLevel::Clear
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TlpLevel::Red => "RED",
            TlpLevel::Amber => "AMBER",
            TlpLevel::Green => "GREEN",
            TlpLevel::Clear => "CLEAR",
        }
    }

    /// Text colour; every level is drawn on black
    pub fn color(&self) -> Rgba {
        match self {
            TlpLevel::Red => Rgba([255, 43, 43, 255]),
            TlpLevel::Amber => Rgba([255, 192, 0, 255]),
            TlpLevel::Green => Rgba([51, 255, 0, 255]),
            TlpLevel::Clear => Rgba::WHITE,
        }
    }
}

pub struct TlpPlugin {
    level: TlpLevel,
    text: String,
    x: i64,
    y: i64,
    scale: u32,
    padding: u32,
}

impl TlpPlugin {
    pub fn from_options(options: &PluginOptions) -> Result<Self, PluginError> {
        let level = options.text("level")?.map(TlpLevel::parse).unwrap_or_default();
        Ok(Self {
            level,
            text: format!("TLP:{}", level.label()),
            x: options.integer("x")?.unwrap_or(20),
            y: options.integer("y")?.unwrap_or(20),
            scale: options.unsigned("scale")?.unwrap_or(DEFAULT_TEXT_SCALE).max(1),
            padding: options.unsigned("padding")?.unwrap_or(DEFAULT_PADDING),
        })
    }

    pub fn level(&self) -> TlpLevel {
        self.level
    }
}

impl Plugin for TlpPlugin {
    fn apply(
        &self,
        frame: &mut Frame,
        _ctx: &ApplyContext<'_>,
    ) -> Result<StageOutput, PluginError> {
        let (w, h) = text_size(&self.text, self.scale);
        let pad = self.padding as i64;
        fill_rect(
            frame,
            self.x - pad,
            self.y - pad,
            w + 2 * self.padding,
            h + 2 * self.padding,
            Rgba::BLACK,
        );
        draw_text(frame, self.x, self.y, &self.text, self.scale, self.level.color());
        Ok(StageOutput::InPlace)
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new("tlp", "Traffic Light Protocol badge", &SCHEMA, |options| {
        Ok(Box::new(TlpPlugin::from_options(options)?))
    })
}
