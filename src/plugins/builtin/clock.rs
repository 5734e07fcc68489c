// SPDX-License-Identifier: GPL-3.0-only

//! Real-time clock overlay

use super::{LabelStyle, label_schema};
use crate::constants::overlay::DEFAULT_CLOCK_FORMAT;
use crate::errors::PluginError;
use crate::media::Frame;
use crate::plugins::draw::{Rgba, draw_label};
use crate::plugins::options::{OptionField, OptionKind};
use crate::plugins::{ApplyContext, Plugin, PluginDescriptor, PluginOptions, StageOutput};
use chrono::format::{Item, StrftimeItems};
use chrono::{Local, Utc};
use std::fmt::Write;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
    Local,
    Utc,
}

impl Timezone {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Some(Timezone::Local),
            "utc" => Some(Timezone::Utc),
            _ => None,
        }
    }
}

pub struct ClockPlugin {
    format: String,
    timezone: Timezone,
    style: LabelStyle,
    /// Last rendered (unix second, text); the label only changes once a second
    cache: Mutex<Option<(i64, String)>>,
}

impl ClockPlugin {
    pub fn from_options(options: &PluginOptions) -> Result<Self, PluginError> {
        let format = options
            .text("format")?
            .unwrap_or(DEFAULT_CLOCK_FORMAT)
            .to_string();
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(PluginError::invalid("format", format!("bad strftime pattern '{format}'")));
        }

        let timezone = match options.text("timezone")? {
            None => Timezone::Local,
            Some(tz) => Timezone::parse(tz).ok_or_else(|| {
                PluginError::invalid("timezone", format!("'{tz}' is not local or utc"))
            })?,
        };

        let defaults = LabelStyle::at(1080, 20).with_background(Rgba::SHADE);
        Ok(Self {
            format,
            timezone,
            style: LabelStyle::from_options(options, defaults)?,
            cache: Mutex::new(None),
        })
    }

    fn render_now(&self) -> Result<(i64, String), PluginError> {
        let mut text = String::new();
        let second = match self.timezone {
            Timezone::Local => {
                let now = Local::now();
                write!(text, "{}", now.format(&self.format))
                    .map_err(|_| PluginError::render("clock format failed"))?;
                now.timestamp()
            }
            Timezone::Utc => {
                let now = Utc::now();
                write!(text, "{}", now.format(&self.format))
                    .map_err(|_| PluginError::render("clock format failed"))?;
                now.timestamp()
            }
        };
        Ok((second, text))
    }
}

impl Plugin for ClockPlugin {
    fn apply(
        &self,
        frame: &mut Frame,
        _ctx: &ApplyContext<'_>,
    ) -> Result<StageOutput, PluginError> {
        let second = Utc::now().timestamp();
        let text = {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| PluginError::render("clock state poisoned"))?;
            let hit = cache
                .as_ref()
                .filter(|(cached, _)| *cached == second)
                .map(|(_, text)| text.clone());
            match hit {
                Some(text) => text,
                None => {
                    let (second, text) = self.render_now()?;
                    *cache = Some((second, text.clone()));
                    text
                }
            }
        };

        let style = self.style;
        draw_label(frame, style.x, style.y, &text, style.scale, style.color, style.background);
        Ok(StageOutput::InPlace)
    }

    fn is_stateful(&self) -> bool {
        true
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(
        "clock",
        "Current time, strftime formatted",
        &label_schema(&[
            OptionField::optional("format", OptionKind::Text),
            OptionField::optional("timezone", OptionKind::Text),
        ]),
        |options| Ok(Box::new(ClockPlugin::from_options(options)?)),
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{black, ctx, lit, pool};
    use super::*;

    #[test]
    fn test_defaults() {
        let plugin = ClockPlugin::from_options(&PluginOptions::new()).unwrap();
        assert_eq!(plugin.format, DEFAULT_CLOCK_FORMAT);
        assert_eq!(plugin.timezone, Timezone::Local);
        assert!(plugin.is_stateful());
    }

    #[test]
    fn test_rejects_bad_options() {
        let bad_format = PluginOptions::new().with("format", "%Q %");
        assert!(ClockPlugin::from_options(&bad_format).is_err());
        let bad_tz = PluginOptions::new().with("timezone", "Mars/Olympus");
        assert!(ClockPlugin::from_options(&bad_tz).is_err());
    }

    #[test]
    fn test_draws_utc_time() {
        let options = PluginOptions::new()
            .with("timezone", "UTC")
            .with("x", 4i64)
            .with("y", 4i64)
            .with("scale", 1i64);
        let plugin = ClockPlugin::from_options(&options).unwrap();
        let pool = pool();
        let mut frame = black(200, 40);
        plugin.apply(&mut frame, &ctx(&options, &pool)).unwrap();
        assert!(lit(&frame) > 0);

        let (_, text) = plugin.render_now().unwrap();
        assert_eq!(text.len(), "00:00:00".len());
    }
}
