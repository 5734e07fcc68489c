// SPDX-License-Identifier: GPL-3.0-only

//! System CPU usage label

use super::{LabelStyle, label_schema, update_interval};
use crate::constants::overlay::DEFAULT_CPU_INTERVAL_SECS;
use crate::errors::PluginError;
use crate::media::Frame;
use crate::plugins::draw::{Rgba, draw_label};
use crate::plugins::options::{OptionField, OptionKind};
use crate::plugins::{ApplyContext, Plugin, PluginDescriptor, PluginOptions, StageOutput};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::System;

struct CpuState {
    system: System,
    label: String,
    last_check: Option<Instant>,
}

pub struct CpuPlugin {
    interval: Duration,
    style: LabelStyle,
    state: Mutex<CpuState>,
}

impl CpuPlugin {
    pub fn from_options(options: &PluginOptions) -> Result<Self, PluginError> {
        let interval = update_interval(options, DEFAULT_CPU_INTERVAL_SECS)?;

        let defaults = LabelStyle::at(40, 35).with_color(Rgba::GREEN);
        Ok(Self {
            interval,
            style: LabelStyle::from_options(options, defaults)?,
            state: Mutex::new(CpuState {
                system: System::new(),
                label: "CPU: 0%".to_string(),
                last_check: None,
            }),
        })
    }

    /// Current label, refreshing the reading once per interval
    fn label(&self) -> Result<String, PluginError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PluginError::render("cpu state poisoned"))?;
        let due = state
            .last_check
            .is_none_or(|last| last.elapsed() >= self.interval);
        if due {
            state.system.refresh_cpu_usage();
            let usage = state.system.global_cpu_usage();
            state.label = format!("CPU: {}%", usage.round() as u32);
            state.last_check = Some(Instant::now());
        }
        Ok(state.label.clone())
    }
}

impl Plugin for CpuPlugin {
    fn apply(
        &self,
        frame: &mut Frame,
        _ctx: &ApplyContext<'_>,
    ) -> Result<StageOutput, PluginError> {
        let label = self.label()?;
        let style = self.style;
        draw_label(frame, style.x, style.y, &label, style.scale, style.color, style.background);
        Ok(StageOutput::InPlace)
    }

    fn is_stateful(&self) -> bool {
        true
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(
        "cpu",
        "System CPU usage",
        &label_schema(&[OptionField::optional("update_interval", OptionKind::Float)]),
        |options| Ok(Box::new(CpuPlugin::from_options(options)?)),
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{black, ctx, lit, pool};
    use super::*;

    #[test]
    fn test_label_format() {
        let plugin = CpuPlugin::from_options(&PluginOptions::new()).unwrap();
        let label = plugin.label().unwrap();
        assert!(label.starts_with("CPU: ") && label.ends_with('%'), "{label}");
        assert_eq!(plugin.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_draws() {
        let options = PluginOptions::new().with("update_interval", 0.5);
        let plugin = CpuPlugin::from_options(&options).unwrap();
        let pool = pool();
        let mut frame = black(320, 80);
        plugin.apply(&mut frame, &ctx(&options, &pool)).unwrap();
        assert!(lit(&frame) > 0);
    }

    #[test]
    fn test_negative_interval_rejected() {
        let options = PluginOptions::new().with("update_interval", -1i64);
        assert!(CpuPlugin::from_options(&options).is_err());
    }

    #[test]
    fn test_huge_interval_rejected() {
        let options = PluginOptions::new().with("update_interval", 1e30);
        let err = CpuPlugin::from_options(&options).err().unwrap();
        assert!(matches!(
            err,
            PluginError::InvalidOption { ref field, .. } if field == "update_interval"
        ));
    }
}
