// SPDX-License-Identifier: GPL-3.0-only

//! `tail -f` style text box
//!
//! Shows the last (or, with `following: false`, the first) N lines of a
//! text file. The file is re-checked every `update_interval` seconds and
//! re-read only when its size or modification time changed. Lines wider
//! than the box are wrapped (`breakline`) or truncated with `...`.

use super::{LabelStyle, label_schema, update_interval};
use crate::constants::overlay::{DEFAULT_TAIL_LINES, GLYPH_SIZE, TEXT_PADDING};
use crate::errors::PluginError;
use crate::media::Frame;
use crate::plugins::draw::{Rgba, draw_text, fill_rect};
use crate::plugins::options::{OptionField, OptionKind};
use crate::plugins::{ApplyContext, Plugin, PluginDescriptor, PluginOptions, StageOutput};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;

const DEFAULT_UPDATE_SECS: f64 = 1.0;

#[derive(Default)]
struct TailState {
    lines: Vec<String>,
    last_check: Option<Instant>,
    /// (size, mtime) of the file when it was last read
    stamp: Option<(u64, Option<SystemTime>)>,
}

pub struct TailPlugin {
    path: PathBuf,
    lines: usize,
    following: bool,
    breakline: bool,
    interval: Duration,
    width: Option<u32>,
    height: Option<u32>,
    style: LabelStyle,
    state: Mutex<TailState>,
}

impl TailPlugin {
    pub fn from_options(options: &PluginOptions) -> Result<Self, PluginError> {
        let interval = update_interval(options, DEFAULT_UPDATE_SECS)?;
        let lines = options
            .unsigned("lines")?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_TAIL_LINES);
        if lines == 0 {
            return Err(PluginError::invalid("lines", "must be at least 1"));
        }

        let defaults = LabelStyle::at(20, 400)
            .with_scale(1)
            .with_background(Rgba([0, 0, 0, 180]));
        Ok(Self {
            path: PathBuf::from(options.required_text("file")?),
            lines,
            following: options.boolean("following")?.unwrap_or(true),
            breakline: options.boolean("breakline")?.unwrap_or(false),
            interval,
            width: options.unsigned("width")?,
            height: options.unsigned("height")?,
            style: LabelStyle::from_options(options, defaults)?,
            state: Mutex::new(TailState::default()),
        })
    }

    fn read_lines(&self) -> Vec<String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return vec![format!("[file not found: {}]", self.path.display())];
            }
            Err(e) => return vec![format!("[read error: {e}]")],
        };
        let all: Vec<&str> = content.lines().collect();
        let picked = if self.following {
            &all[all.len().saturating_sub(self.lines)..]
        } else {
            &all[..all.len().min(self.lines)]
        };
        picked.iter().map(|line| line.trim_end().to_string()).collect()
    }

    /// Current lines, re-reading the file when it changed
    fn current_lines(&self) -> Result<Vec<String>, PluginError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PluginError::render("tail state poisoned"))?;
        let due = state
            .last_check
            .is_none_or(|last| last.elapsed() >= self.interval);
        if due {
            state.last_check = Some(Instant::now());
            let stamp = fs::metadata(&self.path)
                .ok()
                .map(|meta| (meta.len(), meta.modified().ok()));
            if state.stamp != stamp || stamp.is_none() {
                debug!(path = %self.path.display(), "Re-reading tail file");
                state.lines = self.read_lines();
                state.stamp = stamp;
            }
        }
        Ok(state.lines.clone())
    }

    /// Characters that fit on one line of the box
    fn columns(&self) -> Option<usize> {
        let cell = GLYPH_SIZE * self.style.scale;
        self.width
            .map(|w| (w.saturating_sub(2 * TEXT_PADDING) / cell).max(1) as usize)
    }

    fn layout(&self, lines: &[String]) -> Vec<String> {
        let Some(columns) = self.columns() else {
            return lines.to_vec();
        };
        let mut out = Vec::with_capacity(lines.len());
        for line in lines {
            let chars: Vec<char> = line.chars().collect();
            if chars.len() <= columns {
                out.push(line.clone());
            } else if self.breakline {
                out.extend(chars.chunks(columns).map(|chunk| chunk.iter().collect::<String>()));
            } else {
                let keep = columns.saturating_sub(3);
                let mut truncated: String = chars[..keep].iter().collect();
                truncated.push_str("...");
                out.push(truncated);
            }
        }
        out
    }
}

impl Plugin for TailPlugin {
    fn apply(
        &self,
        frame: &mut Frame,
        _ctx: &ApplyContext<'_>,
    ) -> Result<StageOutput, PluginError> {
        let lines = self.layout(&self.current_lines()?);
        let style = self.style;
        let line_height = GLYPH_SIZE * style.scale + 2;
        let columns = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u32;

        let box_w = self
            .width
            .unwrap_or(columns * GLYPH_SIZE * style.scale + 2 * TEXT_PADDING);
        let box_h = self
            .height
            .unwrap_or(lines.len() as u32 * line_height + 2 * TEXT_PADDING);
        if let Some(background) = style.background {
            fill_rect(frame, style.x, style.y, box_w, box_h, background);
        }

        let max_rows = (box_h.saturating_sub(TEXT_PADDING) / line_height) as usize;
        for (row, line) in lines.iter().take(max_rows).enumerate() {
            let y = style.y + TEXT_PADDING as i64 + (row as u32 * line_height) as i64;
            draw_text(frame, style.x + TEXT_PADDING as i64, y, line, style.scale, style.color);
        }
        Ok(StageOutput::InPlace)
    }

    fn is_stateful(&self) -> bool {
        true
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(
        "tail",
        "Last lines of a text file",
        &label_schema(&[
            OptionField::required("file", OptionKind::Text),
            OptionField::optional("lines", OptionKind::Integer),
            OptionField::optional("following", OptionKind::Bool),
            OptionField::optional("breakline", OptionKind::Bool),
            OptionField::optional("update_interval", OptionKind::Float),
            OptionField::optional("width", OptionKind::Integer),
            OptionField::optional("height", OptionKind::Integer),
        ]),
        |options| Ok(Box::new(TailPlugin::from_options(options)?)),
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{black, ctx, lit, pool};
    use super::*;
    use std::io::Write;

    fn write_log(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn options_for(file: &tempfile::NamedTempFile) -> PluginOptions {
        PluginOptions::new()
            .with("file", file.path().to_string_lossy().as_ref())
            .with("lines", 2i64)
            .with("update_interval", 0i64)
    }

    #[test]
    fn test_following_keeps_last_lines() {
        let file = write_log(&["one", "two", "three"]);
        let plugin = TailPlugin::from_options(&options_for(&file)).unwrap();
        assert_eq!(plugin.current_lines().unwrap(), vec!["two", "three"]);

        let head = TailPlugin::from_options(&options_for(&file).with("following", false)).unwrap();
        assert_eq!(head.current_lines().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn test_rereads_on_change() {
        let mut file = write_log(&["a", "b"]);
        let plugin = TailPlugin::from_options(&options_for(&file)).unwrap();
        assert_eq!(plugin.current_lines().unwrap(), vec!["a", "b"]);

        writeln!(file, "c").unwrap();
        file.flush().unwrap();
        assert_eq!(plugin.current_lines().unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn test_missing_file_is_shown() {
        let options = PluginOptions::new().with("file", "/nonexistent/overlaycam.log");
        let plugin = TailPlugin::from_options(&options).unwrap();
        let lines = plugin.current_lines().unwrap();
        assert!(lines[0].starts_with("[file not found"));
    }

    #[test]
    fn test_truncate_and_wrap() {
        let file = write_log(&["abcdefghijklmnop"]);
        // 8px glyphs, 10px padding: 106px wide box fits 12 columns
        let options = options_for(&file).with("width", 106i64);
        let truncating = TailPlugin::from_options(&options).unwrap();
        let lines = truncating.layout(&truncating.current_lines().unwrap());
        assert_eq!(lines, vec!["abcdefghi..."]);

        let wrapping = TailPlugin::from_options(
            &options_for(&file).with("width", 106i64).with("breakline", true),
        )
        .unwrap();
        let lines = wrapping.layout(&wrapping.current_lines().unwrap());
        assert_eq!(lines, vec!["abcdefghijkl", "mnop"]);
    }

    #[test]
    fn test_draws_box() {
        let file = write_log(&["hello"]);
        let options = options_for(&file).with("x", 0i64).with("y", 0i64);
        let plugin = TailPlugin::from_options(&options).unwrap();
        let pool = pool();
        let mut frame = black(200, 100);
        plugin.apply(&mut frame, &ctx(&options, &pool)).unwrap();
        assert!(lit(&frame) > 0);
    }
}
