// SPDX-License-Identifier: GPL-3.0-only

//! Whole-frame colour filters
//!
//! Per-pixel filters run in place. Chromatic aberration and pencil sample
//! neighbouring pixels, so they read the input frame and write a fresh one
//! drawn from the pool (`StageOutput::Replaced`).

use crate::errors::PluginError;
use crate::media::Frame;
use crate::plugins::options::{OptionField, OptionKind};
use crate::plugins::{ApplyContext, Plugin, PluginDescriptor, PluginOptions, StageOutput};

const SCHEMA: [OptionField; 1] = [OptionField::required("mode", OptionKind::Text)];

/// Available filter modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Black & white / monochrome
    Mono,
    /// Warm brownish tint
    Sepia,
    /// High contrast black & white
    Noir,
    /// Boosted saturation and contrast
    Vivid,
    /// Blue colour temperature shift
    Cool,
    /// Orange/amber colour temperature
    Warm,
    /// Lifted blacks with muted colours
    Fade,
    /// Two-colour gradient mapping
    Duotone,
    /// Darkened edges
    Vignette,
    /// Inverted colours
    Negative,
    /// Reduced colour levels (pop-art)
    Posterize,
    /// Partially inverted tones
    Solarize,
    /// RGB channel split
    ChromaticAberration,
    /// Pencil sketch drawing
    Pencil,
}

impl FilterMode {
    pub const ALL: [FilterMode; 14] = [
        FilterMode::Mono,
        FilterMode::Sepia,
        FilterMode::Noir,
        FilterMode::Vivid,
        FilterMode::Cool,
        FilterMode::Warm,
        FilterMode::Fade,
        FilterMode::Duotone,
        FilterMode::Vignette,
        FilterMode::Negative,
        FilterMode::Posterize,
        FilterMode::Solarize,
        FilterMode::ChromaticAberration,
        FilterMode::Pencil,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterMode::Mono => "mono",
            FilterMode::Sepia => "sepia",
            FilterMode::Noir => "noir",
            FilterMode::Vivid => "vivid",
            FilterMode::Cool => "cool",
            FilterMode::Warm => "warm",
            FilterMode::Fade => "fade",
            FilterMode::Duotone => "duotone",
            FilterMode::Vignette => "vignette",
            FilterMode::Negative => "negative",
            FilterMode::Posterize => "posterize",
            FilterMode::Solarize => "solarize",
            FilterMode::ChromaticAberration => "chromatic_aberration",
            FilterMode::Pencil => "pencil",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|mode| mode.name() == value)
    }

    /// Whether the filter needs neighbouring pixels
    fn samples_neighbours(&self) -> bool {
        matches!(self, FilterMode::ChromaticAberration | FilterMode::Pencil)
    }
}

pub struct FilterPlugin {
    mode: FilterMode,
}

impl FilterPlugin {
    pub fn new(mode: FilterMode) -> Self {
        Self { mode }
    }

    pub fn from_options(options: &PluginOptions) -> Result<Self, PluginError> {
        let mode = options.required_text("mode")?;
        FilterMode::parse(mode)
            .map(Self::new)
            .ok_or_else(|| PluginError::invalid("mode", format!("unknown filter '{mode}'")))
    }
}

impl Plugin for FilterPlugin {
    fn apply(&self, frame: &mut Frame, ctx: &ApplyContext<'_>) -> Result<StageOutput, PluginError> {
        if self.mode.samples_neighbours() {
            let mut output = ctx.acquire_like(frame)?;
            match self.mode {
                FilterMode::Pencil => apply_pencil(frame, &mut output),
                _ => apply_chromatic_aberration(frame, &mut output),
            }
            return Ok(StageOutput::Replaced(output));
        }

        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let [ri, gi, bi, _] = frame.pixel_format().channel_offsets();
        for (idx, px) in frame.data_mut().chunks_exact_mut(4).enumerate() {
            let mut r = px[ri] as f32 / 255.0;
            let mut g = px[gi] as f32 / 255.0;
            let mut b = px[bi] as f32 / 255.0;
            apply_filter_rgb(
                &mut r,
                &mut g,
                &mut b,
                self.mode,
                idx % width,
                idx / width,
                width,
                height,
            );
            px[ri] = to_byte(r);
            px[gi] = to_byte(g);
            px[bi] = to_byte(b);
        }
        Ok(StageOutput::InPlace)
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new("filter", "Whole-frame colour filter", &SCHEMA, |options| {
        Ok(Box::new(FilterPlugin::from_options(options)?))
    })
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Normalised RGB of a pixel, coordinates clamped to the frame
fn sample(frame: &Frame, x: isize, y: isize) -> (f32, f32, f32) {
    let x = x.clamp(0, frame.width() as isize - 1) as u32;
    let y = y.clamp(0, frame.height() as isize - 1) as u32;
    let [r, g, b, _] = frame.pixel(x, y).unwrap_or([0, 0, 0, 255]);
    (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
}

fn write(output: &mut Frame, x: usize, y: usize, rgb: (f32, f32, f32), alpha: u8) {
    let [ri, gi, bi, ai] = output.pixel_format().channel_offsets();
    let idx = y * output.format().stride() + x * 4;
    let px = &mut output.data_mut()[idx..idx + 4];
    px[ri] = to_byte(rgb.0);
    px[gi] = to_byte(rgb.1);
    px[bi] = to_byte(rgb.2);
    px[ai] = alpha;
}

fn alpha_at(frame: &Frame, x: usize, y: usize) -> u8 {
    frame
        .pixel(x as u32, y as u32)
        .map(|px| px[3])
        .unwrap_or(255)
}

/// Sobel edge detection on luminance, dark lines on paper
fn apply_pencil(input: &Frame, output: &mut Frame) {
    let width = input.width() as usize;
    let height = input.height() as usize;

    let lum = |x: isize, y: isize| -> f32 {
        let (r, g, b) = sample(input, x, y);
        luminance(r, g, b)
    };
    // Pseudo-random noise for paper texture
    let hash = |x: usize, y: usize| -> f32 {
        let p = (x as f32 * 127.1 + y as f32 * 311.7) * 0.01;
        (p.sin() * 43758.5453).fract().abs()
    };

    for py in 0..height {
        for px in 0..width {
            let x = px as isize;
            let y = py as isize;

            let tl = lum(x - 1, y - 1);
            let tm = lum(x, y - 1);
            let tr = lum(x + 1, y - 1);
            let ml = lum(x - 1, y);
            let mr = lum(x + 1, y);
            let bl = lum(x - 1, y + 1);
            let bm = lum(x, y + 1);
            let br = lum(x + 1, y + 1);

            let gx = -tl - 2.0 * ml - bl + tr + 2.0 * mr + br;
            let gy = -tl - 2.0 * tm - tr + bl + 2.0 * bm + br;
            let edge = (gx * gx + gy * gy).sqrt();

            let pencil = 1.0 - edge * 2.0;
            let paper = 0.95 + hash(px, py) * 0.05;
            let value = (pencil * paper).clamp(0.0, 1.0);
            write(output, px, py, (value, value, value), alpha_at(input, px, py));
        }
    }
}

/// Red sampled to the right, blue to the left, green in place
fn apply_chromatic_aberration(input: &Frame, output: &mut Frame) {
    let width = input.width() as usize;
    let height = input.height() as usize;
    // 0.4% of the width
    let offset = (width as f32 * 0.004).max(1.0) as isize;

    for py in 0..height {
        for px in 0..width {
            let x = px as isize;
            let y = py as isize;
            let (_, g, _) = sample(input, x, y);
            let (r, _, _) = sample(input, x + offset, y);
            let (_, _, b) = sample(input, x - offset, y);
            write(output, px, py, (r, g, b), alpha_at(input, px, py));
        }
    }
}

/// Apply a per-pixel filter to normalised RGB values in place
#[inline]
#[allow(clippy::too_many_arguments)]
fn apply_filter_rgb(
    r: &mut f32,
    g: &mut f32,
    b: &mut f32,
    mode: FilterMode,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) {
    match mode {
        FilterMode::Mono => {
            let gray = luminance(*r, *g, *b);
            *r = gray;
            *g = gray;
            *b = gray;
        }

        FilterMode::Sepia => {
            let lum = luminance(*r, *g, *b);
            *r = (lum * 1.2 + 0.1).clamp(0.0, 1.0);
            *g = (lum * 0.9 + 0.05).clamp(0.0, 1.0);
            *b = (lum * 0.7).clamp(0.0, 1.0);
        }

        FilterMode::Noir => {
            let lum = luminance(*r, *g, *b);
            let adjusted = ((lum - 0.5) * 2.0 + 0.5).clamp(0.0, 1.0);
            *r = adjusted;
            *g = adjusted;
            *b = adjusted;
        }

        FilterMode::Vivid => {
            let lum = luminance(*r, *g, *b);
            for c in [&mut *r, &mut *g, &mut *b] {
                *c = (lum + (*c - lum) * 1.4).clamp(0.0, 1.0);
                *c = ((*c - 0.5) * 1.15 + 0.5).clamp(0.0, 1.0);
            }
        }

        FilterMode::Cool => {
            *r = (*r * 0.9).clamp(0.0, 1.0);
            *g = (*g * 0.95).clamp(0.0, 1.0);
            *b = (*b * 1.1).clamp(0.0, 1.0);
        }

        FilterMode::Warm => {
            *r = (*r * 1.1).clamp(0.0, 1.0);
            *b = (*b * 0.85).clamp(0.0, 1.0);
        }

        FilterMode::Fade => {
            for c in [&mut *r, &mut *g, &mut *b] {
                *c = (*c * 0.85 + 0.1).clamp(0.0, 1.0);
            }
            let lum = luminance(*r, *g, *b);
            for c in [&mut *r, &mut *g, &mut *b] {
                *c = (lum + (*c - lum) * 0.7).clamp(0.0, 1.0);
            }
        }

        FilterMode::Duotone => {
            let lum = luminance(*r, *g, *b);
            let dark = (0.1, 0.1, 0.4);
            let light = (1.0, 0.9, 0.5);
            *r = dark.0 + lum * (light.0 - dark.0);
            *g = dark.1 + lum * (light.1 - dark.1);
            *b = dark.2 + lum * (light.2 - dark.2);
        }

        FilterMode::Vignette => {
            let dx = x as f32 / width as f32 - 0.5;
            let dy = y as f32 / height as f32 - 0.5;
            let dist = (dx * dx + dy * dy).sqrt();
            let vignette = 1.0 - smoothstep(0.3, 0.9, dist);
            *r *= vignette;
            *g *= vignette;
            *b *= vignette;
        }

        FilterMode::Negative => {
            *r = 1.0 - *r;
            *g = 1.0 - *g;
            *b = 1.0 - *b;
        }

        FilterMode::Posterize => {
            let levels = 4.0;
            for c in [&mut *r, &mut *g, &mut *b] {
                *c = (*c * levels).floor() / levels;
            }
        }

        FilterMode::Solarize => {
            for c in [&mut *r, &mut *g, &mut *b] {
                if *c > 0.5 {
                    *c = 1.0 - *c;
                }
            }
        }

        // Neighbourhood filters never reach the per-pixel path
        FilterMode::ChromaticAberration | FilterMode::Pencil => {}
    }
}

#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
