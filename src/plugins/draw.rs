// SPDX-License-Identifier: GPL-3.0-only

//! CPU drawing primitives shared by the built-in overlays
//!
//! Everything here draws straight-alpha colour onto a [`Frame`] in place,
//! honouring the frame's byte order and clipping to its bounds. Nothing
//! ever changes the frame's size or pixel format.

use crate::constants::overlay::{GLYPH_SIZE, TEXT_PADDING};
use crate::media::Frame;
use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::RgbaImage;

/// Straight-alpha RGBA colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
    /// Label background used by the clock overlay
    pub const SHADE: Rgba = Rgba([0, 0, 0, 100]);
    pub const GREEN: Rgba = Rgba([0, 255, 0, 200]);

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }

    /// Same colour with its alpha scaled by `factor` (0..1)
    pub fn scaled_alpha(self, factor: f32) -> Rgba {
        let [r, g, b, a] = self.0;
        Rgba([r, g, b, (a as f32 * factor.clamp(0.0, 1.0)).round() as u8])
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (the leading `#` is optional)
    pub fn parse_hex(text: &str) -> Option<Rgba> {
        let hex = text.trim().trim_start_matches('#');
        if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
        Some(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
    }
}

/// Blend one straight-alpha colour over a destination pixel
#[inline]
fn blend_into(px: &mut [u8], offsets: [usize; 4], color: [u8; 4]) {
    let src_a = color[3] as u32;
    if src_a == 0 {
        return;
    }
    if src_a == 255 {
        for (channel, offset) in offsets.iter().enumerate() {
            px[*offset] = color[channel];
        }
        return;
    }
    let inv = 255 - src_a;
    for channel in 0..3 {
        let dst = px[offsets[channel]] as u32;
        px[offsets[channel]] = ((color[channel] as u32 * src_a + dst * inv + 127) / 255) as u8;
    }
    let dst_a = px[offsets[3]] as u32;
    px[offsets[3]] = (src_a + (dst_a * inv + 127) / 255).min(255) as u8;
}

/// Fill a rectangle, clipped to the frame
pub fn fill_rect(frame: &mut Frame, x: i64, y: i64, width: u32, height: u32, color: Rgba) {
    let frame_w = frame.width() as i64;
    let frame_h = frame.height() as i64;
    let x0 = x.clamp(0, frame_w);
    let y0 = y.clamp(0, frame_h);
    let x1 = (x + width as i64).clamp(0, frame_w);
    let y1 = (y + height as i64).clamp(0, frame_h);
    if x0 >= x1 || y0 >= y1 || color.alpha() == 0 {
        return;
    }

    let offsets = frame.pixel_format().channel_offsets();
    let stride = frame.format().stride();
    let data = frame.data_mut();
    for row in y0..y1 {
        let start = row as usize * stride + x0 as usize * 4;
        let end = row as usize * stride + x1 as usize * 4;
        for px in data[start..end].chunks_exact_mut(4) {
            blend_into(px, offsets, color.0);
        }
    }
}

fn glyph(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Pixel size of `text` at an integer scale (multi-line aware)
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let scale = scale.max(1);
    let lines = text.lines().count().max(1) as u32;
    let columns = text
        .lines()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0) as u32;
    (columns * GLYPH_SIZE * scale, lines * GLYPH_SIZE * scale)
}

/// Draw text with the embedded 8x8 font; `\n` starts a new line
pub fn draw_text(frame: &mut Frame, x: i64, y: i64, text: &str, scale: u32, color: Rgba) {
    let scale = scale.max(1);
    let cell = (GLYPH_SIZE * scale) as i64;

    for (line_idx, line) in text.lines().enumerate() {
        let top = y + line_idx as i64 * cell;
        for (col, c) in line.chars().enumerate() {
            if c == ' ' {
                continue;
            }
            let left = x + col as i64 * cell;
            for (row, bits) in glyph(c).iter().enumerate() {
                for bit in 0..GLYPH_SIZE {
                    if bits & (1 << bit) != 0 {
                        fill_rect(
                            frame,
                            left + (bit * scale) as i64,
                            top + (row as u32 * scale) as i64,
                            scale,
                            scale,
                            color,
                        );
                    }
                }
            }
        }
    }
}

/// Text on an optional padded background box
pub fn draw_label(
    frame: &mut Frame,
    x: i64,
    y: i64,
    text: &str,
    scale: u32,
    color: Rgba,
    background: Option<Rgba>,
) {
    if let Some(background) = background {
        let (w, h) = text_size(text, scale);
        let pad = TEXT_PADDING as i64;
        fill_rect(
            frame,
            x - pad,
            y - pad,
            w + 2 * TEXT_PADDING,
            h + 2 * TEXT_PADDING,
            background,
        );
    }
    draw_text(frame, x, y, text, scale, color);
}

/// Composite an RGBA image at (x, y) with an extra opacity factor
pub fn blit_image(frame: &mut Frame, image: &RgbaImage, x: i64, y: i64, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity == 0.0 {
        return;
    }
    let frame_w = frame.width() as i64;
    let frame_h = frame.height() as i64;
    let offsets = frame.pixel_format().channel_offsets();
    let stride = frame.format().stride();
    let data = frame.data_mut();

    for (ix, iy, px) in image.enumerate_pixels() {
        let fx = x + ix as i64;
        let fy = y + iy as i64;
        if fx < 0 || fy < 0 || fx >= frame_w || fy >= frame_h {
            continue;
        }
        let [r, g, b, a] = px.0;
        let a = (a as f32 * opacity).round() as u8;
        let idx = fy as usize * stride + fx as usize * 4;
        blend_into(&mut data[idx..idx + 4], offsets, [r, g, b, a]);
    }
}
