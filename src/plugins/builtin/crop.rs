// SPDX-License-Identifier: GPL-3.0-only

//! Centre crop scaled back up to the frame size (digital zoom)

use crate::errors::PluginError;
use crate::media::Frame;
use crate::plugins::options::{OptionField, OptionKind};
use crate::plugins::{ApplyContext, Plugin, PluginDescriptor, PluginOptions, StageOutput};

const SCHEMA: [OptionField; 3] = [
    OptionField::required("zoom", OptionKind::Float),
    OptionField::optional("center_x", OptionKind::Float),
    OptionField::optional("center_y", OptionKind::Float),
];

pub struct CropPlugin {
    zoom: f64,
    center: (f64, f64),
}

impl CropPlugin {
    pub fn from_options(options: &PluginOptions) -> Result<Self, PluginError> {
        let zoom = options.float("zoom")?.unwrap_or(1.0);
        if !zoom.is_finite() || zoom < 1.0 {
            return Err(PluginError::invalid("zoom", "must be at least 1.0"));
        }
        let unit = |key: &str| -> Result<f64, PluginError> {
            let value = options.float(key)?.unwrap_or(0.5);
            if (0.0..=1.0).contains(&value) {
                Ok(value)
            } else {
                Err(PluginError::invalid(key, "must be within 0..1"))
            }
        };
        Ok(Self {
            zoom,
            center: (unit("center_x")?, unit("center_y")?),
        })
    }

    /// Source rectangle (x, y, width, height) for a frame of the given size
    fn source_rect(&self, width: u32, height: u32) -> (f64, f64, f64, f64) {
        let crop_w = width as f64 / self.zoom;
        let crop_h = height as f64 / self.zoom;
        let x = (self.center.0 * width as f64 - crop_w / 2.0).clamp(0.0, width as f64 - crop_w);
        let y = (self.center.1 * height as f64 - crop_h / 2.0).clamp(0.0, height as f64 - crop_h);
        (x, y, crop_w, crop_h)
    }
}

impl Plugin for CropPlugin {
    fn apply(&self, frame: &mut Frame, ctx: &ApplyContext<'_>) -> Result<StageOutput, PluginError> {
        if self.zoom == 1.0 {
            return Ok(StageOutput::InPlace);
        }

        let mut output = ctx.acquire_like(frame)?;
        let width = frame.width();
        let height = frame.height();
        let stride = frame.format().stride();
        let (sx, sy, sw, sh) = self.source_rect(width, height);
        let src = frame.data();
        let dst = output.data_mut();

        for y in 0..height as usize {
            let src_y =
                ((sy + (y as f64 + 0.5) * sh / height as f64) as usize).min(height as usize - 1);
            for x in 0..width as usize {
                let src_x =
                    ((sx + (x as f64 + 0.5) * sw / width as f64) as usize).min(width as usize - 1);
                let from = src_y * stride + src_x * 4;
                let to = y * stride + x * 4;
                dst[to..to + 4].copy_from_slice(&src[from..from + 4]);
            }
        }
        Ok(StageOutput::Replaced(output))
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new("crop", "Centre crop scaled to the frame", &SCHEMA, |options| {
        Ok(Box::new(CropPlugin::from_options(options)?))
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{ctx, pool};
    use super::*;
    use crate::media::FrameFormat;

    #[test]
    fn test_zoom_two_magnifies_centre() {
        // 4x4 frame: centre 2x2 white, border black
        let mut frame = Frame::new(FrameFormat::rgba(4, 4));
        frame.fill([0, 0, 0, 255]);
        for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            let idx = (y * 4 + x) * 4;
            frame.data_mut()[idx..idx + 4].copy_from_slice(&[255, 255, 255, 255]);
        }

        let options = PluginOptions::new().with("zoom", 2.0);
        let plugin = CropPlugin::from_options(&options).unwrap();
        let pool = pool();
        let StageOutput::Replaced(out) = plugin.apply(&mut frame, &ctx(&options, &pool)).unwrap()
        else {
            panic!("zoom must replace the frame");
        };
        assert_eq!(out.format(), frame.format());
        assert_eq!(out.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(out.pixel(3, 3), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_invalid_zoom() {
        assert!(CropPlugin::from_options(&PluginOptions::new().with("zoom", 0.5)).is_err());
        assert!(
            CropPlugin::from_options(&PluginOptions::new().with("zoom", 2.0).with("center_x", 3.0))
                .is_err()
        );
    }
}
