// SPDX-License-Identifier: GPL-3.0-only

//! Image overlay (frames, logos, watermarks)
//!
//! The file is decoded once when the chain is built. With `fit` the image is
//! stretched to the frame; the scaled copy is cached per frame size.

use crate::errors::PluginError;
use crate::media::Frame;
use crate::plugins::draw::blit_image;
use crate::plugins::options::{OptionField, OptionKind};
use crate::plugins::{ApplyContext, Plugin, PluginDescriptor, PluginOptions, StageOutput};
use ::image::RgbaImage;
use ::image::imageops::{self, FilterType};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCHEMA: [OptionField; 6] = [
    OptionField::required("file", OptionKind::Text),
    OptionField::optional("x", OptionKind::Integer),
    OptionField::optional("y", OptionKind::Integer),
    OptionField::optional("opacity", OptionKind::Float),
    OptionField::optional("resize", OptionKind::Float),
    OptionField::optional("fit", OptionKind::Bool),
];

/// Decode an image file into straight-alpha RGBA
pub fn load_rgba(path: &Path) -> Result<RgbaImage, String> {
    info!(path = %path.display(), "Loading image file");
    let img = ::image::open(path)
        .map_err(|e| format!("failed to load image '{}': {}", path.display(), e))?;
    let rgba = img.to_rgba8();
    info!(width = rgba.width(), height = rgba.height(), "Image loaded");
    Ok(rgba)
}

pub struct ImagePlugin {
    image: Arc<RgbaImage>,
    x: i64,
    y: i64,
    opacity: f32,
    fit: bool,
    /// Image stretched to the last seen frame size
    fitted: Mutex<Option<Arc<RgbaImage>>>,
}

impl ImagePlugin {
    pub fn from_options(options: &PluginOptions) -> Result<Self, PluginError> {
        let file = options.required_text("file")?;
        let image = load_rgba(Path::new(file)).map_err(|e| PluginError::invalid("file", e))?;
        Self::from_image(image, options)
    }

    /// Build from an already decoded image (options other than `file` apply)
    pub fn from_image(image: RgbaImage, options: &PluginOptions) -> Result<Self, PluginError> {
        let opacity = options.float("opacity")?.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&opacity) {
            return Err(PluginError::invalid("opacity", "must be within 0..1"));
        }

        let resize = options.float("resize")?.unwrap_or(1.0);
        if resize <= 0.0 {
            return Err(PluginError::invalid("resize", "must be positive"));
        }
        let image = if (resize - 1.0).abs() > f64::EPSILON {
            let width = ((image.width() as f64 * resize).round() as u32).max(1);
            let height = ((image.height() as f64 * resize).round() as u32).max(1);
            imageops::resize(&image, width, height, FilterType::Triangle)
        } else {
            image
        };

        Ok(Self {
            image: Arc::new(image),
            x: options.integer("x")?.unwrap_or(0),
            y: options.integer("y")?.unwrap_or(0),
            opacity: opacity as f32,
            fit: options.boolean("fit")?.unwrap_or(false),
            fitted: Mutex::new(None),
        })
    }

    fn image_for(&self, frame: &Frame) -> Result<Arc<RgbaImage>, PluginError> {
        if !self.fit {
            return Ok(Arc::clone(&self.image));
        }
        let mut fitted = self
            .fitted
            .lock()
            .map_err(|_| PluginError::render("image cache poisoned"))?;
        if let Some(cached) = fitted.as_ref()
            && cached.dimensions() == (frame.width(), frame.height())
        {
            return Ok(Arc::clone(cached));
        }
        let scaled = Arc::new(imageops::resize(
            self.image.as_ref(),
            frame.width(),
            frame.height(),
            FilterType::Triangle,
        ));
        *fitted = Some(Arc::clone(&scaled));
        Ok(scaled)
    }
}

impl Plugin for ImagePlugin {
    fn apply(
        &self,
        frame: &mut Frame,
        _ctx: &ApplyContext<'_>,
    ) -> Result<StageOutput, PluginError> {
        let image = self.image_for(frame)?;
        let (x, y) = if self.fit { (0, 0) } else { (self.x, self.y) };
        blit_image(frame, &image, x, y, self.opacity);
        Ok(StageOutput::InPlace)
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(
        "image",
        "Image file composited with alpha",
        &SCHEMA,
        |options| Ok(Box::new(ImagePlugin::from_options(options)?)),
    )
}
