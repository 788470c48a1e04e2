//! User facing encoder settings.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Creates a color from its channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Which GIF encoder writes `.gif` outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GifEncoderKind {
    /// Frame-offset aware encoder with transparency and disposal support.
    #[default]
    Custom,
    /// Full-canvas encoder from the `image` crate.
    Standard,
}

/// Settings read by every job at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// GIF encoder used for `.gif` outputs.
    pub gif_encoder: GifEncoderKind,
    /// Crop frames to the region that changed since the previous frame.
    pub detect_unchanged: bool,
    /// Paint unchanged pixels with [`transparent_color`](Self::transparent_color).
    pub paint_transparent: bool,
    /// Color marking see-through pixels.
    pub transparent_color: Rgb,
    /// Quantization speed, 1 (best) to 30 (fastest).
    pub quality: u8,
    /// Repeat the animation after its first playback.
    pub looped: bool,
    /// Repeat forever, ignoring `repeat_count`.
    pub repeat_forever: bool,
    /// Extra playbacks when looping a finite number of times.
    pub repeat_count: u16,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            gif_encoder: GifEncoderKind::Custom,
            detect_unchanged: true,
            paint_transparent: true,
            transparent_color: Rgb::new(0, 255, 0),
            quality: 10,
            looped: true,
            repeat_forever: true,
            repeat_count: 2,
        }
    }
}

impl EncoderSettings {
    /// Parses settings from JSON. Missing fields take their default value.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Serializes the settings to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Sets the GIF encoder.
    pub fn with_gif_encoder(mut self, kind: GifEncoderKind) -> Self {
        self.gif_encoder = kind;
        self
    }

    /// Enables or disables cropping of unchanged regions.
    pub fn with_detect_unchanged(mut self, enabled: bool) -> Self {
        self.detect_unchanged = enabled;
        self
    }

    /// Enables transparent painting of unchanged pixels with the given color,
    /// or disables it with `None`.
    pub fn with_transparency(mut self, color: Option<Rgb>) -> Self {
        self.paint_transparent = color.is_some();
        if let Some(color) = color {
            self.transparent_color = color;
        }
        self
    }

    /// Sets the quantization speed.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Plays the animation once.
    pub fn play_once(mut self) -> Self {
        self.looped = false;
        self
    }

    /// Loops the animation forever.
    pub fn loop_forever(mut self) -> Self {
        self.looped = true;
        self.repeat_forever = true;
        self
    }

    /// Repeats the animation `count` times after the first playback.
    pub fn repeat(mut self, count: u16) -> Self {
        self.looped = true;
        self.repeat_forever = false;
        self.repeat_count = count;
        self
    }
}
