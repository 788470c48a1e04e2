//! Chooses how a job's frames are prepared and which backend receives them.

use crate::{
    backend::{BackendKind, ContainerBackend},
    frame::Format,
    settings::{EncoderSettings, GifEncoderKind, Rgb},
};

/// Loop count that repeats forever.
pub const LOOP_FOREVER: i32 = 0;

/// Loop count that plays once without repeating.
pub const PLAY_ONCE: i32 = -1;

/// The encoding decision for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingStrategy {
    /// Run the delta optimizer before encoding.
    pub optimizer_enabled: bool,
    /// Paint unchanged pixels see-through.
    pub transparency_enabled: bool,
    /// Color used for see-through pixels.
    pub transparent_color: Option<Rgb>,
    /// Leave each frame in place when the next one is drawn.
    pub dispose_keep: bool,
    /// `0` loops forever, `-1` plays once, `n > 0` repeats `n` more times.
    pub loop_count: i32,
    /// Quantization speed passed to the backend.
    pub quality: u8,
    /// Backend receiving the frames.
    pub backend: BackendKind,
}

impl EncodingStrategy {
    /// Derives the strategy for an output format from the settings.
    pub fn select(format: Format, settings: &EncoderSettings) -> Self {
        let backend = match (format, settings.gif_encoder) {
            (Format::Avi, _) => BackendKind::Avi,
            (Format::Gif, GifEncoderKind::Custom) => BackendKind::GifCustom,
            (Format::Gif, GifEncoderKind::Standard) => BackendKind::GifStandard,
        };

        let optimizer_enabled = backend == BackendKind::GifCustom && settings.detect_unchanged;
        let transparency_enabled = optimizer_enabled && settings.paint_transparent;

        Self {
            optimizer_enabled,
            transparency_enabled,
            transparent_color: transparency_enabled.then_some(settings.transparent_color),
            // Cropped frames only add up to the full picture if nothing is cleared.
            dispose_keep: optimizer_enabled,
            loop_count: loop_count(settings),
            quality: settings.quality,
            backend,
        }
    }

    /// Forwards the decision to the calls the backend exposes.
    pub fn apply(&self, backend: &mut dyn ContainerBackend) {
        backend.set_quality(self.quality);
        if let Some(color) = self.transparent_color {
            backend.set_transparent(color);
        }
        if self.dispose_keep {
            backend.set_dispose_keep();
        }
    }
}

/// Translates the repeat settings into a loop count.
pub fn loop_count(settings: &EncoderSettings) -> i32 {
    match (settings.looped, settings.repeat_forever) {
        (false, _) => PLAY_ONCE,
        (true, true) => LOOP_FOREVER,
        (true, false) => i32::from(settings.repeat_count.max(1)),
    }
}
