//! Container backends that turn frames into GIF and AVI files.

pub mod avi;

#[cfg(feature = "gif")]
pub mod gif_custom;

#[cfg(feature = "gif")]
pub mod gif_standard;

mod canvas;

use crate::{settings::Rgb, Result};
use image::RgbaImage;
use std::{fmt, path::PathBuf};

pub(crate) use canvas::Canvas;

/// Parameters for opening an output container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenParams {
    /// File the container is written to.
    pub destination: PathBuf,
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// `0` loops forever, `-1` plays once, `n > 0` repeats `n` more times.
    pub loop_count: i32,
    /// Frames per second, for containers with a fixed rate.
    pub frame_rate_hint: Option<u32>,
}

/// A container writer that receives frames in playback order.
///
/// Backends own no job state. [`close`](ContainerBackend::close) must leave a
/// playable file even when only some of the frames were appended.
pub trait ContainerBackend: Send {
    /// Opens the output.
    fn open(&mut self, params: &OpenParams) -> Result<()>;

    /// Appends a frame whose top left corner is placed at `(x, y)`.
    /// `delay` is in centiseconds.
    fn append_frame(&mut self, pixels: &RgbaImage, x: u32, y: u32, delay: u16) -> Result<()>;

    /// Finalizes and flushes the output.
    fn close(&mut self) -> Result<()>;

    /// Returns `true` if zero delays must be raised before appending.
    fn requires_positive_delay(&self) -> bool {
        false
    }

    /// Marks a color as see-through. Ignored by backends without transparency.
    fn set_transparent(&mut self, _color: Rgb) {}

    /// Leaves each frame in place when the next one is drawn.
    fn set_dispose_keep(&mut self) {}

    /// Sets the quantization speed, 1 (best) to 30 (fastest).
    fn set_quality(&mut self, _quality: u8) {}
}

/// The closed set of shipped container backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// GIF writer with frame offsets, transparency and disposal control.
    GifCustom,
    /// Full-canvas GIF writer.
    GifStandard,
    /// Uncompressed AVI writer.
    Avi,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::GifCustom => "custom gif",
            BackendKind::GifStandard => "standard gif",
            BackendKind::Avi => "avi",
        })
    }
}

/// Creates backends for jobs.
pub trait BackendFactory: Send + Sync + 'static {
    /// Creates a fresh backend of the given kind.
    fn create(&self, kind: BackendKind) -> Result<Box<dyn ContainerBackend>>;
}

/// Factory for the backends shipped with this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, kind: BackendKind) -> Result<Box<dyn ContainerBackend>> {
        match kind {
            #[cfg(feature = "gif")]
            BackendKind::GifCustom => Ok(Box::new(gif_custom::CustomGifBackend::new())),
            #[cfg(feature = "gif")]
            BackendKind::GifStandard => Ok(Box::new(gif_standard::StandardGifBackend::new())),
            BackendKind::Avi => Ok(Box::new(avi::AviBackend::new())),
            #[cfg(not(feature = "gif"))]
            kind => Err(crate::Error::BackendUnavailable(kind)),
        }
    }
}

impl<F> BackendFactory for F
where
    F: Fn(BackendKind) -> Result<Box<dyn ContainerBackend>> + Send + Sync + 'static,
{
    fn create(&self, kind: BackendKind) -> Result<Box<dyn ContainerBackend>> {
        self(kind)
    }
}

/// Converts a 0/-1/n loop count into the gif crate's repeat setting.
/// `None` means no loop extension is written, so the animation plays once.
#[cfg(feature = "gif")]
pub(crate) fn gif_repeat(loop_count: i32) -> Option<gif::Repeat> {
    match loop_count {
        0 => Some(gif::Repeat::Infinite),
        n if n > 0 => Some(gif::Repeat::Finite(n.min(u16::MAX as i32) as u16)),
        _ => None,
    }
}
