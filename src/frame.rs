//! Captured frames and the ordered sets a job encodes.

use crate::Result;
use image::RgbaImage;
use std::path::{Path, PathBuf};

/// Smallest delay, in centiseconds, handed to backends that reject zero delays.
pub const MIN_DELAY: u16 = 1;

/// A region of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Creates a new rectangle.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns `true` if the rectangle covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// One captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Location of the frame's pixels.
    pub image_location: PathBuf,
    /// Where the pixels are placed on the canvas.
    pub rect: Rect,
    /// Display duration in centiseconds.
    pub delay: u16,
    /// `false` if the frame adds nothing and is skipped while encoding.
    pub has_area: bool,
}

impl FrameInfo {
    /// Creates a visible frame.
    pub fn new(image_location: impl Into<PathBuf>, rect: Rect, delay: u16) -> Self {
        Self {
            image_location: image_location.into(),
            rect,
            delay,
            has_area: true,
        }
    }

    /// Decodes the frame's pixels.
    pub fn load_pixels(&self) -> Result<RgbaImage> {
        Ok(image::open(&self.image_location)?.to_rgba8())
    }

    /// The delay to hand to a backend, raised to [`MIN_DELAY`] when the backend
    /// rejects zero delays.
    pub fn delay_for(&self, requires_positive_delay: bool) -> u16 {
        if requires_positive_delay {
            self.delay.max(MIN_DELAY)
        } else {
            self.delay
        }
    }
}

/// Ordered frames of one job, in playback order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameSet {
    frames: Vec<FrameInfo>,
    storage_dir: Option<PathBuf>,
}

impl FrameSet {
    /// Creates a frame set that owns no temporary storage.
    pub fn new(frames: Vec<FrameInfo>) -> Self {
        Self {
            frames,
            storage_dir: None,
        }
    }

    /// Marks `dir` as the job's temporary frame storage. It is deleted once
    /// the job finishes, whatever the outcome.
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// The frames in playback order.
    pub fn frames(&self) -> &[FrameInfo] {
        &self.frames
    }

    /// The temporary storage deleted on finalization, if any.
    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// Number of frames, visible or not.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if there are no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames with a visible area.
    pub fn visible_count(&self) -> usize {
        self.frames.iter().filter(|frame| frame.has_area).count()
    }

    /// Returns `true` if at least one frame would be encoded.
    pub fn has_visible_frame(&self) -> bool {
        self.frames.iter().any(|frame| frame.has_area)
    }

    /// Canvas size covering every frame's rectangle.
    pub fn canvas_size(&self) -> (u32, u32) {
        self.frames.iter().fold((0, 0), |(w, h), frame| {
            (w.max(frame.rect.right()), h.max(frame.rect.bottom()))
        })
    }

    /// Delay of the first visible frame, used to derive a frame rate.
    pub fn first_delay(&self) -> Option<u16> {
        self.frames
            .iter()
            .find(|frame| frame.has_area)
            .map(|frame| frame.delay)
    }

    pub(crate) fn replace_frames(&self, frames: Vec<FrameInfo>) -> Self {
        Self {
            frames,
            storage_dir: self.storage_dir.clone(),
        }
    }
}

impl FromIterator<FrameInfo> for FrameSet {
    fn from_iter<I: IntoIterator<Item = FrameInfo>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Container format of an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Animated GIF.
    Gif,
    /// AVI video.
    Avi,
}

impl Format {
    /// Derives the format from an output path: `.gif` (any case) is a GIF,
    /// everything else an AVI.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gif") => Format::Gif,
            _ => Format::Avi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(x: u32, y: u32, w: u32, h: u32, has_area: bool) -> FrameInfo {
        FrameInfo {
            image_location: PathBuf::from("frame.png"),
            rect: Rect::new(x, y, w, h),
            delay: 10,
            has_area,
        }
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(Format::from_path(Path::new("out.gif")), Format::Gif);
        assert_eq!(Format::from_path(Path::new("OUT.GIF")), Format::Gif);
        assert_eq!(Format::from_path(Path::new("out.avi")), Format::Avi);
        assert_eq!(Format::from_path(Path::new("out.gif.bak")), Format::Avi);
        assert_eq!(Format::from_path(Path::new("out")), Format::Avi);
    }

    #[test]
    fn canvas_covers_all_rects() {
        let set = FrameSet::new(vec![frame(0, 0, 40, 30, true), frame(30, 20, 20, 20, true)]);
        assert_eq!(set.canvas_size(), (50, 40));
    }

    #[test]
    fn visibility_counts() {
        let set = FrameSet::new(vec![frame(0, 0, 4, 4, false), frame(0, 0, 4, 4, true)]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.visible_count(), 1);
        assert!(set.has_visible_frame());
        assert!(!FrameSet::new(vec![frame(0, 0, 4, 4, false)]).has_visible_frame());
    }

    #[test]
    fn zero_delay_is_raised_only_when_required() {
        let mut f = frame(0, 0, 1, 1, true);
        f.delay = 0;
        assert_eq!(f.delay_for(true), MIN_DELAY);
        assert_eq!(f.delay_for(false), 0);
        f.delay = 7;
        assert_eq!(f.delay_for(true), 7);
    }

    #[test]
    fn first_delay_skips_hidden_frames() {
        let mut hidden = frame(0, 0, 1, 1, false);
        hidden.delay = 3;
        let set = FrameSet::new(vec![hidden, frame(0, 0, 1, 1, true)]);
        assert_eq!(set.first_delay(), Some(10));
    }
}
