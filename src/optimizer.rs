//! Delta optimization of frame sets.
//!
//! Each frame is reduced to the bounding box of the pixels that changed since
//! the previous frame. Frames that change nothing stay in the set with
//! `has_area = false`, keeping frame count and delays intact. In transparency
//! mode, pixels inside a box that did not change are painted with the
//! transparent color at zero alpha, so the backend can let the previous frame
//! show through instead of encoding the same pixels again.
//!
//! The optimizer rebuilds the full canvas for every input frame (drawing the
//! frame at its offset, zero-alpha pixels leaving the canvas untouched), so an
//! already optimized set yields the same boxes again.

use crate::{
    frame::{FrameInfo, Rect},
    job::CancellationToken,
    settings::Rgb,
    Result,
};
use image::{Rgba, RgbaImage};
use std::path::Path;
use tracing::debug;

/// Crops frames to their changed regions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaFrameOptimizer {
    transparent: Option<Rgb>,
}

impl DeltaFrameOptimizer {
    /// Creates an optimizer. With a transparent color, unchanged pixels inside
    /// a changed region are painted with it.
    pub fn new(transparent: Option<Rgb>) -> Self {
        Self { transparent }
    }

    /// Optimizes `frames`, writing the cropped images into `scratch_dir`.
    ///
    /// Returns `None` if `token` was cancelled before every frame was
    /// processed. `progress` receives the index of each processed frame.
    pub fn optimize(
        &self,
        frames: &[FrameInfo],
        scratch_dir: &Path,
        token: &CancellationToken,
        mut progress: impl FnMut(usize),
    ) -> Result<Option<Vec<FrameInfo>>> {
        let (width, height) = frames.iter().fold((0, 0), |(w, h), frame| {
            (w.max(frame.rect.right()), h.max(frame.rect.bottom()))
        });

        let mut previous: Option<RgbaImage> = None;
        let mut optimized = Vec::with_capacity(frames.len());

        for (index, frame) in frames.iter().enumerate() {
            if token.is_cancelled() {
                debug!(index, "Optimization cancelled");
                return Ok(None);
            }

            let current = reconstruct(previous.as_ref(), frame, width, height)?;
            let output = match previous.as_ref() {
                None => {
                    let location = scratch_dir.join(format!("{index:06}.png"));
                    current.save(&location)?;
                    FrameInfo {
                        image_location: location,
                        rect: Rect::new(0, 0, width, height),
                        delay: frame.delay,
                        has_area: frame.has_area,
                    }
                }
                Some(prev) => match changed_bounds(prev, &current) {
                    None => FrameInfo {
                        has_area: false,
                        ..frame.clone()
                    },
                    Some(rect) => {
                        let location = scratch_dir.join(format!("{index:06}.png"));
                        self.crop(prev, &current, rect).save(&location)?;
                        FrameInfo {
                            image_location: location,
                            rect,
                            delay: frame.delay,
                            has_area: true,
                        }
                    }
                },
            };

            optimized.push(output);
            previous = Some(current);
            progress(index);
        }

        debug!(
            frames = optimized.len(),
            visible = optimized.iter().filter(|frame| frame.has_area).count(),
            "Optimized frame set"
        );
        Ok(Some(optimized))
    }

    fn crop(&self, previous: &RgbaImage, current: &RgbaImage, rect: Rect) -> RgbaImage {
        RgbaImage::from_fn(rect.width, rect.height, |x, y| {
            let (cx, cy) = (rect.x + x, rect.y + y);
            let pixel = *current.get_pixel(cx, cy);
            match self.transparent {
                Some(Rgb { r, g, b }) if previous.get_pixel(cx, cy) == &pixel => Rgba([r, g, b, 0]),
                _ => pixel,
            }
        })
    }
}

/// Draws `frame` over the previous canvas.
fn reconstruct(
    previous: Option<&RgbaImage>,
    frame: &FrameInfo,
    width: u32,
    height: u32,
) -> Result<RgbaImage> {
    let mut canvas = match previous {
        Some(previous) => previous.clone(),
        None => RgbaImage::new(width, height),
    };
    if !frame.has_area {
        return Ok(canvas);
    }

    let pixels = frame.load_pixels()?;
    for (x, y, pixel) in pixels.enumerate_pixels() {
        let (cx, cy) = (frame.rect.x + x, frame.rect.y + y);
        if pixel[3] == 0 || cx >= width || cy >= height {
            continue;
        }
        canvas.put_pixel(cx, cy, *pixel);
    }
    Ok(canvas)
}

/// Smallest rectangle containing every pixel that differs.
fn changed_bounds(previous: &RgbaImage, current: &RgbaImage) -> Option<Rect> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in current.enumerate_pixels() {
        if previous.get_pixel(x, y) == pixel {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((left, top, right, bottom)) => {
                (left.min(x), top.min(y), right.max(x), bottom.max(y))
            }
        });
    }
    bounds.map(|(left, top, right, bottom)| {
        Rect::new(left, top, right - left + 1, bottom - top + 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn write_frame(dir: &Path, name: &str, image: &RgbaImage) -> FrameInfo {
        let path = dir.join(name);
        image.save(&path).unwrap();
        FrameInfo::new(path, Rect::new(0, 0, image.width(), image.height()), 10)
    }

    /// Three 8x8 frames: white, white with a red 2x2 at (3,4), unchanged.
    fn sample(dir: &Path) -> Vec<FrameInfo> {
        let white = RgbaImage::from_pixel(8, 8, WHITE);
        let mut marked = white.clone();
        for (x, y) in [(3, 4), (4, 4), (3, 5), (4, 5)] {
            marked.put_pixel(x, y, RED);
        }
        vec![
            write_frame(dir, "a.png", &white),
            write_frame(dir, "b.png", &marked),
            write_frame(dir, "c.png", &marked),
        ]
    }

    #[test]
    fn crops_to_changed_region() {
        let input = TempDir::new("optimizer_in").unwrap();
        let scratch = TempDir::new("optimizer_out").unwrap();
        let frames = sample(input.path());

        let mut seen = Vec::new();
        let out = DeltaFrameOptimizer::new(None)
            .optimize(&frames, scratch.path(), &CancellationToken::new(), |i| seen.push(i))
            .unwrap()
            .unwrap();

        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].rect, Rect::new(0, 0, 8, 8));
        assert!(out[0].has_area);
        assert_eq!(out[1].rect, Rect::new(3, 4, 2, 2));
        assert!(out[1].has_area);
        assert!(!out[2].has_area);
        assert_eq!(out[2].delay, 10);

        let cropped = out[1].load_pixels().unwrap();
        assert_eq!(cropped.dimensions(), (2, 2));
        assert!(cropped.pixels().all(|p| *p == RED));
    }

    #[test]
    fn paints_unchanged_pixels_inside_the_box() {
        let input = TempDir::new("optimizer_in").unwrap();
        let scratch = TempDir::new("optimizer_out").unwrap();
        let mut first = RgbaImage::from_pixel(4, 4, WHITE);
        first.put_pixel(1, 1, BLUE);
        let mut second = first.clone();
        second.put_pixel(0, 0, RED);
        second.put_pixel(2, 2, RED);
        let frames = vec![
            write_frame(input.path(), "a.png", &first),
            write_frame(input.path(), "b.png", &second),
        ];

        let out = DeltaFrameOptimizer::new(Some(Rgb::new(0, 255, 0)))
            .optimize(&frames, scratch.path(), &CancellationToken::new(), |_| {})
            .unwrap()
            .unwrap();

        assert_eq!(out[1].rect, Rect::new(0, 0, 3, 3));
        let delta = out[1].load_pixels().unwrap();
        assert_eq!(delta.get_pixel(0, 0), &RED);
        assert_eq!(delta.get_pixel(2, 2), &RED);
        assert_eq!(delta.get_pixel(1, 1), &Rgba([0, 255, 0, 0]));
        assert_eq!(delta.get_pixel(1, 0), &Rgba([0, 255, 0, 0]));
    }

    #[test]
    fn optimized_output_is_a_fixed_point() {
        let input = TempDir::new("optimizer_in").unwrap();
        let first_pass = TempDir::new("optimizer_once").unwrap();
        let second_pass = TempDir::new("optimizer_twice").unwrap();
        let frames = sample(input.path());

        for transparent in [None, Some(Rgb::new(0, 255, 0))] {
            let optimizer = DeltaFrameOptimizer::new(transparent);
            let token = CancellationToken::new();
            let once = optimizer
                .optimize(&frames, first_pass.path(), &token, |_| {})
                .unwrap()
                .unwrap();
            let twice = optimizer
                .optimize(&once, second_pass.path(), &token, |_| {})
                .unwrap()
                .unwrap();

            let shape = |frames: &[FrameInfo]| {
                frames
                    .iter()
                    .map(|f| (f.rect, f.has_area, f.delay))
                    .collect::<Vec<_>>()
            };
            assert_eq!(shape(&once), shape(&twice));
            for (a, b) in once.iter().zip(&twice).filter(|(a, _)| a.has_area) {
                assert_eq!(a.load_pixels().unwrap(), b.load_pixels().unwrap());
            }
        }
    }

    #[test]
    fn stops_when_cancelled() {
        let input = TempDir::new("optimizer_in").unwrap();
        let scratch = TempDir::new("optimizer_out").unwrap();
        let frames = sample(input.path());
        let token = CancellationToken::new();

        let out = DeltaFrameOptimizer::new(None)
            .optimize(&frames, scratch.path(), &token, |index| {
                if index == 0 {
                    token.cancel();
                }
            })
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn missing_frame_image_is_an_error() {
        let scratch = TempDir::new("optimizer_out").unwrap();
        let frames = vec![FrameInfo::new(
            scratch.path().join("missing.png"),
            Rect::new(0, 0, 2, 2),
            10,
        )];
        assert!(DeltaFrameOptimizer::new(None)
            .optimize(&frames, scratch.path(), &CancellationToken::new(), |_| {})
            .is_err());
    }

    #[test]
    fn bounds_of_identical_images_are_empty() {
        let image = RgbaImage::from_pixel(3, 3, WHITE);
        assert_eq!(changed_bounds(&image, &image), None);
        let mut other = image.clone();
        other.put_pixel(2, 0, RED);
        assert_eq!(changed_bounds(&image, &other), Some(Rect::new(2, 0, 1, 1)));
    }
}
