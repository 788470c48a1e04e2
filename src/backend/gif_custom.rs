//! GIF backend driving the `gif` crate directly.

use super::{gif_repeat, ContainerBackend, OpenParams};
use crate::{settings::Rgb, Error, Result};
use gif::{DisposalMethod, Encoder, Frame};
use image::RgbaImage;
use std::{
    fs::File,
    io::{BufWriter, Write},
};

/// A GIF backend that keeps frame offsets, so cropped frames stay small.
///
/// With a transparent color set, fully transparent pixels are encoded as
/// see-through with that color. Opaque pixels keep their color, even when it
/// equals the transparent one.
pub struct CustomGifBackend {
    speed: i32,
    transparent: Option<Rgb>,
    dispose: DisposalMethod,
    encoder: Option<Encoder<BufWriter<File>>>,
}

impl CustomGifBackend {
    /// Creates a backend without transparency.
    pub fn new() -> Self {
        Self {
            speed: 10,
            transparent: None,
            dispose: DisposalMethod::Any,
            encoder: None,
        }
    }

    fn prepare_pixels(&self, pixels: &RgbaImage) -> Vec<u8> {
        let mut rgba = pixels.as_raw().clone();
        match self.transparent {
            Some(Rgb { r, g, b }) => {
                for px in rgba.chunks_exact_mut(4) {
                    if px[3] == 0 {
                        px.copy_from_slice(&[r, g, b, 0]);
                    }
                }
            }
            None => {
                for px in rgba.chunks_exact_mut(4) {
                    px[3] = 255;
                }
            }
        }
        rgba
    }
}

impl Default for CustomGifBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn dimension(value: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::Backend(format!("{value} exceeds the gif size limit")))
}

impl ContainerBackend for CustomGifBackend {
    fn open(&mut self, params: &OpenParams) -> Result<()> {
        let writer = BufWriter::new(File::create(&params.destination)?);
        let mut encoder = Encoder::new(
            writer,
            dimension(params.width)?,
            dimension(params.height)?,
            &[],
        )?;
        if let Some(repeat) = gif_repeat(params.loop_count) {
            encoder.set_repeat(repeat)?;
        }

        self.encoder = Some(encoder);
        Ok(())
    }

    fn append_frame(&mut self, pixels: &RgbaImage, x: u32, y: u32, delay: u16) -> Result<()> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(Error::Backend("cannot encode an empty frame".to_string()));
        }
        let (width, height) = (dimension(pixels.width())?, dimension(pixels.height())?);
        let mut rgba = self.prepare_pixels(pixels);

        let mut frame = Frame::from_rgba_speed(width, height, &mut rgba, self.speed);
        frame.left = dimension(x)?;
        frame.top = dimension(y)?;
        frame.delay = delay;
        frame.dispose = self.dispose;

        self.encoder
            .as_mut()
            .ok_or_else(|| Error::Backend("gif output is not open".to_string()))?
            .write_frame(&frame)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| Error::Backend("gif output is not open".to_string()))?;
        let mut writer = encoder.into_inner()?;
        writer.flush()?;
        Ok(())
    }

    fn set_transparent(&mut self, color: Rgb) {
        self.transparent = Some(color);
    }

    fn set_dispose_keep(&mut self) {
        self.dispose = DisposalMethod::Keep;
    }

    fn set_quality(&mut self, quality: u8) {
        self.speed = i32::from(quality.clamp(1, 30));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::path::Path;
    use tempdir::TempDir;

    fn open(backend: &mut CustomGifBackend, path: &Path, loop_count: i32) {
        backend
            .open(&OpenParams {
                destination: path.to_path_buf(),
                width: 10,
                height: 10,
                loop_count,
                frame_rate_hint: None,
            })
            .unwrap();
    }

    #[test]
    fn keeps_offsets_delays_and_disposal() {
        let dir = TempDir::new("custom_gif").unwrap();
        let path = dir.path().join("out.gif");

        let mut backend = CustomGifBackend::new();
        backend.set_dispose_keep();
        open(&mut backend, &path, 0);
        backend
            .append_frame(&RgbaImage::from_pixel(10, 10, Rgba([10, 20, 30, 255])), 0, 0, 0)
            .unwrap();
        backend
            .append_frame(&RgbaImage::from_pixel(3, 2, Rgba([200, 0, 0, 255])), 4, 5, 7)
            .unwrap();
        backend.close().unwrap();

        let mut decoder = gif::DecodeOptions::new()
            .read_info(File::open(&path).unwrap())
            .unwrap();
        let first = decoder.read_next_frame().unwrap().unwrap().clone();
        assert_eq!((first.left, first.top, first.delay), (0, 0, 0));
        assert_eq!(first.dispose, DisposalMethod::Keep);
        let second = decoder.read_next_frame().unwrap().unwrap().clone();
        assert_eq!((second.left, second.top), (4, 5));
        assert_eq!((second.width, second.height), (3, 2));
        assert_eq!(second.delay, 7);
        assert!(decoder.read_next_frame().unwrap().is_none());
    }

    #[test]
    fn only_transparent_pixels_become_see_through() {
        let backend = {
            let mut backend = CustomGifBackend::new();
            backend.set_transparent(Rgb::new(0, 255, 0));
            backend
        };
        let mut pixels = RgbaImage::from_pixel(3, 1, Rgba([0, 255, 0, 255]));
        pixels.put_pixel(1, 0, Rgba([5, 5, 5, 255]));
        pixels.put_pixel(2, 0, Rgba([9, 9, 9, 0]));
        let rgba = backend.prepare_pixels(&pixels);
        assert_eq!(&rgba[..4], &[0, 255, 0, 255]);
        assert_eq!(&rgba[4..8], &[5, 5, 5, 255]);
        assert_eq!(&rgba[8..], &[0, 255, 0, 0]);
    }

    #[test]
    fn opaque_without_transparency() {
        let backend = CustomGifBackend::new();
        let rgba = backend.prepare_pixels(&RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 0])));
        assert_eq!(rgba, vec![1, 2, 3, 255]);
    }

    #[test]
    fn close_without_open_fails() {
        assert!(matches!(
            CustomGifBackend::new().close(),
            Err(Error::Backend(_))
        ));
    }
}
