//! Full-canvas GIF backend built on the `image` crate's encoder.

use super::{Canvas, ContainerBackend, OpenParams};
use crate::{Error, Result};
use image::{
    codecs::gif::{self, Repeat},
    Delay, Frame, RgbaImage,
};
use parking_lot::Mutex;
use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

/// A GIF backend that always stores whole frames.
///
/// Appended frames are drawn onto a canvas and the complete canvas is encoded,
/// so the output needs no disposal or transparency support from the decoder.
/// The file is assembled in memory and written on [`close`](ContainerBackend::close).
pub struct StandardGifBackend {
    speed: i32,
    state: Option<OpenGif>,
}

struct OpenGif {
    encoder: gif::GifEncoder<SharedBuffer>,
    buffer: SharedBuffer,
    canvas: Canvas,
    destination: PathBuf,
}

impl StandardGifBackend {
    /// Creates a backend with the encoder's default speed.
    pub fn new() -> Self {
        Self {
            speed: 10,
            state: None,
        }
    }
}

impl Default for StandardGifBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBackend for StandardGifBackend {
    fn open(&mut self, params: &OpenParams) -> Result<()> {
        let buffer = SharedBuffer::default();
        let mut encoder = gif::GifEncoder::new_with_speed(buffer.clone(), self.speed);
        match params.loop_count {
            0 => encoder.set_repeat(Repeat::Infinite)?,
            n if n > 0 => encoder.set_repeat(Repeat::Finite(n.min(u16::MAX as i32) as u16))?,
            _ => {}
        }

        self.state = Some(OpenGif {
            encoder,
            buffer,
            canvas: Canvas::new(params.width, params.height),
            destination: params.destination.clone(),
        });
        Ok(())
    }

    fn append_frame(&mut self, pixels: &RgbaImage, x: u32, y: u32, delay: u16) -> Result<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| Error::Backend("gif output is not open".to_string()))?;

        state.canvas.draw(pixels, x, y);
        let delay = Delay::from_numer_denom_ms(u32::from(delay) * 10, 1);
        state
            .encoder
            .encode_frame(Frame::from_parts(state.canvas.image().clone(), 0, 0, delay))?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let OpenGif {
            encoder,
            buffer,
            destination,
            ..
        } = self
            .state
            .take()
            .ok_or_else(|| Error::Backend("gif output is not open".to_string()))?;

        // Dropping the encoder writes the trailer.
        drop(encoder);
        fs::write(&destination, &*buffer.0.lock())?;
        Ok(())
    }

    fn requires_positive_delay(&self) -> bool {
        true
    }

    fn set_quality(&mut self, quality: u8) {
        self.speed = i32::from(quality.clamp(1, 30));
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
