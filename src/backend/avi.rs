//! Uncompressed AVI backend.
//!
//! Frames are stored as 24-bit bottom-up DIBs in a RIFF `AVI ` container with an
//! `idx1` index. Frame counts and chunk sizes are patched on close, so a
//! container closed after any number of frames is playable.

use super::{Canvas, ContainerBackend, OpenParams};
use crate::{Error, Result};
use image::RgbaImage;
use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
};

const DEFAULT_FRAME_RATE: u32 = 10;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

// Byte offsets of the fields patched on close.
const RIFF_SIZE_AT: u64 = 4;
const TOTAL_FRAMES_AT: u64 = 48;
const STREAM_LENGTH_AT: u64 = 140;
const MOVI_SIZE_AT: u64 = 216;
const MOVI_FOURCC_AT: u64 = 220;
const HEADER_LEN: u64 = 224;

/// An AVI backend writing uncompressed video.
pub struct AviBackend {
    state: Option<OpenAvi>,
}

struct OpenAvi {
    writer: BufWriter<File>,
    canvas: Canvas,
    frame_size: u32,
    index: Vec<(u32, u32)>,
    position: u64,
}

impl AviBackend {
    /// Creates a closed backend.
    pub fn new() -> Self {
        Self { state: None }
    }
}

impl Default for AviBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn row_stride(width: u32) -> u32 {
    (width * 3 + 3) & !3
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_u16<W: Write>(writer: &mut W, value: u16) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Converts a size or offset into a RIFF field, which is limited to 32 bits.
fn riff_u32(value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Backend("avi output exceeds the 4 GiB RIFF limit".to_string()))
}

/// Fails if appending one more frame would push the RIFF size past 32 bits.
fn check_capacity(position: u64, frames: usize, frame_size: u32) -> Result<()> {
    let next = position + 8 + u64::from(frame_size);
    // RIFF size = file length - 8 = end of movi + idx1 entries.
    riff_u32(next + (frames as u64 + 1) * 16)?;
    Ok(())
}

fn dimension(value: u32) -> Result<u16> {
    u16::try_from(value)
        .ok()
        .filter(|&value| value > 0)
        .ok_or_else(|| Error::Backend(format!("unsupported avi frame dimension {value}")))
}

fn write_header<W: Write>(
    writer: &mut W,
    width: u16,
    height: u16,
    frame_size: u32,
    rate: u32,
) -> Result<()> {
    let (width_px, height_px) = (u32::from(width), u32::from(height));

    writer.write_all(b"RIFF")?;
    write_u32(writer, 0)?;
    writer.write_all(b"AVI ")?;

    writer.write_all(b"LIST")?;
    write_u32(writer, 192)?;
    writer.write_all(b"hdrl")?;

    writer.write_all(b"avih")?;
    write_u32(writer, 56)?;
    write_u32(writer, 1_000_000 / rate)?;
    write_u32(writer, frame_size.saturating_mul(rate))?;
    write_u32(writer, 0)?;
    write_u32(writer, AVIF_HASINDEX)?;
    write_u32(writer, 0)?; // total frames
    write_u32(writer, 0)?;
    write_u32(writer, 1)?;
    write_u32(writer, frame_size)?;
    write_u32(writer, width_px)?;
    write_u32(writer, height_px)?;
    writer.write_all(&[0; 16])?;

    writer.write_all(b"LIST")?;
    write_u32(writer, 116)?;
    writer.write_all(b"strl")?;

    writer.write_all(b"strh")?;
    write_u32(writer, 56)?;
    writer.write_all(b"vids")?;
    writer.write_all(b"DIB ")?;
    write_u32(writer, 0)?;
    write_u16(writer, 0)?;
    write_u16(writer, 0)?;
    write_u32(writer, 0)?;
    write_u32(writer, 1)?;
    write_u32(writer, rate)?;
    write_u32(writer, 0)?;
    write_u32(writer, 0)?; // stream length
    write_u32(writer, frame_size)?;
    write_u32(writer, u32::MAX)?;
    write_u32(writer, 0)?;
    write_u16(writer, 0)?;
    write_u16(writer, 0)?;
    write_u16(writer, width)?;
    write_u16(writer, height)?;

    writer.write_all(b"strf")?;
    write_u32(writer, 40)?;
    write_u32(writer, 40)?;
    write_u32(writer, width_px)?;
    write_u32(writer, height_px)?;
    write_u16(writer, 1)?;
    write_u16(writer, 24)?;
    write_u32(writer, 0)?;
    write_u32(writer, frame_size)?;
    writer.write_all(&[0; 16])?;

    writer.write_all(b"LIST")?;
    write_u32(writer, 0)?;
    writer.write_all(b"movi")?;
    Ok(())
}

fn to_dib(image: &RgbaImage) -> Vec<u8> {
    let stride = row_stride(image.width()) as usize;
    let mut data = vec![0; stride * image.height() as usize];
    for (row, y) in (0..image.height()).rev().enumerate() {
        let line = &mut data[row * stride..];
        for x in 0..image.width() {
            let [r, g, b, _] = image.get_pixel(x, y).0;
            let at = x as usize * 3;
            line[at..at + 3].copy_from_slice(&[b, g, r]);
        }
    }
    data
}

impl ContainerBackend for AviBackend {
    fn open(&mut self, params: &OpenParams) -> Result<()> {
        let (width, height) = (dimension(params.width)?, dimension(params.height)?);
        let frame_size = riff_u32(u64::from(row_stride(params.width)) * u64::from(params.height))?;
        check_capacity(HEADER_LEN, 0, frame_size)?;
        let rate = params.frame_rate_hint.unwrap_or(DEFAULT_FRAME_RATE).max(1);

        let mut writer = BufWriter::new(File::create(&params.destination)?);
        write_header(&mut writer, width, height, frame_size, rate)?;

        self.state = Some(OpenAvi {
            writer,
            canvas: Canvas::new(params.width, params.height),
            frame_size,
            index: Vec::new(),
            position: HEADER_LEN,
        });
        Ok(())
    }

    fn append_frame(&mut self, pixels: &RgbaImage, x: u32, y: u32, _delay: u16) -> Result<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| Error::Backend("avi output is not open".to_string()))?;

        check_capacity(state.position, state.index.len(), state.frame_size)?;
        state.canvas.draw(pixels, x, y);
        let data = to_dib(state.canvas.image());

        let offset = riff_u32(state.position - MOVI_FOURCC_AT)?;
        state.writer.write_all(b"00db")?;
        write_u32(&mut state.writer, state.frame_size)?;
        state.writer.write_all(&data)?;
        state.index.push((offset, state.frame_size));
        state.position += 8 + u64::from(state.frame_size);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let OpenAvi {
            mut writer,
            index,
            position,
            ..
        } = self
            .state
            .take()
            .ok_or_else(|| Error::Backend("avi output is not open".to_string()))?;

        let movi_size = riff_u32(position - MOVI_FOURCC_AT)?;
        writer.write_all(b"idx1")?;
        write_u32(&mut writer, riff_u32(index.len() as u64 * 16)?)?;
        for (offset, size) in &index {
            writer.write_all(b"00db")?;
            write_u32(&mut writer, AVIIF_KEYFRAME)?;
            write_u32(&mut writer, *offset)?;
            write_u32(&mut writer, *size)?;
        }
        let file_len = position + 8 + index.len() as u64 * 16;

        let frames = riff_u32(index.len() as u64)?;
        for (at, value) in [
            (RIFF_SIZE_AT, riff_u32(file_len - 8)?),
            (TOTAL_FRAMES_AT, frames),
            (STREAM_LENGTH_AT, frames),
            (MOVI_SIZE_AT, movi_size),
        ] {
            writer.seek(SeekFrom::Start(at))?;
            write_u32(&mut writer, value)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn requires_positive_delay(&self) -> bool {
        true
    }
}
