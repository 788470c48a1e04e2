use image::{Rgba, RgbaImage};

/// Full-size drawing surface for backends that only store whole frames.
///
/// Frames smaller than the canvas are drawn at their offset; fully
/// transparent pixels leave the previous content visible.
pub(crate) struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])),
        }
    }

    pub(crate) fn draw(&mut self, pixels: &RgbaImage, x: u32, y: u32) {
        for (px, py, pixel) in pixels.enumerate_pixels() {
            let (cx, cy) = (x + px, y + py);
            if cx >= self.image.width() || cy >= self.image.height() || pixel[3] == 0 {
                continue;
            }
            self.image.put_pixel(cx, cy, Rgba([pixel[0], pixel[1], pixel[2], 255]));
        }
    }

    pub(crate) fn image(&self) -> &RgbaImage {
        &self.image
    }

}
