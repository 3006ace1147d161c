//! Minimal raster drawing on top of `image::RgbImage`
//!
//! Lines, filled rectangles and text in a built-in 5x7 uppercase font are
//! all the plots and kernel grids need.

use crate::error::{Result, TrainError};
use image::{Rgb, RgbImage};
use std::path::Path;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const GRID: Rgb<u8> = Rgb([225, 225, 225]);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Row bitmaps, most significant of the low five bits is the leftmost column.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c.to_ascii_uppercase() {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}

pub struct Canvas {
    image: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Rgb<u8>) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, background),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Sets one pixel; coordinates outside the canvas are ignored.
    pub fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.width() && (y as u32) < self.height() {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    pub fn fill_rect(&mut self, x: i64, y: i64, width: u32, height: u32, color: Rgb<u8>) {
        for dy in 0..height as i64 {
            for dx in 0..width as i64 {
                self.put(x + dx, y + dy, color);
            }
        }
    }

    /// Bresenham line, `thickness` pixels wide.
    pub fn line(&mut self, from: (i64, i64), to: (i64, i64), thickness: u32, color: Rgb<u8>) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        let half = thickness as i64 / 2;
        loop {
            self.fill_rect(x - half, y - half, thickness.max(1), thickness.max(1), color);
            if (x, y) == to {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn text_width(text: &str, scale: u32) -> u32 {
        let n = text.chars().count() as u32;
        if n == 0 {
            0
        } else {
            (n * (GLYPH_WIDTH + 1) - 1) * scale
        }
    }

    pub fn text_height(scale: u32) -> u32 {
        GLYPH_HEIGHT * scale
    }

    /// Draws `text` with its top-left corner at `(x, y)`. Characters without a
    /// glyph are left blank.
    pub fn text(&mut self, x: i64, y: i64, text: &str, scale: u32, color: Rgb<u8>) {
        let advance = ((GLYPH_WIDTH + 1) * scale) as i64;
        for (i, c) in text.chars().enumerate() {
            let Some(rows) = glyph(c) else { continue };
            let origin = x + i as i64 * advance;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (0x10 >> col) != 0 {
                        self.fill_rect(
                            origin + (col * scale) as i64,
                            y + (row as u32 * scale) as i64,
                            scale,
                            scale,
                            color,
                        );
                    }
                }
            }
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.image.save(path).map_err(|e| TrainError::image(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_endpoints() {
        let mut canvas = Canvas::new(10, 10, WHITE);
        canvas.line((1, 1), (8, 5), 1, BLACK);
        assert_eq!(*canvas.image().get_pixel(1, 1), BLACK);
        assert_eq!(*canvas.image().get_pixel(8, 5), BLACK);
        assert_eq!(*canvas.image().get_pixel(8, 1), WHITE);
    }

    #[test]
    fn test_out_of_bounds_is_clipped() {
        let mut canvas = Canvas::new(4, 4, WHITE);
        canvas.fill_rect(-2, -2, 3, 3, BLACK);
        assert_eq!(*canvas.image().get_pixel(0, 0), BLACK);
        assert_eq!(*canvas.image().get_pixel(1, 1), WHITE);
    }

    #[test]
    fn test_text_metrics() {
        assert_eq!(Canvas::text_width("EPOCH 1", 2), (7 * 6 - 1) * 2);
        let mut canvas = Canvas::new(40, 10, WHITE);
        canvas.text(0, 0, "1", 1, BLACK);
        // top row of '1' is 0x04: only the middle column
        assert_eq!(*canvas.image().get_pixel(2, 0), BLACK);
        assert_eq!(*canvas.image().get_pixel(0, 0), WHITE);
    }
}
