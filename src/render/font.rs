//! Font backends for label text.
//!
//! `BitmapFont` is a built-in 5x7 glyph set: no assets, and pixel output is fully
//! deterministic. `TrueTypeFont` renders a user-supplied TTF/OTF through imageproc.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

/// Measures and draws label text.
pub trait LabelFont: Send + Sync {
    /// Rendered (width, height) of `text` in pixels.
    fn text_size(&self, text: &str) -> (u32, u32);

    /// Draw `text` with its top-left corner at (x, y). Pixels outside the canvas are
    /// skipped.
    fn draw_text(&self, canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, text: &str);
}

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const FIRST_GLYPH: u8 = 0x20;

/// Column-major glyphs for ASCII 0x20..=0x7E; bit 0 is the top row.
#[rustfmt::skip]
const GLYPHS: [[u8; 5]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], [0x00, 0x00, 0x5F, 0x00, 0x00], // ' ' '!'
    [0x00, 0x07, 0x00, 0x07, 0x00], [0x14, 0x7F, 0x14, 0x7F, 0x14], // '"' '#'
    [0x24, 0x2A, 0x7F, 0x2A, 0x12], [0x23, 0x13, 0x08, 0x64, 0x62], // '$' '%'
    [0x36, 0x49, 0x55, 0x22, 0x50], [0x00, 0x05, 0x03, 0x00, 0x00], // '&' '''
    [0x00, 0x1C, 0x22, 0x41, 0x00], [0x00, 0x41, 0x22, 0x1C, 0x00], // '(' ')'
    [0x14, 0x08, 0x3E, 0x08, 0x14], [0x08, 0x08, 0x3E, 0x08, 0x08], // '*' '+'
    [0x00, 0x50, 0x30, 0x00, 0x00], [0x08, 0x08, 0x08, 0x08, 0x08], // ',' '-'
    [0x00, 0x60, 0x60, 0x00, 0x00], [0x20, 0x10, 0x08, 0x04, 0x02], // '.' '/'
    [0x3E, 0x51, 0x49, 0x45, 0x3E], [0x00, 0x42, 0x7F, 0x40, 0x00], // '0' '1'
    [0x42, 0x61, 0x51, 0x49, 0x46], [0x21, 0x41, 0x45, 0x4B, 0x31], // '2' '3'
    [0x18, 0x14, 0x12, 0x7F, 0x10], [0x27, 0x45, 0x45, 0x45, 0x39], // '4' '5'
    [0x3C, 0x4A, 0x49, 0x49, 0x30], [0x01, 0x71, 0x09, 0x05, 0x03], // '6' '7'
    [0x36, 0x49, 0x49, 0x49, 0x36], [0x06, 0x49, 0x49, 0x29, 0x1E], // '8' '9'
    [0x00, 0x36, 0x36, 0x00, 0x00], [0x00, 0x56, 0x36, 0x00, 0x00], // ':' ';'
    [0x08, 0x14, 0x22, 0x41, 0x00], [0x14, 0x14, 0x14, 0x14, 0x14], // '<' '='
    [0x00, 0x41, 0x22, 0x14, 0x08], [0x02, 0x01, 0x51, 0x09, 0x06], // '>' '?'
    [0x32, 0x49, 0x79, 0x41, 0x3E], [0x7E, 0x11, 0x11, 0x11, 0x7E], // '@' 'A'
    [0x7F, 0x49, 0x49, 0x49, 0x36], [0x3E, 0x41, 0x41, 0x41, 0x22], // 'B' 'C'
    [0x7F, 0x41, 0x41, 0x22, 0x1C], [0x7F, 0x49, 0x49, 0x49, 0x41], // 'D' 'E'
    [0x7F, 0x09, 0x09, 0x09, 0x01], [0x3E, 0x41, 0x49, 0x49, 0x7A], // 'F' 'G'
    [0x7F, 0x08, 0x08, 0x08, 0x7F], [0x00, 0x41, 0x7F, 0x41, 0x00], // 'H' 'I'
    [0x20, 0x40, 0x41, 0x3F, 0x01], [0x7F, 0x08, 0x14, 0x22, 0x41], // 'J' 'K'
    [0x7F, 0x40, 0x40, 0x40, 0x40], [0x7F, 0x02, 0x0C, 0x02, 0x7F], // 'L' 'M'
    [0x7F, 0x04, 0x08, 0x10, 0x7F], [0x3E, 0x41, 0x41, 0x41, 0x3E], // 'N' 'O'
    [0x7F, 0x09, 0x09, 0x09, 0x06], [0x3E, 0x41, 0x51, 0x21, 0x5E], // 'P' 'Q'
    [0x7F, 0x09, 0x19, 0x29, 0x46], [0x46, 0x49, 0x49, 0x49, 0x31], // 'R' 'S'
    [0x01, 0x01, 0x7F, 0x01, 0x01], [0x3F, 0x40, 0x40, 0x40, 0x3F], // 'T' 'U'
    [0x1F, 0x20, 0x40, 0x20, 0x1F], [0x3F, 0x40, 0x38, 0x40, 0x3F], // 'V' 'W'
    [0x63, 0x14, 0x08, 0x14, 0x63], [0x07, 0x08, 0x70, 0x08, 0x07], // 'X' 'Y'
    [0x61, 0x51, 0x49, 0x45, 0x43], [0x00, 0x7F, 0x41, 0x41, 0x00], // 'Z' '['
    [0x02, 0x04, 0x08, 0x10, 0x20], [0x00, 0x41, 0x41, 0x7F, 0x00], // '\' ']'
    [0x04, 0x02, 0x01, 0x02, 0x04], [0x40, 0x40, 0x40, 0x40, 0x40], // '^' '_'
    [0x00, 0x01, 0x02, 0x04, 0x00], [0x20, 0x54, 0x54, 0x54, 0x78], // '`' 'a'
    [0x7F, 0x48, 0x44, 0x44, 0x38], [0x38, 0x44, 0x44, 0x44, 0x20], // 'b' 'c'
    [0x38, 0x44, 0x44, 0x48, 0x7F], [0x38, 0x54, 0x54, 0x54, 0x18], // 'd' 'e'
    [0x08, 0x7E, 0x09, 0x01, 0x02], [0x0C, 0x52, 0x52, 0x52, 0x3E], // 'f' 'g'
    [0x7F, 0x08, 0x04, 0x04, 0x78], [0x00, 0x44, 0x7D, 0x40, 0x00], // 'h' 'i'
    [0x20, 0x40, 0x44, 0x3D, 0x00], [0x7F, 0x10, 0x28, 0x44, 0x00], // 'j' 'k'
    [0x00, 0x41, 0x7F, 0x40, 0x00], [0x7C, 0x04, 0x18, 0x04, 0x78], // 'l' 'm'
    [0x7C, 0x08, 0x04, 0x04, 0x78], [0x38, 0x44, 0x44, 0x44, 0x38], // 'n' 'o'
    [0x7C, 0x14, 0x14, 0x14, 0x08], [0x08, 0x14, 0x14, 0x18, 0x7C], // 'p' 'q'
    [0x7C, 0x08, 0x04, 0x04, 0x08], [0x48, 0x54, 0x54, 0x54, 0x20], // 'r' 's'
    [0x04, 0x3F, 0x44, 0x40, 0x20], [0x3C, 0x40, 0x40, 0x20, 0x7C], // 't' 'u'
    [0x1C, 0x20, 0x40, 0x20, 0x1C], [0x3C, 0x40, 0x30, 0x40, 0x3C], // 'v' 'w'
    [0x44, 0x28, 0x10, 0x28, 0x44], [0x0C, 0x50, 0x50, 0x50, 0x3C], // 'x' 'y'
    [0x44, 0x64, 0x54, 0x4C, 0x44], [0x00, 0x08, 0x36, 0x41, 0x00], // 'z' '{'
    [0x00, 0x00, 0x7F, 0x00, 0x00], [0x00, 0x41, 0x36, 0x08, 0x00], // '|' '}'
    [0x08, 0x04, 0x08, 0x10, 0x08],                                 // '~'
];

/// Built-in 5x7 bitmap font, integer-scaled.
#[derive(Clone, Copy, Debug)]
pub struct BitmapFont {
    scale: u32,
}

impl BitmapFont {
    pub fn new(scale: u32) -> Self {
        Self {
            scale: scale.max(1),
        }
    }

    fn glyph(ch: char) -> &'static [u8; 5] {
        let code = ch as u32;
        if (FIRST_GLYPH as u32..=0x7E).contains(&code) {
            &GLYPHS[(code - FIRST_GLYPH as u32) as usize]
        } else {
            &GLYPHS[(b'?' - FIRST_GLYPH) as usize]
        }
    }

    fn advance(&self) -> u32 {
        (GLYPH_W + 1) * self.scale
    }
}

impl Default for BitmapFont {
    fn default() -> Self {
        Self::new(1)
    }
}

impl LabelFont for BitmapFont {
    fn text_size(&self, text: &str) -> (u32, u32) {
        let count = text.chars().count() as u32;
        if count == 0 {
            return (0, 0);
        }
        // No spacing column after the last glyph.
        (count * self.advance() - self.scale, GLYPH_H * self.scale)
    }

    fn draw_text(&self, canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, text: &str) {
        let (width, height) = (canvas.width() as i64, canvas.height() as i64);
        let scale = self.scale as i64;
        for (index, ch) in text.chars().enumerate() {
            let origin_x = x as i64 + index as i64 * self.advance() as i64;
            for (col, bits) in Self::glyph(ch).iter().enumerate() {
                for row in 0..GLYPH_H as i64 {
                    if bits & (1 << row) == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let px = origin_x + col as i64 * scale + dx;
                            let py = y as i64 + row * scale + dy;
                            if px >= 0 && py >= 0 && px < width && py < height {
                                canvas.put_pixel(px as u32, py as u32, color);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// TrueType/OpenType font rendered through imageproc.
pub struct TrueTypeFont {
    font: FontVec,
    scale: PxScale,
}

impl TrueTypeFont {
    pub fn from_bytes(bytes: Vec<u8>, px_height: f32) -> Result<Self> {
        let font = FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font: {}", e))?;
        Ok(Self {
            font,
            scale: PxScale::from(px_height),
        })
    }

    pub fn load<P: AsRef<Path>>(path: P, px_height: f32) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
        Self::from_bytes(bytes, px_height).with_context(|| format!("loading {}", path.display()))
    }
}

impl LabelFont for TrueTypeFont {
    fn text_size(&self, text: &str) -> (u32, u32) {
        imageproc::drawing::text_size(self.scale, &self.font, text)
    }

    fn draw_text(&self, canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, text: &str) {
        imageproc::drawing::draw_text_mut(canvas, color, x, y, self.scale, &self.font, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_metrics_scale_linearly() {
        let font = BitmapFont::new(2);
        assert_eq!(font.text_size(""), (0, 0));
        assert_eq!(font.text_size("a"), (10, 14));
        assert_eq!(font.text_size("cat: 0.91"), (9 * 12 - 2, 14));
    }

    #[test]
    fn bitmap_draw_stays_inside_measured_box() {
        let font = BitmapFont::new(1);
        let mut canvas = RgbImage::new(40, 20);
        let (w, h) = font.text_size("dog: 0.50");
        font.draw_text(&mut canvas, Rgb([255, 255, 255]), 2, 3, "dog: 0.50");

        let mut lit = 0;
        for (x, y, px) in canvas.enumerate_pixels() {
            if px.0 != [0, 0, 0] {
                lit += 1;
                assert!(x >= 2 && x < 2 + w, "x {} outside", x);
                assert!(y >= 3 && y < 3 + h, "y {} outside", y);
            }
        }
        assert!(lit > 0);
    }

    #[test]
    fn bitmap_draw_clips_off_canvas() {
        let font = BitmapFont::new(3);
        let mut canvas = RgbImage::new(8, 8);
        font.draw_text(&mut canvas, Rgb([255, 0, 0]), -10, -10, "WWW");
        font.draw_text(&mut canvas, Rgb([255, 0, 0]), 6, 6, "WWW");
    }

    #[test]
    fn unknown_characters_fall_back() {
        assert_eq!(BitmapFont::glyph('é'), BitmapFont::glyph('?'));
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        assert!(TrueTypeFont::from_bytes(vec![0, 1, 2, 3], 12.0).is_err());
    }
}
