//! Puzzle image rendering.
//!
//! Each character is drawn on its own transparent tile in a random colour,
//! tilted, and composited onto a pale background; noise lines and specks are
//! scattered on top. Glyphs come from a TrueType font when one is
//! configured, otherwise from built-in stroke outlines.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use rand::Rng;
use rusttype::{Font, Scale, point};
use std::io::Cursor;

use gatekeeper_common::{Difficulty, GatekeeperError};

const TILE_WIDTH: u32 = 44;
const TILE_HEIGHT: u32 = 64;
const PADDING: u32 = 16;
/// Horizontal advance per glyph, tiles overlap slightly
const ADVANCE: u32 = 36;
const SPACE_ADVANCE: u32 = 14;

/// Line segment in unit glyph coordinates: x in [0, 1] left to right, y top to bottom
type Stroke = ((f32, f32), (f32, f32));

// Seven-segment parts
const A: Stroke = ((0.0, 0.0), (1.0, 0.0));
const B: Stroke = ((1.0, 0.0), (1.0, 0.5));
const C: Stroke = ((1.0, 0.5), (1.0, 1.0));
const D: Stroke = ((0.0, 1.0), (1.0, 1.0));
const E: Stroke = ((0.0, 0.5), (0.0, 1.0));
const F: Stroke = ((0.0, 0.0), (0.0, 0.5));
const G: Stroke = ((0.0, 0.5), (1.0, 0.5));

fn strokes(c: char) -> Option<&'static [Stroke]> {
    let strokes: &'static [Stroke] = match c {
        '0' => &[A, B, C, D, E, F],
        '1' => &[B, C],
        '2' => &[A, B, G, E, D],
        '3' => &[A, B, G, C, D],
        '4' => &[F, G, B, C],
        '5' => &[A, F, G, C, D],
        '6' => &[A, F, G, E, D, C],
        '7' => &[A, B, C],
        '8' => &[A, B, C, D, E, F, G],
        '9' => &[A, B, C, D, F, G],
        '+' => &[((0.5, 0.2), (0.5, 0.8)), ((0.15, 0.5), (0.85, 0.5))],
        '-' => &[((0.15, 0.5), (0.85, 0.5))],
        'x' => &[((0.2, 0.3), (0.8, 0.8)), ((0.8, 0.3), (0.2, 0.8))],
        '=' => &[((0.15, 0.38), (0.85, 0.38)), ((0.15, 0.62), (0.85, 0.62))],
        '?' => &[A, B, ((1.0, 0.5), (0.5, 0.5)), ((0.5, 0.5), (0.5, 0.78)), ((0.5, 0.92), (0.5, 1.0))],
        _ => return None,
    };
    Some(strokes)
}

pub struct Renderer {
    font: Option<Font<'static>>,
}

impl Renderer {
    /// Load the optional font; a configured but unreadable font is an error
    pub fn new(font_path: Option<&str>) -> Result<Self, GatekeeperError> {
        let font = match font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .map_err(|e| GatekeeperError::Config(format!("font {path}: {e}")))?;
                let font = Font::try_from_vec(bytes)
                    .ok_or_else(|| GatekeeperError::Config(format!("font {path}: not a TrueType font")))?;
                tracing::info!(path = %path, "CAPTCHA font loaded");
                Some(font)
            }
            None => None,
        };
        Ok(Self { font })
    }

    /// Render `text` as a PNG
    pub fn render<R: Rng + ?Sized>(
        &self,
        text: &str,
        difficulty: Difficulty,
        rng: &mut R,
    ) -> Result<Vec<u8>, GatekeeperError> {
        let width = PADDING * 2
            + text
                .chars()
                .map(|c| if c == ' ' { SPACE_ADVANCE } else { ADVANCE })
                .sum::<u32>()
            + (TILE_WIDTH - ADVANCE);
        let height = TILE_HEIGHT + PADDING * 2;

        let background = Rgba([
            rng.random_range(225..=255),
            rng.random_range(225..=255),
            rng.random_range(225..=255),
            255,
        ]);
        let mut canvas = RgbaImage::from_pixel(width, height, background);

        let max_tilt = difficulty.max_tilt_degrees();
        let mut x = PADDING;
        for c in text.chars() {
            if c == ' ' {
                x += SPACE_ADVANCE;
                continue;
            }

            let color = glyph_color(rng);
            let tile = self.glyph_tile(c, color)?;
            let tilt = rng.random_range(-max_tilt..=max_tilt).to_radians();
            let tile = rotate_about_center(&tile, tilt, Interpolation::Bilinear, Rgba([0, 0, 0, 0]));

            let jitter = rng.random_range(-6..=6);
            imageops::overlay(&mut canvas, &tile, x as i64, PADDING as i64 + jitter);
            x += ADVANCE;
        }

        for _ in 0..difficulty.noise_lines() {
            let start = (rng.random_range(0.0..width as f32), rng.random_range(0.0..height as f32));
            let end = (rng.random_range(0.0..width as f32), rng.random_range(0.0..height as f32));
            draw_line_segment_mut(&mut canvas, start, end, glyph_color(rng));
        }
        for _ in 0..difficulty.noise_dots() {
            let center = (
                rng.random_range(0..width as i32),
                rng.random_range(0..height as i32),
            );
            draw_filled_circle_mut(&mut canvas, center, rng.random_range(0..=1), glyph_color(rng));
        }

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(canvas)
            .to_rgb8()
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| GatekeeperError::Captcha(format!("PNG encoding failed: {e}")))?;

        Ok(png)
    }

    fn glyph_tile(&self, c: char, color: Rgba<u8>) -> Result<RgbaImage, GatekeeperError> {
        let mut tile = RgbaImage::new(TILE_WIDTH, TILE_HEIGHT);
        match &self.font {
            Some(font) => draw_font_glyph(&mut tile, font, c, color),
            None => {
                let strokes = strokes(c)
                    .ok_or_else(|| GatekeeperError::Captcha(format!("no glyph for {c:?}")))?;
                draw_stroke_glyph(&mut tile, strokes, color);
            }
        }
        Ok(tile)
    }
}

/// Saturated, reasonably dark colour so glyphs stay legible on the background
fn glyph_color<R: Rng + ?Sized>(rng: &mut R) -> Rgba<u8> {
    let mut channels = [
        rng.random_range(0..=90),
        rng.random_range(0..=160),
        rng.random_range(60..=200),
    ];
    // Rotate so no channel is always the dominant one
    channels.rotate_left(rng.random_range(0..3));
    Rgba([channels[0], channels[1], channels[2], 255])
}

fn draw_stroke_glyph(tile: &mut RgbaImage, strokes: &[Stroke], color: Rgba<u8>) {
    let margin_x = 8.0;
    let margin_y = 8.0;
    let glyph_w = TILE_WIDTH as f32 - 2.0 * margin_x;
    let glyph_h = TILE_HEIGHT as f32 - 2.0 * margin_y;
    let thickness = 2i32;

    for &((x1, y1), (x2, y2)) in strokes {
        let start = (margin_x + x1 * glyph_w, margin_y + y1 * glyph_h);
        let end = (margin_x + x2 * glyph_w, margin_y + y2 * glyph_h);
        for dx in -thickness..=thickness {
            for dy in -thickness..=thickness {
                let (dx, dy) = (dx as f32, dy as f32);
                draw_line_segment_mut(tile, (start.0 + dx, start.1 + dy), (end.0 + dx, end.1 + dy), color);
            }
        }
    }
}

fn draw_font_glyph(tile: &mut RgbaImage, font: &Font<'static>, c: char, color: Rgba<u8>) {
    let scale = Scale::uniform(TILE_HEIGHT as f32 * 0.8);
    let ascent = font.v_metrics(scale).ascent;
    let glyph = font.glyph(c).scaled(scale).positioned(point(0.0, ascent));

    let Some(bounds) = glyph.pixel_bounding_box() else {
        return;
    };

    // Centre the glyph in the tile
    let offset_x = (TILE_WIDTH as i32 - bounds.width()) / 2;
    let offset_y = (TILE_HEIGHT as i32 - bounds.height()) / 2;

    glyph.draw(|gx, gy, coverage| {
        let px = offset_x + gx as i32;
        let py = offset_y + gy as i32;
        if px < 0 || py < 0 || px >= TILE_WIDTH as i32 || py >= TILE_HEIGHT as i32 {
            return;
        }
        let alpha = (coverage.clamp(0.0, 1.0) * 255.0) as u8;
        if alpha > 0 {
            tile.put_pixel(px as u32, py as u32, Rgba([color[0], color[1], color[2], alpha]));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_stroke_glyphs_cover_puzzle_alphabet() {
        for c in "0123456789+-x=?".chars() {
            assert!(strokes(c).is_some(), "missing glyph {c:?}");
        }
        assert!(strokes('A').is_none());
    }

    #[test]
    fn test_render_produces_png() {
        let renderer = Renderer::new(None).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let png = renderer.render("12 + 7 = ?", Difficulty::MAX, &mut rng).unwrap();
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!(decoded.height(), TILE_HEIGHT + PADDING * 2);
        assert!(decoded.width() > TILE_WIDTH * 5);
    }

    #[test]
    fn test_render_rejects_unknown_glyph() {
        let renderer = Renderer::new(None).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(renderer.render("AB", Difficulty::MIN, &mut rng).is_err());
    }

    #[test]
    fn test_missing_font_is_config_error() {
        let result = Renderer::new(Some("/nonexistent/font.ttf"));
        assert!(matches!(result, Err(GatekeeperError::Config(_))));
    }
}
