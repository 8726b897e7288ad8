//! Raster surface: tiny-skia pixmap + fontdue glyph rasterization.
//!
//! Drawing happens in CSS px; the surface applies the device-pixel scale
//! itself (glyphs are rasterized at `font_px * scale` and placed at scaled
//! coordinates). Coverage masks are cached per (glyph, rasterized size).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};
use tiny_skia::{Color, Pixmap};

struct CachedGlyph {
    metrics: fontdue::Metrics,
    coverage: Vec<u8>,
}

pub struct PixmapSurface {
    font: Font,
    pixmap: Pixmap,
    scale: f32,
    font_px: f32,
    ascent: f32,
    glyph_cache: HashMap<(char, u32), CachedGlyph>,
}

impl PixmapSurface {
    /// Acquire the surface: read and parse the monospace font, allocate a
    /// minimal pixmap. Either failure is an initialization error.
    pub fn new(font_path: &Path) -> Result<Self> {
        let font_bytes = fs::read(font_path)
            .with_context(|| format!("failed to read font file {}", font_path.display()))?;
        let font = Font::from_bytes(font_bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font {}: {error}", font_path.display()))?;
        let pixmap = Pixmap::new(1, 1).context("failed to create pixmap")?;
        let mut surface = Self {
            font,
            pixmap,
            scale: 1.0,
            font_px: 12.0,
            ascent: 12.0,
            glyph_cache: HashMap::new(),
        };
        surface.refresh_ascent();
        Ok(surface)
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Raw RGBA bytes of the current frame.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        image::save_buffer(
            path,
            self.pixmap.data(),
            self.pixmap.width(),
            self.pixmap.height(),
            image::ExtendedColorType::Rgba8,
        )
        .with_context(|| format!("failed to write {}", path.display()))
    }

    fn refresh_ascent(&mut self) {
        let px = self.font_px * self.scale;
        self.ascent = self
            .font
            .horizontal_line_metrics(px)
            .map(|metrics| metrics.ascent)
            .unwrap_or(px);
    }
}

impl crate::surface::RenderSurface for PixmapSurface {
    fn set_physical_size(&mut self, width: u32, height: u32, scale: f32) -> Result<()> {
        self.pixmap = Pixmap::new(width.max(1), height.max(1)).context("failed to create pixmap")?;
        self.scale = scale.max(1.0);
        self.glyph_cache.clear();
        self.refresh_ascent();
        Ok(())
    }

    fn clear(&mut self, color: [u8; 4]) {
        self.pixmap
            .fill(Color::from_rgba8(color[0], color[1], color[2], 255));
    }

    fn set_font_px(&mut self, font_px: f32) {
        self.font_px = font_px.max(1.0);
        self.refresh_ascent();
    }

    fn glyph_advance(&self, reference: char) -> f32 {
        self.font.metrics(reference, self.font_px).advance_width
    }

    fn fill_text(&mut self, glyph: char, x: f32, y: f32, color: [u8; 4], alpha: f32) {
        if glyph == ' ' || alpha <= 0.0 {
            return;
        }
        let px = self.font_px * self.scale;
        let cached = self
            .glyph_cache
            .entry((glyph, px.to_bits()))
            .or_insert_with(|| {
                let (metrics, coverage) = self.font.rasterize(glyph, px);
                CachedGlyph { metrics, coverage }
            });
        if cached.metrics.width == 0 || cached.metrics.height == 0 {
            return;
        }

        // Top-aligned cell origin → baseline, then bitmap placement from the
        // glyph's bearing.
        let baseline = y * self.scale + self.ascent;
        let left = (x * self.scale).round() as i32 + cached.metrics.xmin;
        let top = (baseline - (cached.metrics.height as f32 + cached.metrics.ymin as f32)).round()
            as i32;

        let alpha_u8 = (alpha.min(1.0) * 255.0).round() as u8;
        let width = self.pixmap.width();
        let height = self.pixmap.height();
        blend_glyph(
            self.pixmap.data_mut(),
            width,
            height,
            left,
            top,
            cached.metrics.width,
            cached.metrics.height,
            &cached.coverage,
            color,
            alpha_u8,
        );
    }
}

fn blend_glyph(
    frame: &mut [u8],
    frame_width: u32,
    frame_height: u32,
    x: i32,
    y: i32,
    glyph_width: usize,
    glyph_height: usize,
    coverage: &[u8],
    color: [u8; 4],
    alpha: u8,
) {
    for row in 0..glyph_height {
        let py = y + row as i32;
        if py < 0 || py >= frame_height as i32 {
            continue;
        }
        for col in 0..glyph_width {
            let px = x + col as i32;
            if px < 0 || px >= frame_width as i32 {
                continue;
            }
            let mask = coverage[row * glyph_width + col];
            if mask == 0 {
                continue;
            }
            let src_alpha = ((u16::from(mask) * u16::from(alpha)) / 255) as u8;
            let idx = ((py as u32 * frame_width + px as u32) * 4) as usize;
            blend_pixel(frame, idx, [color[0], color[1], color[2], src_alpha]);
        }
    }
}

fn blend_pixel(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    if alpha == 0 {
        return;
    }
    let inv_alpha = 255_u16.saturating_sub(alpha);
    for channel in 0..3 {
        let dst = u16::from(frame[idx + channel]);
        let src_c = u16::from(src[channel]);
        frame[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    frame[idx + 3] = 255;
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn missing_font_is_an_initialization_error() {
        let result = PixmapSurface::new(Path::new("/no/such/font.ttf"));
        assert!(result.is_err());
    }

    #[test]
    fn blend_pixel_replaces_at_full_alpha_and_skips_at_zero() {
        let mut frame = vec![10_u8, 20, 30, 255];
        blend_pixel(&mut frame, 0, [200, 100, 50, 255]);
        assert_eq!(&frame[..3], &[200, 100, 50]);

        let mut frame = vec![10_u8, 20, 30, 255];
        blend_pixel(&mut frame, 0, [200, 100, 50, 0]);
        assert_eq!(&frame[..3], &[10, 20, 30]);
    }

    #[test]
    fn blend_pixel_mixes_at_half_alpha() {
        let mut frame = vec![0_u8, 0, 0, 255];
        blend_pixel(&mut frame, 0, [255, 255, 255, 128]);
        // (255*128 + 0*127 + 127) / 255 = 128
        assert_eq!(&frame[..3], &[128, 128, 128]);
    }

    #[test]
    fn blend_glyph_clips_outside_the_frame() {
        let mut frame = vec![0_u8; 4 * 4 * 4];
        let coverage = vec![255_u8; 3 * 3];
        // Partially off the top-left corner; must not panic or wrap.
        blend_glyph(&mut frame, 4, 4, -1, -1, 3, 3, &coverage, [255, 255, 255, 255], 255);
        // Only the 2x2 in-frame part was touched.
        let red_at = |x: usize, y: usize| frame[(y * 4 + x) * 4];
        assert_eq!(red_at(0, 0), 255);
        assert_eq!(red_at(1, 1), 255);
        assert_eq!(red_at(2, 2), 0);
    }
}
