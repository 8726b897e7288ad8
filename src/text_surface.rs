//! Glyph-op recording surface.
//!
//! Records every draw call of a frame and can lay the frame back out as text
//! lines — the backend behind terminal playback, determinism tests, and the
//! render bench. Opacity is recorded per op but dropped when flattening to
//! text; a character grid has no alpha channel.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::surface::RenderSurface;

/// Advance width relative to the font size for the built-in monospace
/// metrics. Every printable glyph reports the same advance.
const ADVANCE_FACTOR: f32 = 0.6;

/// One recorded `fill_text` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphOp {
    pub glyph: char,
    pub x: f32,
    pub y: f32,
    pub alpha: f32,
}

#[derive(Debug, Clone)]
pub struct TextSurface {
    width: u32,
    height: u32,
    scale: f32,
    font_px: f32,
    background: [u8; 4],
    ops: Vec<GlyphOp>,
}

impl TextSurface {
    pub fn new() -> Self {
        Self {
            width: 1,
            height: 1,
            scale: 1.0,
            font_px: 12.0,
            background: [0, 0, 0, 255],
            ops: Vec::new(),
        }
    }

    /// Draw calls recorded since the last clear, in draw order.
    pub fn ops(&self) -> &[GlyphOp] {
        &self.ops
    }

    /// Background color of the last clear.
    pub fn background(&self) -> [u8; 4] {
        self.background
    }

    pub fn physical_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Flatten the recorded ops into text lines: ops grouped into rows by
    /// their y coordinate, ordered left to right, one line per row, trailing
    /// newline. Engine scans emit cell-origin coordinates, so exact float
    /// grouping is sufficient.
    pub fn to_text(&self) -> String {
        let mut rows: BTreeMap<u32, BTreeMap<u32, char>> = BTreeMap::new();
        for op in &self.ops {
            // Coordinates are non-negative cell origins; the bit pattern of a
            // non-negative f32 orders the same way the value does.
            rows.entry(op.y.to_bits())
                .or_default()
                .insert(op.x.to_bits(), op.glyph);
        }

        let mut text = String::new();
        for row in rows.values() {
            text.extend(row.values());
            text.push('\n');
        }
        text
    }
}

impl Default for TextSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface for TextSurface {
    fn set_physical_size(&mut self, width: u32, height: u32, scale: f32) -> Result<()> {
        self.width = width;
        self.height = height;
        self.scale = scale;
        self.ops.clear();
        Ok(())
    }

    fn clear(&mut self, color: [u8; 4]) {
        self.background = color;
        self.ops.clear();
    }

    fn set_font_px(&mut self, font_px: f32) {
        self.font_px = font_px;
    }

    fn glyph_advance(&self, _reference: char) -> f32 {
        self.font_px * ADVANCE_FACTOR
    }

    fn fill_text(&mut self, glyph: char, x: f32, y: f32, _color: [u8; 4], alpha: f32) {
        self.ops.push(GlyphOp { glyph, x, y, alpha });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_flatten_into_row_ordered_text() {
        let mut surface = TextSurface::new();
        surface.clear([0, 0, 0, 255]);
        // Drawn out of order on purpose.
        surface.fill_text('b', 7.2, 0.0, [255; 4], 1.0);
        surface.fill_text('a', 0.0, 0.0, [255; 4], 1.0);
        surface.fill_text('c', 0.0, 16.2, [255; 4], 0.5);
        assert_eq!(surface.to_text(), "ab\nc\n");
    }

    #[test]
    fn clear_discards_previous_frame() {
        let mut surface = TextSurface::new();
        surface.fill_text('x', 0.0, 0.0, [255; 4], 1.0);
        surface.clear([10, 17, 24, 255]);
        assert!(surface.ops().is_empty());
        assert_eq!(surface.background(), [10, 17, 24, 255]);
        assert_eq!(surface.to_text(), "");
    }

    #[test]
    fn advance_scales_with_font_size() {
        let mut surface = TextSurface::new();
        surface.set_font_px(12.0);
        let small = surface.glyph_advance('M');
        surface.set_font_px(20.0);
        let large = surface.glyph_advance('M');
        assert!(large > small);
    }
}
