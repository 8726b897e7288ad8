//! External collaborator contracts: the drawing surface and the sizing host.
//!
//! The core renders through [`RenderSurface`] — a pixel-addressable 2D raster
//! (or anything that can pretend to be one) offering background fill, font
//! selection, single-glyph measurement, and alpha-composited glyph drawing.
//! [`SizingHost`] supplies the dimensions, device pixel ratio, reduced-motion
//! preference, and resize-watch bookkeeping the engine needs but does not own.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use crate::options::SizeMode;

pub trait RenderSurface {
    /// Reallocate the backing store to `width` x `height` physical pixels and
    /// record the CSS-px → physical-px `scale`. All later draw coordinates
    /// are CSS px. Fallible: allocation or transform setup can be refused.
    fn set_physical_size(&mut self, width: u32, height: u32, scale: f32) -> Result<()>;

    /// Fill the whole surface with an opaque color.
    fn clear(&mut self, color: [u8; 4]);

    /// Select the monospace font size used for subsequent measurement and
    /// drawing.
    fn set_font_px(&mut self, font_px: f32);

    /// Advance width of a single reference glyph, in CSS px.
    fn glyph_advance(&self, reference: char) -> f32;

    /// Draw one glyph with its top-left at `(x, y)` CSS px, composited with
    /// `alpha` in [0, 1].
    fn fill_text(&mut self, glyph: char, x: f32, y: f32, color: [u8; 4], alpha: f32);
}

pub trait SizingHost {
    /// Viewport dimensions in CSS px (window sizing mode).
    fn viewport_size(&self) -> (f32, f32);

    /// Host-element bounds in CSS px (element sizing mode). `None` when the
    /// host has no element-bounds reporting; the engine then keeps its last
    /// known size instead of failing.
    fn element_size(&self) -> Option<(f32, f32)>;

    /// Physical pixels per CSS px; hosts without the notion report 1.
    fn device_pixel_ratio(&self) -> f32;

    /// System reduced-motion preference. Sampled once at engine
    /// construction, not re-polled.
    fn prefers_reduced_motion(&self) -> bool;

    /// Attach the resize observation appropriate to `mode`. Replaces any
    /// previous watch.
    fn watch_resize(&mut self, mode: SizeMode);

    /// Detach the resize observation, if any.
    fn unwatch_resize(&mut self);
}

/// A host with fixed dimensions: what a headless driver (CLI render loop,
/// tests, benches) stands in front of instead of a window system.
#[derive(Debug, Clone)]
pub struct FixedHost {
    width: f32,
    height: f32,
    dpr: f32,
    reduced_motion: bool,
    element: Option<(f32, f32)>,
    watching: Option<SizeMode>,
}

impl FixedHost {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            dpr: 1.0,
            reduced_motion: false,
            element: None,
            watching: None,
        }
    }

    pub fn with_dpr(mut self, dpr: f32) -> Self {
        self.dpr = dpr;
        self
    }

    pub fn with_reduced_motion(mut self, reduced: bool) -> Self {
        self.reduced_motion = reduced;
        self
    }

    /// Simulate a viewport change; the driver still has to call
    /// `Engine::resize` to propagate it, exactly like a host resize event.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    /// Provide (or withdraw) element bounds for element sizing mode.
    pub fn set_element_size(&mut self, size: Option<(f32, f32)>) {
        self.element = size;
    }

    /// The currently attached resize watch, if any.
    pub fn watching(&self) -> Option<SizeMode> {
        self.watching
    }
}

impl SizingHost for FixedHost {
    fn viewport_size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn element_size(&self) -> Option<(f32, f32)> {
        self.element
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.dpr
    }

    fn prefers_reduced_motion(&self) -> bool {
        self.reduced_motion
    }

    fn watch_resize(&mut self, mode: SizeMode) {
        self.watching = Some(mode);
    }

    fn unwatch_resize(&mut self) {
        self.watching = None;
    }
}

/// Shared-handle forwarding: the engine owns a `Box<dyn RenderSurface>`, and
/// drivers that need to read frames back (print text, save PNGs, assert in
/// tests) hand it an `Rc<RefCell<...>>` clone and keep the other handle.
impl<S: RenderSurface> RenderSurface for Rc<RefCell<S>> {
    fn set_physical_size(&mut self, width: u32, height: u32, scale: f32) -> Result<()> {
        self.borrow_mut().set_physical_size(width, height, scale)
    }

    fn clear(&mut self, color: [u8; 4]) {
        self.borrow_mut().clear(color);
    }

    fn set_font_px(&mut self, font_px: f32) {
        self.borrow_mut().set_font_px(font_px);
    }

    fn glyph_advance(&self, reference: char) -> f32 {
        self.borrow().glyph_advance(reference)
    }

    fn fill_text(&mut self, glyph: char, x: f32, y: f32, color: [u8; 4], alpha: f32) {
        self.borrow_mut().fill_text(glyph, x, y, color, alpha);
    }
}

impl<H: SizingHost> SizingHost for Rc<RefCell<H>> {
    fn viewport_size(&self) -> (f32, f32) {
        self.borrow().viewport_size()
    }

    fn element_size(&self) -> Option<(f32, f32)> {
        self.borrow().element_size()
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.borrow().device_pixel_ratio()
    }

    fn prefers_reduced_motion(&self) -> bool {
        self.borrow().prefers_reduced_motion()
    }

    fn watch_resize(&mut self, mode: SizeMode) {
        self.borrow_mut().watch_resize(mode);
    }

    fn unwatch_resize(&mut self) {
        self.borrow_mut().unwatch_resize();
    }
}
