//! Frame driver and lifecycle state machine.
//!
//! The engine owns the configuration snapshot, the auto-level bounds, and the
//! derived glyph metrics; it borrows everything else (surface, sizing host,
//! frame scheduler) through the collaborator traits. Each tick is one bounded
//! synchronous pass over the glyph grid:
//!
//! cell → wobble/drift offset → domain warp → fbm → tonemap → composited glyph
//!
//! A frame reads one options snapshot taken at its start; patches and resizes
//! land between frames, never mid-scan.

use std::f64::consts::TAU;

use anyhow::{bail, Context, Result};

use crate::noise::{domain_warp, fbm_2d, FbmParams};
use crate::options::{parse_hex_color, DanceOptions, OptionsPatch, SizeMode};
use crate::scheduler::FrameScheduler;
use crate::surface::{RenderSurface, SizingHost};
use crate::tonemap::{tonemap, AutoLevel, ToneParams};

/// Glyph row height as a multiple of the font size. Width comes from
/// measuring the reference glyph; height is this fixed line factor.
const LINE_HEIGHT_FACTOR: f32 = 1.35;

/// Reference glyph for advance measurement.
const MEASURE_GLYPH: char = 'M';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
    /// Terminal; no transitions out.
    Destroyed,
}

pub struct Engine {
    surface: Box<dyn RenderSurface>,
    host: Box<dyn SizingHost>,
    scheduler: Box<dyn FrameScheduler>,
    options: DanceOptions,
    levels: AutoLevel,
    state: EngineState,
    prefers_reduced: bool,
    bg: [u8; 4],
    fg: [u8; 4],
    css_width: f32,
    css_height: f32,
    glyph_width: f32,
    glyph_height: f32,
}

impl Engine {
    /// Build an engine over an acquired surface. Fails synchronously when the
    /// configuration is invalid or the surface refuses its initial
    /// allocation; no partial engine is returned. The host's reduced-motion
    /// preference is sampled here, once.
    pub fn new(
        surface: Box<dyn RenderSurface>,
        host: Box<dyn SizingHost>,
        scheduler: Box<dyn FrameScheduler>,
        options: DanceOptions,
    ) -> Result<Self> {
        options.validate().context("invalid engine options")?;
        let prefers_reduced = options.reduced_motion_fallback && host.prefers_reduced_motion();
        let mut engine = Self {
            surface,
            host,
            scheduler,
            bg: parse_hex_color(&options.bg)?,
            fg: parse_hex_color(&options.fg)?,
            options,
            levels: AutoLevel::new(),
            state: EngineState::Stopped,
            prefers_reduced,
            css_width: 1.0,
            css_height: 1.0,
            glyph_width: 8.0,
            glyph_height: 16.0,
        };
        engine
            .resize()
            .context("failed to acquire rendering surface")?;
        Ok(engine)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Current configuration, read-only.
    pub fn options(&self) -> &DanceOptions {
        &self.options
    }

    /// Derived glyph cell (width, height) in CSS px.
    pub fn glyph_metrics(&self) -> (f32, f32) {
        (self.glyph_width, self.glyph_height)
    }

    /// Whether a frame callback is outstanding with the scheduler.
    pub fn frame_pending(&self) -> bool {
        self.scheduler.pending()
    }

    /// Attach resize observation for the current sizing mode and schedule the
    /// first frame. No-op unless `Stopped`.
    pub fn start(&mut self) {
        if self.state != EngineState::Stopped {
            return;
        }
        self.state = EngineState::Running;
        self.host.watch_resize(self.options.size_mode);
        self.scheduler.schedule();
    }

    /// Cancel the scheduled frame and detach resize observation. Idempotent.
    pub fn stop(&mut self) {
        if self.state != EngineState::Running {
            return;
        }
        self.state = EngineState::Stopped;
        self.scheduler.cancel();
        self.host.unwatch_resize();
    }

    /// Stop and transition to the terminal state. Idempotent.
    pub fn destroy(&mut self) {
        if self.state == EngineState::Destroyed {
            return;
        }
        self.stop();
        self.state = EngineState::Destroyed;
    }

    /// Merge a partial update into a fresh snapshot and swap it in. Font or
    /// palette changes re-derive glyph metrics; a sizing-mode change rewires
    /// the resize watch and triggers an immediate resize; an explicit
    /// `auto_level` field resets the EMA bounds. Rejected patches leave the
    /// live options untouched.
    pub fn update(&mut self, patch: &OptionsPatch) -> Result<()> {
        if self.state == EngineState::Destroyed {
            bail!("cannot update a destroyed engine");
        }

        let next = patch.apply(&self.options);
        next.validate().context("invalid options patch")?;

        let font_changed = next.font_px != self.options.font_px;
        let palette_changed = next.palette != self.options.palette;
        let mode_changed = next.size_mode != self.options.size_mode;

        self.bg = parse_hex_color(&next.bg)?;
        self.fg = parse_hex_color(&next.fg)?;
        self.options = next;

        if font_changed || palette_changed {
            self.refresh_metrics();
        }
        if mode_changed {
            if self.state == EngineState::Running {
                self.host.unwatch_resize();
                self.host.watch_resize(self.options.size_mode);
            }
            self.resize()?;
        }
        if patch.auto_level.is_some() {
            self.levels.reset();
        }
        Ok(())
    }

    /// Re-read device pixel scaling and CSS dimensions from the host,
    /// reallocate the physical surface, and re-derive glyph metrics. Safe to
    /// call in any state, including before the first frame.
    pub fn resize(&mut self) -> Result<()> {
        let dpr = self.host.device_pixel_ratio().max(1.0);
        let (css_w, css_h) = match self.options.size_mode {
            SizeMode::Window => self.host.viewport_size(),
            // No element-bounds reporting: degrade to the last known size.
            SizeMode::Element => self
                .host
                .element_size()
                .unwrap_or((self.css_width, self.css_height)),
        };
        self.css_width = css_w.max(1.0);
        self.css_height = css_h.max(1.0);

        let width = ((self.css_width * dpr).floor() as u32).max(1);
        let height = ((self.css_height * dpr).floor() as u32).max(1);
        self.surface
            .set_physical_size(width, height, dpr)
            .context("failed to size rendering surface")?;
        self.refresh_metrics();
        Ok(())
    }

    /// Deliver one frame callback. Renders only while `Running` and only if a
    /// frame request is actually outstanding (a cancelled frame never
    /// renders), then schedules the next.
    pub fn tick(&mut self, elapsed_ms: f64) {
        if self.state != EngineState::Running || !self.scheduler.consume() {
            return;
        }
        self.render_frame(elapsed_ms);
        self.scheduler.schedule();
    }

    fn refresh_metrics(&mut self) {
        self.surface.set_font_px(self.options.font_px);
        self.glyph_width = self.surface.glyph_advance(MEASURE_GLYPH).max(1.0);
        self.glyph_height = (self.options.font_px * LINE_HEIGHT_FACTOR).max(1.0);
    }

    fn render_frame(&mut self, elapsed_ms: f64) {
        // Frame-start snapshot; the scan below never re-reads live state.
        let o = self.options.clone();
        let palette = o.palette_chars();
        let t = elapsed_ms * 0.001;

        // Under reduced motion every term driving field evolution freezes so
        // the field is static; drift and wobble still read the real clock.
        let field_t = if self.prefers_reduced { 0.0 } else { t };
        let time_factor = o.speed * 60.0;
        let base = FbmParams {
            seed: o.seed,
            cell_size: o.cell_size,
            octaves: o.octaves,
            lacunarity: o.lacunarity,
            gain: o.gain,
        };
        let tone = ToneParams {
            auto_level: o.auto_level,
            auto_level_decay: o.auto_level_decay,
            plateau_steps: o.plateau_steps,
            gamma: o.gamma,
            contrast: o.contrast,
            invert: o.invert,
        };

        self.surface.clear(self.bg);

        let mut y = 0.0_f32;
        while y < self.css_height {
            let yf = f64::from(y);
            // Row-coherent motion: sinusoidal wobble plus one-way drift.
            // Both keep animating under reduced motion by design; only the
            // field evolution freezes.
            let wobble = o.wobble_amp * (TAU * o.wobble_freq * t + yf * 0.0125).sin();
            let drift = o.drift_amp * t;
            let phase = field_t + (yf * 0.002).sin() * 0.35;

            let mut x = 0.0_f32;
            while x < self.css_width {
                let wx = (f64::from(x) + wobble + drift) * o.scale;
                let wy = yf * o.scale;

                let (sx, sy) = domain_warp(
                    wx + phase.sin() * 0.3,
                    wy + (phase * 0.8).cos() * 0.3,
                    field_t,
                    o.warp_amp,
                    o.warp_freq,
                    o.seed,
                    o.cell_size,
                );

                let v = fbm_2d(
                    sx + field_t * time_factor * 0.12,
                    sy - field_t * time_factor * 0.1,
                    &base,
                );

                let shade = tonemap(v, &palette, &tone, &mut self.levels);
                let alpha = (o.opacity_base + o.opacity_var * shade.weight).clamp(0.0, 1.0);
                self.surface
                    .fill_text(shade.glyph, x, y, self.fg, alpha as f32);

                x += self.glyph_width;
            }
            y += self.glyph_height;
        }
    }
}
