//! Engine configuration: the options record, partial patches, and manifest
//! loading.
//!
//! Options form an immutable snapshot. A patch is applied to a snapshot to
//! produce a new snapshot, so a frame already scanning the grid never observes
//! a half-merged record.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Where the engine reads its CSS-equivalent dimensions from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeMode {
    /// Whole-viewport dimensions, with a global resize watch.
    Window,
    /// Host-element bounds, with an element-bounds watch.
    Element,
}

impl Default for SizeMode {
    fn default() -> Self {
        Self::Window
    }
}

/// The full configuration record. Every field has a documented default, so a
/// manifest (or construction call) only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DanceOptions {
    // Look
    pub bg: String,
    pub fg: String,
    /// Glyph ramp ordered lightest → darkest. Must contain at least one char.
    pub palette: String,
    pub font_px: f32,
    pub contrast: f64,

    // Animation
    pub speed: f64,
    /// Spatial scale; higher values show finer detail.
    pub scale: f64,
    pub opacity_base: f64,
    pub opacity_var: f64,
    pub reduced_motion_fallback: bool,

    // Noise shaping
    pub seed: i32,
    pub cell_size: f64,
    pub octaves: u32,
    pub lacunarity: f64,
    pub gain: f64,
    pub plateau_steps: Option<u32>,
    pub warp_amp: f64,
    pub warp_freq: f64,

    // Motion
    pub drift_amp: f64,
    pub wobble_amp: f64,
    pub wobble_freq: f64,

    // Tonemapping
    pub auto_level: bool,
    pub auto_level_decay: f64,
    pub gamma: f64,
    pub invert: bool,

    // Sizing
    pub size_mode: SizeMode,
}

impl Default for DanceOptions {
    fn default() -> Self {
        Self {
            bg: "#0a1118".to_owned(),
            fg: "#91a4b4".to_owned(),
            palette: " .,:;=+*#%@".to_owned(),
            font_px: 12.0,
            contrast: 1.12,

            speed: 0.014,
            scale: 0.075,
            opacity_base: 0.45,
            opacity_var: 0.35,
            reduced_motion_fallback: true,

            seed: 1337,
            cell_size: 140.0,
            octaves: 2,
            lacunarity: 1.8,
            gain: 0.45,
            plateau_steps: Some(5),
            warp_amp: 18.0,
            warp_freq: 0.75,

            drift_amp: 0.0,
            wobble_amp: 28.0,
            wobble_freq: 0.06,

            auto_level: true,
            auto_level_decay: 0.97,
            gamma: 1.0,
            invert: false,

            size_mode: SizeMode::Window,
        }
    }
}

impl DanceOptions {
    /// Reject configurations the pipeline cannot degrade through. Out-of-range
    /// gain/contrast/gamma are deliberately accepted (they saturate instead).
    pub fn validate(&self) -> Result<()> {
        if self.palette.is_empty() {
            bail!("palette must contain at least one character");
        }
        if self.octaves == 0 {
            bail!("octaves must be >= 1");
        }
        if !self.lacunarity.is_finite() || self.lacunarity <= 0.0 {
            bail!("lacunarity must be > 0, got {}", self.lacunarity);
        }
        if !self.font_px.is_finite() || self.font_px <= 0.0 {
            bail!("font_px must be > 0, got {}", self.font_px);
        }
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            bail!("cell_size must be finite and > 0, got {}", self.cell_size);
        }
        parse_hex_color(&self.bg).with_context(|| format!("invalid bg color '{}'", self.bg))?;
        parse_hex_color(&self.fg).with_context(|| format!("invalid fg color '{}'", self.fg))?;
        Ok(())
    }

    /// The palette as indexable glyphs.
    pub fn palette_chars(&self) -> Vec<char> {
        self.palette.chars().collect()
    }
}

/// A partial update: every field independently optional. `plateau_steps` is
/// doubly optional so a patch can both set a step count and clear it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsPatch {
    pub bg: Option<String>,
    pub fg: Option<String>,
    pub palette: Option<String>,
    pub font_px: Option<f32>,
    pub contrast: Option<f64>,

    pub speed: Option<f64>,
    pub scale: Option<f64>,
    pub opacity_base: Option<f64>,
    pub opacity_var: Option<f64>,
    pub reduced_motion_fallback: Option<bool>,

    pub seed: Option<i32>,
    pub cell_size: Option<f64>,
    pub octaves: Option<u32>,
    pub lacunarity: Option<f64>,
    pub gain: Option<f64>,
    pub plateau_steps: Option<Option<u32>>,
    pub warp_amp: Option<f64>,
    pub warp_freq: Option<f64>,

    pub drift_amp: Option<f64>,
    pub wobble_amp: Option<f64>,
    pub wobble_freq: Option<f64>,

    pub auto_level: Option<bool>,
    pub auto_level_decay: Option<f64>,
    pub gamma: Option<f64>,
    pub invert: Option<bool>,

    pub size_mode: Option<SizeMode>,
}

impl OptionsPatch {
    /// Apply this patch over `base`, producing a new snapshot. The base is
    /// never mutated; callers swap the result in atomically.
    pub fn apply(&self, base: &DanceOptions) -> DanceOptions {
        let mut next = base.clone();
        if let Some(value) = self.bg.clone() {
            next.bg = value;
        }
        if let Some(value) = self.fg.clone() {
            next.fg = value;
        }
        if let Some(value) = self.palette.clone() {
            next.palette = value;
        }
        if let Some(value) = self.font_px {
            next.font_px = value;
        }
        if let Some(value) = self.contrast {
            next.contrast = value;
        }
        if let Some(value) = self.speed {
            next.speed = value;
        }
        if let Some(value) = self.scale {
            next.scale = value;
        }
        if let Some(value) = self.opacity_base {
            next.opacity_base = value;
        }
        if let Some(value) = self.opacity_var {
            next.opacity_var = value;
        }
        if let Some(value) = self.reduced_motion_fallback {
            next.reduced_motion_fallback = value;
        }
        if let Some(value) = self.seed {
            next.seed = value;
        }
        if let Some(value) = self.cell_size {
            next.cell_size = value;
        }
        if let Some(value) = self.octaves {
            next.octaves = value;
        }
        if let Some(value) = self.lacunarity {
            next.lacunarity = value;
        }
        if let Some(value) = self.gain {
            next.gain = value;
        }
        if let Some(value) = self.plateau_steps {
            next.plateau_steps = value;
        }
        if let Some(value) = self.warp_amp {
            next.warp_amp = value;
        }
        if let Some(value) = self.warp_freq {
            next.warp_freq = value;
        }
        if let Some(value) = self.drift_amp {
            next.drift_amp = value;
        }
        if let Some(value) = self.wobble_amp {
            next.wobble_amp = value;
        }
        if let Some(value) = self.wobble_freq {
            next.wobble_freq = value;
        }
        if let Some(value) = self.auto_level {
            next.auto_level = value;
        }
        if let Some(value) = self.auto_level_decay {
            next.auto_level_decay = value;
        }
        if let Some(value) = self.gamma {
            next.gamma = value;
        }
        if let Some(value) = self.invert {
            next.invert = value;
        }
        if let Some(value) = self.size_mode {
            next.size_mode = value;
        }
        next
    }
}

/// Load and validate an options manifest (YAML, fields merged over defaults).
pub fn load_options(path: &Path) -> Result<DanceOptions> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read options manifest {}", path.display()))?;
    let options: DanceOptions = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;
    options.validate()?;
    Ok(options)
}

/// Parse `#rgb` or `#rrggbb` into RGBA bytes (alpha fixed at 255).
pub fn parse_hex_color(value: &str) -> Result<[u8; 4]> {
    let digits = value
        .strip_prefix('#')
        .ok_or_else(|| anyhow!("color must start with '#', got '{value}'"))?;

    let channel =
        |hex: &str| u8::from_str_radix(hex, 16).map_err(|_| anyhow!("bad hex digits '{hex}'"));

    match digits.len() {
        3 => {
            let mut out = [0_u8; 4];
            for (slot, ch) in out.iter_mut().zip(digits.chars()) {
                let nibble = channel(&ch.to_string())?;
                *slot = nibble << 4 | nibble;
            }
            out[3] = 255;
            Ok(out)
        }
        6 => Ok([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
            255,
        ]),
        other => bail!("expected 3 or 6 hex digits, got {other} in '{value}'"),
    }
}
