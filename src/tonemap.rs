//! Adaptive tonemapping: scalar field value → glyph + draw weight.
//!
//! Stages run in a fixed, significant order:
//!
//! 1. **Auto-level** — EMA range tracking, rescale to the observed span
//! 2. **Plateau quantization** — snap to N evenly spaced levels
//! 3. **Gamma** — `v^(1/gamma)`
//! 4. **Contrast** — stretch about 0.5, then hard clamp to [0, 1]
//! 5. **Invert**
//! 6. **Palette lookup** — index into the light→dark glyph ramp
//!
//! Auto-level must precede quantization/gamma/contrast for the adaptive range
//! to be meaningful; contrast must follow gamma.

/// Floor for the auto-level span. Keeps the rescale finite while the EMA
/// interval is still degenerate or has collapsed onto a constant field.
const SPAN_FLOOR: f64 = 1e-3;

/// Exponential-moving-average brightness bounds.
///
/// Owned by the engine and passed `&mut` into [`tonemap`] each cell. Starts as
/// the inverted interval (1, 0) so the first observed sample initializes both
/// bounds; `lo <= hi` holds from then on. The bounds only move toward values
/// that extend the range — the min/max against the previous bound stops them
/// drifting back outward between extremes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoLevel {
    lo: f64,
    hi: f64,
}

impl AutoLevel {
    pub fn new() -> Self {
        Self { lo: 1.0, hi: 0.0 }
    }

    /// Back to the degenerate initial interval. Called when the auto-level
    /// flag is toggled so stale bounds never leak across configurations.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current (lo, hi) interval.
    pub fn bounds(&self) -> (f64, f64) {
        (self.lo, self.hi)
    }

    /// Fold one sample into the bounds and rescale it to the tracked range.
    fn normalize(&mut self, v: f64, decay: f64) -> f64 {
        self.lo = (self.lo * decay + v * (1.0 - decay)).min(self.lo);
        self.hi = (self.hi * decay + v * (1.0 - decay)).max(self.hi);
        let span = (self.hi - self.lo).max(SPAN_FLOOR);
        (v - self.lo) / span
    }
}

impl Default for AutoLevel {
    fn default() -> Self {
        Self::new()
    }
}

/// Tonemap stage configuration, a per-frame snapshot of the live options.
#[derive(Debug, Clone, Copy)]
pub struct ToneParams {
    pub auto_level: bool,
    pub auto_level_decay: f64,
    pub plateau_steps: Option<u32>,
    pub gamma: f64,
    pub contrast: f64,
    pub invert: bool,
}

/// One tonemapped cell: the glyph to draw and the post-contrast, pre-palette
/// value the caller uses to modulate opacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shade {
    pub glyph: char,
    pub weight: f64,
}

/// Map a field value (nominally [0, 1], not assumed clamped) to a glyph from
/// `palette` and a draw weight. `palette` is ordered lightest → darkest and
/// must be non-empty; construction validates this, so an empty slice here
/// falls back to a blank cell rather than panicking.
pub fn tonemap(value: f64, palette: &[char], params: &ToneParams, levels: &mut AutoLevel) -> Shade {
    let mut v = value;

    if params.auto_level {
        v = levels.normalize(v, params.auto_level_decay);
    }

    if let Some(steps) = params.plateau_steps {
        if steps > 1 {
            let n = f64::from(steps - 1);
            v = (v * n).round() / n;
        }
    }

    if params.gamma != 1.0 {
        v = v.powf(1.0 / params.gamma);
    }

    // Contrast about 0.5, then the only hard clamp in the pipeline.
    v = (v * 2.0 - 1.0) * params.contrast;
    v = (v + 1.0) / 2.0;
    v = v.clamp(0.0, 1.0);

    if params.invert {
        v = 1.0 - v;
    }

    let Some(last) = palette.len().checked_sub(1) else {
        return Shade { glyph: ' ', weight: v };
    };
    let idx = ((v * last as f64).floor() as usize).min(last);
    Shade {
        glyph: palette[idx],
        weight: v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_params() -> ToneParams {
        ToneParams {
            auto_level: false,
            auto_level_decay: 0.97,
            plateau_steps: None,
            gamma: 1.0,
            contrast: 1.0,
            invert: false,
        }
    }

    #[test]
    fn identity_transform_passes_value_through() {
        let palette: Vec<char> = " .,:;=+*#%@".chars().collect();
        let mut levels = AutoLevel::new();
        for &v in &[0.0, 0.125, 0.5, 0.875, 1.0] {
            let shade = tonemap(v, &palette, &identity_params(), &mut levels);
            assert!((shade.weight - v).abs() < 1e-12, "weight {} for {v}", shade.weight);
        }
        // Out-of-range inputs clamp at the contrast stage.
        assert_eq!(tonemap(1.7, &palette, &identity_params(), &mut levels).weight, 1.0);
        assert_eq!(tonemap(-0.4, &palette, &identity_params(), &mut levels).weight, 0.0);
    }

    #[test]
    fn three_glyph_palette_picks_expected_characters() {
        let palette: Vec<char> = " .#".chars().collect();
        let mut levels = AutoLevel::new();
        let params = identity_params();
        assert_eq!(tonemap(0.0, &palette, &params, &mut levels).glyph, ' ');
        assert_eq!(tonemap(0.5, &palette, &params, &mut levels).glyph, '.');
        assert_eq!(tonemap(1.0, &palette, &params, &mut levels).glyph, '#');
    }

    #[test]
    fn auto_level_bounds_never_invert() {
        let palette: Vec<char> = " #".chars().collect();
        let params = ToneParams {
            auto_level: true,
            ..identity_params()
        };
        let mut levels = AutoLevel::new();
        let samples = [0.5, 0.2, 0.8, 0.81, 0.1, 0.9, 0.45, 0.3, 0.99, 0.01];
        for (i, &v) in samples.iter().enumerate() {
            tonemap(v, &palette, &params, &mut levels);
            let (lo, hi) = levels.bounds();
            assert!(lo <= hi, "bounds inverted after sample {i}: ({lo}, {hi})");
        }
    }

    #[test]
    fn auto_level_interval_tightens_toward_observed_range() {
        let params = ToneParams {
            auto_level: true,
            ..identity_params()
        };
        let mut levels = AutoLevel::new();
        for _ in 0..500 {
            let palette: Vec<char> = " #".chars().collect();
            tonemap(0.3, &palette, &params, &mut levels);
            tonemap(0.7, &palette, &params, &mut levels);
        }
        let (lo, hi) = levels.bounds();
        assert!(lo <= 0.3 + 1e-9 && lo > 0.0, "lo={lo}");
        assert!(hi >= 0.7 - 1e-9 && hi < 1.0, "hi={hi}");
    }

    #[test]
    fn reset_restores_degenerate_interval() {
        let palette: Vec<char> = " #".chars().collect();
        let params = ToneParams {
            auto_level: true,
            ..identity_params()
        };
        let mut levels = AutoLevel::new();
        tonemap(0.42, &palette, &params, &mut levels);
        assert_ne!(levels.bounds(), (1.0, 0.0));
        levels.reset();
        assert_eq!(levels.bounds(), (1.0, 0.0));
    }

    #[test]
    fn plateau_snaps_to_discrete_levels() {
        let palette: Vec<char> = " .,:;=+*#%@".chars().collect();
        let params = ToneParams {
            plateau_steps: Some(5),
            ..identity_params()
        };
        let mut levels = AutoLevel::new();
        for i in 0..=100 {
            let v = i as f64 / 100.0;
            let w = tonemap(v, &palette, &params, &mut levels).weight;
            let nearest = (w * 4.0).round() / 4.0;
            assert!((w - nearest).abs() < 1e-12, "weight {w} is not on a plateau");
        }
        // A step count of 1 (or 0) disables quantization instead of erroring.
        let off = ToneParams {
            plateau_steps: Some(1),
            ..identity_params()
        };
        assert!((tonemap(0.37, &palette, &off, &mut levels).weight - 0.37).abs() < 1e-12);
    }

    #[test]
    fn invert_mirrors_weight() {
        let palette: Vec<char> = " .#".chars().collect();
        let mut levels = AutoLevel::new();
        let inverted = ToneParams {
            invert: true,
            ..identity_params()
        };
        let straight = tonemap(0.25, &palette, &identity_params(), &mut levels).weight;
        let flipped = tonemap(0.25, &palette, &inverted, &mut levels).weight;
        assert!((straight + flipped - 1.0).abs() < 1e-12);
    }

    #[test]
    fn extreme_contrast_saturates_instead_of_failing() {
        let palette: Vec<char> = " #".chars().collect();
        let params = ToneParams {
            contrast: 100.0,
            ..identity_params()
        };
        let mut levels = AutoLevel::new();
        assert_eq!(tonemap(0.4, &palette, &params, &mut levels).weight, 0.0);
        assert_eq!(tonemap(0.6, &palette, &params, &mut levels).weight, 1.0);
    }

    #[test]
    fn empty_palette_degrades_to_blank_cell() {
        let mut levels = AutoLevel::new();
        let shade = tonemap(0.8, &[], &identity_params(), &mut levels);
        assert_eq!(shade.glyph, ' ');
    }
}
