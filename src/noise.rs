//! Deterministic value noise, fractal summation, and domain warping.
//!
//! Everything in this module is pure: the same inputs always produce the same
//! output, with no global state. The field is built in three layers:
//!
//! 1. **Hash** — integer multiply–XOR–shift cascade over (cell x, cell y, seed)
//! 2. **Value noise** — quintic-smoothed bilinear blend of the four corner hashes
//! 3. **fbm** — normalized octave sum; **domain warp** — fbm-driven coordinate shift

/// Mix three integers into a well-distributed 32-bit value.
///
/// Wrapping arithmetic throughout; corner values shared between adjacent
/// lattice cells hash identically, which is what keeps `value_noise_2d`
/// continuous across cell boundaries.
#[inline]
pub fn hash(ix: i32, iy: i32, seed: i32) -> u32 {
    let mut n = ix
        .wrapping_mul(374_761_393)
        .wrapping_add(iy.wrapping_mul(668_265_263))
        .wrapping_add(seed.wrapping_mul(1_442_695_041)) as u32;
    n ^= n >> 13;
    n = n.wrapping_mul(1_274_126_177);
    n ^= n >> 16;
    n
}

/// Hash reduced to a float in [0, 1].
#[inline]
pub fn rand01(ix: i32, iy: i32, seed: i32) -> f64 {
    f64::from(hash(ix, iy, seed)) / f64::from(u32::MAX)
}

/// Quintic fade `6t^5 - 15t^4 + 10t^3`. Zero first and second derivative at
/// t=0 and t=1, so interpolation shows no creasing at cell boundaries.
#[inline]
fn smooth5(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

/// 2D value noise in [0, 1]: pseudo-random values fixed at integer lattice
/// points (`cell_size` world units apart), blended with the quintic fade.
pub fn value_noise_2d(x: f64, y: f64, seed: i32, cell_size: f64) -> f64 {
    let gx = (x / cell_size).floor();
    let gy = (y / cell_size).floor();
    let tx = (x - gx * cell_size) / cell_size;
    let ty = (y - gy * cell_size) / cell_size;
    let (gx, gy) = (gx as i32, gy as i32);

    let u = smooth5(tx);
    let v = smooth5(ty);

    let v00 = rand01(gx, gy, seed);
    let v10 = rand01(gx + 1, gy, seed);
    let v01 = rand01(gx, gy + 1, seed);
    let v11 = rand01(gx + 1, gy + 1, seed);

    let vx0 = v00 + (v10 - v00) * u;
    let vx1 = v01 + (v11 - v01) * u;
    vx0 + (vx1 - vx0) * v
}

/// Octave walk parameters for [`fbm_2d`].
#[derive(Debug, Clone, Copy)]
pub struct FbmParams {
    pub seed: i32,
    pub cell_size: f64,
    pub octaves: u32,
    pub lacunarity: f64,
    pub gain: f64,
}

/// Per-octave seed offset. Without it every octave would sample the same hash
/// lattice at different scales and the octaves would visibly correlate.
const OCTAVE_SEED_STEP: i32 = 17;

/// Fractal Brownian motion: amplitude-weighted octave sum, normalized back to
/// [0, 1] by the total amplitude (floored so gain → 0 cannot divide by zero).
///
/// Output may exceed [0, 1] by interpolation slack; callers must not assume a
/// hard clamp.
pub fn fbm_2d(x: f64, y: f64, params: &FbmParams) -> f64 {
    let mut amp = 1.0;
    let mut freq = 1.0;
    let mut sum = 0.0;
    let mut norm = 0.0;
    for i in 0..params.octaves {
        let cs = params.cell_size / freq;
        sum += value_noise_2d(x, y, params.seed + i as i32 * OCTAVE_SEED_STEP, cs) * amp;
        norm += amp;
        amp *= params.gain;
        freq *= params.lacunarity;
    }
    sum / norm.max(1e-6)
}

/// Seed masks keeping the two warp axes decorrelated from each other and from
/// the base field.
const WARP_SEED_X: i32 = 0x9e37;
const WARP_SEED_Y: i32 = 0x85eb;

/// Perturb `(x, y)` with two independent single-octave fbm fields before the
/// main field evaluation, producing a flowing distortion of the sample grid.
///
/// The x-displacement field drifts with `t * 20`, the y-displacement field
/// with `t * 17`. Each sample is remapped from [0, 1] to [-1, 1] and scaled
/// by `amp`. `amp == 0` returns the input unchanged without evaluating noise.
pub fn domain_warp(
    x: f64,
    y: f64,
    t: f64,
    amp: f64,
    freq: f64,
    seed: i32,
    cell_size: f64,
) -> (f64, f64) {
    if amp == 0.0 {
        return (x, y);
    }
    let axis = |seed: i32| FbmParams {
        seed,
        cell_size,
        octaves: 1,
        lacunarity: 2.0,
        gain: 0.5,
    };
    let sx = fbm_2d(x * freq + t * 20.0, y * freq, &axis(seed ^ WARP_SEED_X));
    let sy = fbm_2d(x * freq, y * freq + t * 17.0, &axis(seed ^ WARP_SEED_Y));
    (x + (sx - 0.5) * 2.0 * amp, y + (sy - 0.5) * 2.0 * amp)
}
