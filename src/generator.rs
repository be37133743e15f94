//! Noise realization generator
//!
//! Draws white Gaussian fields directly in Fourier space, colors them with a
//! precomputed per-mode covariance square root, and brings them back to
//! pixel space scaled to the depth of each split.

use ndarray::{s, Array2, Array3, Array4, ArrayView2, Axis, Zip};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;
use tracing::{debug, info, warn};

use crate::error::{NoiseError, Result};
use crate::maps::{CovarianceSqrt, IvarMaps, NoiseRealization, NCOMP};
use crate::seed::{split_rng, Seed};
use crate::transform::SpectralTransform;

pub const DEFAULT_BINARY_PERCENTILE: f64 = 10.0;

/// Generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    /// Pixels whose weight falls below this percentile of their split's
    /// weight map are zeroed
    pub binary_percentile: f64,
    /// Seed sequence; fresh entropy for every draw when absent
    pub seed: Option<Seed>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            binary_percentile: DEFAULT_BINARY_PERCENTILE,
            seed: None,
        }
    }
}

impl GeneratorOptions {
    pub fn seeded(seed: impl Into<Seed>) -> Self {
        Self {
            seed: Some(seed.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.binary_percentile) {
            return Err(NoiseError::InvalidConfig(format!(
                "binary_percentile must be in [0, 100], got {}",
                self.binary_percentile
            )));
        }
        Ok(())
    }
}

/// Percentile of all values with linear interpolation between order
/// statistics.
pub fn percentile(values: ArrayView2<'_, f64>, p: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// 1 where the weight reaches `threshold` and is non-zero, 0 elsewhere.
pub fn binary_mask(weights: ArrayView2<'_, f64>, threshold: f64) -> Array2<u8> {
    weights.mapv(|w| u8::from(w > 0.0 && w >= threshold))
}

/// Complex Gaussian field with unit variance per Fourier mode whose inverse
/// transform is real.
///
/// Coefficients at `k` and `-k` are conjugate pairs with real and imaginary
/// parts of variance 1/2; self-conjugate modes are real with variance 1.
pub fn rand_gauss_harm<R: Rng + ?Sized>(
    shape: (usize, usize, usize),
    rng: &mut R,
) -> Array3<Complex64> {
    let (ncomp, ny, nx) = shape;
    let mut field = Array3::zeros(shape);
    for c in 0..ncomp {
        for y in 0..ny {
            for x in 0..nx {
                let (py, px) = ((ny - y) % ny, (nx - x) % nx);
                if (py, px) == (y, x) {
                    let re: f64 = StandardNormal.sample(rng);
                    field[[c, y, x]] = Complex64::new(re, 0.0);
                } else if (y, x) < (py, px) {
                    let re = half_normal(rng);
                    let im = half_normal(rng);
                    field[[c, y, x]] = Complex64::new(re, im);
                    field[[c, py, px]] = Complex64::new(re, -im);
                }
            }
        }
    }
    field
}

/// Gaussian deviate with variance 1/2
fn half_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let v: f64 = StandardNormal.sample(rng);
    v * FRAC_1_SQRT_2
}

/// Apply the per-mode matrix `covsqrt[.., .., y, x]` to the coefficient
/// vector `field[.., y, x]` at every mode.
fn color(covsqrt: &Array4<f64>, field: &Array3<Complex64>) -> Array3<Complex64> {
    let mut out = Array3::zeros(field.raw_dim());
    let ncomp = field.shape()[0];
    for a in 0..ncomp {
        let mut row = out.index_axis_mut(Axis(0), a);
        for b in 0..ncomp {
            Zip::from(&mut row)
                .and(covsqrt.slice(s![a, b, .., ..]))
                .and(field.index_axis(Axis(0), b))
                .for_each(|o, &m, &g| *o += g * m);
        }
    }
    out
}

/// Generate one noise realization for every split.
///
/// # Arguments
/// * `covsqrt` - Per-mode covariance square root [3 * nfreqs, 3 * nfreqs, y, x]
/// * `ivar` - Inverse-variance weights [frequency, split, y, x]
/// * `options` - Masking percentile and seed
///
/// # Returns
/// Noise maps [frequency, split, component, y, x]. Pixels below the
/// percentile threshold, and every pixel with zero weight, are exactly zero.
pub fn generate_noise_sim(
    covsqrt: &CovarianceSqrt,
    ivar: &IvarMaps,
    options: &GeneratorOptions,
) -> Result<NoiseRealization> {
    covsqrt
        .grid()
        .ensure_same(ivar.grid(), "covariance square root vs ivar grid")?;
    if covsqrt.nfreqs() != ivar.nfreqs() {
        return Err(NoiseError::shape(
            "covariance square root frequencies",
            ivar.nfreqs(),
            covsqrt.nfreqs(),
        ));
    }
    options.validate()?;
    let nsplits = ivar.nsplits();
    if nsplits == 0 {
        return Err(NoiseError::shape("ivar splits", "at least 1", nsplits));
    }

    let nfreqs = ivar.nfreqs();
    let ncomp = covsqrt.ncomp();
    let (ny, nx) = ivar.grid().shape();
    info!(
        nfreqs,
        nsplits,
        percentile = options.binary_percentile,
        seeded = options.seed.is_some(),
        "generating noise realization"
    );

    let mut kmap = Array4::zeros((nsplits, ncomp, ny, nx));
    for split in 0..nsplits {
        let mut rng = split_rng(options.seed.as_ref(), split);
        let white = rand_gauss_harm((ncomp, ny, nx), &mut rng);
        let colored = color(covsqrt.data(), &white);
        kmap.index_axis_mut(Axis(0), split).assign(&colored);
    }

    let transform = SpectralTransform::new(ivar.grid());
    let mut outmaps = transform.inverse_raw(kmap)?.mapv(|c| c.re);

    let split_scale = (nsplits as f64).sqrt();
    for f in 0..nfreqs {
        for split in 0..nsplits {
            let w = ivar.slice(f, split);
            let mut block = outmaps.slice_mut(s![split, f * NCOMP..(f + 1) * NCOMP, .., ..]);
            if w.iter().all(|&v| v == 0.0) {
                warn!(freq = f, split, "split has no weight, fully masked");
                block.fill(0.0);
                continue;
            }
            let threshold = percentile(w, options.binary_percentile);
            let mask = binary_mask(w, threshold);
            debug!(freq = f, split, threshold, "binary mask threshold");
            for mut plane in block.outer_iter_mut() {
                Zip::from(&mut plane)
                    .and(&w)
                    .and(&mask)
                    .for_each(|o, &weight, &keep| {
                        *o = if keep == 1 {
                            *o * split_scale / weight.sqrt()
                        } else {
                            0.0
                        };
                    });
            }
        }
    }

    let strided = |_| NoiseError::shape("realization layout", "standard layout", "strided");
    let data = outmaps
        .into_shape((nsplits, nfreqs, NCOMP, ny, nx))
        .map_err(strided)?
        .permuted_axes([1, 0, 2, 3, 4])
        .as_standard_layout()
        .into_owned();
    Ok(NoiseRealization::from_parts(ivar.grid().clone(), data))
}
