//! Noise covariance estimation
//!
//! Estimates the per-mode noise covariance of the coadd from weighted split
//! maps, either by subtracting the inverse-variance coadd from every split or
//! by differencing split auto-spectra against split cross-spectra.

use ndarray::{
    s, Array2, Array3, Array4, Array5, ArrayView2, ArrayView3, Axis, RemoveAxis, Zip,
};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{NoiseError, Result};
use crate::maps::{ApodMask, IvarMaps, NoiseCovariance, SkyMaps, NCOMP};
use crate::plot::PlotSink;
use crate::transform::SpectralTransform;

/// Estimation switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorOptions {
    /// Subtract the per-frequency coadd from each split before transforming
    pub coadd_estimator: bool,
    /// Pre-whiten by `sqrt(ivar)` instead of weighting by `ivar`
    pub flattened: bool,
    /// Label prefix for diagnostic images; nothing is plotted when absent
    pub plot_label: Option<String>,
}

/// Inverse-variance weighted coadd over splits.
///
/// Returns the coadd, indexed by [frequency, component, y, x], and the total
/// weight, indexed by [frequency, y, x]. Pixels where every split has zero
/// weight carry no data and are set to zero in the coadd.
pub fn coadd(splits: &SkyMaps, ivar: &IvarMaps) -> Result<(Array4<f64>, Array3<f64>)> {
    ivar.ensure_matches(splits)?;
    let data = splits.data();
    let weights = ivar.data();
    let (nfreqs, _, ncomp, ny, nx) = data.dim();

    let total = weights.sum_axis(Axis(1));
    let mut coadd = Array4::zeros((nfreqs, ncomp, ny, nx));
    for ((f, c, y, x), out) in coadd.indexed_iter_mut() {
        let w = total[[f, y, x]];
        if w > 0.0 {
            let weighted: f64 = data
                .slice(s![f, .., c, y, x])
                .iter()
                .zip(weights.slice(s![f, .., y, x]).iter())
                .map(|(d, w)| d * w)
                .sum();
            *out = weighted / w;
        }
    }
    Ok((coadd, total))
}

/// Estimate the noise covariance of the coadd.
///
/// # Arguments
/// * `splits` - Split maps [frequency, split, component, y, x]
/// * `ivar` - Inverse-variance weights [frequency, split, y, x]
/// * `mask` - Apodization mask [y, x]
/// * `options` - Estimator switches and optional diagnostic label
/// * `sink` - Receiver for diagnostic images; only used with a label
///
/// # Returns
/// The covariance [3 * nfreqs, 3 * nfreqs, y, x], frequency-major
pub fn estimate_n2d(
    splits: &SkyMaps,
    ivar: &IvarMaps,
    mask: &ApodMask,
    options: &EstimatorOptions,
    mut sink: Option<&mut dyn PlotSink>,
) -> Result<NoiseCovariance> {
    ivar.ensure_matches(splits)?;
    splits
        .grid()
        .ensure_same(mask.grid(), "apodization mask vs split maps grid")?;
    if splits.data().iter().any(|v| !v.is_finite()) {
        return Err(NoiseError::NonFinite("split maps"));
    }
    if mask.data().iter().any(|v| !v.is_finite()) {
        return Err(NoiseError::NonFinite("apodization mask"));
    }
    let nsplits = splits.nsplits();
    if nsplits < 2 {
        return Err(NoiseError::TooFewSplits(nsplits));
    }
    for f in 0..splits.nfreqs() {
        for split in 0..nsplits {
            if ivar.slice(f, split).iter().all(|&w| w == 0.0) {
                return Err(NoiseError::DegenerateWeight {
                    freq: f,
                    split,
                    reason: "total weight is zero",
                });
            }
        }
    }
    info!(
        nfreqs = splits.nfreqs(),
        nsplits,
        coadd_estimator = options.coadd_estimator,
        flattened = options.flattened,
        "estimating noise covariance"
    );

    let data: Array5<f64> = if options.coadd_estimator {
        let (coadd, _) = coadd(splits, ivar)?;
        splits.data() - &coadd.insert_axis(Axis(1))
    } else {
        splits.data().clone()
    };

    let (weighted, weights) = apply_weights(data, ivar, mask, options.flattened);
    if let (Some(label), Some(sink)) = (options.plot_label.as_deref(), sink.as_deref_mut()) {
        for split in 0..nsplits {
            let image = weighted.slice(s![0, split, 0, .., ..]);
            sink.plot(&format!("{label}_fft_maps_split{split}"), image);
        }
    }

    let transform = SpectralTransform::new(splits.grid());
    let ffts = transform.forward(&weighted)?;
    let n2d = cross_spectra(&ffts.into_inner(), &weights, options.coadd_estimator)?;

    if let (Some(label), Some(sink)) = (options.plot_label.as_deref(), sink) {
        for i in 0..n2d.shape()[0] {
            sink.plot(&format!("{label}_n2d_{i}{i}"), n2d.slice(s![i, i, .., ..]));
        }
    }
    NoiseCovariance::new(splits.grid().clone(), n2d)
}

/// Weight the data and build the matching normalization weights.
///
/// Returns the weighted data and the weights [frequency, split, y, x] that
/// the cross-spectra must be normalized by.
fn apply_weights(
    mut data: Array5<f64>,
    ivar: &IvarMaps,
    mask: &ApodMask,
    flattened: bool,
) -> (Array5<f64>, Array4<f64>) {
    let (nfreqs, nsplits, _, ny, nx) = data.dim();
    let m = mask.data();
    let mut weights = Array4::zeros((nfreqs, nsplits, ny, nx));
    for f in 0..nfreqs {
        for split in 0..nsplits {
            let w = ivar.slice(f, split);
            let factor = if flattened {
                Zip::from(m).and(&w).map_collect(|&a, &b| a * b.sqrt())
            } else {
                Zip::from(m).and(&w).map_collect(|&a, &b| a * b)
            };
            for mut component in data.slice_mut(s![f, split, .., .., ..]).outer_iter_mut() {
                component *= &factor;
            }
            let norm = if flattened { m.to_owned() } else { &w * m };
            weights.slice_mut(s![f, split, .., ..]).assign(&norm);
        }
    }
    (data, weights)
}

/// Mean of the product of every pair of weight maps, [f1, f2, s1, s2].
fn weight_normalizations(weights: &Array4<f64>) -> Result<Array4<f64>> {
    let (nfreqs, nsplits, _, _) = weights.dim();
    for f in 0..nfreqs {
        for split in 0..nsplits {
            let w = weights.slice(s![f, split, .., ..]);
            if w.iter().all(|&v| v == 0.0) {
                return Err(NoiseError::DegenerateWeight {
                    freq: f,
                    split,
                    reason: "no weight inside the mask",
                });
            }
        }
    }

    let mut norms = Array4::zeros((nfreqs, nfreqs, nsplits, nsplits));
    for ((f1, f2, s1, s2), out) in norms.indexed_iter_mut() {
        let a = weights.slice(s![f1, s1, .., ..]);
        let b = weights.slice(s![f2, s2, .., ..]);
        let mean = Zip::from(&a).and(&b).fold(0.0, |acc, x, y| acc + x * y) / a.len() as f64;
        if mean <= 0.0 {
            return Err(NoiseError::DegenerateWeight {
                freq: f1,
                split: s1,
                reason: "no overlapping weight with another split",
            });
        }
        *out = mean;
    }
    debug!(?norms, "weight normalizations");
    Ok(norms)
}

/// Fill the full covariance from the upper triangle of frequency-major
/// component pairs.
fn cross_spectra(
    ffts: &Array5<Complex64>,
    weights: &Array4<f64>,
    coadd_estimator: bool,
) -> Result<Array4<f64>> {
    let (nfreqs, _, ncomp, ny, nx) = ffts.dim();
    debug_assert_eq!(ncomp, NCOMP);
    let norms = weight_normalizations(weights)?;
    let n = nfreqs * ncomp;
    let mut n2d = Array4::zeros((n, n, ny, nx));
    for i in 0..n {
        for j in i..n {
            let (fi, ci) = (i / ncomp, i % ncomp);
            let (fj, cj) = (j / ncomp, j % ncomp);
            let power = noise_power(
                ffts.slice(s![fi, .., ci, .., ..]),
                ffts.slice(s![fj, .., cj, .., ..]),
                norms.slice(s![fi, fj, .., ..]),
                coadd_estimator,
            );
            n2d.slice_mut(s![i, j, .., ..]).assign(&power);
            if i != j {
                n2d.slice_mut(s![j, i, .., ..]).assign(&power);
            }
        }
    }
    Ok(n2d)
}

/// Noise power of the coadd between two sets of split Fourier maps.
///
/// `norms[[s, t]]` is the mean product of the weights applied to split `s`
/// of the first set and split `t` of the second.
fn noise_power(
    kmaps1: ArrayView3<'_, Complex64>,
    kmaps2: ArrayView3<'_, Complex64>,
    norms: ArrayView2<'_, f64>,
    coadd_estimator: bool,
) -> Array2<f64> {
    let nsplits = kmaps1.shape()[0];
    let n = nsplits as f64;
    let cross = |s1: usize, s2: usize| -> Array2<f64> {
        let norm = norms[[s1, s2]];
        Zip::from(kmaps1.index_axis(Axis(0), s1))
            .and(kmaps2.index_axis(Axis(0), s2))
            .map_collect(|a, b| (a * b.conj()).re / norm)
    };

    let mut auto = Array2::zeros(kmaps1.raw_dim().remove_axis(Axis(0)));
    for split in 0..nsplits {
        auto += &cross(split, split);
    }
    if coadd_estimator {
        // each residual carries (n - 1) / n of the split noise
        return auto / (n * (n - 1.0));
    }

    let mut xpower = Array2::zeros(auto.raw_dim());
    for s1 in 0..nsplits {
        for s2 in 0..nsplits {
            if s1 != s2 {
                xpower += &cross(s1, s2);
            }
        }
    }
    (auto / n - xpower / (n * (n - 1.0))) / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridDescriptor, Wcs};
    use crate::plot::MemoryPlotSink;
    use approx::assert_relative_eq;
    use ndarray::Array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn grid(n: usize) -> GridDescriptor {
        GridDescriptor::new((n, n), Wcs::car(180.0 / std::f64::consts::PI)).unwrap()
    }

    fn white_splits(
        g: &GridDescriptor,
        nfreqs: usize,
        nsplits: usize,
        sigma: f64,
        seed: u64,
    ) -> SkyMaps {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let normal = Normal::new(0.0, sigma).unwrap();
        let (ny, nx) = g.shape();
        let data = Array::from_shape_fn((nfreqs, nsplits, NCOMP, ny, nx), |_| {
            normal.sample(&mut rng)
        });
        SkyMaps::new(g.clone(), data).unwrap()
    }

    fn flat_ivar(g: &GridDescriptor, nfreqs: usize, nsplits: usize, value: f64) -> IvarMaps {
        let (ny, nx) = g.shape();
        let data = Array4::from_elem((nfreqs, nsplits, ny, nx), value);
        IvarMaps::new(g.clone(), data).unwrap()
    }

    #[test]
    fn test_coadd_weights_by_ivar() {
        let g = grid(2);
        let mut data = Array5::zeros((1, 2, NCOMP, 2, 2));
        data.slice_mut(s![0, 0, .., .., ..]).fill(1.0);
        data.slice_mut(s![0, 1, .., .., ..]).fill(4.0);
        let splits = SkyMaps::new(g.clone(), data).unwrap();
        let mut w = Array4::zeros((1, 2, 2, 2));
        w.slice_mut(s![0, 0, .., ..]).fill(3.0);
        w.slice_mut(s![0, 1, .., ..]).fill(1.0);
        w[[0, 0, 1, 1]] = 0.0;
        w[[0, 1, 1, 1]] = 0.0;
        let ivar = IvarMaps::new(g, w).unwrap();

        let (coadd, total) = coadd(&splits, &ivar).unwrap();
        assert_relative_eq!(coadd[[0, 2, 0, 0]], (3.0 + 4.0) / 4.0);
        assert_eq!(total[[0, 0, 0]], 4.0);
        // no weight from any split: no data
        assert_eq!(coadd[[0, 0, 1, 1]], 0.0);
        assert_eq!(total[[0, 1, 1]], 0.0);
    }

    #[test]
    fn test_n2d_shape_and_symmetry() {
        let g = grid(8);
        let splits = white_splits(&g, 2, 4, 1.0, 3);
        let ivar = flat_ivar(&g, 2, 4, 1.0);
        let mask = ApodMask::ones(g.clone());
        for coadd_estimator in [false, true] {
            let options = EstimatorOptions {
                coadd_estimator,
                ..Default::default()
            };
            let n2d = estimate_n2d(&splits, &ivar, &mask, &options, None).unwrap();
            assert_eq!(n2d.data().dim(), (6, 6, 8, 8));
            for ((i, j, y, x), v) in n2d.data().indexed_iter() {
                assert_eq!(*v, n2d.data()[[j, i, y, x]]);
            }
        }
    }

    #[test]
    fn test_identical_splits_have_no_noise() {
        let g = grid(8);
        let one = white_splits(&g, 1, 1, 1.0, 9).into_inner();
        let data = ndarray::concatenate(Axis(1), &[one.view(), one.view(), one.view()]).unwrap();
        let splits = SkyMaps::new(g.clone(), data).unwrap();
        let ivar = flat_ivar(&g, 1, 3, 2.0);
        let mask = ApodMask::ones(g.clone());
        for flattened in [false, true] {
            for coadd_estimator in [false, true] {
                let options = EstimatorOptions {
                    coadd_estimator,
                    flattened,
                    plot_label: None,
                };
                let n2d = estimate_n2d(&splits, &ivar, &mask, &options, None).unwrap();
                assert!(n2d.data().iter().all(|v| v.abs() < 1e-9));
            }
        }
    }

    #[test]
    fn test_estimators_agree_for_equal_weights() {
        // with equal weights, split-minus-coadd and auto-minus-cross are
        // algebraically identical
        let g = grid(8);
        let splits = white_splits(&g, 1, 4, 0.7, 21);
        let ivar = flat_ivar(&g, 1, 4, 3.0);
        let mask = ApodMask::ones(g.clone());
        let a = estimate_n2d(&splits, &ivar, &mask, &EstimatorOptions::default(), None).unwrap();
        let options = EstimatorOptions {
            coadd_estimator: true,
            ..Default::default()
        };
        let b = estimate_n2d(&splits, &ivar, &mask, &options, None).unwrap();
        for (x, y) in a.data().iter().zip(b.data().iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_zero_weight_split_is_degenerate() {
        let g = grid(4);
        let splits = white_splits(&g, 1, 2, 1.0, 1);
        let mut w = Array4::ones((1, 2, 4, 4));
        w.slice_mut(s![0, 1, .., ..]).fill(0.0);
        let ivar = IvarMaps::new(g.clone(), w).unwrap();
        let mask = ApodMask::ones(g);
        for flattened in [false, true] {
            let options = EstimatorOptions {
                flattened,
                ..Default::default()
            };
            let err = estimate_n2d(&splits, &ivar, &mask, &options, None);
            assert!(matches!(err, Err(NoiseError::DegenerateWeight { split: 1, .. })));
        }
    }

    #[test]
    fn test_weight_outside_mask_is_degenerate() {
        let g = grid(4);
        let splits = white_splits(&g, 1, 2, 1.0, 1);
        let mut w = Array4::ones((1, 2, 4, 4));
        w.slice_mut(s![0, 0, 2.., ..]).fill(0.0);
        w.slice_mut(s![0, 1, ..2, ..]).fill(0.0);
        let ivar = IvarMaps::new(g.clone(), w).unwrap();
        let mut m = Array2::ones((4, 4));
        m.slice_mut(s![2.., ..]).fill(0.0);
        let mask = ApodMask::new(g, m).unwrap();
        let err = estimate_n2d(&splits, &ivar, &mask, &EstimatorOptions::default(), None);
        assert!(matches!(err, Err(NoiseError::DegenerateWeight { split: 1, .. })));
    }

    #[test]
    fn test_single_split_rejected() {
        let g = grid(4);
        let splits = white_splits(&g, 1, 1, 1.0, 1);
        let ivar = flat_ivar(&g, 1, 1, 1.0);
        let mask = ApodMask::ones(g);
        assert!(matches!(
            estimate_n2d(&splits, &ivar, &mask, &EstimatorOptions::default(), None),
            Err(NoiseError::TooFewSplits(1))
        ));
    }

    #[test]
    fn test_mask_grid_mismatch_rejected() {
        let g = grid(4);
        let splits = white_splits(&g, 1, 2, 1.0, 1);
        let ivar = flat_ivar(&g, 1, 2, 1.0);
        let mask = ApodMask::ones(grid(8));
        assert!(matches!(
            estimate_n2d(&splits, &ivar, &mask, &EstimatorOptions::default(), None),
            Err(NoiseError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_diagnostics_only_with_label() {
        let g = grid(4);
        let splits = white_splits(&g, 1, 2, 1.0, 4);
        let ivar = flat_ivar(&g, 1, 2, 1.0);
        let mask = ApodMask::ones(g);
        let mut sink = MemoryPlotSink::new();
        let unlabelled = EstimatorOptions::default();
        estimate_n2d(&splits, &ivar, &mask, &unlabelled, Some(&mut sink)).unwrap();
        assert!(sink.images.is_empty());

        let options = EstimatorOptions {
            plot_label: Some("deep8".to_string()),
            ..Default::default()
        };
        estimate_n2d(&splits, &ivar, &mask, &options, Some(&mut sink)).unwrap();
        assert!(sink.get("deep8_fft_maps_split0").is_some());
        assert!(sink.get("deep8_fft_maps_split1").is_some());
        assert!(sink.get("deep8_n2d_22").is_some());
        assert_eq!(sink.images.len(), 2 + NCOMP);
    }
}
