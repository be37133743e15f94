//! Physically normalized 2D Fourier transforms
//!
//! The forward transform is the unitary DFT scaled by `sqrt(pixel area)`,
//! so that the power of white noise with per-pixel variance `sigma^2` is
//! `sigma^2 * pixel area` at every mode. The inverse divides the same
//! factor back out, making `inverse(forward(x)) == x`.
//!
//! Both directions act on the last two axes of an array of any rank; the
//! leading axes are carried through untouched.

use ndarray::{Array, ArrayBase, Axis, Data, Dimension};
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{NoiseError, Result};
use crate::grid::GridDescriptor;
use crate::maps::FourierMaps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Inverse,
}

/// Planned forward and inverse transforms for one grid
pub struct SpectralTransform {
    grid: GridDescriptor,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("shape", &self.grid.shape())
            .finish()
    }
}

impl SpectralTransform {
    pub fn new(grid: &GridDescriptor) -> Self {
        let mut planner = FftPlanner::new();
        let (ny, nx) = grid.shape();
        Self {
            grid: grid.clone(),
            row_forward: planner.plan_fft_forward(nx),
            row_inverse: planner.plan_fft_inverse(nx),
            col_forward: planner.plan_fft_forward(ny),
            col_inverse: planner.plan_fft_inverse(ny),
        }
    }

    pub fn grid(&self) -> &GridDescriptor {
        &self.grid
    }

    /// Transform a real map to Fourier space.
    pub fn forward<S, D>(&self, map: &ArrayBase<S, D>) -> Result<FourierMaps<D>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        self.check_dims("forward transform input", map.shape())?;
        let mut data = map.mapv(|v| Complex64::new(v, 0.0));
        self.transform_last_two(&mut data, Direction::Forward);
        Ok(FourierMaps::from_parts(self.grid.clone(), data))
    }

    /// Transform Fourier coefficients back to (complex) pixel space.
    pub fn inverse<D: Dimension>(&self, kmap: &FourierMaps<D>) -> Result<Array<Complex64, D>> {
        self.grid.ensure_same(kmap.grid(), "inverse transform grid")?;
        self.inverse_raw(kmap.data().clone())
    }

    /// Inverse transform followed by taking the real part.
    pub fn inverse_real<D: Dimension>(&self, kmap: &FourierMaps<D>) -> Result<Array<f64, D>> {
        Ok(self.inverse(kmap)?.mapv(|c| c.re))
    }

    /// Inverse transform of a locally owned coefficient buffer, consumed in place.
    pub(crate) fn inverse_raw<D: Dimension>(
        &self,
        mut data: Array<Complex64, D>,
    ) -> Result<Array<Complex64, D>> {
        self.check_dims("inverse transform input", data.shape())?;
        self.transform_last_two(&mut data, Direction::Inverse);
        Ok(data)
    }

    fn check_dims(&self, context: &'static str, shape: &[usize]) -> Result<()> {
        let n = shape.len();
        if n < 2 {
            return Err(NoiseError::shape(context, "rank >= 2", shape));
        }
        self.grid.ensure_spatial(context, (shape[n - 2], shape[n - 1]))
    }

    fn transform_last_two<D: Dimension>(
        &self,
        data: &mut Array<Complex64, D>,
        direction: Direction,
    ) {
        let nd = data.ndim();
        let (row, col) = match direction {
            Direction::Forward => (&self.row_forward, &self.col_forward),
            Direction::Inverse => (&self.row_inverse, &self.col_inverse),
        };
        apply_along(data, Axis(nd - 1), row.as_ref());
        apply_along(data, Axis(nd - 2), col.as_ref());

        let npix = self.grid.npix() as f64;
        let area = self.grid.pixel_area();
        let scale = match direction {
            Direction::Forward => (area / npix).sqrt(),
            Direction::Inverse => 1.0 / (area * npix).sqrt(),
        };
        data.mapv_inplace(|c| c * scale);
        debug!(?direction, shape = ?data.shape(), scale, "applied 2D transform");
    }
}

/// Run a 1D transform over every lane of `data` along `axis`.
fn apply_along<D: Dimension>(data: &mut Array<Complex64, D>, axis: Axis, fft: &dyn Fft<f64>) {
    let len = data.len_of(axis);
    let mut line = vec![Complex64::new(0.0, 0.0); len];
    let mut scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    for mut lane in data.lanes_mut(axis) {
        for (dst, src) in line.iter_mut().zip(lane.iter()) {
            *dst = *src;
        }
        fft.process_with_scratch(&mut line, &mut scratch);
        for (dst, src) in lane.iter_mut().zip(line.iter()) {
            *dst = *src;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Wcs;
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn grid(ny: usize, nx: usize, pixel_deg: f64) -> GridDescriptor {
        GridDescriptor::new((ny, nx), Wcs::car(pixel_deg)).unwrap()
    }

    #[test]
    fn test_constant_map_concentrates_in_zero_mode() {
        let g = grid(4, 8, 180.0 / std::f64::consts::PI);
        let transform = SpectralTransform::new(&g);
        let map = Array2::from_elem((4, 8), 2.0);
        let kmap = transform.forward(&map).unwrap();
        let k = kmap.data();
        // unitary DFT of a constant c over N pixels puts c * sqrt(N) in mode 0
        assert_relative_eq!(k[[0, 0]].re, 2.0 * (32.0f64).sqrt(), epsilon = 1e-10);
        for ((y, x), c) in k.indexed_iter() {
            if (y, x) != (0, 0) {
                assert!(c.norm() < 1e-10);
            }
        }
    }

    #[test]
    fn test_forward_preserves_integrated_power() {
        let g = grid(8, 6, 0.5);
        let transform = SpectralTransform::new(&g);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let map = Array2::from_shape_fn((8, 6), |_| normal.sample(&mut rng));
        let kmap = transform.forward(&map).unwrap();
        let real_power: f64 = map.iter().map(|v| v * v).sum::<f64>() * g.pixel_area();
        let fourier_power: f64 = kmap.data().iter().map(|c| c.norm_sqr()).sum();
        assert_relative_eq!(real_power, fourier_power, max_relative = 1e-10);
    }

    #[test]
    fn test_round_trip_leading_axes() {
        let g = grid(5, 7, 0.25);
        let transform = SpectralTransform::new(&g);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let map = Array3::from_shape_fn((3, 5, 7), |_| normal.sample(&mut rng));
        let kmap = transform.forward(&map).unwrap();
        let back = transform.inverse_real(&kmap).unwrap();
        for (a, b) in map.iter().zip(back.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let transform = SpectralTransform::new(&grid(4, 4, 0.5));
        let map = Array2::<f64>::zeros((4, 5));
        assert!(matches!(
            transform.forward(&map),
            Err(NoiseError::ShapeMismatch { .. })
        ));
    }
}
