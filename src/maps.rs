//! Typed map containers
//!
//! Every container pairs an explicitly ranked array with the grid it lives
//! on. Constructors check the trailing (y, x) dimensions against the grid so
//! that later broadcasts only need to compare leading axes.

use ndarray::{s, Array, Array2, Array4, Array5, ArrayView2, Axis, Dimension};
use rustfft::num_complex::Complex64;

use crate::error::{NoiseError, Result};
use crate::grid::GridDescriptor;

/// Components per frequency: intensity plus two polarization channels
pub const NCOMP: usize = 3;

fn spatial_dims(shape: &[usize]) -> (usize, usize) {
    let n = shape.len();
    (shape[n - 2], shape[n - 1])
}

/// Split maps indexed by [frequency, split, component, y, x]
#[derive(Debug, Clone)]
pub struct SkyMaps {
    grid: GridDescriptor,
    data: Array5<f64>,
}

impl SkyMaps {
    pub fn new(grid: GridDescriptor, data: Array5<f64>) -> Result<Self> {
        grid.ensure_spatial("split maps", spatial_dims(data.shape()))?;
        if data.shape()[2] != NCOMP {
            return Err(NoiseError::shape(
                "split map components",
                NCOMP,
                data.shape()[2],
            ));
        }
        Ok(Self { grid, data })
    }

    pub fn grid(&self) -> &GridDescriptor {
        &self.grid
    }

    pub fn data(&self) -> &Array5<f64> {
        &self.data
    }

    pub fn nfreqs(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn nsplits(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn into_inner(self) -> Array5<f64> {
        self.data
    }
}

/// Inverse-variance weights indexed by [frequency, split, y, x]
#[derive(Debug, Clone)]
pub struct IvarMaps {
    grid: GridDescriptor,
    data: Array4<f64>,
}

impl IvarMaps {
    /// Wrap a weight stack, rejecting negative or non-finite weights.
    pub fn new(grid: GridDescriptor, data: Array4<f64>) -> Result<Self> {
        grid.ensure_spatial("ivar maps", spatial_dims(data.shape()))?;
        for ((freq, split, _, _), &value) in data.indexed_iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(NoiseError::InvalidWeight { freq, split, value });
            }
        }
        Ok(Self { grid, data })
    }

    /// Accept the single-component layout [frequency, split, 1, y, x].
    pub fn from_components(grid: GridDescriptor, data: Array5<f64>) -> Result<Self> {
        if data.shape()[2] != 1 {
            return Err(NoiseError::shape("ivar components", 1, data.shape()[2]));
        }
        Self::new(grid, data.index_axis_move(Axis(2), 0))
    }

    pub fn grid(&self) -> &GridDescriptor {
        &self.grid
    }

    pub fn data(&self) -> &Array4<f64> {
        &self.data
    }

    pub fn nfreqs(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn nsplits(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn slice(&self, freq: usize, split: usize) -> ArrayView2<'_, f64> {
        self.data.slice(s![freq, split, .., ..])
    }

    /// Fail unless these weights cover exactly the frequencies and splits of `maps`.
    pub fn ensure_matches(&self, maps: &SkyMaps) -> Result<()> {
        self.grid.ensure_same(maps.grid(), "ivar vs split maps grid")?;
        let expected = (maps.nfreqs(), maps.nsplits());
        let got = (self.nfreqs(), self.nsplits());
        if expected != got {
            return Err(NoiseError::shape("ivar (freq, split)", expected, got));
        }
        Ok(())
    }
}

/// Apodization mask indexed by [y, x]
#[derive(Debug, Clone)]
pub struct ApodMask {
    grid: GridDescriptor,
    data: Array2<f64>,
}

impl ApodMask {
    pub fn new(grid: GridDescriptor, data: Array2<f64>) -> Result<Self> {
        grid.ensure_spatial("apodization mask", data.dim())?;
        Ok(Self { grid, data })
    }

    /// Mask of ones over the whole grid
    pub fn ones(grid: GridDescriptor) -> Self {
        let data = Array2::ones(grid.shape());
        Self { grid, data }
    }

    pub fn grid(&self) -> &GridDescriptor {
        &self.grid
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }
}

/// Complex Fourier-domain coefficients, same leading layout as the real map
/// they were transformed from
#[derive(Debug, Clone)]
pub struct FourierMaps<D: Dimension> {
    grid: GridDescriptor,
    data: Array<Complex64, D>,
}

impl<D: Dimension> FourierMaps<D> {
    pub(crate) fn from_parts(grid: GridDescriptor, data: Array<Complex64, D>) -> Self {
        Self { grid, data }
    }

    pub fn grid(&self) -> &GridDescriptor {
        &self.grid
    }

    pub fn data(&self) -> &Array<Complex64, D> {
        &self.data
    }

    pub fn into_inner(self) -> Array<Complex64, D> {
        self.data
    }
}

fn check_square_stack(
    grid: &GridDescriptor,
    data: &Array4<f64>,
    context: &'static str,
) -> Result<()> {
    let (n0, n1, ny, nx) = data.dim();
    grid.ensure_spatial(context, (ny, nx))?;
    if n0 != n1 || n0 == 0 || n0 % NCOMP != 0 {
        return Err(NoiseError::shape(
            context,
            "[3 * nfreqs, 3 * nfreqs, ny, nx]",
            data.shape(),
        ));
    }
    Ok(())
}

/// Per-mode noise covariance indexed by [component, component, y, x], where
/// component runs over frequency-major (frequency, I/Q/U) pairs
#[derive(Debug, Clone)]
pub struct NoiseCovariance {
    grid: GridDescriptor,
    data: Array4<f64>,
}

impl NoiseCovariance {
    pub fn new(grid: GridDescriptor, data: Array4<f64>) -> Result<Self> {
        check_square_stack(&grid, &data, "noise covariance")?;
        Ok(Self { grid, data })
    }

    pub fn grid(&self) -> &GridDescriptor {
        &self.grid
    }

    pub fn data(&self) -> &Array4<f64> {
        &self.data
    }

    pub fn ncomp(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn into_inner(self) -> Array4<f64> {
        self.data
    }
}

/// Precomputed per-mode square root of the noise covariance, same layout as
/// [`NoiseCovariance`]
#[derive(Debug, Clone)]
pub struct CovarianceSqrt {
    grid: GridDescriptor,
    data: Array4<f64>,
}

impl CovarianceSqrt {
    pub fn new(grid: GridDescriptor, data: Array4<f64>) -> Result<Self> {
        check_square_stack(&grid, &data, "covariance square root")?;
        Ok(Self { grid, data })
    }

    /// `scale` times the identity at every mode
    pub fn scaled_identity(grid: GridDescriptor, nfreqs: usize, scale: f64) -> Self {
        let ncomp = nfreqs * NCOMP;
        let (ny, nx) = grid.shape();
        let mut data = Array4::zeros((ncomp, ncomp, ny, nx));
        for a in 0..ncomp {
            data.slice_mut(s![a, a, .., ..]).fill(scale);
        }
        Self { grid, data }
    }

    pub fn grid(&self) -> &GridDescriptor {
        &self.grid
    }

    pub fn data(&self) -> &Array4<f64> {
        &self.data
    }

    pub fn ncomp(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn nfreqs(&self) -> usize {
        self.ncomp() / NCOMP
    }
}

/// Simulated noise indexed by [frequency, split, component, y, x]
#[derive(Debug, Clone)]
pub struct NoiseRealization {
    grid: GridDescriptor,
    data: Array5<f64>,
}

impl NoiseRealization {
    pub(crate) fn from_parts(grid: GridDescriptor, data: Array5<f64>) -> Self {
        Self { grid, data }
    }

    pub fn grid(&self) -> &GridDescriptor {
        &self.grid
    }

    pub fn data(&self) -> &Array5<f64> {
        &self.data
    }

    pub fn into_inner(self) -> Array5<f64> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Wcs;

    fn grid(ny: usize, nx: usize) -> GridDescriptor {
        GridDescriptor::new((ny, nx), Wcs::car(0.5)).unwrap()
    }

    #[test]
    fn test_sky_maps_requires_three_components() {
        let g = grid(4, 4);
        assert!(SkyMaps::new(g.clone(), Array5::zeros((1, 2, 3, 4, 4))).is_ok());
        assert!(SkyMaps::new(g.clone(), Array5::zeros((1, 2, 1, 4, 4))).is_err());
        assert!(SkyMaps::new(g, Array5::zeros((1, 2, 3, 4, 5))).is_err());
    }

    #[test]
    fn test_ivar_rejects_negative() {
        let g = grid(2, 2);
        let mut data = Array4::ones((1, 2, 2, 2));
        data[[0, 1, 1, 0]] = -1.0;
        match IvarMaps::new(g, data) {
            Err(NoiseError::InvalidWeight { freq, split, value }) => {
                assert_eq!((freq, split), (0, 1));
                assert_eq!(value, -1.0);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_ivar_from_components() {
        let g = grid(3, 3);
        let ivar = IvarMaps::from_components(g.clone(), Array5::ones((2, 4, 1, 3, 3))).unwrap();
        assert_eq!(ivar.data().dim(), (2, 4, 3, 3));
        assert!(IvarMaps::from_components(g, Array5::ones((2, 4, 3, 3, 3))).is_err());
    }

    #[test]
    fn test_ivar_must_match_maps() {
        let g = grid(4, 4);
        let maps = SkyMaps::new(g.clone(), Array5::zeros((2, 4, 3, 4, 4))).unwrap();
        let ivar = IvarMaps::new(g.clone(), Array4::ones((2, 4, 4, 4))).unwrap();
        assert!(ivar.ensure_matches(&maps).is_ok());
        let ivar = IvarMaps::new(g, Array4::ones((1, 4, 4, 4))).unwrap();
        assert!(ivar.ensure_matches(&maps).is_err());
    }

    #[test]
    fn test_covariance_sqrt_shape_contract() {
        let g = grid(4, 4);
        assert!(CovarianceSqrt::new(g.clone(), Array4::zeros((6, 6, 4, 4))).is_ok());
        assert!(CovarianceSqrt::new(g.clone(), Array4::zeros((4, 4, 4, 4))).is_err());
        assert!(CovarianceSqrt::new(g.clone(), Array4::zeros((3, 6, 4, 4))).is_err());
        let c = CovarianceSqrt::scaled_identity(g, 2, 2.5);
        assert_eq!(c.nfreqs(), 2);
        assert_eq!(c.data()[[4, 4, 1, 2]], 2.5);
        assert_eq!(c.data()[[4, 3, 1, 2]], 0.0);
    }
}
