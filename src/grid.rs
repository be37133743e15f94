//! Grid descriptors
//!
//! A grid descriptor pairs the pixel shape of a map with its world
//! coordinate system. Every operand of an estimation or generation call
//! must carry an identical descriptor.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{NoiseError, Result};

/// Sky projection of a rectangular pixelization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    /// Plate carrée
    Car,
    /// Cylindrical equal area
    Cea,
}

/// World coordinate system of a rectangular pixel grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wcs {
    pub projection: Projection,
    /// Pixel spacing in degrees along (y, x)
    pub cdelt: [f64; 2],
    /// Reference coordinate in degrees along (y, x)
    pub crval: [f64; 2],
    /// Reference pixel along (y, x)
    pub crpix: [f64; 2],
}

impl Wcs {
    /// Plate carrée grid with square pixels of `pixel_deg` degrees, centred
    /// on the origin.
    pub fn car(pixel_deg: f64) -> Self {
        Self {
            projection: Projection::Car,
            cdelt: [pixel_deg, -pixel_deg],
            crval: [0.0, 0.0],
            crpix: [0.0, 0.0],
        }
    }

    /// Cylindrical equal-area grid with `pixel_deg` steps in right
    /// ascension and in sin(dec) (as degrees), centred on the origin.
    pub fn cea(pixel_deg: f64) -> Self {
        Self {
            projection: Projection::Cea,
            ..Self::car(pixel_deg)
        }
    }

    /// Coordinate spacing in radians along (y, x)
    pub fn pixel_radians(&self) -> (f64, f64) {
        (
            self.cdelt[0].abs() * PI / 180.0,
            self.cdelt[1].abs() * PI / 180.0,
        )
    }

    /// Physical pixel spacing in radians along (y, x) at the reference
    /// declination `crval[0]`.
    ///
    /// CAR rows are evenly spaced in declination, CEA rows in sin(dec), so a
    /// CEA row step covers `dy / cos(dec)` of declination. Both shrink in
    /// right ascension by `cos(dec)`.
    pub fn physical_spacing(&self) -> (f64, f64) {
        let (dy, dx) = self.pixel_radians();
        let cos_dec = (self.crval[0] * PI / 180.0).cos();
        match self.projection {
            Projection::Car => (dy, dx * cos_dec),
            Projection::Cea => (dy / cos_dec, dx * cos_dec),
        }
    }
}

/// Pixel shape plus coordinate system shared by every map-like entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDescriptor {
    shape: (usize, usize),
    wcs: Wcs,
}

impl GridDescriptor {
    pub fn new(shape: (usize, usize), wcs: Wcs) -> Result<Self> {
        if shape.0 == 0 || shape.1 == 0 {
            return Err(NoiseError::shape("grid", "non-empty (ny, nx)", shape));
        }
        let dec = wcs.crval[0];
        if !dec.is_finite() || dec.abs() >= 90.0 {
            return Err(NoiseError::InvalidConfig(format!(
                "reference declination must lie strictly between the poles, got {dec}"
            )));
        }
        let (dy, dx) = wcs.physical_spacing();
        if !(dy.is_finite() && dx.is_finite() && dy > 0.0 && dx > 0.0) {
            return Err(NoiseError::InvalidConfig(format!(
                "pixel spacing must be finite and non-zero, got {:?}",
                wcs.cdelt
            )));
        }
        Ok(Self { shape, wcs })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn ny(&self) -> usize {
        self.shape.0
    }

    pub fn nx(&self) -> usize {
        self.shape.1
    }

    pub fn npix(&self) -> usize {
        self.shape.0 * self.shape.1
    }

    pub fn wcs(&self) -> &Wcs {
        &self.wcs
    }

    /// Solid angle of one pixel in steradians at the reference declination
    /// (flat-sky)
    pub fn pixel_area(&self) -> f64 {
        let (dy, dx) = self.wcs.physical_spacing();
        dy * dx
    }

    /// Fail unless `other` describes exactly the same grid.
    pub fn ensure_same(&self, other: &GridDescriptor, context: &'static str) -> Result<()> {
        if self != other {
            return Err(NoiseError::shape(context, self, other));
        }
        Ok(())
    }

    /// Fail unless the trailing (y, x) dimensions of an array match this grid.
    pub fn ensure_spatial(&self, context: &'static str, dims: (usize, usize)) -> Result<()> {
        if dims != self.shape {
            return Err(NoiseError::shape(context, self.shape, dims));
        }
        Ok(())
    }

    /// Magnitude of the angular wavenumber |l| of every Fourier mode, in the
    /// unshifted FFT layout.
    pub fn modlmap(&self) -> Array2<f64> {
        let (dy, dx) = self.wcs.physical_spacing();
        let ly = fft_frequencies(self.ny(), dy);
        let lx = fft_frequencies(self.nx(), dx);
        Array2::from_shape_fn(self.shape, |(y, x)| {
            let (ky, kx) = (2.0 * PI * ly[y], 2.0 * PI * lx[x]);
            (ky * ky + kx * kx).sqrt()
        })
    }
}

/// Sample frequencies of an `n`-point DFT with spacing `d`, in cycles per
/// unit of `d`.
fn fft_frequencies(n: usize, d: f64) -> Vec<f64> {
    let scale = 1.0 / (n as f64 * d);
    (0..n)
        .map(|k| {
            let signed = if k < (n + 1) / 2 {
                k as f64
            } else {
                k as f64 - n as f64
            };
            signed * scale
        })
        .collect()
}
