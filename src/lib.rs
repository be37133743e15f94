//! splitnoise - split-based map noise modelling
//!
//! Estimates the two-dimensional Fourier-space noise covariance of sky maps
//! observed as several independent splits, weighted by inverse-variance
//! maps, and draws Gaussian noise realizations with a given covariance
//! square root.

pub mod config;
pub mod context;
pub mod error;
pub mod estimator;
pub mod generator;
pub mod grid;
pub mod maps;
pub mod plot;
pub mod repository;
pub mod seed;
pub mod transform;

// Re-export main types
pub use config::Config;
pub use context::DataModel;
pub use error::{NoiseError, Result};
pub use estimator::{coadd, estimate_n2d, EstimatorOptions};
pub use generator::{generate_noise_sim, rand_gauss_harm, GeneratorOptions};
pub use grid::{GridDescriptor, Projection, Wcs};
pub use maps::{
    ApodMask, CovarianceSqrt, FourierMaps, IvarMaps, NoiseCovariance, NoiseRealization, SkyMaps,
    NCOMP,
};
pub use plot::{MemoryPlotSink, PlotSink};
pub use repository::{InMemoryRepository, MapId, MapRepository};
pub use seed::Seed;
pub use transform::SpectralTransform;
