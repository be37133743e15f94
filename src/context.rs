//! Session context
//!
//! Loads the apodization mask and the inverse-variance stack of one
//! season/patch/array once, then runs estimation and generation against
//! them.

use ndarray::{s, Array2, Array4, Array5};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{NoiseError, Result};
use crate::estimator::{self, EstimatorOptions};
use crate::generator::{self, GeneratorOptions};
use crate::grid::GridDescriptor;
use crate::maps::{
    ApodMask, CovarianceSqrt, IvarMaps, NoiseCovariance, NoiseRealization, SkyMaps, NCOMP,
};
use crate::plot::PlotSink;
use crate::repository::{MapId, MapRepository};

pub struct DataModel<'a> {
    config: Config,
    repo: &'a dyn MapRepository,
    bands: Vec<String>,
    mask: ApodMask,
    ivar: IvarMaps,
}

impl std::fmt::Debug for DataModel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataModel")
            .field("session", &self.config.session)
            .field("bands", &self.bands)
            .field("grid", self.grid())
            .finish()
    }
}

impl<'a> DataModel<'a> {
    /// Load the mask and every ivar map of the configured session.
    ///
    /// The mask defines the grid; every ivar map must live on the same one.
    pub fn load(config: &Config, repo: &'a dyn MapRepository) -> Result<Self> {
        config.validate()?;
        let bands = config.bands()?.to_vec();
        let nsplits = config.session.nsplits;

        let mask = repo.read_mask(&config.session.patch)?;
        let grid = mask.grid;
        grid.ensure_spatial("apodization mask", mask.data.dim())?;
        let mask = ApodMask::new(grid.clone(), mask.data)?;

        let (ny, nx) = grid.shape();
        let mut ivar = Array4::zeros((bands.len(), nsplits, ny, nx));
        for (f, band) in bands.iter().enumerate() {
            for split in 0..nsplits {
                let id = map_id(config, band, split);
                let map = repo.read_ivar(&id)?;
                grid.ensure_same(&map.grid, "ivar map vs mask grid")?;
                grid.ensure_spatial("ivar map", map.data.dim())?;
                ivar.slice_mut(s![f, split, .., ..]).assign(&map.data);
            }
        }
        let ivar = IvarMaps::new(grid.clone(), ivar)?;
        info!(
            season = %config.session.season,
            patch = %config.session.patch,
            array = %config.session.array,
            nfreqs = bands.len(),
            nsplits,
            shape = ?grid.shape(),
            "loaded session"
        );

        Ok(Self {
            config: config.clone(),
            repo,
            bands,
            mask,
            ivar,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grid(&self) -> &GridDescriptor {
        self.mask.grid()
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn nfreqs(&self) -> usize {
        self.bands.len()
    }

    pub fn nsplits(&self) -> usize {
        self.config.session.nsplits
    }

    pub fn ivar(&self) -> &IvarMaps {
        &self.ivar
    }

    pub fn mask(&self) -> &ApodMask {
        &self.mask
    }

    pub fn modlmap(&self) -> Array2<f64> {
        self.grid().modlmap()
    }

    /// Read the split maps of every band, [frequency, split, component, y, x].
    pub fn load_splits(&self) -> Result<SkyMaps> {
        let (ny, nx) = self.grid().shape();
        let mut data = Array5::zeros((self.nfreqs(), self.nsplits(), NCOMP, ny, nx));
        for (f, band) in self.bands.iter().enumerate() {
            for split in 0..self.nsplits() {
                let id = map_id(&self.config, band, split);
                let map = self.repo.read_map(&id)?;
                self.grid().ensure_same(&map.grid, "split map vs mask grid")?;
                if map.data.dim() != (NCOMP, ny, nx) {
                    return Err(NoiseError::shape(
                        "split map",
                        (NCOMP, ny, nx),
                        map.data.dim(),
                    ));
                }
                debug!(file = %id.map_file_name(), "read split map");
                data.slice_mut(s![f, split, .., .., ..]).assign(&map.data);
            }
        }
        SkyMaps::new(self.grid().clone(), data)
    }

    /// Noise covariance of the given splits, weighted by this session's
    /// ivar maps and apodized by its mask.
    pub fn estimate_n2d(
        &self,
        splits: &SkyMaps,
        options: &EstimatorOptions,
        sink: Option<&mut dyn PlotSink>,
    ) -> Result<NoiseCovariance> {
        estimator::estimate_n2d(splits, &self.ivar, &self.mask, options, sink)
    }

    /// Noise realization with this session's ivar maps.
    pub fn generate_noise_sim(
        &self,
        covsqrt: &CovarianceSqrt,
        options: &GeneratorOptions,
    ) -> Result<NoiseRealization> {
        generator::generate_noise_sim(covsqrt, &self.ivar, options)
    }
}

fn map_id(config: &Config, band: &str, split: usize) -> MapId {
    MapId {
        season: config.session.season.clone(),
        patch: config.session.patch.clone(),
        array: config.session.array.clone(),
        band: band.to_string(),
        split,
    }
}
