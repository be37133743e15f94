//! Map naming and the map repository seam
//!
//! Reading maps from storage is the caller's concern. The crate only fixes
//! how maps are identified and what a repository hands back.

use ndarray::{Array2, Array3};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::PathsConfig;
use crate::error::{NoiseError, Result};
use crate::grid::GridDescriptor;

/// One split of one band of one array
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapId {
    pub season: String,
    pub patch: String,
    pub array: String,
    pub band: String,
    pub split: usize,
}

impl MapId {
    fn prefix(&self) -> String {
        format!(
            "{}_{}_{}_{}_nohwp_night_3pass_4way_set{}",
            self.season, self.patch, self.array, self.band, self.split
        )
    }

    /// Source-subtracted I/Q/U map
    pub fn map_file_name(&self) -> String {
        format!("{}_map_srcfree.fits", self.prefix())
    }

    /// Inverse-variance map
    pub fn ivar_file_name(&self) -> String {
        format!("{}_ivar.fits", self.prefix())
    }

    pub fn map_path(&self, paths: &PathsConfig) -> PathBuf {
        paths.map_root.join(self.map_file_name())
    }

    pub fn ivar_path(&self, paths: &PathsConfig) -> PathBuf {
        paths.map_root.join(self.ivar_file_name())
    }
}

/// Apodization mask of a patch
pub fn mask_file_name(patch: &str) -> String {
    format!("{patch}_mask_run_180323_master_apo_w0.fits")
}

pub fn mask_path(patch: &str, paths: &PathsConfig) -> PathBuf {
    paths.mask_root.join(mask_file_name(patch))
}

/// Array data together with the grid it was read on
#[derive(Debug, Clone)]
pub struct Gridded<T> {
    pub grid: GridDescriptor,
    pub data: T,
}

/// Source of split maps, weights, and masks
pub trait MapRepository {
    /// I/Q/U map [component, y, x]
    fn read_map(&self, id: &MapId) -> Result<Gridded<Array3<f64>>>;
    /// Inverse-variance map [y, x]
    fn read_ivar(&self, id: &MapId) -> Result<Gridded<Array2<f64>>>;
    /// Apodization mask [y, x]
    fn read_mask(&self, patch: &str) -> Result<Gridded<Array2<f64>>>;
}

/// Repository backed by maps held in memory, keyed by file name
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    maps: HashMap<String, Gridded<Array3<f64>>>,
    images: HashMap<String, Gridded<Array2<f64>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_map(&mut self, id: &MapId, grid: GridDescriptor, data: Array3<f64>) {
        self.maps.insert(id.map_file_name(), Gridded { grid, data });
    }

    pub fn insert_ivar(&mut self, id: &MapId, grid: GridDescriptor, data: Array2<f64>) {
        self.images.insert(id.ivar_file_name(), Gridded { grid, data });
    }

    pub fn insert_mask(&mut self, patch: &str, grid: GridDescriptor, data: Array2<f64>) {
        self.images.insert(mask_file_name(patch), Gridded { grid, data });
    }

    pub fn len(&self) -> usize {
        self.maps.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MapRepository for InMemoryRepository {
    fn read_map(&self, id: &MapId) -> Result<Gridded<Array3<f64>>> {
        let name = id.map_file_name();
        self.maps
            .get(&name)
            .cloned()
            .ok_or(NoiseError::MissingMap(name))
    }

    fn read_ivar(&self, id: &MapId) -> Result<Gridded<Array2<f64>>> {
        let name = id.ivar_file_name();
        self.images
            .get(&name)
            .cloned()
            .ok_or(NoiseError::MissingMap(name))
    }

    fn read_mask(&self, patch: &str) -> Result<Gridded<Array2<f64>>> {
        let name = mask_file_name(patch);
        self.images
            .get(&name)
            .cloned()
            .ok_or(NoiseError::MissingMap(name))
    }
}
