//! Session configuration
//!
//! An explicit configuration value built by the caller, usually from a TOML
//! file. Nothing in the crate reads configuration from global state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NoiseError, Result};
use crate::estimator::EstimatorOptions;
use crate::generator::{GeneratorOptions, DEFAULT_BINARY_PERCENTILE};
use crate::seed::Seed;

/// Storage roots, resolved by the map repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub map_root: PathBuf,
    pub mask_root: PathBuf,
    pub plots: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            map_root: PathBuf::from("maps"),
            mask_root: PathBuf::from("masks"),
            plots: None,
        }
    }
}

/// Which observations make up the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub season: String,
    pub patch: String,
    pub array: String,
    pub nsplits: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            season: "s15".to_string(),
            patch: "deep8".to_string(),
            array: "pa3".to_string(),
            nsplits: 4,
        }
    }
}

/// Generator settings as written in the file; the seed stays untyped until
/// [`Config::generator_options`] checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub binary_percentile: f64,
    pub seed: Option<serde_json::Value>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            binary_percentile: DEFAULT_BINARY_PERCENTILE,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub session: SessionConfig,
    /// Frequency bands observed by each detector array
    pub arrays: BTreeMap<String, Vec<String>>,
    pub estimator: EstimatorOptions,
    pub generator: GeneratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            session: SessionConfig::default(),
            arrays: default_arrays(),
            estimator: EstimatorOptions::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

fn default_arrays() -> BTreeMap<String, Vec<String>> {
    [
        ("pa1", vec!["f150"]),
        ("pa2", vec!["f150"]),
        ("pa3", vec!["f090", "f150"]),
    ]
    .into_iter()
    .map(|(array, bands)| {
        let bands: Vec<String> = bands.into_iter().map(str::to_string).collect();
        (array.to_string(), bands)
    })
    .collect()
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.nsplits == 0 {
            return Err(NoiseError::InvalidConfig(
                "nsplits must be greater than zero".to_string(),
            ));
        }
        if let Some((array, _)) = self.arrays.iter().find(|(_, bands)| bands.is_empty()) {
            return Err(NoiseError::InvalidConfig(format!(
                "array {array} has no frequency bands"
            )));
        }
        self.bands()?;
        self.generator_options()?.validate()
    }

    /// Frequency bands of the session's array
    pub fn bands(&self) -> Result<&[String]> {
        let array = &self.session.array;
        match self.arrays.get(array) {
            Some(bands) => Ok(bands.as_slice()),
            None => Err(NoiseError::InvalidConfig(format!("unknown array {array}"))),
        }
    }

    pub fn generator_options(&self) -> Result<GeneratorOptions> {
        let seed = self
            .generator
            .seed
            .as_ref()
            .map(Seed::try_from)
            .transpose()?;
        Ok(GeneratorOptions {
            binary_percentile: self.generator.binary_percentile,
            seed,
        })
    }

    /// Estimator options, labelling diagnostics under the plots directory
    /// when one is configured.
    pub fn estimator_options(&self) -> EstimatorOptions {
        let mut options = self.estimator.clone();
        if options.plot_label.is_none() {
            if let Some(dir) = &self.paths.plots {
                let stem = format!("{}_{}", self.session.patch, self.session.array);
                options.plot_label = Some(dir.join(stem).display().to_string());
            }
        }
        options
    }
}
