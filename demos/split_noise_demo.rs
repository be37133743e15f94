//! Split Noise Example
//!
//! Builds a synthetic session of white-noise splits, estimates the 2D noise
//! covariance from them, and draws a new realization from its diagonal.

use anyhow::{Context, Result};
use ndarray::{s, Array2, Array3, Array4, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use splitnoise::{
    Config, CovarianceSqrt, DataModel, GridDescriptor, InMemoryRepository, MapId,
    MemoryPlotSink, Wcs, NCOMP,
};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

const SHAPE: (usize, usize) = (64, 64);
/// Half an arcminute
const PIXEL_DEG: f64 = 0.5 / 60.0;

/// Depth map: deepest in the middle of the patch
fn depth(split: usize, band: usize) -> Array2<f64> {
    let (ny, nx) = SHAPE;
    let (cy, cx) = (ny as f64 / 2.0, nx as f64 / 2.0);
    Array2::from_shape_fn(SHAPE, |(y, x)| {
        let r2 = ((y as f64 - cy) / cy).powi(2) + ((x as f64 - cx) / cx).powi(2);
        (1.0 + 0.25 * split as f64) * (1.0 + band as f64) * (-r2).exp()
    })
}

/// Cosine taper over the outer eighth of the patch
fn apodization() -> Array2<f64> {
    let (ny, nx) = SHAPE;
    let taper = |i: usize, n: usize| {
        let width = n as f64 / 8.0;
        let edge = (i.min(n - 1 - i) as f64 / width).min(1.0);
        0.5 - 0.5 * (std::f64::consts::PI * edge).cos()
    };
    Array2::from_shape_fn(SHAPE, |(y, x)| taper(y, ny) * taper(x, nx))
}

fn synthetic_repository(config: &Config, grid: &GridDescriptor) -> Result<InMemoryRepository> {
    let mut rng = ChaCha8Rng::seed_from_u64(2018);
    let mut repo = InMemoryRepository::new();
    repo.insert_mask(&config.session.patch, grid.clone(), apodization());
    for (f, band) in config.bands()?.iter().enumerate() {
        for split in 0..config.session.nsplits {
            let id = MapId {
                season: config.session.season.clone(),
                patch: config.session.patch.clone(),
                array: config.session.array.clone(),
                band: band.clone(),
                split,
            };
            let ivar = depth(split, f);
            let map = Array3::from_shape_fn((NCOMP, SHAPE.0, SHAPE.1), |(_, y, x)| {
                let g: f64 = StandardNormal.sample(&mut rng);
                g / ivar[[y, x]].sqrt()
            });
            repo.insert_ivar(&id, grid.clone(), ivar);
            repo.insert_map(&id, grid.clone(), map);
        }
    }
    Ok(repo)
}

fn main() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::var("SPLITNOISE_CONFIG") {
        Ok(path) => Config::from_toml_file(&PathBuf::from(&path))
            .with_context(|| format!("loading {path}"))?,
        Err(_) => Config::default(),
    };
    let grid = GridDescriptor::new(SHAPE, Wcs::car(PIXEL_DEG))?;
    let repo = synthetic_repository(&config, &grid)?;
    let model = DataModel::load(&config, &repo)?;
    println!(
        "Session {} {} {}: {} bands x {} splits on a {:?} grid",
        config.session.season,
        config.session.patch,
        config.session.array,
        model.nfreqs(),
        model.nsplits(),
        model.grid().shape()
    );

    let splits = model.load_splits()?;
    let mut sink = MemoryPlotSink::new();
    let mut options = config.estimator_options();
    options.flattened = true;
    options.plot_label.get_or_insert_with(|| "demo".to_string());
    let n2d = model.estimate_n2d(&splits, &options, Some(&mut sink))?;
    println!("Diagnostic images: {}", sink.labels().join(", "));

    let ncomp = n2d.ncomp();
    let lmax = model.modlmap().fold(0.0f64, |acc, &l| acc.max(l));
    println!("Fourier modes up to l = {lmax:.0}");
    for i in 0..ncomp {
        let diag = n2d.data().slice(s![i, i, .., ..]);
        println!(
            "  n2d[{i}][{i}] mean {:.3e}",
            diag.mean().unwrap_or(f64::NAN)
        );
    }

    // per-mode square root of the diagonal only
    let (ny, nx) = model.grid().shape();
    let mut covsqrt = Array4::zeros((ncomp, ncomp, ny, nx));
    for i in 0..ncomp {
        let diag = n2d.data().slice(s![i, i, .., ..]);
        let root = diag.mapv(|v| v.max(0.0).sqrt());
        covsqrt.slice_mut(s![i, i, .., ..]).assign(&root);
    }
    let covsqrt = CovarianceSqrt::new(model.grid().clone(), covsqrt)?;
    let sims = model.generate_noise_sim(&covsqrt, &config.generator_options()?)?;

    for (f, band) in model.bands().iter().enumerate() {
        let observed = splits.data().index_axis(Axis(0), f);
        let simulated = sims.data().index_axis(Axis(0), f);
        println!(
            "  {band}: observed std {:.3}, simulated std {:.3} (central I pixels)",
            observed.slice(s![.., 0, 24..40, 24..40]).std(0.0),
            simulated.slice(s![.., 0, 24..40, 24..40]).std(0.0)
        );
    }

    Ok(())
}
