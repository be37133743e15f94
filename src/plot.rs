//! Diagnostic output sink
//!
//! Estimation can optionally emit intermediate 2D arrays for inspection.
//! Rendering them is left to the caller's implementation of [`PlotSink`].

use ndarray::{Array2, ArrayView2};

/// Receiver of labelled diagnostic images
pub trait PlotSink {
    fn plot(&mut self, label: &str, image: ArrayView2<'_, f64>);
}

/// Sink that keeps every emitted image in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPlotSink {
    pub images: Vec<(String, Array2<f64>)>,
}

impl MemoryPlotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.images
            .iter()
            .map(|(label, _)| label.as_str())
            .collect()
    }

    pub fn get(&self, label: &str) -> Option<&Array2<f64>> {
        self.images
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, image)| image)
    }
}

impl PlotSink for MemoryPlotSink {
    fn plot(&mut self, label: &str, image: ArrayView2<'_, f64>) {
        self.images.push((label.to_string(), image.to_owned()));
    }
}
