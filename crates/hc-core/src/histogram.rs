//! Histogram template type bound by observations, processes and shape
//! systematics.

use serde::{Deserialize, Serialize};

/// A 1D binned template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Histogram name.
    pub name: String,
    /// Bin edges (length = bin_content.len() + 1).
    pub bin_edges: Vec<f64>,
    /// Bin contents (excluding under/overflow).
    pub bin_content: Vec<f64>,
    /// Sum of weights squared per bin (for statistical errors), if stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sumw2: Option<Vec<f64>>,
    /// Total number of entries.
    #[serde(default)]
    pub entries: f64,
}

impl Histogram {
    /// Create a histogram with unit-width bins starting at 0 and no sumw2.
    pub fn from_content(name: impl Into<String>, bin_content: Vec<f64>) -> Self {
        let bin_edges = (0..=bin_content.len()).map(|i| i as f64).collect();
        let entries = bin_content.iter().sum();
        Self { name: name.into(), bin_edges, bin_content, sumw2: None, entries }
    }

    /// Number of bins (excluding under/overflow).
    pub fn n_bins(&self) -> usize {
        self.bin_content.len()
    }

    /// Total content summed over all bins.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Statistical variance of bin `i`: stored sumw2 when available,
    /// otherwise the bin content (unit-weight Poisson).
    pub fn variance(&self, i: usize) -> f64 {
        match &self.sumw2 {
            Some(sw2) => sw2[i].max(0.0),
            None => self.bin_content[i].max(0.0),
        }
    }

    /// Scale every bin content (and sumw2, quadratically) by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.bin_content {
            *v *= factor;
        }
        if let Some(sw2) = &mut self.sumw2 {
            for v in sw2 {
                *v *= factor * factor;
            }
        }
    }
}
