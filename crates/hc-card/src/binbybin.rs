//! Bin-by-bin statistical uncertainties: one shape-kind systematic per
//! histogram bin whose relative statistical uncertainty exceeds a
//! threshold.

use hc_core::{Histogram, Result};

use crate::registry::{Registry, Systematic};
use crate::select::Selection;
use crate::syst::SystKind;

/// Factory synthesizing per-histogram-bin statistical nuisances from the
/// limited statistics of bound templates.
#[derive(Debug, Clone)]
pub struct BinByBinFactory {
    add_threshold: f64,
    fix_norm: bool,
}

impl Default for BinByBinFactory {
    fn default() -> Self {
        Self { add_threshold: 0.0, fix_norm: false }
    }
}

impl BinByBinFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fractional statistical-uncertainty threshold a histogram bin must
    /// exceed (strictly) before a nuisance is created for it.
    pub fn set_add_threshold(mut self, threshold: f64) -> Self {
        self.add_threshold = threshold;
        self
    }

    /// Rescale shifted templates to the nominal integral, so each nuisance
    /// captures shape migration only, not a rate change.
    pub fn set_fix_norm(mut self, fix_norm: bool) -> Self {
        self.fix_norm = fix_norm;
        self
    }

    /// Synthesize and attach nuisances for every process matching `sel`.
    ///
    /// For each histogram bin `i` of a bound template with
    /// `sqrt(variance_i)/content_i > threshold`, a shape systematic named
    /// from (bin, process, i) is attached whose up/down templates move only
    /// bin `i` by one standard deviation (the down shift clamped at zero).
    pub fn add_bin_by_bin(&self, sel: &Selection, registry: &mut Registry) -> Result<()> {
        for idx in 0..registry.processes().len() {
            if !sel.matches_process(&registry.processes()[idx]) {
                continue;
            }
            let synthesized: Vec<Systematic> = {
                let proc = &registry.processes()[idx];
                let Some(nominal) = proc.shape.as_ref() else { continue };
                self.synthesize(&proc.bin, &proc.name, nominal)
            };
            if synthesized.is_empty() {
                continue;
            }
            tracing::debug!(
                process = %registry.processes()[idx].name,
                bin = %registry.processes()[idx].bin,
                count = synthesized.len(),
                "adding bin-by-bin systematics"
            );
            for syst in synthesized {
                registry.processes_mut()[idx].attach(syst)?;
            }
        }
        Ok(())
    }

    /// Nuisances for the template bins of one process that fail the
    /// threshold.
    fn synthesize(&self, bin: &str, process: &str, nominal: &Histogram) -> Vec<Systematic> {
        let total = nominal.integral();
        let mut out = Vec::new();

        for i in 0..nominal.n_bins() {
            let content = nominal.bin_content[i];
            if content <= 0.0 {
                continue;
            }
            let err = nominal.variance(i).sqrt();
            if err / content <= self.add_threshold {
                continue;
            }

            let name = format!("{}_{}_bin_{}", bin, process, i);
            let mut syst = Systematic::new(name.clone(), SystKind::Shape, 1.0);
            syst.shape_up = Some(self.shifted(nominal, i, err, total, &format!("{}Up", name)));
            syst.shape_down =
                Some(self.shifted(nominal, i, -err, total, &format!("{}Down", name)));
            out.push(syst);
        }
        out
    }

    /// Nominal with bin `i` moved by `delta`, clamped at zero, optionally
    /// rescaled back to the nominal integral.
    fn shifted(
        &self,
        nominal: &Histogram,
        i: usize,
        delta: f64,
        nominal_total: f64,
        name: &str,
    ) -> Histogram {
        let mut hist = nominal.clone();
        hist.name = name.to_string();
        hist.bin_content[i] = (hist.bin_content[i] + delta).max(0.0);
        if self.fix_norm {
            let total = hist.integral();
            if total > 0.0 {
                hist.scale(nominal_total / total);
            }
        }
        hist
    }
}
