//! The model registry: bins, observations, processes and their attached
//! systematics, plus rate/uncertainty read-back over a selection.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use hc_core::{Error, Histogram, Result};

use crate::select::Selection;
use crate::syst::SystKind;
use crate::template::Tokens;

/// An analysis category: integer id for ordering/display, unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    pub id: i32,
    pub name: String,
}

impl Bin {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Measured data for one (bin, era, channel) triple.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Analysis tag.
    pub analysis: String,
    /// Data-taking era.
    pub era: String,
    /// Analysis channel.
    pub channel: String,
    /// Bin name.
    pub bin: String,
    /// Bin id (ordering/display only).
    pub bin_id: i32,
    /// Missing templates for this entry are tolerated.
    pub optional: bool,
    /// Bound data histogram, absent until extraction.
    pub shape: Option<Histogram>,
}

impl Observation {
    /// Observed event count: total content of the bound histogram, 0 when
    /// unbound.
    pub fn rate(&self) -> f64 {
        self.shape.as_ref().map(Histogram::integral).unwrap_or(0.0)
    }

    pub(crate) fn tokens(&self) -> Tokens<'_> {
        Tokens {
            analysis: Some(&self.analysis),
            bin: Some(&self.bin),
            channel: Some(&self.channel),
            era: Some(&self.era),
            // Data histograms follow the fixed data_obs naming convention.
            process: Some("data_obs"),
            ..Default::default()
        }
    }
}

/// One physical contribution (signal or background) to one bin.
#[derive(Debug, Clone)]
pub struct Process {
    /// Process name (shared across bins/eras; identity is the full tuple).
    pub name: String,
    /// Analysis tag.
    pub analysis: String,
    /// Data-taking era.
    pub era: String,
    /// Analysis channel.
    pub channel: String,
    /// Bin name.
    pub bin: String,
    /// Bin id (ordering/display only).
    pub bin_id: i32,
    /// Signal mass label; `*` for backgrounds.
    pub mass: String,
    /// Signal flag.
    pub signal: bool,
    /// Missing templates for this entry are tolerated.
    pub optional: bool,
    /// Rate: integral of the bound nominal histogram, 0 when unbound.
    pub rate: f64,
    /// Bound nominal histogram.
    pub shape: Option<Histogram>,
    /// Attached systematics, each owned by exactly this process.
    pub systematics: Vec<Systematic>,
}

impl Process {
    pub(crate) fn tokens(&self) -> Tokens<'_> {
        Tokens {
            analysis: Some(&self.analysis),
            bin: Some(&self.bin),
            channel: Some(&self.channel),
            era: Some(&self.era),
            mass: Some(&self.mass),
            process: Some(&self.name),
            ..Default::default()
        }
    }

    /// Attach a systematic, rejecting a duplicate resolved name.
    pub(crate) fn attach(&mut self, syst: Systematic) -> Result<()> {
        if self.systematics.iter().any(|s| s.name == syst.name) {
            return Err(Error::DuplicateSystematic(format!(
                "'{}' already attached to process '{}' in bin '{}'",
                syst.name, self.name, self.bin
            )));
        }
        self.systematics.push(syst);
        Ok(())
    }
}

/// One nuisance parameter attached to a single process.
#[derive(Debug, Clone)]
pub struct Systematic {
    /// Resolved name (after token substitution).
    pub name: String,
    /// Multiplicative (lnN) or shape variation.
    pub kind: SystKind,
    /// Effect value: lnN factor, or scale of the shape variation.
    pub value: f64,
    /// Missing shifted templates for this systematic are tolerated.
    pub optional: bool,
    /// Up-shifted template (shape kind only).
    pub shape_up: Option<Histogram>,
    /// Down-shifted template (shape kind only).
    pub shape_down: Option<Histogram>,
}

impl Systematic {
    pub fn new(name: impl Into<String>, kind: SystKind, value: f64) -> Self {
        Self { name: name.into(), kind, value, optional: false, shape_up: None, shape_down: None }
    }

    /// Effect of this nuisance on the owning process rate (one standard
    /// deviation, symmetrized for shape variations).
    pub fn rate_shift(&self, rate: f64) -> f64 {
        match self.kind {
            SystKind::LogNormal => (self.value - 1.0) * rate,
            SystKind::Shape => match (&self.shape_up, &self.shape_down) {
                (Some(up), Some(down)) => self.value * (up.integral() - down.integral()) / 2.0,
                _ => 0.0,
            },
        }
    }
}

/// The authoritative in-memory collection of observations and processes.
///
/// Populated once during model setup; systematics are added through
/// [`Registry::add_syst`] and the bin-by-bin factory; shapes are bound by
/// extraction. Entries are never deleted.
#[derive(Debug, Default)]
pub struct Registry {
    observations: Vec<Observation>,
    processes: Vec<Process>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation per bin for an (analysis, era, channel) triple.
    pub fn add_observations(&mut self, analysis: &str, era: &str, channel: &str, bins: &[Bin]) {
        for bin in bins {
            self.observations.push(Observation {
                analysis: analysis.to_string(),
                era: era.to_string(),
                channel: channel.to_string(),
                bin: bin.name.clone(),
                bin_id: bin.id,
                optional: false,
                shape: None,
            });
        }
    }

    /// Add one process per (mass, name, bin) combination. Background calls
    /// conventionally pass a single `"*"` mass label.
    pub fn add_processes(
        &mut self,
        masses: &[&str],
        analysis: &str,
        era: &str,
        channel: &str,
        names: &[&str],
        bins: &[Bin],
        signal: bool,
    ) {
        for mass in masses {
            for name in names {
                for bin in bins {
                    self.processes.push(Process {
                        name: name.to_string(),
                        analysis: analysis.to_string(),
                        era: era.to_string(),
                        channel: channel.to_string(),
                        bin: bin.name.clone(),
                        bin_id: bin.id,
                        mass: mass.to_string(),
                        signal,
                        optional: false,
                        rate: 0.0,
                        shape: None,
                        systematics: Vec::new(),
                    });
                }
            }
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub(crate) fn observations_mut(&mut self) -> &mut [Observation] {
        &mut self.observations
    }

    pub(crate) fn processes_mut(&mut self) -> &mut [Process] {
        &mut self.processes
    }

    pub(crate) fn push_observation(&mut self, obs: Observation) {
        self.observations.push(obs);
    }

    pub(crate) fn push_process(&mut self, proc: Process) {
        self.processes.push(proc);
    }

    /// The closed set of bin names referenced by observations, processes
    /// and (through their owning processes) systematics.
    pub fn bin_set(&self) -> BTreeSet<String> {
        self.observations
            .iter()
            .map(|o| o.bin.clone())
            .chain(self.processes.iter().map(|p| p.bin.clone()))
            .collect()
    }

    /// Mark every matching process (and its systematics) as optional or
    /// required for template extraction.
    pub fn set_optional(&mut self, sel: &Selection, optional: bool) {
        for obs in &mut self.observations {
            if sel.matches_observation(obs) {
                obs.optional = optional;
            }
        }
        for proc in &mut self.processes {
            if sel.matches_process(proc) {
                proc.optional = optional;
                for syst in &mut proc.systematics {
                    syst.optional = optional;
                }
            }
        }
    }

    /// Summed rate of every process matching `sel`.
    pub fn rate(&self, sel: &Selection) -> f64 {
        self.processes.iter().filter(|p| sel.matches_process(p)).map(|p| p.rate).sum()
    }

    /// Combined uncertainty on [`Registry::rate`] for the same selection.
    ///
    /// A nuisance name shared by several matching processes is fully
    /// correlated across them: its per-process rate shifts are summed
    /// linearly first. Distinct names are independent and combine in
    /// quadrature.
    pub fn uncertainty(&self, sel: &Selection) -> f64 {
        let mut by_name: BTreeMap<&str, f64> = BTreeMap::new();
        for proc in self.processes.iter().filter(|p| sel.matches_process(p)) {
            for syst in &proc.systematics {
                *by_name.entry(syst.name.as_str()).or_insert(0.0) += syst.rate_shift(proc.rate);
            }
        }
        by_name.values().map(|shift| shift * shift).sum::<f64>().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syst::EffectSpec;
    use approx::assert_relative_eq;
    use hc_core::Histogram;

    fn two_bin_registry() -> Registry {
        let mut reg = Registry::new();
        let bins = [Bin::new(1, "pass"), Bin::new(2, "fail")];
        reg.add_observations("eff", "13TeV", "et", &bins);
        reg.add_processes(&["*"], "eff", "13TeV", "et", &["W", "QCD"], &bins, false);
        reg.add_processes(&["90"], "eff", "13TeV", "et", &["ZTT"], &bins, true);
        reg
    }

    fn bind_rates(reg: &mut Registry) {
        for p in reg.processes_mut() {
            let hist = Histogram::from_content(p.name.clone(), vec![6.0, 4.0]);
            p.rate = hist.integral();
            p.shape = Some(hist);
        }
    }

    #[test]
    fn bin_set_is_union_of_observation_and_process_bins() {
        let mut reg = two_bin_registry();
        // A process-only bin must still appear in the set.
        reg.add_processes(&["*"], "eff", "13TeV", "et", &["VV"], &[Bin::new(3, "extra")], false);

        let bins: Vec<String> = reg.bin_set().into_iter().collect();
        assert_eq!(bins, vec!["extra".to_string(), "fail".to_string(), "pass".to_string()]);
    }

    #[test]
    fn rate_sums_matching_processes() {
        let mut reg = two_bin_registry();
        bind_rates(&mut reg);

        let sel = Selection::new().bin(["pass"]);
        assert_relative_eq!(reg.rate(&sel), 30.0);
        assert_relative_eq!(reg.rate(&Selection::new().bin(["pass"]).signals()), 10.0);
    }

    #[test]
    fn shared_systematic_name_is_correlated_across_processes() {
        let mut reg = two_bin_registry();
        bind_rates(&mut reg);

        // Same resolved name on W and QCD: shifts add linearly.
        let sel = Selection::new().bin(["pass"]).process(["W", "QCD"]);
        reg.add_syst(&sel, "norm_common", SystKind::LogNormal, &EffectSpec::uniform(1.1))
            .unwrap();

        let coherent = reg.uncertainty(&sel);
        assert_relative_eq!(coherent, 2.0, epsilon = 1e-12);

        // Distinct names on the same processes: quadrature instead.
        let mut reg2 = two_bin_registry();
        bind_rates(&mut reg2);
        reg2.add_syst(&sel, "norm_$PROCESS", SystKind::LogNormal, &EffectSpec::uniform(1.1))
            .unwrap();
        let independent = reg2.uncertainty(&sel);
        assert_relative_eq!(independent, (2.0_f64).sqrt(), epsilon = 1e-12);

        assert!(coherent > independent);
    }

    #[test]
    fn unbound_shape_systematic_does_not_contribute() {
        let syst = Systematic::new("s", SystKind::Shape, 1.0);
        assert_relative_eq!(syst.rate_shift(100.0), 0.0);
    }

    #[test]
    fn shape_systematic_shift_is_symmetrized_integral_difference() {
        let mut syst = Systematic::new("s", SystKind::Shape, 1.0);
        syst.shape_up = Some(Histogram::from_content("u", vec![6.0, 6.0]));
        syst.shape_down = Some(Histogram::from_content("d", vec![4.0, 4.0]));
        assert_relative_eq!(syst.rate_shift(10.0), 2.0);
    }
}
