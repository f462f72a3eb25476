//! Systematic kinds, effect specifications and their application to a
//! selection of processes.

use std::collections::BTreeMap;

use hc_core::{Error, Result};

use crate::registry::{Process, Registry, Systematic};
use crate::select::Selection;
use crate::template::substitute;

/// Nuisance parameter kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystKind {
    /// Multiplicative rate uncertainty (datacard `lnN`).
    LogNormal,
    /// Shape variation with bound up/down templates (datacard `shape`).
    Shape,
}

impl SystKind {
    /// Datacard column label.
    pub fn label(&self) -> &'static str {
        match self {
            SystKind::LogNormal => "lnN",
            SystKind::Shape => "shape",
        }
    }

    /// Parse a datacard column label.
    pub fn from_label(label: &str) -> Result<Self> {
        match label {
            "lnN" => Ok(SystKind::LogNormal),
            "shape" => Ok(SystKind::Shape),
            other => Err(Error::Card(format!("unknown systematic kind '{}'", other))),
        }
    }
}

/// Effect values for one `add_syst` call: a uniform scalar, or a mapping
/// over exactly one axis of the matching processes.
#[derive(Debug, Clone)]
pub enum EffectSpec {
    /// Same value for every matching process.
    Uniform(f64),
    /// Value keyed by era name.
    ByEra(BTreeMap<String, f64>),
    /// Value keyed by bin id.
    ByBin(BTreeMap<i32, f64>),
    /// Value keyed by process name.
    ByProcess(BTreeMap<String, f64>),
}

impl EffectSpec {
    pub fn uniform(value: f64) -> Self {
        EffectSpec::Uniform(value)
    }

    pub fn by_era<S, I>(entries: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, f64)>,
    {
        EffectSpec::ByEra(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn by_bin<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i32, f64)>,
    {
        EffectSpec::ByBin(entries.into_iter().collect())
    }

    pub fn by_process<S, I>(entries: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, f64)>,
    {
        EffectSpec::ByProcess(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Effect value for one process, taken from the varying axis.
    fn lookup(&self, proc: &Process) -> Result<f64> {
        let missing = |axis: &str, key: &str| {
            Error::Configuration(format!(
                "no {} effect entry for '{}' (process '{}' in bin '{}')",
                axis, key, proc.name, proc.bin
            ))
        };
        match self {
            EffectSpec::Uniform(v) => Ok(*v),
            EffectSpec::ByEra(map) => {
                map.get(&proc.era).copied().ok_or_else(|| missing("era", &proc.era))
            }
            EffectSpec::ByBin(map) => map
                .get(&proc.bin_id)
                .copied()
                .ok_or_else(|| missing("bin-id", &proc.bin_id.to_string())),
            EffectSpec::ByProcess(map) => {
                map.get(&proc.name).copied().ok_or_else(|| missing("process", &proc.name))
            }
        }
    }
}

impl Registry {
    /// Attach one systematic to every process matching `sel`.
    ///
    /// `name_template` is resolved per process (`$ERA`, `$BIN`, `$PROCESS`,
    /// ...), the effect value is looked up on the effect map's varying axis,
    /// and the result is appended to that process. Fail-fast: the first failing
    /// process aborts the call; systematics already attached by it stay.
    pub fn add_syst(
        &mut self,
        sel: &Selection,
        name_template: &str,
        kind: SystKind,
        effect: &EffectSpec,
    ) -> Result<()> {
        for idx in 0..self.processes().len() {
            if !sel.matches_process(&self.processes()[idx]) {
                continue;
            }
            let (name, value) = {
                let proc = &self.processes()[idx];
                (substitute(name_template, &proc.tokens())?, effect.lookup(proc)?)
            };
            tracing::debug!(syst = %name, kind = kind.label(), value, "attaching systematic");
            self.processes_mut()[idx].attach(Systematic::new(name, kind, value))?;
        }
        Ok(())
    }
}
