//! Predicate-based selection of registry entries.
//!
//! A [`Selection`] is a lazy projection: it owns no entries, only the
//! predicates, and every read or edit that takes one walks the registry and
//! applies to the matching subset in place.

use std::collections::BTreeSet;

use crate::registry::{Observation, Process};

/// Conjunction of per-dimension predicates over registry entries.
///
/// A dimension that was never supplied matches everything; a dimension
/// supplied with an empty set matches nothing. Supplying the same dimension
/// again unions the values, so
/// `Selection::new().process(["ZJ"]).process(["ZTT"])` matches either
/// process.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    analyses: Option<BTreeSet<String>>,
    bins: Option<BTreeSet<String>>,
    channels: Option<BTreeSet<String>>,
    eras: Option<BTreeSet<String>>,
    masses: Option<BTreeSet<String>>,
    processes: Option<BTreeSet<String>>,
    signal: Option<bool>,
}

fn extend<I, S>(slot: &mut Option<BTreeSet<String>>, values: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    slot.get_or_insert_with(BTreeSet::new).extend(values.into_iter().map(Into::into));
}

fn accepts(slot: &Option<BTreeSet<String>>, value: &str) -> bool {
    match slot {
        None => true,
        Some(set) => set.contains(value),
    }
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given analysis tags.
    pub fn analysis<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.analyses, values);
        self
    }

    /// Restrict to the given bin names.
    pub fn bin<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.bins, values);
        self
    }

    /// Restrict to the given channel names.
    pub fn channel<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.channels, values);
        self
    }

    /// Restrict to the given era names.
    pub fn era<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.eras, values);
        self
    }

    /// Restrict to the given mass labels.
    pub fn mass<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.masses, values);
        self
    }

    /// Restrict to the given process names. Repeated calls union.
    pub fn process<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend(&mut self.processes, values);
        self
    }

    /// Restrict to signal processes.
    pub fn signals(mut self) -> Self {
        self.signal = Some(true);
        self
    }

    /// Restrict to background processes.
    pub fn backgrounds(mut self) -> Self {
        self.signal = Some(false);
        self
    }

    /// Whether `proc` satisfies every supplied predicate.
    pub fn matches_process(&self, proc: &Process) -> bool {
        accepts(&self.analyses, &proc.analysis)
            && accepts(&self.bins, &proc.bin)
            && accepts(&self.channels, &proc.channel)
            && accepts(&self.eras, &proc.era)
            && accepts(&self.masses, &proc.mass)
            && accepts(&self.processes, &proc.name)
            && self.signal.map_or(true, |s| s == proc.signal)
    }

    /// Whether `obs` satisfies every supplied predicate. Process-name, mass
    /// and signal predicates do not exist on an observation and are ignored.
    pub fn matches_observation(&self, obs: &Observation) -> bool {
        accepts(&self.analyses, &obs.analysis)
            && accepts(&self.bins, &obs.bin)
            && accepts(&self.channels, &obs.channel)
            && accepts(&self.eras, &obs.era)
    }
}
