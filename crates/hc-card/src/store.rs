//! Template store: resolved shape paths → histograms.
//!
//! The store is addressed purely by the path strings produced by template
//! substitution (`$BIN/$PROCESS`, `$BIN/$PROCESS_$SYSTEMATICUp`, ...). The
//! concrete container is a flat JSON map; anything that can answer `read`
//! can stand in for it.

use std::collections::BTreeMap;
use std::path::Path;

use hc_core::{Histogram, Result};
use serde::{Deserialize, Serialize};

/// Read side of a histogram container.
pub trait TemplateStore {
    /// Histogram at `path`, or `None` when absent.
    fn read(&self, path: &str) -> Option<&Histogram>;
}

/// A shape container persisted as a JSON map keyed by resolved path.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ShapeContainer {
    templates: BTreeMap<String, Histogram>,
}

impl ShapeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a container from a JSON file.
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the container to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Insert (or replace) the histogram stored at `path`.
    pub fn insert(&mut self, path: impl Into<String>, hist: Histogram) {
        self.templates.insert(path.into(), hist);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Stored paths, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

impl TemplateStore for ShapeContainer {
    fn read(&self, path: &str) -> Option<&Histogram> {
        self.templates.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_inserted_histogram() {
        let mut store = ShapeContainer::new();
        store.insert("pass/ZTT", Histogram::from_content("ZTT", vec![1.0, 2.0]));

        assert_eq!(store.read("pass/ZTT").unwrap().integral(), 3.0);
        assert!(store.read("pass/missing").is_none());
        assert_eq!(store.paths().collect::<Vec<_>>(), vec!["pass/ZTT"]);
    }

    #[test]
    fn json_round_trip() {
        let mut store = ShapeContainer::new();
        let mut hist = Histogram::from_content("W", vec![5.0, 0.5]);
        hist.sumw2 = Some(vec![2.0, 0.1]);
        store.insert("fail/W", hist);

        let text = serde_json::to_string(&store).unwrap();
        let back: ShapeContainer = serde_json::from_str(&text).unwrap();
        assert_eq!(back.read("fail/W"), store.read("fail/W"));
    }
}
