//! Shape-template extraction: binding nominal and shifted histograms from a
//! template store into the selected registry entries.

use hc_core::{Error, Result};

use crate::registry::Registry;
use crate::select::Selection;
use crate::store::TemplateStore;
use crate::syst::SystKind;
use crate::template::substitute;

impl Registry {
    /// Bind shapes for every observation and process matching `sel`.
    ///
    /// `nominal_tpl` is resolved with `$BIN`/`$PROCESS` (observations use
    /// the `data_obs` process name); `syst_tpl` additionally resolves
    /// `$SYSTEMATIC` and is looked up once with an `Up` and once with a
    /// `Down` suffix for every shape-kind systematic. Rates are recomputed
    /// from the nominal integral immediately after binding. A path absent
    /// from the store is fatal unless the entry is marked optional.
    pub fn extract_shapes(
        &mut self,
        sel: &Selection,
        store: &dyn TemplateStore,
        nominal_tpl: &str,
        syst_tpl: &str,
    ) -> Result<()> {
        for idx in 0..self.observations().len() {
            if !sel.matches_observation(&self.observations()[idx]) {
                continue;
            }
            let (path, optional, bin) = {
                let obs = &self.observations()[idx];
                (substitute(nominal_tpl, &obs.tokens())?, obs.optional, obs.bin.clone())
            };
            match store.read(&path) {
                Some(hist) => {
                    tracing::debug!(path = %path, bin = %bin, "bound observation shape");
                    self.observations_mut()[idx].shape = Some(hist.clone());
                }
                None if optional => {}
                None => {
                    return Err(Error::MissingTemplate(format!(
                        "'{}' for observation in bin '{}'",
                        path, bin
                    )))
                }
            }
        }

        for idx in 0..self.processes().len() {
            if !sel.matches_process(&self.processes()[idx]) {
                continue;
            }
            let (path, optional, name, bin) = {
                let proc = &self.processes()[idx];
                (
                    substitute(nominal_tpl, &proc.tokens())?,
                    proc.optional,
                    proc.name.clone(),
                    proc.bin.clone(),
                )
            };
            match store.read(&path) {
                Some(hist) => {
                    let proc = &mut self.processes_mut()[idx];
                    proc.rate = hist.integral();
                    proc.shape = Some(hist.clone());
                }
                None if optional => {}
                None => {
                    return Err(Error::MissingTemplate(format!(
                        "'{}' for process '{}' in bin '{}'",
                        path, name, bin
                    )))
                }
            }

            self.bind_shifted(idx, store, syst_tpl)?;
        }

        Ok(())
    }

    /// Bind the up/down pair of every shape-kind systematic on process `idx`.
    fn bind_shifted(
        &mut self,
        idx: usize,
        store: &dyn TemplateStore,
        syst_tpl: &str,
    ) -> Result<()> {
        let shifted: Vec<(usize, String, bool)> = {
            let proc = &self.processes()[idx];
            proc.systematics
                .iter()
                .enumerate()
                .filter(|(_, s)| s.kind == SystKind::Shape)
                .map(|(i, s)| {
                    let tokens = proc.tokens().with_systematic(&s.name);
                    Ok((i, substitute(syst_tpl, &tokens)?, s.optional || proc.optional))
                })
                .collect::<Result<Vec<_>>>()?
        };

        for (i, base, optional) in shifted {
            let up_path = format!("{}Up", base);
            let down_path = format!("{}Down", base);
            match (store.read(&up_path), store.read(&down_path)) {
                (Some(up), Some(down)) => {
                    let syst = &mut self.processes_mut()[idx].systematics[i];
                    syst.shape_up = Some(up.clone());
                    syst.shape_down = Some(down.clone());
                }
                _ if optional => {}
                (up, _) => {
                    let missing = if up.is_none() { up_path } else { down_path };
                    let proc = &self.processes()[idx];
                    return Err(Error::MissingTemplate(format!(
                        "'{}' for systematic '{}' on process '{}' in bin '{}'",
                        missing, proc.systematics[i].name, proc.name, proc.bin
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Bin;
    use crate::store::ShapeContainer;
    use crate::syst::EffectSpec;
    use approx::assert_relative_eq;
    use hc_core::Histogram;

    fn registry() -> Registry {
        let mut reg = Registry::new();
        let bins = [Bin::new(1, "pass")];
        reg.add_observations("eff", "13TeV", "et", &bins);
        reg.add_processes(&["*"], "eff", "13TeV", "et", &["W"], &bins, false);
        reg.add_processes(&["90"], "eff", "13TeV", "et", &["ZTT"], &bins, true);
        reg
    }

    fn store() -> ShapeContainer {
        let mut store = ShapeContainer::new();
        store.insert("pass/data_obs", Histogram::from_content("data_obs", vec![10.0, 10.0]));
        store.insert("pass/W", Histogram::from_content("W", vec![3.0, 1.0]));
        store.insert("pass/ZTT", Histogram::from_content("ZTT", vec![40.0, 40.0]));
        store
    }

    #[test]
    fn binds_nominal_shapes_and_recomputes_rates() {
        let mut reg = registry();
        reg.extract_shapes(&Selection::new(), &store(), "$BIN/$PROCESS", "$BIN/$PROCESS_$SYSTEMATIC")
            .unwrap();

        assert_relative_eq!(reg.observations()[0].rate(), 20.0);
        let w = reg.processes().iter().find(|p| p.name == "W").unwrap();
        assert_relative_eq!(w.rate, 4.0);
        assert!(w.shape.is_some());
    }

    #[test]
    fn binds_shifted_pair_for_shape_systematics() {
        let mut reg = registry();
        reg.add_syst(
            &Selection::new().process(["ZTT"]),
            "probetau_",
            SystKind::Shape,
            &EffectSpec::uniform(1.0),
        )
        .unwrap();

        let mut store = store();
        store.insert("pass/ZTT_probetau_Up", Histogram::from_content("u", vec![44.0, 44.0]));
        store.insert("pass/ZTT_probetau_Down", Histogram::from_content("d", vec![36.0, 36.0]));

        reg.extract_shapes(&Selection::new(), &store, "$BIN/$PROCESS", "$BIN/$PROCESS_$SYSTEMATIC")
            .unwrap();

        let ztt = reg.processes().iter().find(|p| p.name == "ZTT").unwrap();
        let syst = &ztt.systematics[0];
        assert_relative_eq!(syst.shape_up.as_ref().unwrap().integral(), 88.0);
        assert_relative_eq!(syst.shape_down.as_ref().unwrap().integral(), 72.0);
    }

    #[test]
    fn missing_required_nominal_is_fatal() {
        let mut reg = registry();
        reg.add_processes(&["*"], "eff", "13TeV", "et", &["QCD"], &[Bin::new(1, "pass")], false);

        let err = reg
            .extract_shapes(&Selection::new(), &store(), "$BIN/$PROCESS", "$BIN/$PROCESS_$SYSTEMATIC")
            .unwrap_err();
        assert!(matches!(err, Error::MissingTemplate(_)));
        assert!(err.to_string().contains("pass/QCD"));
    }

    #[test]
    fn optional_process_tolerates_missing_templates() {
        let mut reg = registry();
        reg.add_processes(&["*"], "eff", "13TeV", "et", &["QCD"], &[Bin::new(1, "pass")], false);
        reg.set_optional(&Selection::new().process(["QCD"]), true);

        reg.extract_shapes(&Selection::new(), &store(), "$BIN/$PROCESS", "$BIN/$PROCESS_$SYSTEMATIC")
            .unwrap();
        let qcd = reg.processes().iter().find(|p| p.name == "QCD").unwrap();
        assert!(qcd.shape.is_none());
        assert_relative_eq!(qcd.rate, 0.0);
    }

    #[test]
    fn missing_shifted_template_is_fatal_for_required_systematic() {
        let mut reg = registry();
        reg.add_syst(
            &Selection::new().process(["ZTT"]),
            "probetau_",
            SystKind::Shape,
            &EffectSpec::uniform(1.0),
        )
        .unwrap();

        let mut store = store();
        // Only the Up template present.
        store.insert("pass/ZTT_probetau_Up", Histogram::from_content("u", vec![44.0, 44.0]));

        let err = reg
            .extract_shapes(&Selection::new(), &store, "$BIN/$PROCESS", "$BIN/$PROCESS_$SYSTEMATIC")
            .unwrap_err();
        assert!(err.to_string().contains("ZTT_probetau_Down"));
    }
}
