//! Derived pass/fail efficiency and its first-order propagated uncertainty.

use hc_core::{Error, Result};

use crate::registry::Registry;
use crate::select::Selection;

/// A ratio efficiency with its propagated uncertainty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Efficiency {
    pub value: f64,
    pub uncertainty: f64,
}

/// Efficiency of `signal_process` migrating into `pass_bin` out of
/// `pass_bin` + `fail_bin`.
///
/// `eff = r_pass / (r_pass + r_fail)`; the uncertainty is delta-method
/// propagation of the two aggregated rate uncertainties, treating pass and
/// fail as uncorrelated.
pub fn efficiency(
    registry: &Registry,
    pass_bin: &str,
    fail_bin: &str,
    signal_process: &str,
) -> Result<Efficiency> {
    let pass = Selection::new().bin([pass_bin]).process([signal_process]);
    let fail = Selection::new().bin([fail_bin]).process([signal_process]);

    let rate_pass = registry.rate(&pass);
    let rate_fail = registry.rate(&fail);
    let err_pass = registry.uncertainty(&pass);
    let err_fail = registry.uncertainty(&fail);

    let total = rate_pass + rate_fail;
    if total == 0.0 {
        return Err(Error::DivideByZero(format!(
            "pass+fail rate of process '{}' is zero (bins '{}', '{}')",
            signal_process, pass_bin, fail_bin
        )));
    }

    let d_pass = rate_fail / (total * total);
    let d_fail = -rate_pass / (total * total);
    let uncertainty = ((d_pass * err_pass).powi(2) + (d_fail * err_fail).powi(2)).sqrt();

    Ok(Efficiency { value: rate_pass / total, uncertainty })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Bin;
    use crate::syst::{EffectSpec, SystKind};
    use approx::assert_relative_eq;
    use hc_core::Histogram;

    /// Registry with one signal process per bin, rates 80/20 and lnN
    /// systematics giving absolute rate errors 5 and 3.
    fn worked_example() -> Registry {
        let mut reg = Registry::new();
        let bins = [Bin::new(1, "pass"), Bin::new(2, "fail")];
        reg.add_processes(&["90"], "eff", "13TeV", "et", &["ZTT"], &bins, true);

        for proc in reg.processes_mut() {
            let content = if proc.bin == "pass" { vec![80.0] } else { vec![20.0] };
            let hist = Histogram::from_content("ZTT", content);
            proc.rate = hist.integral();
            proc.shape = Some(hist);
        }

        // 5/80 and 3/20 relative effects.
        reg.add_syst(
            &Selection::new().bin(["pass"]),
            "err_pass",
            SystKind::LogNormal,
            &EffectSpec::uniform(1.0625),
        )
        .unwrap();
        reg.add_syst(
            &Selection::new().bin(["fail"]),
            "err_fail",
            SystKind::LogNormal,
            &EffectSpec::uniform(1.15),
        )
        .unwrap();
        reg
    }

    #[test]
    fn delta_method_worked_example() {
        let reg = worked_example();
        let eff = efficiency(&reg, "pass", "fail", "ZTT").unwrap();

        assert_relative_eq!(eff.value, 0.8);
        // d/d(pass) = 0.002, d/d(fail) = -0.008:
        // sqrt((0.002*5)^2 + (0.008*3)^2) = sqrt(0.0001 + 0.000576)
        assert_relative_eq!(eff.uncertainty, 0.026, epsilon = 1e-4);
    }

    #[test]
    fn zero_denominator_is_fatal() {
        let mut reg = Registry::new();
        let bins = [Bin::new(1, "pass"), Bin::new(2, "fail")];
        reg.add_processes(&["90"], "eff", "13TeV", "et", &["ZTT"], &bins, true);

        let err = efficiency(&reg, "pass", "fail", "ZTT").unwrap_err();
        assert!(matches!(err, Error::DivideByZero(_)));
    }
}
