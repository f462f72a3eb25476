use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use hc_card::{ShapeContainer, TemplateStore};
use hc_core::Histogram;

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_histcard"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("histcard_cli_{}_{}_{}", name, std::process::id(), nanos));
    p
}

fn hist(name: &str, content: Vec<f64>) -> Histogram {
    Histogram::from_content(name, content)
}

/// A complete input container for the hardcoded analysis: data plus every
/// nominal and shifted template the systematics table requires.
fn full_container() -> ShapeContainer {
    let mut store = ShapeContainer::new();
    for bin in ["ETauFR_pass", "ETauFR_fail"] {
        store.insert(format!("{}/data_obs", bin), hist("data_obs", vec![120.0, 80.0]));
        for proc in ["ZJ", "ZEE", "W", "QCD", "TT", "VV", "ZTT"] {
            store.insert(format!("{}/{}", bin, proc), hist(proc, vec![30.0, 20.0]));
        }
        for syst in ["tagele_", "probeele_", "reso_"] {
            store.insert(format!("{}/ZEE_{}Up", bin, syst), hist("u", vec![33.0, 22.0]));
            store.insert(format!("{}/ZEE_{}Down", bin, syst), hist("d", vec![27.0, 18.0]));
        }
        store.insert(format!("{}/ZTT_probetau_Up", bin), hist("u", vec![31.0, 21.0]));
        store.insert(format!("{}/ZTT_probetau_Down", bin), hist("d", vec![29.0, 19.0]));
    }
    store
}

fn run_in(dir: &PathBuf, args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

#[test]
fn builds_card_and_prints_efficiency() {
    let work = tmp_dir("build");
    let aux = work.join("aux");
    std::fs::create_dir_all(&aux).unwrap();
    full_container().save(&aux.join("templates.json")).unwrap();

    let out = run_in(&work, &["templates.json", "--aux-dir", aux.to_str().unwrap()]);
    assert!(
        out.status.success(),
        "histcard failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    let stdout = String::from_utf8_lossy(&out.stdout);
    // Identical pass/fail signal templates: efficiency is exactly 1/2.
    assert!(stdout.contains("pre-fit eff.: 0.5"), "stdout was: {}", stdout);
    assert!(stdout.contains("pre-fit eff. errors:"), "stdout was: {}", stdout);

    let card = std::fs::read_to_string(work.join("templates.txt")).unwrap();
    assert!(card.contains("lumi_13TeV"));
    assert!(card.contains("shapes * * htt_et.input.shapes.json"));

    let shapes = ShapeContainer::open(&work.join("htt_et.input.shapes.json")).unwrap();
    assert!(shapes.read("ETauFR_pass/ZTT").is_some());
    assert!(shapes.read("ETauFR_fail/ZEE_reso_Down").is_some());

    let _ = std::fs::remove_dir_all(&work);
}

#[test]
fn missing_template_aborts_with_nonzero_exit() {
    let work = tmp_dir("missing");
    let aux = work.join("aux");
    std::fs::create_dir_all(&aux).unwrap();

    // Drop one required nominal template.
    let mut store = ShapeContainer::new();
    let full = full_container();
    for path in full.paths().filter(|p| *p != "ETauFR_pass/QCD") {
        store.insert(path.to_string(), full.read(path).unwrap().clone());
    }
    store.save(&aux.join("templates.json")).unwrap();

    let out = run_in(&work, &["templates.json", "--aux-dir", aux.to_str().unwrap()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("ETauFR_pass/QCD"), "stderr was: {}", stderr);

    let _ = std::fs::remove_dir_all(&work);
}
