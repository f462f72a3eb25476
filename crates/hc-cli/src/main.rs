//! histcard CLI: builds the anti-electron tau-fake-rate datacard from a
//! shape container and reports the pre-fit pass/fail efficiency.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use hc_card::card::{NOMINAL_TEMPLATE, SYSTEMATIC_TEMPLATE};
use hc_card::{
    efficiency, write_card, Bin, BinByBinFactory, EffectSpec, Registry, Selection,
    ShapeContainer, SystKind,
};

/// Fixed name of the shape container written next to the card.
const SHAPES_OUTPUT: &str = "htt_et.input.shapes.json";

const PASS_BIN: &str = "ETauFR_pass";
const FAIL_BIN: &str = "ETauFR_fail";
const SIGNAL: &str = "ZTT";

#[derive(Parser)]
#[command(name = "histcard")]
#[command(about = "Template-fit efficiency datacard builder")]
#[command(version)]
struct Cli {
    /// Input shape-container file name, resolved inside the auxiliary
    /// directory.
    input: String,

    /// Auxiliary directory holding the input shape containers.
    #[arg(long, default_value = "InputHisto_ToBeFitted")]
    aux_dir: PathBuf,

    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    let input_path = cli.aux_dir.join(&cli.input);
    tracing::info!(path = %input_path.display(), "loading shape container");
    let store = ShapeContainer::open(&input_path)
        .with_context(|| format!("opening shape container {}", input_path.display()))?;

    let registry = build_model(&store)?;

    let card_path = card_name(&cli.input);
    let mut container = ShapeContainer::new();
    write_card(&registry, &card_path, SHAPES_OUTPUT, &mut container)
        .with_context(|| format!("writing datacard {}", card_path.display()))?;
    container.save(Path::new(SHAPES_OUTPUT))?;
    tracing::info!(card = %card_path.display(), shapes = SHAPES_OUTPUT, "outputs written");

    let eff = efficiency(&registry, PASS_BIN, FAIL_BIN, SIGNAL)?;
    println!("pre-fit eff.: {}", eff.value);
    println!("pre-fit eff. errors: {}", eff.uncertainty);
    Ok(())
}

/// Card file name: the input name with its extension replaced by `.txt`,
/// written to the working directory.
fn card_name(input: &str) -> PathBuf {
    let name = Path::new(input).file_name().map(PathBuf::from).unwrap_or_else(|| input.into());
    name.with_extension("txt")
}

/// Populate the registry, attach the systematics table, extract shapes and
/// synthesize bin-by-bin statistical nuisances.
fn build_model(store: &ShapeContainer) -> Result<Registry> {
    let bins = [Bin::new(1, PASS_BIN), Bin::new(2, FAIL_BIN)];
    let masses = ["90"];
    let backgrounds = ["ZJ", "ZEE", "W", "QCD", "TT", "VV"];

    let mut reg = Registry::new();
    reg.add_observations("ETauFR", "13TeV", "et", &bins);
    reg.add_processes(&["*"], "ETauFR", "13TeV", "et", &backgrounds, &bins, false);
    reg.add_processes(&masses, "ETauFR", "13TeV", "et", &[SIGNAL], &bins, true);

    // Processes sharing the luminosity and lepton-efficiency uncertainties.
    let correlated = Selection::new().process([SIGNAL, "ZJ", "ZEE", "VV", "TT"]);

    reg.add_syst(
        &correlated,
        "lumi_$ERA",
        SystKind::LogNormal,
        &EffectSpec::by_era([("13TeV", 1.026)]),
    )?;

    for (name, process, value) in [
        ("normalizationW", "W", 1.20),
        ("normalizationDYEE", "ZEE", 1.06),
        ("normalizationQCD", "QCD", 1.2),
        ("normalizationVV", "VV", 1.15),
        ("normalizationTT", "TT", 1.10),
    ] {
        reg.add_syst(
            &Selection::new().process([process]),
            name,
            SystKind::LogNormal,
            &EffectSpec::uniform(value),
        )?;
    }
    reg.add_syst(
        &Selection::new().process(["ZJ", SIGNAL]),
        "normalizationDY",
        SystKind::LogNormal,
        &EffectSpec::uniform(1.03),
    )?;

    reg.add_syst(&correlated, "CMS_eff_e", SystKind::LogNormal, &EffectSpec::uniform(1.05))?;
    reg.add_syst(&correlated, "CMS_eff_t", SystKind::LogNormal, &EffectSpec::uniform(1.03))?;

    for name in ["tagele_", "probeele_", "reso_"] {
        reg.add_syst(
            &Selection::new().process(["ZEE"]),
            name,
            SystKind::Shape,
            &EffectSpec::uniform(1.0),
        )?;
    }
    reg.add_syst(
        &Selection::new().process([SIGNAL]),
        "probetau_",
        SystKind::Shape,
        &EffectSpec::uniform(1.0),
    )?;

    reg.extract_shapes(
        &Selection::new().backgrounds(),
        store,
        NOMINAL_TEMPLATE,
        SYSTEMATIC_TEMPLATE,
    )?;
    reg.extract_shapes(&Selection::new().signals(), store, NOMINAL_TEMPLATE, SYSTEMATIC_TEMPLATE)?;

    BinByBinFactory::new()
        .set_add_threshold(0.1)
        .set_fix_norm(true)
        .add_bin_by_bin(&Selection::new().backgrounds(), &mut reg)?;

    Ok(reg)
}
