//! Text datacard serialization and the matching shape-container layout.
//!
//! The card lists bins, observations, the process/rate matrix and one row
//! per systematic; every bound histogram goes into the shape container
//! under the same `$BIN/$PROCESS[_$SYSTEMATIC{Up,Down}]` convention used
//! for extraction, so a card plus its container reconstructs the model.

use std::collections::BTreeMap;
use std::path::Path;

use hc_core::{Error, Result};

use crate::registry::{Observation, Process, Registry, Systematic};
use crate::store::{ShapeContainer, TemplateStore};
use crate::syst::SystKind;
use crate::template::substitute;

/// Container path template for nominal shapes.
pub const NOMINAL_TEMPLATE: &str = "$BIN/$PROCESS";
/// Container path template for shifted shapes (suffixed `Up`/`Down`).
pub const SYSTEMATIC_TEMPLATE: &str = "$BIN/$PROCESS_$SYSTEMATIC";

/// Serialize `registry` as a text datacard at `card_path` and insert every
/// bound histogram into `container` (declared in the card as
/// `shapes_file`).
///
/// The registry must be fully resolved: every required entry bound and
/// every required shape systematic carrying its up/down pair.
pub fn write_card(
    registry: &Registry,
    card_path: &Path,
    shapes_file: &str,
    container: &mut ShapeContainer,
) -> Result<()> {
    validate_resolved(registry)?;

    let bins = ordered_bins(registry);
    let bin_pos: BTreeMap<&str, usize> =
        bins.iter().enumerate().map(|(i, b)| (b.as_str(), i)).collect();
    let index_of = process_indices(registry);

    let mut columns: Vec<&Process> = registry.processes().iter().collect();
    columns.sort_by_key(|p| (bin_pos[p.bin.as_str()], index_of[p.name.as_str()]));

    let systs = systematic_rows(registry, &columns)?;

    let mut card = String::new();
    card.push_str(&format!("imax {} number of bins\n", bins.len()));
    card.push_str(&format!(
        "jmax {} number of processes minus 1\n",
        index_of.len().saturating_sub(1)
    ));
    card.push_str(&format!("kmax {} number of nuisance parameters\n", systs.len()));
    card.push_str(SEPARATOR);
    card.push_str(&format!(
        "shapes * * {} {} {}\n",
        shapes_file, NOMINAL_TEMPLATE, SYSTEMATIC_TEMPLATE
    ));
    card.push_str(SEPARATOR);

    let mut obs_rows = vec![vec!["bin".to_string()], vec!["observation".to_string()]];
    for bin in &bins {
        let obs = registry.observations().iter().find(|o| &o.bin == bin);
        obs_rows[0].push(bin.clone());
        obs_rows[1].push(format_value(obs.map(Observation::rate).unwrap_or(0.0)));
    }
    card.push_str(&format_table(&obs_rows));
    card.push_str(SEPARATOR);

    let mut rows = vec![
        vec!["bin".to_string(), String::new()],
        vec!["process".to_string(), String::new()],
        vec!["process".to_string(), String::new()],
        vec!["rate".to_string(), String::new()],
    ];
    for proc in &columns {
        rows[0].push(proc.bin.clone());
        rows[1].push(proc.name.clone());
        rows[2].push(index_of[proc.name.as_str()].to_string());
        rows[3].push(format_value(proc.rate));
    }
    for (name, (kind, values)) in &systs {
        let mut row = vec![name.clone(), kind.label().to_string()];
        for col in 0..columns.len() {
            match values.get(&col) {
                Some(v) => row.push(format_value(*v)),
                None => row.push("-".to_string()),
            }
        }
        rows.push(row);
    }
    card.push_str(&format_table(&rows));

    fill_container(registry, container)?;

    tracing::info!(
        card = %card_path.display(),
        bins = bins.len(),
        processes = columns.len(),
        systematics = systs.len(),
        "writing datacard"
    );
    std::fs::write(card_path, card)?;
    Ok(())
}

/// Parse a datacard written by [`write_card`] back into a registry,
/// re-binding shapes from `container`.
///
/// Era/channel/analysis tags are not part of the card format and come back
/// empty; names, kinds, effects and (through the container) template
/// integrals survive the round trip.
pub fn read_card(card_path: &Path, container: &ShapeContainer) -> Result<Registry> {
    let text = std::fs::read_to_string(card_path)?;

    let mut nominal_tpl = NOMINAL_TEMPLATE.to_string();
    let mut syst_tpl = SYSTEMATIC_TEMPLATE.to_string();
    let mut bin_rows: Vec<Vec<String>> = Vec::new();
    let mut process_rows: Vec<Vec<String>> = Vec::new();
    let mut observation_row: Option<Vec<String>> = None;
    let mut rate_row: Option<Vec<String>> = None;
    let mut syst_lines: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('-') || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<String> = line.split_whitespace().map(String::from).collect();
        match tokens[0].as_str() {
            "imax" | "jmax" | "kmax" => {}
            "shapes" => {
                if tokens.len() >= 6 {
                    nominal_tpl = tokens[4].clone();
                    syst_tpl = tokens[5].clone();
                }
            }
            "bin" => bin_rows.push(tokens[1..].to_vec()),
            "observation" => observation_row = Some(tokens[1..].to_vec()),
            "process" => process_rows.push(tokens[1..].to_vec()),
            "rate" => rate_row = Some(tokens[1..].to_vec()),
            _ => syst_lines.push(tokens),
        }
    }

    if bin_rows.len() != 2 {
        return Err(Error::Card(format!("expected 2 bin rows, found {}", bin_rows.len())));
    }
    if process_rows.len() != 2 {
        return Err(Error::Card(format!(
            "expected 2 process rows, found {}",
            process_rows.len()
        )));
    }
    let observation_row =
        observation_row.ok_or_else(|| Error::Card("missing observation row".into()))?;
    let rate_row = rate_row.ok_or_else(|| Error::Card("missing rate row".into()))?;

    let obs_bins = &bin_rows[0];
    let col_bins = &bin_rows[1];
    let col_names = &process_rows[0];
    let col_indices = &process_rows[1];
    if col_bins.len() != col_names.len()
        || col_bins.len() != col_indices.len()
        || col_bins.len() != rate_row.len()
    {
        return Err(Error::Card("process matrix columns are inconsistent".into()));
    }

    // Bin ids: order of first appearance across both bin rows.
    let mut bin_ids: BTreeMap<String, i32> = BTreeMap::new();
    for bin in obs_bins.iter().chain(col_bins.iter()) {
        let next = bin_ids.len() as i32 + 1;
        bin_ids.entry(bin.clone()).or_insert(next);
    }

    let mut registry = Registry::new();

    for (bin, value) in obs_bins.iter().zip(observation_row.iter()) {
        parse_value(value)?;
        let mut obs = Observation {
            analysis: String::new(),
            era: String::new(),
            channel: String::new(),
            bin: bin.clone(),
            bin_id: bin_ids[bin],
            optional: false,
            shape: None,
        };
        let path = substitute(&nominal_tpl, &obs.tokens())?;
        obs.shape = container.read(&path).cloned();
        registry.push_observation(obs);
    }

    for col in 0..col_bins.len() {
        let index: i32 = col_indices[col]
            .parse()
            .map_err(|_| Error::Card(format!("bad process index '{}'", col_indices[col])))?;
        let mut proc = Process {
            name: col_names[col].clone(),
            analysis: String::new(),
            era: String::new(),
            channel: String::new(),
            bin: col_bins[col].clone(),
            bin_id: bin_ids[&col_bins[col]],
            mass: "*".to_string(),
            signal: index <= 0,
            optional: false,
            rate: parse_value(&rate_row[col])?,
            shape: None,
            systematics: Vec::new(),
        };
        let path = substitute(&nominal_tpl, &proc.tokens())?;
        if let Some(hist) = container.read(&path) {
            proc.rate = hist.integral();
            proc.shape = Some(hist.clone());
        }
        registry.push_process(proc);
    }

    for tokens in syst_lines {
        if tokens.len() != col_bins.len() + 2 {
            return Err(Error::Card(format!(
                "systematic row '{}' has {} columns, expected {}",
                tokens[0],
                tokens.len() - 2,
                col_bins.len()
            )));
        }
        let kind = SystKind::from_label(&tokens[1])?;
        for (col, value) in tokens[2..].iter().enumerate() {
            if value == "-" {
                continue;
            }
            let mut syst = Systematic::new(tokens[0].clone(), kind, parse_value(value)?);
            let proc = &registry.processes()[col];
            if kind == SystKind::Shape {
                let base =
                    substitute(&syst_tpl, &proc.tokens().with_systematic(&syst.name))?;
                syst.shape_up = container.read(&format!("{}Up", base)).cloned();
                syst.shape_down = container.read(&format!("{}Down", base)).cloned();
            }
            registry.processes_mut()[col].attach(syst)?;
        }
    }

    Ok(registry)
}

const SEPARATOR: &str =
    "----------------------------------------------------------------------\n";

/// Every required entry bound, every required shape systematic resolved.
fn validate_resolved(registry: &Registry) -> Result<()> {
    for obs in registry.observations() {
        if !obs.optional && obs.shape.is_none() {
            return Err(Error::Configuration(format!(
                "observation in bin '{}' has no bound shape",
                obs.bin
            )));
        }
    }
    for proc in registry.processes() {
        if !proc.optional && proc.shape.is_none() {
            return Err(Error::Configuration(format!(
                "process '{}' in bin '{}' has no bound shape",
                proc.name, proc.bin
            )));
        }
        for syst in &proc.systematics {
            let resolved = syst.kind != SystKind::Shape
                || (syst.shape_up.is_some() && syst.shape_down.is_some());
            if !resolved && !syst.optional && !proc.optional {
                return Err(Error::Configuration(format!(
                    "shape systematic '{}' on process '{}' in bin '{}' has no bound up/down pair",
                    syst.name, proc.name, proc.bin
                )));
            }
        }
    }
    Ok(())
}

/// Bin names ordered by (id, name).
fn ordered_bins(registry: &Registry) -> Vec<String> {
    let mut bins: Vec<(i32, String)> = registry
        .observations()
        .iter()
        .map(|o| (o.bin_id, o.bin.clone()))
        .chain(registry.processes().iter().map(|p| (p.bin_id, p.bin.clone())))
        .collect();
    bins.sort();
    bins.dedup();
    bins.into_iter().map(|(_, name)| name).collect()
}

/// Datacard process indices: signals 0, -1, -2, ... and backgrounds
/// 1, 2, 3, ... in registry order.
fn process_indices(registry: &Registry) -> BTreeMap<&str, i32> {
    let mut indices: BTreeMap<&str, i32> = BTreeMap::new();
    let mut n_signal = 0;
    let mut n_background = 0;
    for proc in registry.processes() {
        if indices.contains_key(proc.name.as_str()) {
            continue;
        }
        let index = if proc.signal {
            n_signal += 1;
            1 - n_signal
        } else {
            n_background += 1;
            n_background
        };
        indices.insert(&proc.name, index);
    }
    indices
}

type SystRows = BTreeMap<String, (SystKind, BTreeMap<usize, f64>)>;

/// One row per distinct systematic name: kind plus per-column effect.
fn systematic_rows(registry: &Registry, columns: &[&Process]) -> Result<SystRows> {
    let mut rows: SystRows = BTreeMap::new();
    for (col, proc) in columns.iter().enumerate() {
        for syst in &proc.systematics {
            let entry =
                rows.entry(syst.name.clone()).or_insert_with(|| (syst.kind, BTreeMap::new()));
            if entry.0 != syst.kind {
                return Err(Error::Configuration(format!(
                    "systematic '{}' appears both as {} and {}",
                    syst.name,
                    entry.0.label(),
                    syst.kind.label()
                )));
            }
            entry.1.insert(col, syst.value);
        }
    }
    Ok(rows)
}

/// Insert every bound histogram under the extraction path convention.
fn fill_container(registry: &Registry, container: &mut ShapeContainer) -> Result<()> {
    for obs in registry.observations() {
        if let Some(shape) = &obs.shape {
            container.insert(substitute(NOMINAL_TEMPLATE, &obs.tokens())?, shape.clone());
        }
    }
    for proc in registry.processes() {
        if let Some(shape) = &proc.shape {
            container.insert(substitute(NOMINAL_TEMPLATE, &proc.tokens())?, shape.clone());
        }
        for syst in &proc.systematics {
            let (Some(up), Some(down)) = (&syst.shape_up, &syst.shape_down) else { continue };
            let base =
                substitute(SYSTEMATIC_TEMPLATE, &proc.tokens().with_systematic(&syst.name))?;
            container.insert(format!("{}Up", base), up.clone());
            container.insert(format!("{}Down", base), down.clone());
        }
    }
    Ok(())
}

fn format_value(value: f64) -> String {
    format!("{}", value)
}

fn parse_value(token: &str) -> Result<f64> {
    token.parse().map_err(|_| Error::Card(format!("bad numeric value '{}'", token)))
}

/// Left-justify each column to its widest cell.
fn format_table(rows: &[Vec<String>]) -> String {
    let n_cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..n_cols)
        .map(|c| rows.iter().filter_map(|r| r.get(c)).map(String::len).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    for row in rows {
        let mut line = String::new();
        for (c, cell) in row.iter().enumerate() {
            line.push_str(cell);
            if c + 1 < row.len() {
                for _ in cell.len()..widths[c] + 2 {
                    line.push(' ');
                }
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
