use super::{load_system, print_json};
use anyhow::{bail, Result};
use gridsim_cli::OutputFormat;
use gridsim_core::matrix::sparsity_pattern;
use gridsim_core::offsets::{layout_entries, prepare, LayoutEntry};
use gridsim_core::{DynamicModel, SolveMode, StateData};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

#[derive(Serialize)]
struct LayoutReport {
    mode: &'static str,
    states: usize,
    jacobian_nonzeros: usize,
    jacobian_budget: usize,
    components: Vec<LayoutEntry>,
}

fn slot(offset: Option<usize>, size: usize) -> String {
    match offset {
        Some(o) if size > 0 => format!("{}..{}", o, o + size),
        _ => "-".to_string(),
    }
}

pub fn handle(system: &Path, mode: &str, format: OutputFormat) -> Result<()> {
    let mode = SolveMode::from_str(mode)?;
    if mode.is_local() {
        bail!("mode '{}' addresses component-local storage and has no global layout", mode.as_str());
    }
    let (_, mut bus) = load_system(system)?;
    let n = prepare(&mut bus, &mode);

    let mut state = vec![0.0; n];
    bus.guess_state(0.0, &mut state, None, &mode);
    let sd = StateData::new(0.0, &state);
    let pattern = sparsity_pattern(&bus, &sd, &mode, n);
    let report = LayoutReport {
        mode: mode.as_str(),
        states: n,
        jacobian_nonzeros: pattern.nnz(),
        jacobian_budget: bus.offsets().get(&mode).total.jac_size,
        components: layout_entries(&bus, &mode),
    };
    info!(mode = %mode, states = n, nnz = report.jacobian_nonzeros, "layout computed");

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("{:<20} {:>10} {:>10}", "component", "algebraic", "differential");
            for entry in &report.components {
                let name = format!("{}{}", "  ".repeat(entry.depth), entry.name);
                let o = &entry.offsets;
                println!(
                    "{:<20} {:>10} {:>10}",
                    name,
                    slot(o.alg_offset, o.local.alg_size),
                    slot(o.diff_offset, o.local.diff_size)
                );
            }
            println!("mode: {}", report.mode);
            println!("states: {}", report.states);
            println!(
                "jacobian non-zeros: {} (budget {})",
                report.jacobian_nonzeros, report.jacobian_budget
            );
        }
    }
    Ok(())
}
