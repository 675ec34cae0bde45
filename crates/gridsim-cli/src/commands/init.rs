use super::{global_state_names, load_system, max_norm, print_json};
use anyhow::Result;
use gridsim_cli::OutputFormat;
use gridsim_core::offsets::prepare;
use gridsim_core::{DynamicModel, StateData};
use serde::Serialize;
use std::path::Path;
use tracing::info;

#[derive(Serialize)]
struct ControlReport {
    name: String,
    field_voltage: f64,
    mechanical_power: f64,
    p: f64,
    q: f64,
}

#[derive(Serialize)]
struct StateValue {
    name: String,
    value: f64,
}

#[derive(Serialize)]
struct InitReport {
    mode: &'static str,
    children: Vec<ControlReport>,
    states: Vec<StateValue>,
    residual_norm: f64,
}

pub fn handle(system: &Path, format: OutputFormat) -> Result<()> {
    let (config, mut bus) = load_system(system)?;
    let mode = config.simulation.solve_mode()?;
    bus.initialize_values(&[], &[])?;
    let n = prepare(&mut bus, &mode);

    let mut state = vec![0.0; n];
    let mut dstate = vec![0.0; n];
    bus.guess_state(0.0, &mut state, Some(&mut dstate), &mode);
    let sd = StateData::new(0.0, &state).with_dstate(&dstate);
    let mut resid = vec![0.0; n];
    bus.residual(&[], &sd, &mut resid, &mode);
    let residual_norm = max_norm(&resid);

    let (v, theta) = (bus.voltage(), bus.angle());
    let children = bus
        .child_outputs(&sd, &mode)
        .into_iter()
        .enumerate()
        .map(|(k, (name, out))| {
            let [_, _, ef, pm] = bus.child_inputs(k, v, theta);
            ControlReport {
                name: name.to_string(),
                field_voltage: ef,
                mechanical_power: pm,
                p: out.first().copied().unwrap_or(0.0),
                q: out.get(1).copied().unwrap_or(0.0),
            }
        })
        .collect();
    let states = global_state_names(&bus, &mode, n)
        .into_iter()
        .zip(&state)
        .map(|(name, value)| StateValue { name, value: *value })
        .collect();
    let report = InitReport {
        mode: mode.as_str(),
        children,
        states,
        residual_norm,
    };
    info!(states = n, residual_norm, "system initialized");

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("{:<12} {:>10} {:>10} {:>10} {:>10}", "child", "Ef", "Pm", "P", "Q");
            for c in &report.children {
                println!(
                    "{:<12} {:>10.5} {:>10.5} {:>10.5} {:>10.5}",
                    c.name, c.field_voltage, c.mechanical_power, c.p, c.q
                );
            }
            println!();
            for s in &report.states {
                println!("{:<20} {:>14.8}", s.name, s.value);
            }
            println!("residual max-norm: {:.3e}", report.residual_norm);
        }
    }
    Ok(())
}
