use super::{load_system, print_json};
use anyhow::{Context, Result};
use gridsim_cli::OutputFormat;
use gridsim_core::solver::{ImplicitEuler, SolverKind};
use gridsim_core::{DynamicModel, SolveMode, StateData};
use gridsim_models::InfiniteBus;
use serde::Serialize;
use std::path::Path;
use tracing::info;

#[derive(Serialize)]
struct Trajectory {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    steps: usize,
    max_iterations: usize,
}

fn sample(bus: &InfiniteBus, time: f64, state: &[f64], mode: &SolveMode) -> Vec<f64> {
    let sd = StateData::new(time, state);
    let mut row = vec![time, bus.local_state()[0]];
    for (_, out) in bus.child_outputs(&sd, mode) {
        row.extend(out.iter().take(2));
    }
    row
}

pub fn handle(system: &Path, stop: Option<f64>, solver: Option<&str>, format: OutputFormat) -> Result<()> {
    let (config, mut bus) = load_system(system)?;
    let mode = config.simulation.solve_mode()?;
    let stop = stop.unwrap_or(config.simulation.stop);
    let mut integrator_config = config.simulation.integrator();
    if let Some(name) = solver {
        integrator_config.solver = SolverKind::from_str(name)?;
    }
    let half_step = 0.5 * integrator_config.step;

    bus.initialize_values(&[], &[])?;
    let mut euler = ImplicitEuler::new(integrator_config)?.with_mode(mode);
    euler.initialize(&mut bus, 0.0);

    let mut columns = vec!["time".to_string(), format!("{}.V", bus.name())];
    for child in bus.sub_models() {
        columns.push(format!("{}.P", child.name()));
        columns.push(format!("{}.Q", child.name()));
    }
    let mut rows = vec![sample(&bus, euler.time(), euler.state(), &mode)];

    let mut events = config.events.iter().peekable();
    let mut steps = 0;
    let mut max_iterations = 0;
    while euler.time() + half_step <= stop {
        while let Some(event) = events.next_if(|e| e.time <= euler.time() + half_step) {
            bus.set_param(&event.param, event.value)
                .with_context(|| format!("event at t={}", event.time))?;
            info!(time = euler.time(), param = %event.param, value = event.value, "event applied");
        }
        let report = euler.step(&mut bus)?;
        steps += 1;
        max_iterations = max_iterations.max(report.iterations);
        rows.push(sample(&bus, report.time, euler.state(), &mode));
    }
    info!(steps, max_iterations, time = euler.time(), "simulation finished");

    let trajectory = Trajectory {
        columns,
        rows,
        steps,
        max_iterations,
    };
    match format {
        OutputFormat::Json => print_json(&trajectory)?,
        OutputFormat::Text => {
            let header: Vec<String> = trajectory.columns.iter().map(|c| format!("{:>12}", c)).collect();
            println!("{}", header.join(" "));
            for row in &trajectory.rows {
                let cells: Vec<String> = row.iter().map(|v| format!("{:>12.6}", v)).collect();
                println!("{}", cells.join(" "));
            }
            println!("steps: {} (max newton iterations {})", trajectory.steps, trajectory.max_iterations);
        }
    }
    Ok(())
}
