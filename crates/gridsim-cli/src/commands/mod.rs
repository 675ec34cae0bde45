pub mod init;
pub mod layout;
pub mod simulate;

use anyhow::Result;
use gridsim_core::{DynamicModel, SolveMode};
use gridsim_cli::SystemConfig;
use gridsim_models::{default_registry, InfiniteBus};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Parse `path` and assemble its bus with every child sized.
pub fn load_system(path: &Path) -> Result<(SystemConfig, InfiniteBus)> {
    let config = SystemConfig::from_path(path)?;
    let mut bus = config.build(&default_registry())?;
    bus.initialize_sizes(0.0, 0);
    debug!(
        system = %path.display(),
        generators = config.generators.len(),
        loads = config.loads.len(),
        "system loaded"
    );
    Ok((config, bus))
}

/// Name of every global state slot under `mode`, as `component.state`.
pub fn global_state_names(root: &dyn DynamicModel, mode: &SolveMode, n: usize) -> Vec<String> {
    fn fill(model: &dyn DynamicModel, mode: &SolveMode, out: &mut [String]) {
        let declared = model.offsets().local_sizes();
        let record = model.offsets().get(mode);
        let names = model.state_names();
        let label = |k: usize| format!("{}.{}", model.name(), names[k]);
        if let Some(a) = record.alg_offset {
            for k in 0..record.local.alg_size {
                out[a + k] = label(k);
            }
        }
        if let Some(d) = record.diff_offset {
            for k in 0..record.local.diff_size {
                out[d + k] = label(declared.alg_size + k);
            }
        }
        for sub in model.sub_models() {
            fill(sub.as_ref(), mode, out);
        }
    }
    let mut out = vec![String::new(); n];
    fill(root, mode, &mut out);
    out
}

pub fn max_norm(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
