//! Location resolution: typed views of one component's slots in solver buffers.
//!
//! The solver owns every buffer. A component only ever sees the slices that
//! its [`SolverOffsets`](crate::offsets::SolverOffsets) record for the active
//! mode selects. Blocks the mode does not solve for (algebraic values in a
//! differential-only pass, say) resolve to fallback storage: the paired
//! mode's vector when the solver supplies one, otherwise the component's own
//! local state.

use crate::mode::SolveMode;
use crate::offsets::OffsetTable;
use std::ops::Range;

/// Snapshot of solver state handed to every evaluation call.
#[derive(Debug, Clone, Copy)]
pub struct StateData<'a> {
    pub time: f64,
    /// Global state vector for the active mode
    pub state: &'a [f64],
    /// Solver's discretized state derivative, absent in algebraic-only passes
    pub dstate_dt: Option<&'a [f64]>,
    /// State vector of the paired mode in a partitioned solve
    pub alt_state: Option<&'a [f64]>,
    /// Implicit-integration coefficient ∂ẋ/∂x
    pub cj: f64,
    pub seq_id: u64,
}

impl<'a> StateData<'a> {
    pub fn new(time: f64, state: &'a [f64]) -> Self {
        StateData {
            time,
            state,
            dstate_dt: None,
            alt_state: None,
            cj: 0.0,
            seq_id: 0,
        }
    }

    pub fn with_dstate(mut self, dstate_dt: &'a [f64]) -> Self {
        self.dstate_dt = Some(dstate_dt);
        self
    }

    pub fn with_alt_state(mut self, alt_state: &'a [f64]) -> Self {
        self.alt_state = Some(alt_state);
        self
    }

    pub fn with_cj(mut self, cj: f64) -> Self {
        self.cj = cj;
        self
    }

    pub fn with_seq_id(mut self, seq_id: u64) -> Self {
        self.seq_id = seq_id;
        self
    }
}

/// Read views of a component's state for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Locations<'a> {
    pub alg_state: &'a [f64],
    pub diff_state: &'a [f64],
    /// Only present when the mode solves differential equations
    pub dstate: Option<&'a [f64]>,
    pub alg_offset: Option<usize>,
    pub diff_offset: Option<usize>,
}

/// Mutable output views, split from one destination buffer.
#[derive(Debug)]
pub struct Destinations<'a> {
    pub alg: &'a mut [f64],
    pub diff: &'a mut [f64],
}

fn block(offset: Option<usize>, len: usize) -> Option<Range<usize>> {
    offset.filter(|_| len > 0).map(|o| o..o + len)
}

/// Resolve the read views of one component under `mode`.
///
/// `local` is the component's own state in local layout (algebraic block
/// first). It backs any block the mode does not cover.
///
/// # Panics
///
/// Panics when the offsets for `mode` have not been assigned, or when the
/// buffers are shorter than the assigned ranges.
pub fn resolve<'a>(
    offsets: &OffsetTable,
    sd: &StateData<'a>,
    local: &'a [f64],
    mode: &SolveMode,
) -> Locations<'a> {
    let record = offsets.get(mode);
    assert!(
        record.is_assigned(),
        "offsets for mode {} are not assigned; run load_sizes and set_offset from the root",
        mode
    );
    let declared = offsets.local_sizes();
    let active = record.local;

    let alg_range = if mode.has_algebraic() {
        block(record.alg_offset, active.alg_size)
    } else {
        None
    };
    let diff_range = if mode.has_differential() {
        block(record.diff_offset, active.diff_size)
    } else {
        None
    };

    let paired = mode.paired_offset_index.map(|idx| offsets.by_index(idx));
    let alt_alg = || -> Option<&'a [f64]> {
        let alt = sd.alt_state?;
        let rec = paired.filter(|r| r.is_assigned())?;
        block(rec.alg_offset, rec.local.alg_size).map(|r| &alt[r])
    };
    let alt_diff = || -> Option<&'a [f64]> {
        let alt = sd.alt_state?;
        let rec = paired.filter(|r| r.is_assigned())?;
        block(rec.diff_offset, rec.local.diff_size).map(|r| &alt[r])
    };

    let alg_state = match alg_range {
        Some(r) => &sd.state[r],
        None => alt_alg().unwrap_or_else(|| local.get(..declared.alg_size).unwrap_or(&[])),
    };
    let diff_state = match diff_range.clone() {
        Some(r) => &sd.state[r],
        None => alt_diff().unwrap_or_else(|| {
            local
                .get(declared.alg_size..declared.alg_size + declared.diff_size)
                .unwrap_or(&[])
        }),
    };
    let dstate = match (diff_range, sd.dstate_dt) {
        (Some(r), Some(d)) => Some(&d[r]),
        _ => None,
    };

    Locations {
        alg_state,
        diff_state,
        dstate,
        alg_offset: record.alg_offset,
        diff_offset: record.diff_offset,
    }
}

/// Split `buffer` into the component's algebraic and differential output rows.
///
/// Blocks the mode does not solve for come back empty.
pub fn destinations<'a>(offsets: &OffsetTable, buffer: &'a mut [f64], mode: &SolveMode) -> Destinations<'a> {
    let record = offsets.get(mode);
    assert!(
        record.is_assigned(),
        "offsets for mode {} are not assigned; run load_sizes and set_offset from the root",
        mode
    );
    let alg = if mode.has_algebraic() {
        block(record.alg_offset, record.local.alg_size)
    } else {
        None
    };
    let diff = if mode.has_differential() {
        block(record.diff_offset, record.local.diff_size)
    } else {
        None
    };

    match (alg, diff) {
        (Some(a), Some(d)) if a.end <= d.start => {
            let (head, tail) = buffer.split_at_mut(d.start);
            Destinations {
                alg: &mut head[a],
                diff: &mut tail[..d.end - d.start],
            }
        }
        (Some(a), Some(d)) => {
            assert!(d.end <= a.start, "algebraic and differential rows overlap");
            let (head, tail) = buffer.split_at_mut(a.start);
            Destinations {
                alg: &mut tail[..a.end - a.start],
                diff: &mut head[d],
            }
        }
        (Some(a), None) => Destinations {
            alg: &mut buffer[a],
            diff: &mut [],
        },
        (None, Some(d)) => Destinations {
            alg: &mut [],
            diff: &mut buffer[d],
        },
        (None, None) => Destinations {
            alg: &mut [],
            diff: &mut [],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offsets::{OffsetStatus, StateSizes};

    fn table() -> OffsetTable {
        let mut table = OffsetTable::new();
        table.set_local_sizes(StateSizes::new(2, 3, 8));
        for (mode, alg, diff) in [
            (SolveMode::DAE, Some(4), Some(10)),
            (SolveMode::DYN_ALGEBRAIC, Some(1), None),
            (SolveMode::DYN_DIFFERENTIAL, None, Some(0)),
        ] {
            let rec = table.get_mut(&mode);
            rec.local = StateSizes::new(2, 3, 8).restrict(&mode);
            rec.total = rec.local;
            rec.alg_offset = alg;
            rec.diff_offset = diff;
            rec.status = OffsetStatus::Assigned;
        }
        table
    }

    #[test]
    fn dae_mode_reads_both_blocks_from_state() {
        let state: Vec<f64> = (0..16).map(f64::from).collect();
        let dstate = vec![0.5; 16];
        let sd = StateData::new(0.0, &state).with_dstate(&dstate);
        let locs = resolve(&table(), &sd, &[], &SolveMode::DAE);
        assert_eq!(locs.alg_state, &[4.0, 5.0]);
        assert_eq!(locs.diff_state, &[10.0, 11.0, 12.0]);
        assert_eq!(locs.dstate.unwrap().len(), 3);
    }

    #[test]
    fn algebraic_only_mode_has_no_dstate_and_falls_back_to_local() {
        let state = vec![0.0, 7.0, 8.0];
        let local = [1.0, 2.0, 3.0, 4.0, 5.0];
        let dstate = vec![9.0; 3];
        let sd = StateData::new(0.0, &state).with_dstate(&dstate);
        let locs = resolve(&table(), &sd, &local, &SolveMode::DYN_ALGEBRAIC);
        assert_eq!(locs.alg_state, &[7.0, 8.0]);
        assert_eq!(locs.diff_state, &[3.0, 4.0, 5.0]);
        assert!(locs.dstate.is_none());
    }

    #[test]
    fn differential_only_mode_reads_algebraic_block_from_paired_state() {
        let state = vec![0.1, 0.2, 0.3];
        let alt = vec![-1.0, 6.0, 7.0];
        let sd = StateData::new(0.0, &state).with_alt_state(&alt);
        let locs = resolve(&table(), &sd, &[], &SolveMode::DYN_DIFFERENTIAL);
        assert_eq!(locs.alg_state, &[6.0, 7.0]);
        assert_eq!(locs.diff_state, &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn destinations_are_disjoint_slices() {
        let mut buffer = vec![0.0; 16];
        {
            let dest = destinations(&table(), &mut buffer, &SolveMode::DAE);
            dest.alg.fill(1.0);
            dest.diff.fill(2.0);
        }
        assert_eq!(&buffer[4..6], &[1.0, 1.0]);
        assert_eq!(&buffer[10..13], &[2.0, 2.0, 2.0]);
        assert_eq!(buffer.iter().filter(|v| **v != 0.0).count(), 5);
    }

    #[test]
    fn differential_only_destinations_leave_algebraic_rows_empty() {
        let mut buffer = vec![0.0; 3];
        let dest = destinations(&table(), &mut buffer, &SolveMode::DYN_DIFFERENTIAL);
        assert!(dest.alg.is_empty());
        assert_eq!(dest.diff.len(), 3);
    }

    #[test]
    #[should_panic(expected = "not assigned")]
    fn unassigned_offsets_fail_fast() {
        let table = OffsetTable::new();
        let state = [0.0; 4];
        resolve(&table, &StateData::new(0.0, &state), &[], &SolveMode::POWER_FLOW);
    }
}
