//! # Offset Tables: where each component lives in the global vectors
//!
//! A model tree contributes to one flat state vector and one global Jacobian.
//! No component knows its global position up front; instead every component
//! carries an [`OffsetTable`] holding one [`SolverOffsets`] record per solve
//! mode, filled by two tree walks:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  1. load_sizes(root, mode)                                               │
//! │     post-order: total(node) = own(node) + Σ total(child)                 │
//! │                                                                          │
//! │  2. set_offset(root, base, constraint_base, mode)                        │
//! │     pre-order, strictly sequential over siblings:                        │
//! │                                                                          │
//! │     global vector (DAE mode) for a subtree rooted at P with children A,B │
//! │     ┌──────┬──────┬──────┬──────┬──────┬──────┐                         │
//! │     │ P.alg│ A.alg│ B.alg│P.diff│A.diff│B.diff│                         │
//! │     └──────┴──────┴──────┴──────┴──────┴──────┘                         │
//! │     ^ base               ^ base + total(P).alg_size                      │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each record moves through `Unsized → Sized → Assigned`. Adding or removing
//! a child invalidates the container's records; offsets must then be rebuilt
//! from the root. The local mode (index 0) is special: its record is stamped
//! by `initialize_sizes` at offset 0 within the component's own storage and is
//! never moved by the walks.

use crate::mode::SolveMode;
use crate::model::DynamicModel;
use serde::Serialize;
use tracing::{debug, trace};

/// Slot counts a component (or subtree) occupies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateSizes {
    /// Algebraic state slots
    pub alg_size: usize,
    /// Differential state slots
    pub diff_size: usize,
    /// Upper bound on Jacobian non-zeros
    pub jac_size: usize,
    /// Constraint slots
    pub constraints_size: usize,
}

impl StateSizes {
    pub const ZERO: StateSizes = StateSizes {
        alg_size: 0,
        diff_size: 0,
        jac_size: 0,
        constraints_size: 0,
    };

    pub const fn new(alg_size: usize, diff_size: usize, jac_size: usize) -> Self {
        StateSizes {
            alg_size,
            diff_size,
            jac_size,
            constraints_size: 0,
        }
    }

    /// Number of state slots (algebraic + differential)
    #[inline]
    pub fn total(&self) -> usize {
        self.alg_size + self.diff_size
    }

    /// Accumulate another component's sizes into these.
    pub fn add(&mut self, other: &StateSizes) {
        self.alg_size += other.alg_size;
        self.diff_size += other.diff_size;
        self.jac_size += other.jac_size;
        self.constraints_size += other.constraints_size;
    }

    /// Keep only the slots active under `mode`.
    pub fn restrict(&self, mode: &SolveMode) -> StateSizes {
        StateSizes {
            alg_size: if mode.has_algebraic() { self.alg_size } else { 0 },
            diff_size: if mode.has_differential() { self.diff_size } else { 0 },
            jac_size: self.jac_size,
            constraints_size: self.constraints_size,
        }
    }
}

/// Lifecycle of one offset record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum OffsetStatus {
    #[default]
    Unsized,
    Sized,
    Assigned,
}

/// Offset record for one (component, solve mode) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SolverOffsets {
    /// The component's own slots
    pub local: StateSizes,
    /// Own slots plus every descendant's
    pub total: StateSizes,
    /// First algebraic slot in the global vector
    pub alg_offset: Option<usize>,
    /// First differential slot in the global vector
    pub diff_offset: Option<usize>,
    /// First constraint slot
    pub constraint_offset: Option<usize>,
    pub status: OffsetStatus,
}

impl SolverOffsets {
    const UNSIZED: SolverOffsets = SolverOffsets {
        local: StateSizes::ZERO,
        total: StateSizes::ZERO,
        alg_offset: None,
        diff_offset: None,
        constraint_offset: None,
        status: OffsetStatus::Unsized,
    };

    pub fn reset(&mut self) {
        *self = SolverOffsets::UNSIZED;
    }

    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.status == OffsetStatus::Assigned
    }

    /// Total state slots of the subtree
    #[inline]
    pub fn state_size(&self) -> usize {
        self.total.total()
    }
}

static UNSIZED_RECORD: SolverOffsets = SolverOffsets::UNSIZED;

/// Per-mode offset records of one component.
#[derive(Debug, Clone, Default)]
pub struct OffsetTable {
    /// `None` until `initialize_sizes` has run
    declared: Option<StateSizes>,
    records: Vec<SolverOffsets>,
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the sizes declared by `initialize_sizes` and stamp the local-mode record.
    pub fn set_local_sizes(&mut self, sizes: StateSizes) {
        self.declared = Some(sizes);
        let local = self.get_mut(&SolveMode::LOCAL);
        local.local = sizes;
        local.total = sizes;
        local.alg_offset = Some(0);
        local.diff_offset = Some(sizes.alg_size);
        local.constraint_offset = Some(0);
        local.status = OffsetStatus::Assigned;
    }

    /// Sizes declared by the most recent `initialize_sizes`; zero if it never ran.
    #[inline]
    pub fn local_sizes(&self) -> StateSizes {
        self.declared.unwrap_or_default()
    }

    /// Whether `initialize_sizes` has declared this component's sizes.
    #[inline]
    pub fn is_declared(&self) -> bool {
        self.declared.is_some()
    }

    /// Record for `mode`; an unsized record if the mode was never loaded.
    pub fn get(&self, mode: &SolveMode) -> &SolverOffsets {
        self.records.get(mode.offset_index).unwrap_or(&UNSIZED_RECORD)
    }

    /// Mutable record for `mode`, growing the table as needed.
    pub fn get_mut(&mut self, mode: &SolveMode) -> &mut SolverOffsets {
        if self.records.len() <= mode.offset_index {
            self.records.resize(mode.offset_index + 1, SolverOffsets::UNSIZED);
        }
        &mut self.records[mode.offset_index]
    }

    /// Record for an explicit offset index (used for paired modes).
    pub fn by_index(&self, offset_index: usize) -> &SolverOffsets {
        self.records.get(offset_index).unwrap_or(&UNSIZED_RECORD)
    }

    /// Mark every non-local record stale after a topology change.
    pub fn invalidate(&mut self) {
        for record in self.records.iter_mut().skip(1) {
            record.reset();
        }
    }

    pub fn is_assigned(&self, mode: &SolveMode) -> bool {
        self.get(mode).is_assigned()
    }
}

/// Size `model` and its whole subtree for `mode`.
///
/// Children are visited in insertion order; the parent's total is the sum of
/// its own mode sizes and each child's total.
///
/// # Panics
///
/// Panics if any component in the subtree never ran `initialize_sizes`.
pub fn load_sizes(model: &mut dyn DynamicModel, mode: &SolveMode) {
    if mode.is_local() {
        return;
    }
    assert!(
        model.offsets().is_declared(),
        "component '{}' has no declared sizes; initialize_sizes not run",
        model.name()
    );
    model.offsets_mut().get_mut(mode).reset();
    let own = model.mode_sizes(mode);
    let mut total = own;
    for sub in model.sub_models_mut() {
        load_sizes(sub.as_mut(), mode);
        total.add(&sub.offsets().get(mode).total);
    }
    let record = model.offsets_mut().get_mut(mode);
    record.local = own;
    record.total = total;
    record.status = OffsetStatus::Sized;
    trace!(
        component = model.name(),
        mode = %mode,
        alg = total.alg_size,
        diff = total.diff_size,
        "loaded sizes"
    );
}

/// Assign global offsets to `model` and its subtree, starting at `base`.
///
/// # Panics
///
/// Panics if `load_sizes` has not run for this mode since the last topology change.
pub fn set_offset(model: &mut dyn DynamicModel, base: usize, constraint_base: usize, mode: &SolveMode) {
    if mode.is_local() {
        return;
    }
    let record = model.offsets().get(mode);
    assert!(
        record.status >= OffsetStatus::Sized,
        "set_offset on '{}' for mode {} before load_sizes",
        model.name(),
        mode
    );
    let (alg, diff) = match (mode.has_algebraic(), mode.has_differential()) {
        (true, true) => (Some(base), Some(base + record.total.alg_size)),
        (true, false) => (Some(base), None),
        (false, true) => (None, Some(base)),
        (false, false) => (None, None),
    };
    assign_offsets(model, alg, diff, Some(constraint_base), mode);
    debug!(
        component = model.name(),
        mode = %mode,
        base,
        size = model.offsets().get(mode).state_size(),
        "assigned offsets"
    );
}

fn assign_offsets(
    model: &mut dyn DynamicModel,
    alg: Option<usize>,
    diff: Option<usize>,
    constraint: Option<usize>,
    mode: &SolveMode,
) {
    let name = model.name().to_string();
    let record = model.offsets_mut().get_mut(mode);
    assert!(
        record.status >= OffsetStatus::Sized,
        "component '{}' is unsized for mode {}; rerun load_sizes from the root",
        name,
        mode
    );
    record.alg_offset = alg;
    record.diff_offset = diff;
    record.constraint_offset = constraint;
    record.status = OffsetStatus::Assigned;
    let own = record.local;

    let mut next_alg = alg.map(|a| a + own.alg_size);
    let mut next_diff = diff.map(|d| d + own.diff_size);
    let mut next_con = constraint.map(|c| c + own.constraints_size);
    for sub in model.sub_models_mut() {
        assign_offsets(sub.as_mut(), next_alg, next_diff, next_con, mode);
        let sub_total = sub.offsets().get(mode).total;
        next_alg = next_alg.map(|a| a + sub_total.alg_size);
        next_diff = next_diff.map(|d| d + sub_total.diff_size);
        next_con = next_con.map(|c| c + sub_total.constraints_size);
    }
}

/// Size and place the whole tree for `mode` starting at slot 0.
///
/// Returns the length of the global state vector.
pub fn prepare(model: &mut dyn DynamicModel, mode: &SolveMode) -> usize {
    load_sizes(model, mode);
    set_offset(model, 0, 0, mode);
    model.offsets().get(mode).state_size()
}

/// One row of a flattened offset layout.
#[derive(Debug, Clone, Serialize)]
pub struct LayoutEntry {
    pub name: String,
    pub depth: usize,
    pub offsets: SolverOffsets,
}

/// Flatten the tree's offset records for `mode` in walk order.
pub fn layout_entries(model: &dyn DynamicModel, mode: &SolveMode) -> Vec<LayoutEntry> {
    fn walk(model: &dyn DynamicModel, mode: &SolveMode, depth: usize, out: &mut Vec<LayoutEntry>) {
        out.push(LayoutEntry {
            name: model.name().to_string(),
            depth,
            offsets: *model.offsets().get(mode),
        });
        for sub in model.sub_models() {
            walk(sub.as_ref(), mode, depth + 1, out);
        }
    }
    let mut out = Vec::new();
    walk(model, mode, 0, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelGroup, SizedStub};

    fn two_child_group() -> ModelGroup {
        let mut group = ModelGroup::new("area");
        group.add(Box::new(SizedStub::new("gen", StateSizes::new(1, 6, 10))));
        group.add(Box::new(SizedStub::new("load", StateSizes::new(1, 0, 1))));
        group.initialize_sizes(0.0, 0);
        group
    }

    #[test]
    fn load_sizes_accumulates_children() {
        let mut group = two_child_group();
        load_sizes(&mut group, &SolveMode::DAE);
        let record = group.offsets().get(&SolveMode::DAE);
        assert_eq!(record.status, OffsetStatus::Sized);
        assert_eq!(record.local, StateSizes::ZERO);
        assert_eq!(record.total.alg_size, 2);
        assert_eq!(record.total.diff_size, 6);
        assert_eq!(record.total.jac_size, 11);
    }

    #[test]
    fn set_offset_places_siblings_sequentially() {
        let mut group = two_child_group();
        let mode = SolveMode::DAE;
        load_sizes(&mut group, &mode);
        set_offset(&mut group, 10, 0, &mode);

        let gen = group.sub_models()[0].offsets().get(&mode);
        let load = group.sub_models()[1].offsets().get(&mode);
        assert_eq!(gen.alg_offset, Some(10));
        assert_eq!(load.alg_offset, Some(11));
        assert_eq!(gen.diff_offset, Some(12));
        assert_eq!(load.diff_offset, Some(18));
        assert!(gen.is_assigned() && load.is_assigned());
    }

    #[test]
    fn algebraic_only_mode_drops_differential_slots() {
        let mut group = two_child_group();
        let mode = SolveMode::DYN_ALGEBRAIC;
        let n = prepare(&mut group, &mode);
        assert_eq!(n, 2);
        let gen = group.sub_models()[0].offsets().get(&mode);
        assert_eq!(gen.alg_offset, Some(0));
        assert_eq!(gen.diff_offset, None);
    }

    #[test]
    fn differential_only_mode_drops_algebraic_slots() {
        let mut group = two_child_group();
        let mode = SolveMode::DYN_DIFFERENTIAL;
        let n = prepare(&mut group, &mode);
        assert_eq!(n, 6);
        let load = group.sub_models()[1].offsets().get(&mode);
        assert_eq!(load.alg_offset, None);
        assert_eq!(load.diff_offset, Some(6));
    }

    #[test]
    fn repeated_builds_are_stable() {
        let mut group = two_child_group();
        let mode = SolveMode::DAE;
        prepare(&mut group, &mode);
        let first = layout_entries(&group, &mode);
        prepare(&mut group, &mode);
        let second = layout_entries(&group, &mode);
        let firsts: Vec<_> = first.iter().map(|e| e.offsets).collect();
        let seconds: Vec<_> = second.iter().map(|e| e.offsets).collect();
        assert_eq!(firsts, seconds);
    }

    #[test]
    fn local_mode_record_is_stamped_by_initialize_sizes() {
        let group = two_child_group();
        let stub = &group.sub_models()[0];
        let local = stub.offsets().get(&SolveMode::LOCAL);
        assert_eq!(local.alg_offset, Some(0));
        assert_eq!(local.diff_offset, Some(1));
        assert!(local.is_assigned());
    }

    #[test]
    fn invalidate_returns_records_to_unsized() {
        let mut group = two_child_group();
        prepare(&mut group, &SolveMode::DAE);
        group.offsets_mut().invalidate();
        assert_eq!(group.offsets().get(&SolveMode::DAE).status, OffsetStatus::Unsized);
        assert!(group.offsets().is_assigned(&SolveMode::LOCAL));
    }

    #[test]
    #[should_panic(expected = "initialize_sizes not run")]
    fn child_added_after_sizing_is_rejected() {
        let mut group = two_child_group();
        group.add(Box::new(SizedStub::new("late", StateSizes::new(2, 6, 40))));
        prepare(&mut group, &SolveMode::DAE);
    }

    #[test]
    fn resizing_after_late_add_counts_the_new_child() {
        let mut group = two_child_group();
        group.add(Box::new(SizedStub::new("late", StateSizes::new(2, 6, 40))));
        group.initialize_sizes(0.0, 0);
        assert_eq!(prepare(&mut group, &SolveMode::DAE), 16);
    }

    #[test]
    #[should_panic(expected = "before load_sizes")]
    fn set_offset_without_sizing_panics() {
        let mut group = two_child_group();
        set_offset(&mut group, 0, 0, &SolveMode::DAE);
    }
}
