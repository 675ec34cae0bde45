//! Solve modes: which equation subset is active during a solver phase.
//!
//! Every solver phase evaluates a different subset of the model equations:
//!
//! ```text
//! ┌──────────────────┬───────┬───────────┬──────────────┬─────────────────────────┐
//! │ MODE             │ INDEX │ ALGEBRAIC │ DIFFERENTIAL │ TYPICAL USE             │
//! │──────────────────│───────│───────────│──────────────│─────────────────────────│
//! │ LOCAL            │   0   │    yes    │     yes      │ component-owned storage │
//! │ POWER_FLOW       │   1   │    yes    │      -       │ steady-state solve      │
//! │ DAE              │   2   │    yes    │     yes      │ full implicit step      │
//! │ DYN_ALGEBRAIC    │   3   │    yes    │      -       │ partitioned: alg half   │
//! │ DYN_DIFFERENTIAL │   4   │     -     │     yes      │ partitioned: diff half  │
//! └──────────────────┴───────┴───────────┴──────────────┴─────────────────────────┘
//! ```
//!
//! The `offset_index` selects which offset record a component uses, so two
//! modes with different active subsets never share a layout. Indices 0 and 1
//! are reserved: their names cannot be changed through a [`ModeTable`].

use crate::error::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of offset indices reserved for system-wide conventions.
pub const RESERVED_MODE_COUNT: usize = 2;

/// Selector for the active equation subset and offset layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SolveMode {
    /// Which offset record applies
    pub offset_index: usize,
    /// States live in the component's own storage rather than a global vector
    pub local: bool,
    /// Dynamic (time-domain) rather than steady-state
    pub dynamic: bool,
    /// Algebraic equations are active
    pub algebraic: bool,
    /// Differential equations are active
    pub differential: bool,
    /// Offset index of the complementary mode in a partitioned solve
    pub paired_offset_index: Option<usize>,
}

impl SolveMode {
    /// Component-local storage, both equation kinds.
    pub const LOCAL: SolveMode = SolveMode {
        offset_index: 0,
        local: true,
        dynamic: true,
        algebraic: true,
        differential: true,
        paired_offset_index: None,
    };

    /// Steady-state power flow: algebraic equations only.
    pub const POWER_FLOW: SolveMode = SolveMode {
        offset_index: 1,
        local: false,
        dynamic: false,
        algebraic: true,
        differential: false,
        paired_offset_index: None,
    };

    /// Full dynamic DAE.
    pub const DAE: SolveMode = SolveMode {
        offset_index: 2,
        local: false,
        dynamic: true,
        algebraic: true,
        differential: true,
        paired_offset_index: None,
    };

    /// Algebraic half of a partitioned dynamic solve.
    pub const DYN_ALGEBRAIC: SolveMode = SolveMode {
        offset_index: 3,
        local: false,
        dynamic: true,
        algebraic: true,
        differential: false,
        paired_offset_index: Some(4),
    };

    /// Differential half of a partitioned dynamic solve.
    pub const DYN_DIFFERENTIAL: SolveMode = SolveMode {
        offset_index: 4,
        local: false,
        dynamic: true,
        algebraic: false,
        differential: true,
        paired_offset_index: Some(3),
    };

    /// Build a custom mode at a non-reserved index.
    pub fn new(offset_index: usize, algebraic: bool, differential: bool) -> Self {
        SolveMode {
            offset_index,
            local: false,
            dynamic: differential,
            algebraic,
            differential,
            paired_offset_index: None,
        }
    }

    #[inline]
    pub fn has_algebraic(&self) -> bool {
        self.algebraic
    }

    #[inline]
    pub fn has_differential(&self) -> bool {
        self.differential
    }

    #[inline]
    pub fn is_algebraic_only(&self) -> bool {
        self.algebraic && !self.differential
    }

    #[inline]
    pub fn is_differential_only(&self) -> bool {
        self.differential && !self.algebraic
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Canonical short name of the predefined modes.
    pub fn as_str(&self) -> &'static str {
        match self.offset_index {
            0 => "local",
            1 => "powerflow",
            2 => "dae",
            3 => "dynalg",
            4 => "dyndiff",
            _ => "custom",
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["local", "powerflow", "dae", "dynalg", "dyndiff"]
    }
}

impl Default for SolveMode {
    fn default() -> Self {
        SolveMode::DAE
    }
}

impl fmt::Display for SolveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.as_str(), self.offset_index)
    }
}

impl FromStr for SolveMode {
    type Err = GridError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "local" => Ok(SolveMode::LOCAL),
            "powerflow" | "pflow" | "steady" => Ok(SolveMode::POWER_FLOW),
            "dae" | "dynamic" => Ok(SolveMode::DAE),
            "dynalg" | "dyn_algebraic" => Ok(SolveMode::DYN_ALGEBRAIC),
            "dyndiff" | "dyn_differential" => Ok(SolveMode::DYN_DIFFERENTIAL),
            other => Err(GridError::Config(format!(
                "unknown solve mode '{}'; supported values: {}",
                other,
                SolveMode::available().join(", ")
            ))),
        }
    }
}

/// A named solve mode entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeEntry {
    pub name: String,
    pub mode: SolveMode,
}

/// Catalog of solve modes keyed by offset index.
///
/// Starts with the five predefined modes. Names attached to the reserved
/// indices (0 and 1) are fixed.
#[derive(Debug, Clone)]
pub struct ModeTable {
    entries: Vec<ModeEntry>,
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeTable {
    pub fn new() -> Self {
        let entries = [
            SolveMode::LOCAL,
            SolveMode::POWER_FLOW,
            SolveMode::DAE,
            SolveMode::DYN_ALGEBRAIC,
            SolveMode::DYN_DIFFERENTIAL,
        ]
        .into_iter()
        .map(|mode| ModeEntry {
            name: mode.as_str().to_string(),
            mode,
        })
        .collect();
        ModeTable { entries }
    }

    /// Register a new mode under `name`; it receives the next free offset index.
    pub fn register(&mut self, name: &str, algebraic: bool, differential: bool) -> GridResult<SolveMode> {
        if self.by_name(name).is_some() {
            return Err(GridError::Config(format!("solve mode '{}' already exists", name)));
        }
        let mode = SolveMode::new(self.entries.len(), algebraic, differential);
        self.entries.push(ModeEntry {
            name: name.to_string(),
            mode,
        });
        Ok(mode)
    }

    /// Change the display name of the mode at `offset_index`.
    pub fn rename(&mut self, offset_index: usize, name: &str) -> GridResult<()> {
        if offset_index < RESERVED_MODE_COUNT {
            return Err(GridError::Structure(format!(
                "solve mode index {} is reserved and cannot be renamed",
                offset_index
            )));
        }
        if self.by_name(name).is_some_and(|e| e.mode.offset_index != offset_index) {
            return Err(GridError::Config(format!("solve mode '{}' already exists", name)));
        }
        let entry = self
            .entries
            .get_mut(offset_index)
            .ok_or_else(|| GridError::Config(format!("no solve mode at index {}", offset_index)))?;
        entry.name = name.to_string();
        Ok(())
    }

    pub fn by_index(&self, offset_index: usize) -> Option<&ModeEntry> {
        self.entries.get(offset_index)
    }

    pub fn by_name(&self, name: &str) -> Option<&ModeEntry> {
        self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Resolve a name from configuration: registered names first, then the canonical aliases.
    pub fn resolve(&self, name: &str) -> GridResult<SolveMode> {
        match self.by_name(name) {
            Some(entry) => Ok(entry.mode),
            None => name.parse(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
