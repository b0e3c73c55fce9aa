// Error type for the planner.
//
// Only structural mistakes surface here: bad indices, an impossible base
// reference, an empty template catalog, unreadable config. Numeric inputs
// outside their declared range (energies, tensions, deltas) are clamped at
// the point of use and never produce an error.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("section index {index} out of range (song has {count} sections)")]
    SectionIndexOutOfRange { index: usize, count: usize },

    #[error("bar index {bar} out of range for section {section} ({bar_count} bars)")]
    BarIndexOutOfRange {
        section: usize,
        bar: usize,
        bar_count: usize,
    },

    #[error("base reference {base} must be earlier than section {current}")]
    InvalidBaseReference { current: usize, base: usize },

    #[error("section {index} has zero bars")]
    EmptySection { index: usize },

    #[error("song has no sections")]
    EmptySong,

    #[error("no energy arc templates available (generic fallback list is empty)")]
    NoTemplates,

    #[error("unknown constraint policy '{0}'")]
    UnknownPolicy(String),

    #[error("failed to parse song file: {0}")]
    Config(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Fail with `SectionIndexOutOfRange` unless `index < count`.
pub(crate) fn check_section(index: usize, count: usize) -> Result<(), PlanError> {
    if index < count {
        Ok(())
    } else {
        Err(PlanError::SectionIndexOutOfRange { index, count })
    }
}
