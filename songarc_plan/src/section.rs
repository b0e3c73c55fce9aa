// Song layout: the ordered list of typed, bar-counted sections.
//
// Sections arrive from the song-structure provider and are never mutated.
// The type-local index (how many earlier sections share this section's type)
// is deliberately not stored: every stage recomputes it through
// `type_local_index` so arc lookup, constraint contexts, tension and variation
// planning always agree on it.

use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural role of a section within the song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SectionType {
    Intro,
    Verse,
    PreChorus,
    Chorus,
    PostChorus,
    Bridge,
    Solo,
    Breakdown,
    Outro,
}

impl SectionType {
    pub const ALL: [SectionType; 9] = [
        SectionType::Intro,
        SectionType::Verse,
        SectionType::PreChorus,
        SectionType::Chorus,
        SectionType::PostChorus,
        SectionType::Bridge,
        SectionType::Solo,
        SectionType::Breakdown,
        SectionType::Outro,
    ];

    /// Stable numeric tag, used when a section type feeds a hash.
    pub fn ordinal(self) -> u64 {
        self as u64
    }

    /// Single-letter label for compact reports.
    pub fn short_label(self) -> &'static str {
        match self {
            SectionType::Intro => "I",
            SectionType::Verse => "V",
            SectionType::PreChorus => "P",
            SectionType::Chorus => "C",
            SectionType::PostChorus => "Q",
            SectionType::Bridge => "B",
            SectionType::Solo => "S",
            SectionType::Breakdown => "K",
            SectionType::Outro => "O",
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One section of the song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub section_type: SectionType,
    /// Position in the song's section list (0-based).
    pub absolute_index: usize,
    pub bar_count: usize,
    /// First bar of the section, counted from the start of the song.
    pub start_bar: usize,
}

/// Number of sections before `absolute_index` sharing its section type.
///
/// O(n) in the index; cheap enough to call from every stage. Panics if
/// `absolute_index` is out of range, which is a caller bug.
pub fn type_local_index(sections: &[Section], absolute_index: usize) -> usize {
    let target = sections[absolute_index].section_type;
    sections[..absolute_index]
        .iter()
        .filter(|s| s.section_type == target)
        .count()
}

/// Total number of sections of `section_type` in the song.
pub fn count_of_type(sections: &[Section], section_type: SectionType) -> usize {
    sections
        .iter()
        .filter(|s| s.section_type == section_type)
        .count()
}

/// Build a contiguous section list from `(type, bars)` pairs.
///
/// Absolute indices and start bars are assigned in order. A section with zero
/// bars is rejected.
pub fn layout(parts: &[(SectionType, usize)]) -> Result<Vec<Section>, PlanError> {
    let mut sections = Vec::with_capacity(parts.len());
    let mut start_bar = 0;
    for (index, &(section_type, bar_count)) in parts.iter().enumerate() {
        if bar_count == 0 {
            return Err(PlanError::EmptySection { index });
        }
        sections.push(Section {
            section_type,
            absolute_index: index,
            bar_count,
            start_bar,
        });
        start_bar += bar_count;
    }
    Ok(sections)
}

/// Check that a provided section list is well formed: non-empty, indices
/// match positions, and every section has at least one bar.
pub fn validate_sections(sections: &[Section]) -> Result<(), PlanError> {
    if sections.is_empty() {
        return Err(PlanError::EmptySong);
    }
    for (i, s) in sections.iter().enumerate() {
        if s.absolute_index != i {
            return Err(PlanError::SectionIndexOutOfRange {
                index: s.absolute_index,
                count: sections.len(),
            });
        }
        if s.bar_count == 0 {
            return Err(PlanError::EmptySection { index: i });
        }
    }
    Ok(())
}
