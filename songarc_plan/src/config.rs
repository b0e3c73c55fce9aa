// Planner configuration and song files.
//
// `PlanConfig` carries the knobs the pipeline needs (style name, seed,
// optional form and policy overrides, optional phrase length). Every field
// has a serde default, so a song file may give as little as its sections.
//
// A `SongFile` is the JSON document the `plan` binary reads:
//
//   {
//     "config": { "style": "PopRock", "seed": 42 },
//     "sections": [ { "type": "Verse", "bars": 8 }, ... ]
//   }

use crate::arc_template::SongForm;
use crate::error::PlanError;
use crate::section::{Section, SectionType, layout};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Free-form style or groove name; the category is inferred from it.
    pub style: String,
    pub seed: u64,
    /// Overrides form inference when set.
    pub form: Option<SongForm>,
    /// Constraint policy by name; `None` uses the category default.
    pub policy: Option<String>,
    /// Bars per phrase; `None` infers it from each section's length.
    pub phrase_length: Option<usize>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        PlanConfig {
            style: "Pop".to_string(),
            seed: 0,
            form: None,
            policy: None,
            phrase_length: None,
        }
    }
}

impl PlanConfig {
    pub fn new(style: &str, seed: u64) -> Self {
        PlanConfig {
            style: style.to_string(),
            seed,
            ..Default::default()
        }
    }

    pub fn with_form(mut self, form: SongForm) -> Self {
        self.form = Some(form);
        self
    }

    pub fn with_policy(mut self, policy: &str) -> Self {
        self.policy = Some(policy.to_string());
        self
    }

    pub fn with_phrase_length(mut self, bars: usize) -> Self {
        self.phrase_length = Some(bars);
        self
    }

    pub fn load(path: &Path) -> Result<Self, PlanError> {
        Ok(serde_json::from_str(&read(path)?)?)
    }
}

/// One entry of a song file's section list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub bars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongFile {
    #[serde(default)]
    pub config: PlanConfig,
    pub sections: Vec<SectionSpec>,
}

impl SongFile {
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        Self::parse(&read(path)?)
    }

    pub fn parse(json: &str) -> Result<Self, PlanError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Lay the section list out into indexed sections with start bars.
    pub fn sections(&self) -> Result<Vec<Section>, PlanError> {
        let parts: Vec<(SectionType, usize)> = self
            .sections
            .iter()
            .map(|s| (s.section_type, s.bars))
            .collect();
        layout(&parts)
    }
}

fn read(path: &Path) -> Result<String, PlanError> {
    std::fs::read_to_string(path).map_err(|source| PlanError::Io {
        path: path.to_path_buf(),
        source,
    })
}
