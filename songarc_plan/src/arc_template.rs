// Energy arc templates: declarative per-section energy targets.
//
// A template maps each section type to a default energy and optionally pins
// specific instances (e.g. "the third chorus") to their own target, with
// optional phrase-level offsets. Templates are grouped by a coarse style
// category and tagged with the song forms they suit.
//
// `EnergyArcLibrary::standard()` is the built-in catalog, constructed once on
// first use. Nothing mutates a catalog after construction; `arc.rs` selects
// one template per song and `constraint.rs`/`policy.rs` adjust its targets.
//
// Named preset constructors (`pop_classic_build()`, `rock_anthem()`, ...)
// produce the catalog entries by tuning the same parameter set.

use crate::error::PlanError;
use crate::section::{Section, SectionType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Phrase offsets are small nudges, never a second energy curve.
pub const PHRASE_OFFSET_LIMIT: f64 = 0.05;

/// Energy used when a template defines neither an instance target nor a
/// type default.
pub const FALLBACK_ENERGY: f64 = 0.5;

/// Coarse style family used to pick templates and the default policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StyleCategory {
    Pop,
    Rock,
    Edm,
    Jazz,
    Country,
}

impl StyleCategory {
    /// Infer the category from a free-form style or groove name.
    ///
    /// Rock keywords are checked before Pop, so "PopRock" reads as Rock.
    pub fn infer(style_name: &str) -> StyleCategory {
        let lower = style_name.to_lowercase();
        let has = |keys: &[&str]| keys.iter().any(|k| lower.contains(k));
        if has(&["rock", "metal", "punk", "grunge"]) {
            StyleCategory::Rock
        } else if has(&["edm", "dance", "house", "techno", "trance", "dubstep", "electro"]) {
            StyleCategory::Edm
        } else if has(&["jazz", "swing", "bossa", "bebop", "blues"]) {
            StyleCategory::Jazz
        } else if has(&["country", "folk", "bluegrass", "americana"]) {
            StyleCategory::Country
        } else {
            StyleCategory::Pop
        }
    }
}

/// Structural shape of the song, used to narrow the template candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SongForm {
    VerseChorusBridge,
    VerseChorus,
    Strophic,
    Through,
}

impl SongForm {
    pub fn infer(sections: &[Section]) -> SongForm {
        let has = |t: SectionType| sections.iter().any(|s| s.section_type == t);
        match (
            has(SectionType::Verse),
            has(SectionType::Chorus),
            has(SectionType::Bridge),
        ) {
            (true, true, true) => SongForm::VerseChorusBridge,
            (true, true, false) => SongForm::VerseChorus,
            (true, false, _) => SongForm::Strophic,
            _ => SongForm::Through,
        }
    }
}

/// Per-position energy nudges applied on top of the micro arc.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhraseOffsets {
    pub start: f64,
    pub middle: f64,
    pub peak: f64,
    pub cadence: f64,
}

impl PhraseOffsets {
    /// Construct with every offset clamped to ±`PHRASE_OFFSET_LIMIT`.
    pub fn new(start: f64, middle: f64, peak: f64, cadence: f64) -> Self {
        let c = |v: f64| v.clamp(-PHRASE_OFFSET_LIMIT, PHRASE_OFFSET_LIMIT);
        PhraseOffsets {
            start: c(start),
            middle: c(middle),
            peak: c(peak),
            cadence: c(cadence),
        }
    }
}

/// Unconstrained energy target for one section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergySectionTarget {
    pub energy: f64,
    pub section_type: SectionType,
    pub type_local_index: usize,
    pub phrase_offsets: Option<PhraseOffsets>,
}

impl EnergySectionTarget {
    /// A target with no phrase offsets. `energy` is clamped to [0, 1].
    pub fn uniform(section_type: SectionType, type_local_index: usize, energy: f64) -> Self {
        EnergySectionTarget {
            energy: energy.clamp(0.0, 1.0),
            section_type,
            type_local_index,
            phrase_offsets: None,
        }
    }
}

/// A named energy shape for a whole song.
#[derive(Debug, Clone)]
pub struct EnergyArcTemplate {
    pub name: String,
    pub description: String,
    /// Forms this template is written for. Empty means "any form".
    pub forms: Vec<SongForm>,
    pub default_energy_by_type: BTreeMap<SectionType, f64>,
    pub per_instance_targets: BTreeMap<(SectionType, usize), EnergySectionTarget>,
}

impl EnergyArcTemplate {
    pub fn new(name: &str, description: &str) -> Self {
        EnergyArcTemplate {
            name: name.to_string(),
            description: description.to_string(),
            forms: Vec::new(),
            default_energy_by_type: BTreeMap::new(),
            per_instance_targets: BTreeMap::new(),
        }
    }

    pub fn for_forms(mut self, forms: &[SongForm]) -> Self {
        self.forms = forms.to_vec();
        self
    }

    pub fn with_default(mut self, section_type: SectionType, energy: f64) -> Self {
        self.default_energy_by_type
            .insert(section_type, energy.clamp(0.0, 1.0));
        self
    }

    pub fn with_target(mut self, section_type: SectionType, index: usize, energy: f64) -> Self {
        self.per_instance_targets.insert(
            (section_type, index),
            EnergySectionTarget::uniform(section_type, index, energy),
        );
        self
    }

    /// Attach phrase offsets to an instance target, creating the target from
    /// the type default if the instance was not pinned yet.
    pub fn with_phrase_offsets(
        mut self,
        section_type: SectionType,
        index: usize,
        offsets: PhraseOffsets,
    ) -> Self {
        let default = self.default_energy(section_type);
        let entry = self
            .per_instance_targets
            .entry((section_type, index))
            .or_insert_with(|| EnergySectionTarget::uniform(section_type, index, default));
        entry.phrase_offsets = Some(offsets);
        self
    }

    pub fn suits(&self, form: SongForm) -> bool {
        self.forms.is_empty() || self.forms.contains(&form)
    }

    fn default_energy(&self, section_type: SectionType) -> f64 {
        self.default_energy_by_type
            .get(&section_type)
            .copied()
            .unwrap_or(FALLBACK_ENERGY)
    }

    /// Target for the `type_local_index`-th section of `section_type`:
    /// the instance target if pinned, else the type default, else 0.5.
    pub fn target(&self, section_type: SectionType, type_local_index: usize) -> EnergySectionTarget {
        if let Some(target) = self
            .per_instance_targets
            .get(&(section_type, type_local_index))
        {
            return *target;
        }
        EnergySectionTarget::uniform(
            section_type,
            type_local_index,
            self.default_energy(section_type),
        )
    }

    // ── Presets ──

    fn with_common_defaults(self) -> Self {
        self.with_default(SectionType::Intro, 0.35)
            .with_default(SectionType::Verse, 0.45)
            .with_default(SectionType::PreChorus, 0.58)
            .with_default(SectionType::Chorus, 0.75)
            .with_default(SectionType::PostChorus, 0.62)
            .with_default(SectionType::Bridge, 0.55)
            .with_default(SectionType::Solo, 0.7)
            .with_default(SectionType::Breakdown, 0.35)
            .with_default(SectionType::Outro, 0.3)
    }

    /// Steady verse/chorus climb with a biggest-last chorus.
    pub fn pop_classic_build() -> Self {
        EnergyArcTemplate::new(
            "PopClassicBuild",
            "Verses climb gently, each chorus lifts over the last",
        )
        .for_forms(&[SongForm::VerseChorusBridge, SongForm::VerseChorus])
        .with_common_defaults()
        .with_target(SectionType::Verse, 0, 0.42)
        .with_target(SectionType::Verse, 1, 0.48)
        .with_target(SectionType::Verse, 2, 0.52)
        .with_target(SectionType::Chorus, 0, 0.72)
        .with_target(SectionType::Chorus, 1, 0.78)
        .with_target(SectionType::Chorus, 2, 0.86)
        .with_phrase_offsets(
            SectionType::Chorus,
            2,
            PhraseOffsets::new(0.0, 0.01, 0.03, -0.01),
        )
    }

    /// Low start that takes the whole song to arrive.
    pub fn pop_slow_burn() -> Self {
        EnergyArcTemplate::new("PopSlowBurn", "Sparse opening, long gradual climb")
            .for_forms(&[SongForm::VerseChorus, SongForm::Strophic, SongForm::Through])
            .with_common_defaults()
            .with_default(SectionType::Intro, 0.25)
            .with_target(SectionType::Verse, 0, 0.35)
            .with_target(SectionType::Verse, 1, 0.42)
            .with_target(SectionType::Verse, 2, 0.5)
            .with_target(SectionType::Chorus, 0, 0.65)
            .with_target(SectionType::Chorus, 1, 0.74)
            .with_target(SectionType::Chorus, 2, 0.84)
    }

    /// Bridge drops out before a lifted last chorus.
    pub fn pop_late_lift() -> Self {
        EnergyArcTemplate::new("PopLateLift", "Quiet bridge, key-change-style last chorus")
            .for_forms(&[SongForm::VerseChorusBridge])
            .with_common_defaults()
            .with_target(SectionType::Verse, 0, 0.4)
            .with_target(SectionType::Verse, 1, 0.46)
            .with_target(SectionType::Verse, 2, 0.5)
            .with_target(SectionType::Chorus, 0, 0.7)
            .with_target(SectionType::Chorus, 1, 0.76)
            .with_target(SectionType::Chorus, 2, 0.9)
            .with_target(SectionType::Bridge, 0, 0.45)
            .with_phrase_offsets(
                SectionType::Chorus,
                2,
                PhraseOffsets::new(0.01, 0.01, 0.04, -0.02),
            )
    }

    pub fn rock_driving() -> Self {
        EnergyArcTemplate::new("RockDriving", "High floor, choruses push to the top")
            .for_forms(&[SongForm::VerseChorusBridge, SongForm::VerseChorus])
            .with_common_defaults()
            .with_default(SectionType::Intro, 0.5)
            .with_default(SectionType::Solo, 0.82)
            .with_default(SectionType::Outro, 0.5)
            .with_target(SectionType::Verse, 0, 0.55)
            .with_target(SectionType::Verse, 1, 0.6)
            .with_target(SectionType::Verse, 2, 0.62)
            .with_target(SectionType::Chorus, 0, 0.8)
            .with_target(SectionType::Chorus, 1, 0.85)
            .with_target(SectionType::Chorus, 2, 0.92)
            .with_target(SectionType::Bridge, 0, 0.6)
    }

    pub fn rock_anthem() -> Self {
        EnergyArcTemplate::new("RockAnthem", "Restrained verses, huge final chorus")
            .for_forms(&[
                SongForm::VerseChorusBridge,
                SongForm::VerseChorus,
                SongForm::Through,
            ])
            .with_common_defaults()
            .with_default(SectionType::Intro, 0.4)
            .with_default(SectionType::Solo, 0.85)
            .with_target(SectionType::Verse, 0, 0.5)
            .with_target(SectionType::Verse, 1, 0.55)
            .with_target(SectionType::Verse, 2, 0.6)
            .with_target(SectionType::Chorus, 0, 0.78)
            .with_target(SectionType::Chorus, 1, 0.84)
            .with_target(SectionType::Chorus, 2, 0.95)
            .with_target(SectionType::Bridge, 0, 0.45)
            .with_phrase_offsets(
                SectionType::Chorus,
                2,
                PhraseOffsets::new(0.02, 0.02, 0.05, 0.0),
            )
    }

    pub fn edm_build_drop() -> Self {
        EnergyArcTemplate::new("EdmBuildDrop", "Builds into full drops, breakdowns between")
            .with_common_defaults()
            .with_default(SectionType::Intro, 0.3)
            .with_default(SectionType::PreChorus, 0.7)
            .with_default(SectionType::Chorus, 0.92)
            .with_default(SectionType::Breakdown, 0.25)
            .with_default(SectionType::Bridge, 0.35)
            .with_target(SectionType::Verse, 0, 0.4)
            .with_target(SectionType::Verse, 1, 0.45)
            .with_target(SectionType::Verse, 2, 0.5)
            .with_target(SectionType::Chorus, 0, 0.9)
            .with_target(SectionType::Chorus, 1, 0.95)
            .with_target(SectionType::Chorus, 2, 1.0)
    }

    pub fn edm_progressive() -> Self {
        EnergyArcTemplate::new("EdmProgressive", "Long layered build without hard breakdowns")
            .with_common_defaults()
            .with_default(SectionType::PreChorus, 0.68)
            .with_default(SectionType::Breakdown, 0.4)
            .with_target(SectionType::Verse, 0, 0.4)
            .with_target(SectionType::Verse, 1, 0.5)
            .with_target(SectionType::Verse, 2, 0.55)
            .with_target(SectionType::Chorus, 0, 0.8)
            .with_target(SectionType::Chorus, 1, 0.88)
            .with_target(SectionType::Chorus, 2, 0.95)
    }

    pub fn jazz_head_solos() -> Self {
        EnergyArcTemplate::new("JazzHeadSolos", "Head in, solos climb, head out")
            .with_common_defaults()
            .with_default(SectionType::Intro, 0.3)
            .with_default(SectionType::Chorus, 0.55)
            .with_default(SectionType::Bridge, 0.5)
            .with_target(SectionType::Solo, 0, 0.65)
            .with_target(SectionType::Solo, 1, 0.75)
            .with_target(SectionType::Solo, 2, 0.8)
    }

    pub fn jazz_ballad() -> Self {
        EnergyArcTemplate::new("JazzBallad", "Low, intimate dynamics throughout")
            .with_default(SectionType::Intro, 0.2)
            .with_default(SectionType::Verse, 0.3)
            .with_default(SectionType::PreChorus, 0.35)
            .with_default(SectionType::Chorus, 0.45)
            .with_default(SectionType::PostChorus, 0.35)
            .with_default(SectionType::Bridge, 0.4)
            .with_default(SectionType::Solo, 0.5)
            .with_default(SectionType::Breakdown, 0.2)
            .with_default(SectionType::Outro, 0.2)
    }

    pub fn country_story() -> Self {
        EnergyArcTemplate::new("CountryStory", "Verses carry the story, choruses open up")
            .with_common_defaults()
            .with_default(SectionType::Solo, 0.6)
            .with_target(SectionType::Verse, 0, 0.4)
            .with_target(SectionType::Verse, 1, 0.45)
            .with_target(SectionType::Verse, 2, 0.5)
            .with_target(SectionType::Chorus, 0, 0.65)
            .with_target(SectionType::Chorus, 1, 0.7)
            .with_target(SectionType::Chorus, 2, 0.8)
            .with_target(SectionType::Bridge, 0, 0.5)
    }

    /// Type defaults only; the universal fallback.
    pub fn generic_rise() -> Self {
        EnergyArcTemplate::new("GenericRise", "Type defaults with no per-instance shaping")
            .with_common_defaults()
    }
}

/// Catalog of templates by style category, plus a generic fallback list.
#[derive(Debug, Clone)]
pub struct EnergyArcLibrary {
    by_category: BTreeMap<StyleCategory, Vec<EnergyArcTemplate>>,
    generic: Vec<EnergyArcTemplate>,
}

static STANDARD_LIBRARY: LazyLock<EnergyArcLibrary> = LazyLock::new(EnergyArcLibrary::build_standard);

impl EnergyArcLibrary {
    pub fn new(
        by_category: BTreeMap<StyleCategory, Vec<EnergyArcTemplate>>,
        generic: Vec<EnergyArcTemplate>,
    ) -> Self {
        EnergyArcLibrary {
            by_category,
            generic,
        }
    }

    /// The built-in catalog.
    pub fn standard() -> &'static EnergyArcLibrary {
        &STANDARD_LIBRARY
    }

    fn build_standard() -> Self {
        let mut by_category = BTreeMap::new();
        by_category.insert(
            StyleCategory::Pop,
            vec![
                EnergyArcTemplate::pop_classic_build(),
                EnergyArcTemplate::pop_slow_burn(),
                EnergyArcTemplate::pop_late_lift(),
            ],
        );
        by_category.insert(
            StyleCategory::Rock,
            vec![
                EnergyArcTemplate::rock_driving(),
                EnergyArcTemplate::rock_anthem(),
            ],
        );
        by_category.insert(
            StyleCategory::Edm,
            vec![
                EnergyArcTemplate::edm_build_drop(),
                EnergyArcTemplate::edm_progressive(),
            ],
        );
        by_category.insert(
            StyleCategory::Jazz,
            vec![
                EnergyArcTemplate::jazz_head_solos(),
                EnergyArcTemplate::jazz_ballad(),
            ],
        );
        by_category.insert(StyleCategory::Country, vec![EnergyArcTemplate::country_story()]);
        EnergyArcLibrary::new(by_category, vec![EnergyArcTemplate::generic_rise()])
    }

    /// Candidate templates for a style and form.
    ///
    /// Narrows the style's list to templates suiting `form`; if none suit,
    /// the whole style list is used; if the style has none, the generic list.
    /// An empty generic list is the only failure.
    pub fn candidates(
        &self,
        category: StyleCategory,
        form: SongForm,
    ) -> Result<Vec<&EnergyArcTemplate>, PlanError> {
        let style = self
            .by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let suited: Vec<&EnergyArcTemplate> = style.iter().filter(|t| t.suits(form)).collect();
        if !suited.is_empty() {
            return Ok(suited);
        }
        if !style.is_empty() {
            return Ok(style.iter().collect());
        }
        if self.generic.is_empty() {
            return Err(PlanError::NoTemplates);
        }
        Ok(self.generic.iter().collect())
    }
}
