// Energy arc: template selection plus constraint resolution for one song.
//
// `EnergyArc::create` infers the style category and song form, picks one
// template from the candidates with a seeded draw, proposes a per-section
// energy from it, and resolves those proposals through the style's
// constraint policy. Resolution walks sections strictly left to right and
// records each finalized energy before building the next section's context;
// rules may consult earlier finalized energies, so the order is part of the
// result, not an implementation detail.
//
// The resolved arc is immutable. `tension.rs` and `variation.rs` read it.

use crate::arc_template::{
    EnergyArcLibrary, EnergyArcTemplate, EnergySectionTarget, SongForm, StyleCategory,
};
use crate::constraint::EnergyConstraintContext;
use crate::error::{PlanError, check_section};
use crate::policy::{EnergyConstraintPolicy, EnergyConstraintPolicyLibrary, PolicyOutcome};
use crate::section::{Section, type_local_index, validate_sections};
use songarc_prng::PlanRng;

/// Resolved energy plan for a song.
#[derive(Debug, Clone)]
pub struct EnergyArc {
    sections: Vec<Section>,
    template: EnergyArcTemplate,
    category: StyleCategory,
    form: SongForm,
    policy_name: String,
    outcomes: Vec<PolicyOutcome>,
}

impl EnergyArc {
    /// Build an arc using the standard template catalog and the style's
    /// default policy.
    pub fn create(
        sections: &[Section],
        style_name: &str,
        seed: u64,
        form: Option<SongForm>,
    ) -> Result<EnergyArc, PlanError> {
        let category = StyleCategory::infer(style_name);
        let policy = EnergyConstraintPolicyLibrary::standard().for_category(category)?;
        Self::create_with(
            EnergyArcLibrary::standard(),
            sections,
            style_name,
            seed,
            form,
            policy,
        )
    }

    /// Build an arc with an explicit catalog and policy.
    pub fn create_with(
        library: &EnergyArcLibrary,
        sections: &[Section],
        style_name: &str,
        seed: u64,
        form: Option<SongForm>,
        policy: &EnergyConstraintPolicy,
    ) -> Result<EnergyArc, PlanError> {
        validate_sections(sections)?;
        let category = StyleCategory::infer(style_name);
        let form = form.unwrap_or_else(|| SongForm::infer(sections));
        let candidates = library.candidates(category, form)?;
        let pick = PlanRng::new(seed).range_usize(0, candidates.len());
        let template = candidates[pick].clone();

        tracing::debug!(
            style = style_name,
            ?category,
            ?form,
            template = %template.name,
            candidates = candidates.len(),
            "selected energy arc template"
        );

        let outcomes = resolve(sections, &template, policy);
        Ok(EnergyArc {
            sections: sections.to_vec(),
            template,
            category,
            form,
            policy_name: policy.name.clone(),
            outcomes,
        })
    }

    /// Template target for a section, before any constraint adjustment.
    pub fn target_for_section(&self, section: &Section, type_local_index: usize) -> EnergySectionTarget {
        self.template.target(section.section_type, type_local_index)
    }

    /// Template target for the section at `index`.
    pub fn target(&self, index: usize) -> Result<EnergySectionTarget, PlanError> {
        check_section(index, self.sections.len())?;
        Ok(self.target_for_section(
            &self.sections[index],
            type_local_index(&self.sections, index),
        ))
    }

    /// Resolved (post-constraint) energy of a section.
    pub fn energy(&self, index: usize) -> Result<f64, PlanError> {
        check_section(index, self.sections.len())?;
        Ok(self.outcomes[index].energy)
    }

    pub fn energies(&self) -> Vec<f64> {
        self.outcomes.iter().map(|o| o.energy).collect()
    }

    pub fn outcome(&self, index: usize) -> Result<&PolicyOutcome, PlanError> {
        check_section(index, self.sections.len())?;
        Ok(&self.outcomes[index])
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn template(&self) -> &EnergyArcTemplate {
        &self.template
    }

    pub fn category(&self) -> StyleCategory {
        self.category
    }

    pub fn form(&self) -> SongForm {
        self.form
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }
}

/// Resolve template proposals into finalized energies, one section at a time.
fn resolve(
    sections: &[Section],
    template: &EnergyArcTemplate,
    policy: &EnergyConstraintPolicy,
) -> Vec<PolicyOutcome> {
    let proposed: Vec<f64> = (0..sections.len())
        .map(|i| {
            template
                .target(sections[i].section_type, type_local_index(sections, i))
                .energy
        })
        .collect();

    let mut finalized: Vec<f64> = Vec::with_capacity(sections.len());
    let mut outcomes = Vec::with_capacity(sections.len());
    for i in 0..sections.len() {
        let outcome = {
            let ctx = EnergyConstraintContext::for_section(sections, i, &proposed, &finalized);
            policy.apply(&ctx)
        };
        tracing::debug!(
            section = i,
            section_type = %sections[i].section_type,
            proposed = proposed[i],
            energy = outcome.energy,
            "resolved section energy"
        );
        finalized.push(outcome.energy);
        outcomes.push(outcome);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{SectionType::*, layout};
    use std::collections::BTreeMap;

    fn pop_song() -> Vec<Section> {
        layout(&[
            (Intro, 4),
            (Verse, 8),
            (Chorus, 8),
            (Verse, 8),
            (Chorus, 8),
            (Bridge, 8),
            (Chorus, 8),
            (Outro, 4),
        ])
        .unwrap()
    }

    #[test]
    fn test_same_seed_same_template() {
        let sections = pop_song();
        for seed in [0, 1, 42, 9_999] {
            let a = EnergyArc::create(&sections, "Pop", seed, None).unwrap();
            let b = EnergyArc::create(&sections, "Pop", seed, None).unwrap();
            assert_eq!(a.template().name, b.template().name);
            assert_eq!(a.energies(), b.energies());
        }
    }

    #[test]
    fn test_template_matches_category_and_form() {
        let sections = pop_song();
        let arc = EnergyArc::create(&sections, "Grunge", 7, None).unwrap();
        assert_eq!(arc.category(), StyleCategory::Rock);
        assert_eq!(arc.form(), SongForm::VerseChorusBridge);
        assert!(arc.template().name.starts_with("Rock"));
        assert_eq!(arc.policy_name(), "PopRock");
    }

    #[test]
    fn test_explicit_form_overrides_inference() {
        let sections = pop_song();
        let arc = EnergyArc::create(&sections, "Pop", 3, Some(SongForm::Strophic)).unwrap();
        assert_eq!(arc.form(), SongForm::Strophic);
        assert_eq!(arc.template().name, "PopSlowBurn");
    }

    #[test]
    fn test_energies_in_unit_range() {
        let sections = pop_song();
        for style in ["Pop", "Rock", "EDM", "Jazz", "Country"] {
            for seed in 0..20 {
                let arc = EnergyArc::create(&sections, style, seed, None).unwrap();
                for e in arc.energies() {
                    assert!((0.0..=1.0).contains(&e), "{style} {seed}: {e}");
                }
            }
        }
    }

    #[test]
    fn test_target_lookup_uses_type_local_index() {
        let sections = pop_song();
        let arc = EnergyArc::create(&sections, "Pop", 0, None).unwrap();
        let second_chorus = arc.target(4).unwrap();
        assert_eq!(second_chorus.section_type, Chorus);
        assert_eq!(second_chorus.type_local_index, 1);
        assert!(matches!(
            arc.energy(99),
            Err(PlanError::SectionIndexOutOfRange { index: 99, .. })
        ));
    }

    #[test]
    fn test_empty_policy_keeps_template_energies() {
        let sections = pop_song();
        let arc = EnergyArc::create_with(
            EnergyArcLibrary::standard(),
            &sections,
            "Pop",
            5,
            None,
            &EnergyConstraintPolicy::empty(),
        )
        .unwrap();
        for i in 0..sections.len() {
            assert_eq!(arc.energy(i).unwrap(), arc.target(i).unwrap().energy);
        }
    }

    #[test]
    fn test_resolution_order_feeds_later_rules() {
        // Template proposes falling verses; each resolved verse must see the
        // previous verse's *finalized* energy, so the floor compounds.
        let template = EnergyArcTemplate::new("Falling", "")
            .with_target(Verse, 0, 0.6)
            .with_target(Verse, 1, 0.3)
            .with_target(Verse, 2, 0.2);
        let mut by_category = BTreeMap::new();
        by_category.insert(StyleCategory::Pop, vec![template]);
        let library = EnergyArcLibrary::new(by_category, Vec::new());
        let sections = layout(&[(Verse, 8), (Verse, 8), (Verse, 8)]).unwrap();
        let policy = EnergyConstraintPolicy::pop_rock();
        let arc = EnergyArc::create_with(&library, &sections, "Pop", 1, None, &policy).unwrap();
        let e = arc.energies();
        assert!((e[1] - 0.62).abs() < 1e-9);
        assert!((e[2] - 0.64).abs() < 1e-9);
    }

    #[test]
    fn test_empty_song_is_rejected() {
        assert!(matches!(
            EnergyArc::create(&[], "Pop", 0, None),
            Err(PlanError::EmptySong)
        ));
    }
}
