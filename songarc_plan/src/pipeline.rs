// Whole-song planning pipeline and query facade.
//
// `SongPlan::build` runs the stages in a fixed order, each reading only the
// frozen output of the ones before it:
//
//   arc selection + constraint resolution (arc.rs)
//     → tension derivation (tension.rs)
//     → per-section energy micro arcs (phrase.rs)
//     → variation plans (variation.rs)
//
// Each stage seeds its own PRNG from the config seed, so adding a draw to one
// stage never perturbs another. The finished plan is immutable; generators
// query it through the accessors below and the `TensionQuery` impl.

use crate::arc::EnergyArc;
use crate::arc_template::{EnergyArcLibrary, StyleCategory};
use crate::config::PlanConfig;
use crate::error::{PlanError, check_section};
use crate::hooks::{TensionHooks, TensionHooksBuilder};
use crate::phrase::SectionEnergyMicroArc;
use crate::policy::EnergyConstraintPolicyLibrary;
use crate::section::Section;
use crate::tension::TensionPlan;
use crate::variation::{
    Role, RoleProfile, SectionVariationPlan, VariationParameterAdapter, VariationPlanner,
};
use songarc_prng::mix_seed;

#[derive(Debug, Clone)]
pub struct SongPlan {
    config: PlanConfig,
    arc: EnergyArc,
    tension: TensionPlan,
    micro_arcs: Vec<SectionEnergyMicroArc>,
    variations: Vec<SectionVariationPlan>,
}

impl SongPlan {
    pub fn build(sections: &[Section], config: &PlanConfig) -> Result<SongPlan, PlanError> {
        let policies = EnergyConstraintPolicyLibrary::standard();
        let policy = match &config.policy {
            Some(name) => policies.get(name)?,
            None => policies.for_category(StyleCategory::infer(&config.style))?,
        };
        let arc = EnergyArc::create_with(
            EnergyArcLibrary::standard(),
            sections,
            &config.style,
            config.seed,
            config.form,
            policy,
        )?;

        let tension =
            TensionPlan::derive_with_phrase_length(&arc, config.seed, config.phrase_length);

        let mut micro_arcs = Vec::with_capacity(arc.section_count());
        for (i, section) in arc.sections().iter().enumerate() {
            let target = arc.target(i)?;
            micro_arcs.push(SectionEnergyMicroArc::build(
                section.bar_count,
                arc.energy(i)?,
                config.phrase_length,
                target.phrase_offsets.as_ref(),
                mix_seed(config.seed, i),
            ));
        }

        let variations = VariationPlanner::plan(&arc, &config.style, config.seed)?;

        tracing::info!(
            style = %config.style,
            seed = config.seed,
            sections = arc.section_count(),
            template = %arc.template().name,
            policy = arc.policy_name(),
            "song plan built"
        );

        Ok(SongPlan {
            config: config.clone(),
            arc,
            tension,
            micro_arcs,
            variations,
        })
    }

    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    pub fn arc(&self) -> &EnergyArc {
        &self.arc
    }

    pub fn tension(&self) -> &TensionPlan {
        &self.tension
    }

    pub fn sections(&self) -> &[Section] {
        self.arc.sections()
    }

    pub fn section_count(&self) -> usize {
        self.arc.section_count()
    }

    pub fn energy_micro_arc(&self, section: usize) -> Result<&SectionEnergyMicroArc, PlanError> {
        check_section(section, self.micro_arcs.len())?;
        Ok(&self.micro_arcs[section])
    }

    /// Section energy plus the micro-arc delta for one bar, clamped to [0, 1].
    pub fn bar_energy(&self, section: usize, bar: usize) -> Result<f64, PlanError> {
        let micro = self.energy_micro_arc(section)?;
        let delta = micro.delta(bar).ok_or(PlanError::BarIndexOutOfRange {
            section,
            bar,
            bar_count: micro.energy_delta_by_bar.len(),
        })?;
        Ok((self.arc.energy(section)? + delta).clamp(0.0, 1.0))
    }

    pub fn variation_plan(&self, section: usize) -> Result<&SectionVariationPlan, PlanError> {
        check_section(section, self.variations.len())?;
        Ok(&self.variations[section])
    }

    pub fn variation_plans(&self) -> &[SectionVariationPlan] {
        &self.variations
    }

    /// Energy-derived profile for a role with the section's variation delta
    /// applied.
    pub fn role_profile(&self, section: usize, role: Role) -> Result<RoleProfile, PlanError> {
        let base = RoleProfile::from_energy(role, self.arc.energy(section)?);
        let plan = self.variation_plan(section)?;
        Ok(VariationParameterAdapter::apply_variation(
            &base,
            plan.role_delta(role),
        ))
    }

    pub fn tension_hooks(
        &self,
        section: usize,
        bar: usize,
        ramp_intensity: f64,
    ) -> Result<TensionHooks, PlanError> {
        TensionHooksBuilder::for_bar(&self.tension, section, bar, ramp_intensity)
    }
}
