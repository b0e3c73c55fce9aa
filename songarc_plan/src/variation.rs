// Section reuse and variation planning (A / A′ / B mapping).
//
// For every section the planner decides whether it reuses an earlier
// section as its base reference and how far it strays from it:
// - the first occurrence of a type is fresh material ("A");
// - bridges and solos may instead be marked contrasting ("B"), decided by a
//   stable hash of (seed, style, index, type) against a 40% / 60% threshold
//   for first / later occurrences;
// - any other repeat reuses the EARLIEST earlier section of its type
//   ("Aprime"), never the most recent one.
//
// Variation is expressed as per-role deltas on top of the energy-derived role
// profile. Deltas are clamped tightly when built (`RoleVariationDelta`) and
// again, more loosely, when applied (`VariationParameterAdapter`), leaving
// headroom for deltas composed from several sources.

use crate::arc::EnergyArc;
use crate::error::{PlanError, check_section};
use crate::section::{Section, SectionType, type_local_index};
use serde::{Deserialize, Serialize};
use songarc_prng::StableHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Contrast probability (percent) for the first bridge/solo of a song.
const FIRST_CONTRAST_PERCENT: u8 = 40;
/// Contrast probability (percent) for later bridges/solos.
const REPEAT_CONTRAST_PERCENT: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariationTag {
    A,
    APrime,
    B,
}

impl VariationTag {
    pub fn as_str(self) -> &'static str {
        match self {
            VariationTag::A => "A",
            VariationTag::APrime => "Aprime",
            VariationTag::B => "B",
        }
    }
}

impl fmt::Display for VariationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instrument roles that receive variation deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Bass,
    Comp,
    Keys,
    Pads,
    Drums,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Bass, Role::Comp, Role::Keys, Role::Pads, Role::Drums];
}

// ── Base reference selection ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseReferenceDecision {
    pub base: Option<usize>,
    pub tag: VariationTag,
}

pub struct BaseReferenceSelectorRules;

impl BaseReferenceSelectorRules {
    pub fn select_base_reference(
        index: usize,
        sections: &[Section],
        style_name: &str,
        seed: u64,
    ) -> Result<BaseReferenceDecision, PlanError> {
        check_section(index, sections.len())?;
        let section_type = sections[index].section_type;
        let occurrence = type_local_index(sections, index);

        if matches!(section_type, SectionType::Bridge | SectionType::Solo) {
            let threshold = if occurrence == 0 {
                FIRST_CONTRAST_PERCENT
            } else {
                REPEAT_CONTRAST_PERCENT
            };
            if contrast_roll(seed, style_name, index, section_type) < threshold {
                return Ok(BaseReferenceDecision {
                    base: None,
                    tag: VariationTag::B,
                });
            }
        }

        if occurrence == 0 {
            return Ok(BaseReferenceDecision {
                base: None,
                tag: VariationTag::A,
            });
        }

        let earliest = sections[..index]
            .iter()
            .position(|s| s.section_type == section_type);
        match earliest {
            Some(base) => {
                Self::validate_base_reference(index, base)?;
                Ok(BaseReferenceDecision {
                    base: Some(base),
                    tag: VariationTag::APrime,
                })
            }
            None => Ok(BaseReferenceDecision {
                base: None,
                tag: VariationTag::A,
            }),
        }
    }

    /// A base reference must point strictly backwards.
    pub fn validate_base_reference(current: usize, base: usize) -> Result<(), PlanError> {
        if base < current {
            Ok(())
        } else {
            Err(PlanError::InvalidBaseReference { current, base })
        }
    }
}

/// Stable 0..100 roll for the contrast decision.
fn contrast_roll(seed: u64, style_name: &str, index: usize, section_type: SectionType) -> u8 {
    let mut hasher = StableHasher::new();
    hasher
        .write_u64(seed)
        .write_str(style_name)
        .write_u64(index as u64)
        .write_u64(section_type.ordinal());
    hasher.percent()
}

// ── Deltas and profiles ──

/// Relative change for one role. Absent fields leave the base untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RoleVariationDelta {
    /// [0.5, 2.0], multiplicative.
    pub density_multiplier: Option<f64>,
    /// [-30, 30], additive.
    pub velocity_bias: Option<i32>,
    /// [-24, 24] semitones, additive.
    pub register_lift_semitones: Option<i32>,
    /// [-1, 1], additive.
    pub busy_probability: Option<f64>,
}

impl RoleVariationDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_density(mut self, multiplier: f64) -> Self {
        self.density_multiplier = Some(multiplier.clamp(0.5, 2.0));
        self
    }

    pub fn with_velocity(mut self, bias: i32) -> Self {
        self.velocity_bias = Some(bias.clamp(-30, 30));
        self
    }

    pub fn with_register(mut self, semitones: i32) -> Self {
        self.register_lift_semitones = Some(semitones.clamp(-24, 24));
        self
    }

    pub fn with_busy(mut self, delta: f64) -> Self {
        self.busy_probability = Some(delta.clamp(-1.0, 1.0));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.density_multiplier.is_none()
            && self.velocity_bias.is_none()
            && self.register_lift_semitones.is_none()
            && self.busy_probability.is_none()
    }
}

/// Absolute per-role generation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub density_multiplier: f64,
    pub velocity_bias: i32,
    pub register_lift_semitones: i32,
    pub busy_probability: f64,
}

impl RoleProfile {
    /// Baseline profile for a role at a given section energy.
    pub fn from_energy(role: Role, energy: f64) -> Self {
        let e = energy.clamp(0.0, 1.0);
        let register_lift_semitones = match role {
            Role::Comp | Role::Keys | Role::Pads if e > 0.7 => 12,
            _ => 0,
        };
        let (busy_floor, busy_span) = match role {
            Role::Drums => (0.2, 0.6),
            Role::Bass => (0.1, 0.5),
            Role::Comp => (0.15, 0.5),
            Role::Keys => (0.1, 0.4),
            Role::Pads => (0.05, 0.2),
        };
        RoleProfile {
            density_multiplier: 0.6 + e * 0.9,
            velocity_bias: ((e - 0.5) * 40.0).round() as i32,
            register_lift_semitones,
            busy_probability: busy_floor + busy_span * e,
        }
    }
}

pub struct VariationParameterAdapter;

impl VariationParameterAdapter {
    pub const DENSITY_RANGE: (f64, f64) = (0.5, 2.0);
    pub const VELOCITY_LIMIT: i32 = 127;
    pub const REGISTER_LIMIT: i32 = 48;

    /// Apply a delta to a base profile. `None` returns the base unchanged;
    /// otherwise density multiplies, the rest add, and every field is
    /// clamped to its application guardrail.
    pub fn apply_variation(base: &RoleProfile, delta: Option<&RoleVariationDelta>) -> RoleProfile {
        let Some(delta) = delta else {
            return *base;
        };
        let (dmin, dmax) = Self::DENSITY_RANGE;
        RoleProfile {
            density_multiplier: (base.density_multiplier * delta.density_multiplier.unwrap_or(1.0))
                .clamp(dmin, dmax),
            velocity_bias: (base.velocity_bias + delta.velocity_bias.unwrap_or(0))
                .clamp(-Self::VELOCITY_LIMIT, Self::VELOCITY_LIMIT),
            register_lift_semitones: (base.register_lift_semitones
                + delta.register_lift_semitones.unwrap_or(0))
            .clamp(-Self::REGISTER_LIMIT, Self::REGISTER_LIMIT),
            busy_probability: (base.busy_probability + delta.busy_probability.unwrap_or(0.0))
                .clamp(0.0, 1.0),
        }
    }
}

// ── Plans ──

/// How one section relates to earlier material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionVariationPlan {
    pub absolute_section_index: usize,
    pub base_reference_section_index: Option<usize>,
    pub variation_intensity: f64,
    pub role_deltas: BTreeMap<Role, RoleVariationDelta>,
    pub tags: BTreeSet<String>,
}

impl SectionVariationPlan {
    /// Fails if `base` does not point strictly backwards.
    pub fn new(
        absolute_section_index: usize,
        base: Option<usize>,
        variation_intensity: f64,
        tag: VariationTag,
    ) -> Result<Self, PlanError> {
        if let Some(base) = base {
            BaseReferenceSelectorRules::validate_base_reference(absolute_section_index, base)?;
        }
        Ok(SectionVariationPlan {
            absolute_section_index,
            base_reference_section_index: base,
            variation_intensity: variation_intensity.clamp(0.0, 1.0),
            role_deltas: BTreeMap::new(),
            tags: BTreeSet::from([tag.as_str().to_string()]),
        })
    }

    pub fn with_intensity(&self, intensity: f64) -> Self {
        SectionVariationPlan {
            variation_intensity: intensity.clamp(0.0, 1.0),
            ..self.clone()
        }
    }

    pub fn with_role_delta(&self, role: Role, delta: RoleVariationDelta) -> Self {
        let mut plan = self.clone();
        plan.role_deltas.insert(role, delta);
        plan
    }

    pub fn role_delta(&self, role: Role) -> Option<&RoleVariationDelta> {
        self.role_deltas.get(&role)
    }

    pub fn is_reuse(&self) -> bool {
        self.base_reference_section_index.is_some()
    }

    pub fn has_tag(&self, tag: VariationTag) -> bool {
        self.tags.contains(tag.as_str())
    }
}

pub struct VariationPlanner;

impl VariationPlanner {
    /// One plan per section of the arc, in section order.
    pub fn plan(
        arc: &EnergyArc,
        style_name: &str,
        seed: u64,
    ) -> Result<Vec<SectionVariationPlan>, PlanError> {
        let sections = arc.sections();
        let energies = arc.energies();
        let mut plans = Vec::with_capacity(sections.len());

        for i in 0..sections.len() {
            let decision =
                BaseReferenceSelectorRules::select_base_reference(i, sections, style_name, seed)?;
            let plan = match decision.tag {
                VariationTag::A => SectionVariationPlan::new(i, None, 0.0, VariationTag::A)?,
                VariationTag::APrime => {
                    let base = decision.base.ok_or(PlanError::InvalidBaseReference {
                        current: i,
                        base: i,
                    })?;
                    let repeat = type_local_index(sections, i);
                    aprime_plan(i, base, repeat, energies[i] - energies[base])?
                }
                VariationTag::B => {
                    let delta = i.checked_sub(1).map_or(0.0, |p| energies[i] - energies[p]);
                    contrast_plan(i, delta)?
                }
            };
            tracing::debug!(
                section = i,
                tag = %decision.tag,
                base = ?plan.base_reference_section_index,
                intensity = plan.variation_intensity,
                "planned section variation"
            );
            plans.push(plan);
        }
        Ok(plans)
    }
}

/// Reuse of `base`, drifting with repeat count and the energy gap.
fn aprime_plan(
    index: usize,
    base: usize,
    repeat: usize,
    energy_delta: f64,
) -> Result<SectionVariationPlan, PlanError> {
    let intensity =
        (0.15 + 0.10 * repeat.saturating_sub(1) as f64 + energy_delta.abs() * 0.8).clamp(0.0, 0.6);
    let mut plan = SectionVariationPlan::new(index, Some(base), intensity, VariationTag::APrime)?;
    for role in Role::ALL {
        let mut delta = RoleVariationDelta::new()
            .with_density(1.0 + energy_delta * 1.2 + intensity * 0.1)
            .with_velocity((energy_delta * 60.0 + intensity * 6.0).round() as i32);
        if matches!(role, Role::Keys | Role::Pads) && intensity >= 0.35 {
            delta = delta.with_register(12);
        }
        if role != Role::Pads {
            delta = delta.with_busy(energy_delta * 0.8 + intensity * 0.1);
        }
        plan.role_deltas.insert(role, delta);
    }
    Ok(plan)
}

/// Contrasting material; leans with the energy move into the section.
fn contrast_plan(index: usize, energy_delta: f64) -> Result<SectionVariationPlan, PlanError> {
    let intensity = (0.55 + energy_delta.abs() * 0.5).clamp(0.0, 1.0);
    let mut plan = SectionVariationPlan::new(index, None, intensity, VariationTag::B)?;
    let lifting = energy_delta >= 0.0;
    let sign = if lifting { 1.0 } else { -1.0 };
    for role in Role::ALL {
        let mut delta = RoleVariationDelta::new()
            .with_density(1.0 + sign * 0.2)
            .with_velocity(if lifting { 6 } else { -6 })
            .with_busy(sign * 0.2);
        match role {
            Role::Keys | Role::Pads => delta = delta.with_register(12),
            Role::Bass if !lifting => delta = delta.with_register(-12),
            _ => {}
        }
        plan.role_deltas.insert(role, delta);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{SectionType::*, layout};

    fn song() -> Vec<Section> {
        layout(&[
            (Intro, 4),
            (Verse, 8),
            (Chorus, 8),
            (Verse, 8),
            (Chorus, 8),
            (Bridge, 8),
            (Solo, 8),
            (Chorus, 8),
            (Solo, 8),
            (Outro, 4),
        ])
        .unwrap()
    }

    #[test]
    fn test_first_occurrence_has_no_base() {
        let sections = song();
        for seed in 0..50 {
            for i in [0, 1, 2, 9] {
                let d = BaseReferenceSelectorRules::select_base_reference(i, &sections, "Pop", seed)
                    .unwrap();
                assert_eq!(d.base, None);
                assert_eq!(d.tag, VariationTag::A);
            }
        }
    }

    #[test]
    fn test_repeat_uses_earliest_prior() {
        let sections = song();
        let d = BaseReferenceSelectorRules::select_base_reference(7, &sections, "Pop", 3).unwrap();
        assert_eq!(d.base, Some(2));
        assert_eq!(d.tag, VariationTag::APrime);
        let d = BaseReferenceSelectorRules::select_base_reference(3, &sections, "Pop", 3).unwrap();
        assert_eq!(d.base, Some(1));
    }

    #[test]
    fn test_bridge_and_solo_decisions_are_stable_and_mixed() {
        let sections = song();
        let mut contrast = 0;
        for seed in 0..200 {
            let a = BaseReferenceSelectorRules::select_base_reference(5, &sections, "Pop", seed)
                .unwrap();
            let b = BaseReferenceSelectorRules::select_base_reference(5, &sections, "Pop", seed)
                .unwrap();
            assert_eq!(a, b);
            assert!(a.base.is_none());
            if a.tag == VariationTag::B {
                contrast += 1;
            }
        }
        // ~40% for a first bridge; the hash is not random but should be spread.
        assert!((40..=120).contains(&contrast), "contrast count {contrast}");

        for seed in 0..50 {
            let d = BaseReferenceSelectorRules::select_base_reference(8, &sections, "Pop", seed)
                .unwrap();
            match d.tag {
                VariationTag::B => assert_eq!(d.base, None),
                VariationTag::APrime => assert_eq!(d.base, Some(6)),
                VariationTag::A => panic!("second solo cannot be fresh"),
            }
        }
    }

    #[test]
    fn test_validate_base_reference() {
        assert!(BaseReferenceSelectorRules::validate_base_reference(3, 1).is_ok());
        assert!(matches!(
            BaseReferenceSelectorRules::validate_base_reference(3, 3),
            Err(PlanError::InvalidBaseReference { current: 3, base: 3 })
        ));
        assert!(SectionVariationPlan::new(2, Some(5), 0.1, VariationTag::APrime).is_err());
    }

    #[test]
    fn test_delta_factory_clamps() {
        let d = RoleVariationDelta::new()
            .with_density(5.0)
            .with_velocity(-90)
            .with_register(40)
            .with_busy(-3.0);
        assert_eq!(d.density_multiplier, Some(2.0));
        assert_eq!(d.velocity_bias, Some(-30));
        assert_eq!(d.register_lift_semitones, Some(24));
        assert_eq!(d.busy_probability, Some(-1.0));
        assert!(RoleVariationDelta::new().is_empty());
    }

    #[test]
    fn test_apply_none_is_identity() {
        let base = RoleProfile::from_energy(Role::Drums, 0.7);
        assert_eq!(VariationParameterAdapter::apply_variation(&base, None), base);
    }

    #[test]
    fn test_apply_multiplies_density_and_adds_rest() {
        let base = RoleProfile {
            density_multiplier: 1.2,
            velocity_bias: 10,
            register_lift_semitones: 12,
            busy_probability: 0.5,
        };
        let delta = RoleVariationDelta::new()
            .with_density(1.5)
            .with_velocity(-20)
            .with_register(-24)
            .with_busy(0.3);
        let out = VariationParameterAdapter::apply_variation(&base, Some(&delta));
        assert!((out.density_multiplier - 1.8).abs() < 1e-12);
        assert_eq!(out.velocity_bias, -10);
        assert_eq!(out.register_lift_semitones, -12);
        assert!((out.busy_probability - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_apply_clamps_composed_deltas() {
        let base = RoleProfile {
            density_multiplier: 1.8,
            velocity_bias: 120,
            register_lift_semitones: 40,
            busy_probability: 0.9,
        };
        let delta = RoleVariationDelta::new()
            .with_density(2.0)
            .with_velocity(30)
            .with_register(24)
            .with_busy(1.0);
        let out = VariationParameterAdapter::apply_variation(&base, Some(&delta));
        assert_eq!(out.density_multiplier, 2.0);
        assert_eq!(out.velocity_bias, 127);
        assert_eq!(out.register_lift_semitones, 48);
        assert_eq!(out.busy_probability, 1.0);
    }

    #[test]
    fn test_copy_builders_leave_original_untouched() {
        let plan = SectionVariationPlan::new(4, Some(2), 0.2, VariationTag::APrime).unwrap();
        let louder = plan
            .with_intensity(0.9)
            .with_role_delta(Role::Bass, RoleVariationDelta::new().with_velocity(5));
        assert_eq!(plan.variation_intensity, 0.2);
        assert!(plan.role_delta(Role::Bass).is_none());
        assert_eq!(louder.variation_intensity, 0.9);
        assert_eq!(louder.role_delta(Role::Bass).unwrap().velocity_bias, Some(5));
        assert!(louder.has_tag(VariationTag::APrime));
    }

    #[test]
    fn test_contrast_leans_with_energy_move() {
        let up = contrast_plan(3, 0.2).unwrap();
        let bass = up.role_delta(Role::Bass).unwrap();
        assert!((bass.density_multiplier.unwrap() - 1.2).abs() < 1e-9);
        assert_eq!(bass.velocity_bias, Some(6));
        assert!((bass.busy_probability.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(bass.register_lift_semitones, None);

        let down = contrast_plan(3, -0.2).unwrap();
        let bass = down.role_delta(Role::Bass).unwrap();
        assert!((bass.density_multiplier.unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(bass.velocity_bias, Some(-6));
        assert!((bass.busy_probability.unwrap() + 0.2).abs() < 1e-9);
        assert_eq!(bass.register_lift_semitones, Some(-12));
        assert_eq!(down.role_delta(Role::Pads).unwrap().register_lift_semitones, Some(12));
    }

    #[test]
    fn test_planner_output_is_valid() {
        let sections = song();
        for seed in 0..30 {
            let arc = EnergyArc::create(&sections, "Rock", seed, None).unwrap();
            let plans = VariationPlanner::plan(&arc, "Rock", seed).unwrap();
            assert_eq!(plans.len(), sections.len());
            for (i, plan) in plans.iter().enumerate() {
                assert_eq!(plan.absolute_section_index, i);
                if let Some(base) = plan.base_reference_section_index {
                    assert!(base < i);
                }
                assert!((0.0..=1.0).contains(&plan.variation_intensity));
                assert_eq!(plan.tags.len(), 1);
                for delta in plan.role_deltas.values() {
                    if let Some(d) = delta.density_multiplier {
                        assert!((0.5..=2.0).contains(&d));
                    }
                    if let Some(v) = delta.velocity_bias {
                        assert!((-30..=30).contains(&v));
                    }
                }
            }
            assert!(plans[0].has_tag(VariationTag::A));
            assert!(plans[0].role_deltas.is_empty());
        }
    }
}
