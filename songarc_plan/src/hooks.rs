// Tension hooks: small, bounded bias terms for downstream generators.
//
// Role generators read these as nudges to probabilities and velocities
// (pull-offs and fills, impact hits, accents, thinning). They are biases,
// never triggers, and nothing here feeds back into energy or tension.
//
// The blend weights macro tension over micro tension; micro is scaled by a
// caller-supplied ramp intensity so a generator can mute the per-bar swell.

use crate::error::PlanError;
use crate::tension::TensionQuery;
use serde::{Deserialize, Serialize};

pub const PULL_PROBABILITY_LIMIT: f64 = 0.20;
pub const IMPACT_PROBABILITY_LIMIT: f64 = 0.15;
pub const VELOCITY_ACCENT_LIMIT: i32 = 12;
pub const DENSITY_THINNING_MAX: f64 = 0.25;
pub const VARIATION_INTENSITY_LIMIT: f64 = 0.20;

const MACRO_WEIGHT: f64 = 0.6;
const MICRO_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TensionHooks {
    /// ±0.20
    pub pull_probability_bias: f64,
    /// ±0.15
    pub impact_probability_bias: f64,
    /// ±12 velocity steps
    pub velocity_accent_bias: i32,
    /// [0, 0.25]
    pub density_thinning_bias: f64,
    /// ±0.20
    pub variation_intensity_bias: f64,
}

pub struct TensionHooksBuilder;

impl TensionHooksBuilder {
    /// Blend macro and ramp-weighted micro tension into bias terms.
    /// Inputs are clamped to [0, 1].
    pub fn build(macro_tension: f64, micro_tension: f64, ramp_intensity: f64) -> TensionHooks {
        let macro_tension = macro_tension.clamp(0.0, 1.0);
        let micro = micro_tension.clamp(0.0, 1.0) * ramp_intensity.clamp(0.0, 1.0);
        let combined = (MACRO_WEIGHT * macro_tension + MICRO_WEIGHT * micro).clamp(0.0, 1.0);
        let centered = combined - 0.5;

        TensionHooks {
            pull_probability_bias: (centered * 0.4)
                .clamp(-PULL_PROBABILITY_LIMIT, PULL_PROBABILITY_LIMIT),
            impact_probability_bias: (centered * 0.3)
                .clamp(-IMPACT_PROBABILITY_LIMIT, IMPACT_PROBABILITY_LIMIT),
            velocity_accent_bias: ((centered * 24.0).round() as i32)
                .clamp(-VELOCITY_ACCENT_LIMIT, VELOCITY_ACCENT_LIMIT),
            density_thinning_bias: ((0.5 - combined) * 0.5).clamp(0.0, DENSITY_THINNING_MAX),
            variation_intensity_bias: (centered * 0.4)
                .clamp(-VARIATION_INTENSITY_LIMIT, VARIATION_INTENSITY_LIMIT),
        }
    }

    /// Hooks for one bar of one section, read from any tension source.
    pub fn for_bar(
        query: &impl TensionQuery,
        section: usize,
        bar: usize,
        ramp_intensity: f64,
    ) -> Result<TensionHooks, PlanError> {
        Ok(Self::build(
            query.macro_tension(section)?,
            query.micro_tension(section, bar)?,
            ramp_intensity,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{SectionType::*, layout};
    use crate::tension::NeutralTensionQuery;

    #[test]
    fn test_hooks_bounded_over_grid() {
        let steps = [-0.5, 0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0, 1.5];
        for &m in &steps {
            for &u in &steps {
                for &r in &steps {
                    let h = TensionHooksBuilder::build(m, u, r);
                    assert!(h.pull_probability_bias.abs() <= PULL_PROBABILITY_LIMIT);
                    assert!(h.impact_probability_bias.abs() <= IMPACT_PROBABILITY_LIMIT);
                    assert!(h.velocity_accent_bias.abs() <= VELOCITY_ACCENT_LIMIT);
                    assert!((0.0..=DENSITY_THINNING_MAX).contains(&h.density_thinning_bias));
                    assert!(h.variation_intensity_bias.abs() <= VARIATION_INTENSITY_LIMIT);
                }
            }
        }
    }

    #[test]
    fn test_high_tension_accents_low_tension_thins() {
        let hot = TensionHooksBuilder::build(1.0, 1.0, 1.0);
        assert!(hot.velocity_accent_bias > 0);
        assert!(hot.pull_probability_bias > 0.0);
        assert_eq!(hot.density_thinning_bias, 0.0);

        let calm = TensionHooksBuilder::build(0.0, 0.0, 1.0);
        assert!(calm.velocity_accent_bias < 0);
        assert!(calm.density_thinning_bias > 0.0);
    }

    #[test]
    fn test_zero_ramp_ignores_micro() {
        let a = TensionHooksBuilder::build(0.6, 0.0, 0.0);
        let b = TensionHooksBuilder::build(0.6, 1.0, 0.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_for_bar_reads_query() {
        let sections = layout(&[(Verse, 8)]).unwrap();
        let q = NeutralTensionQuery::new(&sections);
        let h = TensionHooksBuilder::for_bar(&q, 0, 3, 1.0).unwrap();
        assert_eq!(h, TensionHooksBuilder::build(0.5, q.micro_tension(0, 3).unwrap(), 1.0));
        assert!(TensionHooksBuilder::for_bar(&q, 0, 8, 1.0).is_err());
    }
}
