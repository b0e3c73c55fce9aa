// Energy constraint rules: musical heuristics that inspect one section's
// proposed energy and either abstain or suggest an adjustment.
//
// A rule sees an `EnergyConstraintContext` snapshot: the proposed (template)
// energy of the section under evaluation, its neighbours, and the finalized
// energies of every earlier section. Later sections are only visible through
// their proposed energies; their finalized values do not exist yet because
// sections resolve strictly left to right (see `policy.rs` and `arc.rs`).
//
// Rules return one of three shapes:
// - no opinion: the rule's precondition is unmet (not a chorus, no earlier
//   verse, ...). Nothing is reported.
// - accept: the precondition holds and the proposal already satisfies it.
//   A diagnostic explains why.
// - adjust: a suggested energy plus a diagnostic.
// An accept is never encoded as an adjustment echoing the proposed value.

use crate::section::{Section, SectionType, count_of_type, type_local_index};
use std::fmt;

/// Tolerance for "already satisfies" comparisons so that floor/ceiling sums
/// like 0.6 + 0.02 do not trigger spurious adjustments.
pub const ENERGY_EPSILON: f64 = 1e-9;

/// Read-only view of one section during constraint resolution.
#[derive(Debug, Clone)]
pub struct EnergyConstraintContext<'a> {
    pub section: Section,
    pub type_local_index: usize,
    pub proposed_energy: f64,
    /// Finalized energy of the immediately preceding section.
    pub previous_energy: Option<f64>,
    pub previous_section_type: Option<SectionType>,
    /// Proposed energy of the immediately following section.
    pub next_energy: Option<f64>,
    pub next_section_type: Option<SectionType>,
    /// Finalized energy of the most recent earlier section of the same type.
    pub previous_same_type_energy: Option<f64>,
    /// Proposed energy of the next later section of the same type.
    pub next_same_type_energy: Option<f64>,
    pub section_count: usize,
    pub same_type_count: usize,
    /// Finalized energies of sections `0..section.absolute_index`.
    pub finalized_energies: &'a [f64],
    pub sections: &'a [Section],
}

impl<'a> EnergyConstraintContext<'a> {
    /// Build the context for section `index`.
    ///
    /// `proposed` holds a template energy for every section; `finalized`
    /// must hold exactly the resolved energies of sections before `index`.
    /// Panics if either invariant is broken, since that means the resolver
    /// is evaluating sections out of order.
    pub fn for_section(
        sections: &'a [Section],
        index: usize,
        proposed: &[f64],
        finalized: &'a [f64],
    ) -> Self {
        assert_eq!(proposed.len(), sections.len(), "one proposal per section");
        assert_eq!(
            finalized.len(),
            index,
            "sections must be finalized strictly in order"
        );
        let section = sections[index];
        let st = section.section_type;

        let previous_same_type_energy = (0..index)
            .rev()
            .find(|&j| sections[j].section_type == st)
            .map(|j| finalized[j]);
        let next_same_type_energy = (index + 1..sections.len())
            .find(|&j| sections[j].section_type == st)
            .map(|j| proposed[j]);

        EnergyConstraintContext {
            section,
            type_local_index: type_local_index(sections, index),
            proposed_energy: proposed[index].clamp(0.0, 1.0),
            previous_energy: index.checked_sub(1).map(|j| finalized[j]),
            previous_section_type: index.checked_sub(1).map(|j| sections[j].section_type),
            next_energy: proposed.get(index + 1).copied(),
            next_section_type: sections.get(index + 1).map(|s| s.section_type),
            previous_same_type_energy,
            next_same_type_energy,
            section_count: sections.len(),
            same_type_count: count_of_type(sections, st),
            finalized_energies: finalized,
            sections,
        }
    }

    pub fn section_type(&self) -> SectionType {
        self.section.section_type
    }

    pub fn is_last_of_type(&self) -> bool {
        self.type_local_index + 1 == self.same_type_count
    }

    /// Most recent earlier section of `section_type` with its finalized energy.
    pub fn previous_of_type(&self, section_type: SectionType) -> Option<(usize, f64)> {
        (0..self.finalized_energies.len())
            .rev()
            .find(|&j| self.sections[j].section_type == section_type)
            .map(|j| (j, self.finalized_energies[j]))
    }

    /// Highest finalized energy so far, if any section precedes this one.
    pub fn peak_finalized(&self) -> Option<f64> {
        self.finalized_energies.iter().copied().reduce(f64::max)
    }
}

/// A rule's verdict for one section.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyConstraintResult {
    pub adjusted_energy: Option<f64>,
    pub diagnostic: Option<String>,
}

impl EnergyConstraintResult {
    pub fn no_opinion() -> Self {
        EnergyConstraintResult {
            adjusted_energy: None,
            diagnostic: None,
        }
    }

    pub fn accept(diagnostic: impl Into<String>) -> Self {
        EnergyConstraintResult {
            adjusted_energy: None,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Suggest `energy` (clamped to [0, 1]).
    pub fn adjust(energy: f64, diagnostic: impl Into<String>) -> Self {
        EnergyConstraintResult {
            adjusted_energy: Some(energy.clamp(0.0, 1.0)),
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn is_no_opinion(&self) -> bool {
        self.adjusted_energy.is_none() && self.diagnostic.is_none()
    }
}

/// A pure function from context to verdict.
///
/// Implementations must not depend on anything but the context, so that
/// evaluation order inside a policy never changes a rule's answer.
pub trait EnergyConstraintRule: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, ctx: &EnergyConstraintContext<'_>) -> EnergyConstraintResult;
}

// ── Concrete rules ──

/// Repeats of a section type never lose energy, optionally climbing by at
/// least `min_increment` each time.
#[derive(Debug, Clone, Copy)]
pub struct SameTypeMonotonicRule {
    pub min_increment: f64,
}

impl EnergyConstraintRule for SameTypeMonotonicRule {
    fn name(&self) -> &str {
        "SameTypeMonotonic"
    }

    fn evaluate(&self, ctx: &EnergyConstraintContext<'_>) -> EnergyConstraintResult {
        let Some(previous) = ctx.previous_same_type_energy else {
            return EnergyConstraintResult::no_opinion();
        };
        let floor = (previous + self.min_increment.max(0.0)).min(1.0);
        if ctx.proposed_energy + ENERGY_EPSILON >= floor {
            EnergyConstraintResult::accept(format!(
                "{} #{} at {:.3} keeps pace with previous {:.3}",
                ctx.section_type(),
                ctx.type_local_index + 1,
                ctx.proposed_energy,
                previous
            ))
        } else {
            EnergyConstraintResult::adjust(
                floor,
                format!(
                    "{} #{} raised to {:.3} (previous {:.3} + {:.3})",
                    ctx.section_type(),
                    ctx.type_local_index + 1,
                    floor,
                    previous,
                    self.min_increment
                ),
            )
        }
    }
}

/// A non-chorus section right after a chorus sits at least `min_drop` below it.
#[derive(Debug, Clone, Copy)]
pub struct PostChorusDropRule {
    pub min_drop: f64,
}

impl EnergyConstraintRule for PostChorusDropRule {
    fn name(&self) -> &str {
        "PostChorusDrop"
    }

    fn evaluate(&self, ctx: &EnergyConstraintContext<'_>) -> EnergyConstraintResult {
        if ctx.section_type() == SectionType::Chorus
            || ctx.previous_section_type != Some(SectionType::Chorus)
        {
            return EnergyConstraintResult::no_opinion();
        }
        let Some(chorus) = ctx.previous_energy else {
            return EnergyConstraintResult::no_opinion();
        };
        let ceiling = (chorus - self.min_drop).max(0.0);
        if ctx.proposed_energy <= ceiling + ENERGY_EPSILON {
            EnergyConstraintResult::accept(format!(
                "{} at {:.3} already below chorus {:.3}",
                ctx.section_type(),
                ctx.proposed_energy,
                chorus
            ))
        } else {
            EnergyConstraintResult::adjust(
                ceiling,
                format!(
                    "{} capped at {:.3} after chorus {:.3}",
                    ctx.section_type(),
                    ceiling,
                    chorus
                ),
            )
        }
    }
}

/// The last chorus lands within `tolerance` of the highest energy so far.
#[derive(Debug, Clone, Copy)]
pub struct FinalChorusPeakRule {
    pub tolerance: f64,
}

impl EnergyConstraintRule for FinalChorusPeakRule {
    fn name(&self) -> &str {
        "FinalChorusPeak"
    }

    fn evaluate(&self, ctx: &EnergyConstraintContext<'_>) -> EnergyConstraintResult {
        if ctx.section_type() != SectionType::Chorus || !ctx.is_last_of_type() {
            return EnergyConstraintResult::no_opinion();
        }
        let Some(peak) = ctx.peak_finalized() else {
            return EnergyConstraintResult::no_opinion();
        };
        let floor = (peak - self.tolerance.max(0.0)).max(0.0);
        if ctx.proposed_energy + ENERGY_EPSILON >= floor {
            EnergyConstraintResult::accept(format!(
                "final chorus {:.3} is near peak {:.3}",
                ctx.proposed_energy, peak
            ))
        } else {
            EnergyConstraintResult::adjust(
                floor,
                format!("final chorus lifted to {floor:.3} (peak {peak:.3})"),
            )
        }
    }
}

/// A bridge differs from the most recent chorus by at least `min_delta`.
///
/// The bridge moves away from the chorus in the direction it already leans,
/// flipping direction only if that side has no room within [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct BridgeContrastRule {
    pub min_delta: f64,
}

impl EnergyConstraintRule for BridgeContrastRule {
    fn name(&self) -> &str {
        "BridgeContrast"
    }

    fn evaluate(&self, ctx: &EnergyConstraintContext<'_>) -> EnergyConstraintResult {
        if ctx.section_type() != SectionType::Bridge {
            return EnergyConstraintResult::no_opinion();
        }
        let Some((_, chorus)) = ctx.previous_of_type(SectionType::Chorus) else {
            return EnergyConstraintResult::no_opinion();
        };
        let delta = ctx.proposed_energy - chorus;
        if delta.abs() + ENERGY_EPSILON >= self.min_delta {
            return EnergyConstraintResult::accept(format!(
                "bridge {:.3} contrasts chorus {:.3} by {:.3}",
                ctx.proposed_energy,
                chorus,
                delta.abs()
            ));
        }
        let below = chorus - self.min_delta;
        let above = chorus + self.min_delta;
        let target = if delta > 0.0 {
            if above <= 1.0 { above } else { below }
        } else if below >= 0.0 {
            below
        } else {
            above
        };
        EnergyConstraintResult::adjust(
            target,
            format!("bridge moved to {target:.3} to contrast chorus {chorus:.3}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::layout;
    use SectionType::*;

    fn ctx_at<'a>(
        sections: &'a [Section],
        proposed: &[f64],
        finalized: &'a [f64],
    ) -> EnergyConstraintContext<'a> {
        EnergyConstraintContext::for_section(sections, finalized.len(), proposed, finalized)
    }

    #[test]
    fn test_context_neighbours() {
        let sections = layout(&[(Verse, 8), (Chorus, 8), (Verse, 8), (Chorus, 8)]).unwrap();
        let proposed = [0.4, 0.7, 0.45, 0.8];
        let finalized = [0.42, 0.72];
        let ctx = ctx_at(&sections, &proposed, &finalized);
        assert_eq!(ctx.type_local_index, 1);
        assert_eq!(ctx.previous_energy, Some(0.72));
        assert_eq!(ctx.previous_section_type, Some(Chorus));
        assert_eq!(ctx.next_energy, Some(0.8));
        assert_eq!(ctx.previous_same_type_energy, Some(0.42));
        assert_eq!(ctx.next_same_type_energy, None);
        assert!(ctx.is_last_of_type());
        assert_eq!(ctx.peak_finalized(), Some(0.72));
    }

    #[test]
    #[should_panic(expected = "strictly in order")]
    fn test_context_rejects_out_of_order_finalization() {
        let sections = layout(&[(Verse, 8), (Chorus, 8)]).unwrap();
        let proposed = [0.4, 0.7];
        EnergyConstraintContext::for_section(&sections, 1, &proposed, &[]);
    }

    #[test]
    fn test_result_shapes_are_distinguishable() {
        assert!(EnergyConstraintResult::no_opinion().is_no_opinion());
        let accept = EnergyConstraintResult::accept("fine");
        assert!(!accept.is_no_opinion());
        assert!(accept.adjusted_energy.is_none());
        assert_eq!(
            EnergyConstraintResult::adjust(1.4, "x").adjusted_energy,
            Some(1.0)
        );
    }

    #[test]
    fn test_monotonic_raises_lower_repeat() {
        let sections = layout(&[(Verse, 8), (Verse, 8)]).unwrap();
        let proposed = [0.5, 0.4];
        let finalized = [0.5];
        let rule = SameTypeMonotonicRule {
            min_increment: 0.02,
        };
        let r = rule.evaluate(&ctx_at(&sections, &proposed, &finalized));
        assert!((r.adjusted_energy.unwrap() - 0.52).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_accepts_exact_increment() {
        let sections = layout(&[(Verse, 8), (Verse, 8)]).unwrap();
        let proposed = [0.6, 0.62];
        let finalized = [0.6];
        let rule = SameTypeMonotonicRule {
            min_increment: 0.02,
        };
        let r = rule.evaluate(&ctx_at(&sections, &proposed, &finalized));
        assert!(r.adjusted_energy.is_none());
        assert!(r.diagnostic.is_some());
    }

    #[test]
    fn test_monotonic_no_opinion_on_first_occurrence() {
        let sections = layout(&[(Chorus, 8), (Verse, 8)]).unwrap();
        let proposed = [0.7, 0.4];
        let finalized = [0.7];
        let rule = SameTypeMonotonicRule { min_increment: 0.0 };
        assert!(
            rule.evaluate(&ctx_at(&sections, &proposed, &finalized))
                .is_no_opinion()
        );
    }

    #[test]
    fn test_post_chorus_drop_caps_following_section() {
        let sections = layout(&[(Chorus, 8), (Verse, 8)]).unwrap();
        let proposed = [0.8, 0.75];
        let finalized = [0.8];
        let rule = PostChorusDropRule { min_drop: 0.1 };
        let r = rule.evaluate(&ctx_at(&sections, &proposed, &finalized));
        assert!((r.adjusted_energy.unwrap() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_post_chorus_drop_ignores_chorus_to_chorus() {
        let sections = layout(&[(Chorus, 8), (Chorus, 8)]).unwrap();
        let proposed = [0.8, 0.85];
        let finalized = [0.8];
        let rule = PostChorusDropRule { min_drop: 0.1 };
        assert!(
            rule.evaluate(&ctx_at(&sections, &proposed, &finalized))
                .is_no_opinion()
        );
    }

    #[test]
    fn test_final_chorus_floor() {
        let sections = layout(&[(Chorus, 8), (Bridge, 8), (Chorus, 8)]).unwrap();
        let proposed = [0.9, 0.6, 0.7];
        let finalized = [0.9, 0.6];
        let rule = FinalChorusPeakRule { tolerance: 0.02 };
        let r = rule.evaluate(&ctx_at(&sections, &proposed, &finalized));
        assert!((r.adjusted_energy.unwrap() - 0.88).abs() < 1e-12);
    }

    #[test]
    fn test_final_chorus_rule_skips_earlier_choruses() {
        let sections = layout(&[(Verse, 8), (Chorus, 8), (Chorus, 8)]).unwrap();
        let proposed = [0.9, 0.5, 0.8];
        let finalized = [0.9];
        let rule = FinalChorusPeakRule { tolerance: 0.02 };
        assert!(
            rule.evaluate(&ctx_at(&sections, &proposed, &finalized))
                .is_no_opinion()
        );
    }

    #[test]
    fn test_bridge_contrast_moves_away_from_chorus() {
        let sections = layout(&[(Chorus, 8), (Bridge, 8)]).unwrap();
        let finalized = [0.7];
        let rule = BridgeContrastRule { min_delta: 0.15 };

        let below = rule.evaluate(&ctx_at(&sections, &[0.7, 0.65], &finalized));
        assert!((below.adjusted_energy.unwrap() - 0.55).abs() < 1e-12);

        let above = rule.evaluate(&ctx_at(&sections, &[0.7, 0.75], &finalized));
        assert!((above.adjusted_energy.unwrap() - 0.85).abs() < 1e-12);

        let ok = rule.evaluate(&ctx_at(&sections, &[0.7, 0.4], &finalized));
        assert!(ok.adjusted_energy.is_none() && ok.diagnostic.is_some());
    }

    #[test]
    fn test_bridge_contrast_flips_when_no_room() {
        let sections = layout(&[(Chorus, 8), (Bridge, 8)]).unwrap();
        let finalized = [0.95];
        let rule = BridgeContrastRule { min_delta: 0.15 };
        let r = rule.evaluate(&ctx_at(&sections, &[0.95, 0.97], &finalized));
        assert!((r.adjusted_energy.unwrap() - 0.8).abs() < 1e-12);
    }
}
