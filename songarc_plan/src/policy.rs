// Constraint policies: ordered, weighted rule sets and their blending.
//
// A policy evaluates every rule against the same context (rules never see
// each other's output), then resolves the suggestions:
// - none: keep the proposed energy;
// - one: take it as is;
// - several: strength-weighted average, summed in declared rule order so
//   the floating-point result is identical on every run.
// A policy whose suggestions all carry zero strength makes no adjustment.
//
// `EnergyConstraintPolicyLibrary::standard()` holds the named policies
// (PopRock, Jazz, EDM, Minimal, Empty). `arc.rs` drives resolution.

use crate::arc_template::StyleCategory;
use crate::constraint::{
    BridgeContrastRule, EnergyConstraintContext, EnergyConstraintRule, FinalChorusPeakRule,
    PostChorusDropRule, SameTypeMonotonicRule,
};
use crate::error::PlanError;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::LazyLock;

/// A rule paired with its blending strength (never negative).
#[derive(Debug)]
pub struct WeightedRule {
    pub rule: Box<dyn EnergyConstraintRule>,
    pub strength: f64,
}

/// What one rule said about one section.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleVerdict {
    NoOpinion,
    Accept(String),
    Adjust { energy: f64, diagnostic: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleReport {
    pub rule: String,
    pub strength: f64,
    pub verdict: RuleVerdict,
}

/// Result of applying a policy to one section.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    pub proposed_energy: f64,
    pub energy: f64,
    /// True when the final energy came from rule suggestions rather than the
    /// proposal.
    pub adjusted: bool,
    pub reports: Vec<RuleReport>,
    pub diagnostics: Vec<String>,
}

impl PolicyOutcome {
    fn unchanged(proposed: f64) -> Self {
        PolicyOutcome {
            proposed_energy: proposed,
            energy: proposed,
            adjusted: false,
            reports: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

/// Named, ordered set of weighted rules.
#[derive(Debug)]
pub struct EnergyConstraintPolicy {
    pub name: String,
    rules: Vec<WeightedRule>,
    pub enabled: bool,
}

impl EnergyConstraintPolicy {
    pub fn new(name: &str) -> Self {
        EnergyConstraintPolicy {
            name: name.to_string(),
            rules: Vec::new(),
            enabled: true,
        }
    }

    /// Append a rule. Negative strengths are treated as zero.
    pub fn with_rule(mut self, rule: impl EnergyConstraintRule + 'static, strength: f64) -> Self {
        self.rules.push(WeightedRule {
            rule: Box::new(rule),
            strength: strength.max(0.0),
        });
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn rules(&self) -> &[WeightedRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule for one section and resolve a final energy.
    pub fn apply(&self, ctx: &EnergyConstraintContext<'_>) -> PolicyOutcome {
        let proposed = ctx.proposed_energy;
        if !self.enabled || self.rules.is_empty() {
            return PolicyOutcome::unchanged(proposed);
        }

        let mut reports = Vec::with_capacity(self.rules.len());
        let mut diagnostics = Vec::new();
        // (rule name, suggestion, strength) in declared order.
        let mut adjustments: Vec<(&str, f64, f64)> = Vec::new();

        for weighted in &self.rules {
            let name = weighted.rule.name();
            let result = weighted.rule.evaluate(ctx);
            let verdict = match (result.adjusted_energy, result.diagnostic) {
                (Some(energy), diagnostic) => {
                    let diagnostic = diagnostic.unwrap_or_default();
                    adjustments.push((name, energy, weighted.strength));
                    RuleVerdict::Adjust { energy, diagnostic }
                }
                (None, Some(diagnostic)) => {
                    diagnostics.push(format!("[{name}] accept: {diagnostic}"));
                    RuleVerdict::Accept(diagnostic)
                }
                (None, None) => RuleVerdict::NoOpinion,
            };
            reports.push(RuleReport {
                rule: name.to_string(),
                strength: weighted.strength,
                verdict,
            });
        }

        let (energy, adjusted) = match adjustments.as_slice() {
            [] => (proposed, false),
            [(name, suggestion, _)] => {
                diagnostics.push(format!(
                    "[{name}] adjust: {proposed:.3} -> {suggestion:.3}"
                ));
                (*suggestion, true)
            }
            many => {
                let mut weighted_sum = 0.0;
                let mut total_strength = 0.0;
                let mut line = String::from("blend:");
                for (name, suggestion, strength) in many {
                    weighted_sum += suggestion * strength;
                    total_strength += strength;
                    let _ = write!(line, " [{name}] {suggestion:.3}x{strength:.2}");
                }
                if total_strength > 0.0 {
                    let resolved = (weighted_sum / total_strength).clamp(0.0, 1.0);
                    let _ = write!(
                        line,
                        " = {weighted_sum:.4}/{total_strength:.2} -> {resolved:.3}"
                    );
                    diagnostics.push(line);
                    (resolved, true)
                } else {
                    let _ = write!(line, " total strength 0, keeping {proposed:.3}");
                    diagnostics.push(line);
                    (proposed, false)
                }
            }
        };

        if adjusted {
            tracing::debug!(
                policy = %self.name,
                section = ctx.section.absolute_index,
                proposed,
                energy,
                "constraint adjustment"
            );
        }

        PolicyOutcome {
            proposed_energy: proposed,
            energy,
            adjusted,
            reports,
            diagnostics,
        }
    }

    // ── Presets ──

    /// Verse/chorus heuristics for pop, rock and country.
    pub fn pop_rock() -> Self {
        EnergyConstraintPolicy::new("PopRock")
            .with_rule(
                SameTypeMonotonicRule {
                    min_increment: 0.02,
                },
                1.0,
            )
            .with_rule(PostChorusDropRule { min_drop: 0.1 }, 0.6)
            .with_rule(FinalChorusPeakRule { tolerance: 0.02 }, 1.5)
            .with_rule(BridgeContrastRule { min_delta: 0.15 }, 0.8)
    }

    /// Loose constraints: repeats may hold level, bridges contrast mildly.
    pub fn jazz() -> Self {
        EnergyConstraintPolicy::new("Jazz")
            .with_rule(SameTypeMonotonicRule { min_increment: 0.0 }, 0.5)
            .with_rule(BridgeContrastRule { min_delta: 0.1 }, 0.5)
    }

    /// Hard drops after each chorus and a peak last drop.
    pub fn edm() -> Self {
        EnergyConstraintPolicy::new("EDM")
            .with_rule(SameTypeMonotonicRule { min_increment: 0.0 }, 1.0)
            .with_rule(PostChorusDropRule { min_drop: 0.3 }, 1.2)
            .with_rule(FinalChorusPeakRule { tolerance: 0.0 }, 1.5)
    }

    pub fn minimal() -> Self {
        EnergyConstraintPolicy::new("Minimal")
            .with_rule(SameTypeMonotonicRule { min_increment: 0.0 }, 1.0)
    }

    pub fn empty() -> Self {
        EnergyConstraintPolicy::new("Empty")
    }
}

/// Registry of prebuilt policies, keyed by name.
#[derive(Debug)]
pub struct EnergyConstraintPolicyLibrary {
    policies: BTreeMap<String, EnergyConstraintPolicy>,
}

static STANDARD_POLICIES: LazyLock<EnergyConstraintPolicyLibrary> = LazyLock::new(|| {
    EnergyConstraintPolicyLibrary::new(vec![
        EnergyConstraintPolicy::pop_rock(),
        EnergyConstraintPolicy::jazz(),
        EnergyConstraintPolicy::edm(),
        EnergyConstraintPolicy::minimal(),
        EnergyConstraintPolicy::empty(),
    ])
});

impl EnergyConstraintPolicyLibrary {
    pub fn new(policies: Vec<EnergyConstraintPolicy>) -> Self {
        EnergyConstraintPolicyLibrary {
            policies: policies.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }

    pub fn standard() -> &'static EnergyConstraintPolicyLibrary {
        &STANDARD_POLICIES
    }

    pub fn names(&self) -> Vec<&str> {
        self.policies.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Result<&EnergyConstraintPolicy, PlanError> {
        self.policies
            .get(name)
            .ok_or_else(|| PlanError::UnknownPolicy(name.to_string()))
    }

    /// Default policy for a style category, falling back to `Minimal` and
    /// then `Empty` if the preferred one is not registered.
    pub fn for_category(&self, category: StyleCategory) -> Result<&EnergyConstraintPolicy, PlanError> {
        let preferred = match category {
            StyleCategory::Pop | StyleCategory::Rock | StyleCategory::Country => "PopRock",
            StyleCategory::Jazz => "Jazz",
            StyleCategory::Edm => "EDM",
        };
        [preferred, "Minimal", "Empty"]
            .into_iter()
            .find_map(|name| self.policies.get(name))
            .ok_or_else(|| PlanError::UnknownPolicy(preferred.to_string()))
    }
}
