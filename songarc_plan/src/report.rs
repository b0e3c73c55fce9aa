// Plain-text diagnostics for a built `SongPlan`.
//
// Four read-only views:
// - `full_report`: every section with energy resolution detail, tension,
//   transition hint and variation plan
// - `summary_report`: one line per section
// - `compact_report`: a single line, e.g. `V.42 V.48 C.78 ...`
// - `energy_chart`: a horizontal bar chart of section energies
//
// Formatters only borrow the plan; building a report never changes it.

use crate::pipeline::SongPlan;
use std::fmt::Write;

const CHART_WIDTH: usize = 40;

pub fn full_report(plan: &SongPlan) -> String {
    let mut out = String::new();
    let arc = plan.arc();
    let config = plan.config();

    let _ = writeln!(out, "=== Song plan ===");
    let _ = writeln!(
        out,
        "Style: {} ({:?}), form: {:?}, seed: {}",
        config.style,
        arc.category(),
        arc.form(),
        config.seed
    );
    let _ = writeln!(
        out,
        "Template: {} ({})",
        arc.template().name,
        arc.template().description
    );
    let _ = writeln!(out, "Policy: {}", arc.policy_name());
    let _ = writeln!(out);

    let profiles = plan.tension().profiles();
    let transitions = plan.tension().transitions();
    for (i, section) in plan.sections().iter().enumerate() {
        let _ = writeln!(
            out,
            "[{}] {} bars {}-{}",
            i,
            section.section_type,
            section.start_bar,
            section.start_bar + section.bar_count - 1
        );
        if let Ok(outcome) = arc.outcome(i) {
            let _ = writeln!(
                out,
                "  energy {:.3} (proposed {:.3}{})",
                outcome.energy,
                outcome.proposed_energy,
                if outcome.adjusted { ", adjusted" } else { "" }
            );
            for line in &outcome.diagnostics {
                let _ = writeln!(out, "    {}", line);
            }
        }
        if let Some(profile) = profiles.get(i) {
            let _ = writeln!(
                out,
                "  tension {:.3} (micro {:.3}) drivers: {}",
                profile.macro_tension, profile.micro_tension_default, profile.drivers
            );
        }
        if let Some(hint) = transitions.get(i) {
            let _ = writeln!(out, "  transition: {:?}", hint);
        }
        if let Ok(variation) = plan.variation_plan(i) {
            let tags: Vec<&str> = variation.tags.iter().map(String::as_str).collect();
            let base = variation
                .base_reference_section_index
                .map_or_else(|| "-".to_string(), |b| b.to_string());
            let _ = writeln!(
                out,
                "  variation: {} base {} intensity {:.2} ({} role deltas)",
                tags.join(","),
                base,
                variation.variation_intensity,
                variation.role_deltas.len()
            );
        }
    }
    out
}

pub fn summary_report(plan: &SongPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} | {} | {} sections",
        plan.arc().template().name,
        plan.arc().policy_name(),
        plan.section_count()
    );
    let profiles = plan.tension().profiles();
    for (i, section) in plan.sections().iter().enumerate() {
        let energy = plan.arc().energy(i).unwrap_or_default();
        let tension = profiles.get(i).map_or(0.0, |p| p.macro_tension);
        let tag = plan
            .variation_plan(i)
            .ok()
            .and_then(|v| v.tags.iter().next().cloned())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:>2} {:<10} E {:.2}  T {:.2}  {}",
            i,
            section.section_type.to_string(),
            energy,
            tension,
            tag
        );
    }
    out
}

pub fn compact_report(plan: &SongPlan) -> String {
    plan.sections()
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let e = format!("{:.2}", plan.arc().energy(i).unwrap_or_default());
            format!("{}{}", s.section_type.short_label(), e.strip_prefix('0').unwrap_or(&e))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn energy_chart(plan: &SongPlan) -> String {
    let mut out = String::new();
    for (i, section) in plan.sections().iter().enumerate() {
        let e = plan.arc().energy(i).unwrap_or_default();
        let filled = (e * CHART_WIDTH as f64).round() as usize;
        let _ = writeln!(
            out,
            "{:<10} |{}{}| {:.2}",
            section.section_type.to_string(),
            "#".repeat(filled),
            " ".repeat(CHART_WIDTH - filled.min(CHART_WIDTH)),
            e
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanConfig;
    use crate::section::{SectionType::*, layout};

    fn plan() -> SongPlan {
        let sections = layout(&[
            (Intro, 4),
            (Verse, 8),
            (Chorus, 8),
            (Bridge, 8),
            (Chorus, 8),
        ])
        .unwrap();
        SongPlan::build(&sections, &PlanConfig::new("Pop", 9)).unwrap()
    }

    #[test]
    fn test_full_report_lists_every_section() {
        let p = plan();
        let text = full_report(&p);
        assert!(text.contains("Template: "));
        for i in 0..p.section_count() {
            assert!(text.contains(&format!("[{}] ", i)));
        }
        assert!(text.contains("[0] Intro bars 0-3"));
    }

    #[test]
    fn test_summary_has_header_plus_one_line_per_section() {
        let p = plan();
        assert_eq!(summary_report(&p).lines().count(), p.section_count() + 1);
    }

    #[test]
    fn test_compact_report_uses_short_labels() {
        let p = plan();
        let text = compact_report(&p);
        let tokens: Vec<&str> = text.split(' ').collect();
        assert_eq!(tokens.len(), 5);
        assert!(tokens[0].starts_with("I."));
        assert!(tokens[2].starts_with('C'));
    }

    #[test]
    fn test_chart_rows_have_fixed_width() {
        let p = plan();
        let chart = energy_chart(&p);
        let widths: Vec<usize> = chart
            .lines()
            .map(|l| l.find('|').and_then(|a| l.rfind('|').map(|b| b - a)).unwrap())
            .collect();
        assert!(widths.iter().all(|&w| w == CHART_WIDTH + 1));
    }
}
