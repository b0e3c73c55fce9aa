// End-to-end properties of the planning pipeline: determinism, output
// ranges, same-type progression, base-reference validity, and report
// non-interference.

use songarc_plan::arc_template::SongForm;
use songarc_plan::phrase::{MAX_ENERGY_DELTA, MicroTensionMap};
use songarc_plan::report::{compact_report, energy_chart, full_report, summary_report};
use songarc_plan::section::{Section, SectionType, SectionType::*, layout};
use songarc_plan::tension::TensionQuery;
use songarc_plan::variation::Role;
use songarc_plan::{PlanConfig, SongPlan};

const STYLES: [&str; 6] = ["Pop", "PopRock", "Rock", "EDM", "Jazz", "Country"];

fn full_song() -> Vec<Section> {
    layout(&[
        (Intro, 4),
        (Verse, 8),
        (PreChorus, 4),
        (Chorus, 8),
        (PostChorus, 4),
        (Verse, 8),
        (PreChorus, 4),
        (Chorus, 8),
        (Bridge, 8),
        (Solo, 8),
        (Breakdown, 4),
        (Chorus, 8),
        (Outro, 6),
    ])
    .unwrap()
}

fn energies(plan: &SongPlan) -> Vec<f64> {
    plan.arc().energies()
}

#[test]
fn test_pipeline_is_deterministic() {
    let sections = full_song();
    for style in STYLES {
        for seed in [0, 1, 42, 123_456_789] {
            let config = PlanConfig::new(style, seed);
            let a = SongPlan::build(&sections, &config).unwrap();
            let b = SongPlan::build(&sections, &config).unwrap();
            assert_eq!(energies(&a), energies(&b));
            assert_eq!(a.tension().profiles(), b.tension().profiles());
            assert_eq!(a.tension().transitions(), b.tension().transitions());
            assert_eq!(a.variation_plans(), b.variation_plans());
            for i in 0..sections.len() {
                assert_eq!(
                    a.tension().micro_tension_map(i).unwrap(),
                    b.tension().micro_tension_map(i).unwrap()
                );
                assert_eq!(a.energy_micro_arc(i).unwrap(), b.energy_micro_arc(i).unwrap());
            }
        }
    }
}

#[test]
fn test_outputs_stay_in_range() {
    let sections = full_song();
    for style in STYLES {
        for seed in 0..25 {
            let plan = SongPlan::build(&sections, &PlanConfig::new(style, seed)).unwrap();
            let tension = plan.tension();
            for (i, section) in sections.iter().enumerate() {
                let e = plan.arc().energy(i).unwrap();
                assert!((0.0..=1.0).contains(&e), "{style}/{seed} energy {e}");
                let t = tension.macro_tension(i).unwrap();
                assert!((0.0..=1.0).contains(&t), "{style}/{seed} tension {t}");
                for bar in 0..section.bar_count {
                    let micro = tension.micro_tension(i, bar).unwrap();
                    assert!((0.0..=1.0).contains(&micro));
                    let delta = plan.energy_micro_arc(i).unwrap().delta(bar).unwrap();
                    assert!(delta.abs() <= MAX_ENERGY_DELTA);
                }
                for role in Role::ALL {
                    let p = plan.role_profile(i, role).unwrap();
                    assert!((0.5..=2.0).contains(&p.density_multiplier));
                    assert!((-127..=127).contains(&p.velocity_bias));
                }
            }
        }
    }
}

#[test]
fn test_pop_rock_scenario_builds_toward_final_chorus() {
    let sections = layout(&[
        (Verse, 8),
        (Verse, 8),
        (Chorus, 8),
        (Verse, 8),
        (Chorus, 8),
        (Chorus, 8),
    ])
    .unwrap();
    for style in ["Pop", "Rock", "Country"] {
        for seed in 0..200 {
            let config = PlanConfig::new(style, seed).with_policy("PopRock");
            let plan = SongPlan::build(&sections, &config).unwrap();
            let e = energies(&plan);

            assert_eq!(plan.arc().form(), SongForm::VerseChorus);
            assert!(e[0] <= e[1] && e[1] <= e[3], "{style}/{seed} verses: {e:?}");
            assert!(e[2] <= e[4] && e[4] <= e[5], "{style}/{seed} choruses: {e:?}");
            let max = e.iter().copied().fold(f64::MIN, f64::max);
            assert!(
                max - e[5] <= 0.05,
                "{style}/{seed} final chorus {} vs max {}",
                e[5],
                max
            );
        }
    }
}

#[test]
fn test_form_override_skips_inference() {
    let sections = full_song();
    let inferred = SongPlan::build(&sections, &PlanConfig::new("Pop", 9)).unwrap();
    assert_eq!(inferred.arc().form(), SongForm::VerseChorusBridge);
    let config = PlanConfig::new("Pop", 9).with_form(SongForm::Strophic);
    let plan = SongPlan::build(&sections, &config).unwrap();
    assert_eq!(plan.arc().form(), SongForm::Strophic);
}

#[test]
fn test_micro_tension_clamps_out_of_range_macro() {
    let map = MicroTensionMap::build(4, 1.5, 0.5, None, 42);
    assert_eq!(map.bar_count(), 4);
    assert!(map.tension_by_bar.iter().all(|&t| (0.0..=1.0).contains(&t)));
    assert!(map.macro_tension <= 1.0);
}

#[test]
fn test_base_references_point_backwards() {
    let sections = full_song();
    for style in STYLES {
        for seed in 0..40 {
            let plan = SongPlan::build(&sections, &PlanConfig::new(style, seed)).unwrap();
            let mut seen: Vec<SectionType> = Vec::new();
            for (i, variation) in plan.variation_plans().iter().enumerate() {
                assert_eq!(variation.absolute_section_index, i);
                if let Some(base) = variation.base_reference_section_index {
                    assert!(base < i);
                    assert_eq!(sections[base].section_type, sections[i].section_type);
                }
                let section_type = sections[i].section_type;
                if !seen.contains(&section_type) {
                    assert_eq!(variation.base_reference_section_index, None);
                    seen.push(section_type);
                }
            }
        }
    }
}

#[test]
fn test_reports_do_not_change_energies() {
    let sections = full_song();
    let plan = SongPlan::build(&sections, &PlanConfig::new("Pop", 7)).unwrap();
    let before = energies(&plan);
    let tension_before = plan.tension().profiles().to_vec();
    for _ in 0..3 {
        let _ = full_report(&plan);
        let _ = summary_report(&plan);
        let _ = compact_report(&plan);
        let _ = energy_chart(&plan);
    }
    assert_eq!(energies(&plan), before);
    assert_eq!(plan.tension().profiles(), tension_before.as_slice());

    let rebuilt = SongPlan::build(&sections, &PlanConfig::new("Pop", 7)).unwrap();
    assert_eq!(energies(&rebuilt), before);
}

#[test]
fn test_phrase_flags_via_query() {
    let sections = layout(&[(Verse, 8), (Bridge, 6), (Intro, 1)]).unwrap();
    let plan = SongPlan::build(&sections, &PlanConfig::new("Pop", 3).with_phrase_length(4))
        .unwrap();
    let tension = plan.tension();
    assert_eq!(tension.micro_tension_map(0).unwrap().phrase_end_bars(), vec![3, 7]);
    assert_eq!(tension.micro_tension_map(1).unwrap().phrase_end_bars(), vec![3, 5]);
    let single = tension.phrase_flags(2, 0).unwrap();
    assert!(single.is_section_start && single.is_section_end && single.is_phrase_end);
    assert!(tension.phrase_flags(2, 1).is_err());
}
