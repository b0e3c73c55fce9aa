// Tension derivation: macro tension per section, per-bar micro tension, and
// transition hints between sections.
//
// Macro tension starts from the resolved section energy and is nudged by
// fixed section-type biases, anticipation of a louder next section, the
// verse-to-chorus lift, and a small seeded jitter. The jitter generator is
// seeded once per derivation and advanced across sections in order, so two
// sections with equal energy still read differently while the whole result
// stays reproducible for a seed.
//
// Each section's micro map is seeded with `seed XOR (index × 397)`.
// Transition hints are computed after all macro tensions exist, because
// each boundary compares a section with its successor.
//
// `TensionQuery` is the read contract that role builders consume;
// `TensionPlan` implements it from real data and `NeutralTensionQuery` from
// flat defaults.

use crate::arc::EnergyArc;
use crate::error::{PlanError, check_section};
use crate::phrase::{MicroTensionMap, PhraseFlags};
use crate::section::{Section, SectionType};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use songarc_prng::{PlanRng, mix_seed};
use std::fmt;

const JITTER_SPAN: f64 = 0.03;
const ANTICIPATION_THRESHOLD: f64 = 0.10;
const ANTICIPATION_CAP: f64 = 0.15;
const ANTICIPATION_GAIN: f64 = 0.7;
const PRE_CHORUS_LIFT: f64 = 0.10;
/// A repeat chorus must beat the previous chorus by more than this to count
/// as building.
const CHORUS_BUILD_MARGIN: f64 = 0.05;

bitflags! {
    /// Why a section's macro tension moved away from its energy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TensionDrivers: u16 {
        const OPENING          = 1 << 0;
        const VERSE_SETTLE     = 1 << 1;
        const CHORUS_RELEASE   = 1 << 2;
        const CHORUS_BUILD     = 1 << 3;
        const BRIDGE_CONTRAST  = 1 << 4;
        const SOLO_LIFT        = 1 << 5;
        const RESOLUTION       = 1 << 6;
        const ANTICIPATION     = 1 << 7;
        const PRE_CHORUS_BUILD = 1 << 8;
    }
}

impl fmt::Display for TensionDrivers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        f.write_str(&names.join("|"))
    }
}

/// Section-level tension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionTensionProfile {
    pub macro_tension: f64,
    pub micro_tension_default: f64,
    pub drivers: TensionDrivers,
    pub absolute_section_index: usize,
}

impl SectionTensionProfile {
    /// Micro default is half the (clamped) macro tension.
    pub fn new(absolute_section_index: usize, macro_tension: f64, drivers: TensionDrivers) -> Self {
        let macro_tension = macro_tension.clamp(0.0, 1.0);
        SectionTensionProfile {
            macro_tension,
            micro_tension_default: macro_tension / 2.0,
            drivers,
            absolute_section_index,
        }
    }

    pub fn with_micro_default(self, micro: f64) -> Self {
        SectionTensionProfile {
            micro_tension_default: micro.clamp(0.0, 1.0),
            ..self
        }
    }
}

/// Feel of the boundary from one section into the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionTransitionHint {
    None,
    Build,
    Release,
    Sustain,
    Drop,
}

/// Classify a boundary from the energy and tension deltas into the next
/// section. The checks run in a fixed order; Drop is tested before the
/// generic rising-energy fallback.
pub fn classify_transition(energy_delta: f64, tension_delta: f64) -> SectionTransitionHint {
    if energy_delta > 0.08 && tension_delta > 0.05 {
        SectionTransitionHint::Build
    } else if energy_delta < -0.12 || tension_delta < -0.15 {
        SectionTransitionHint::Drop
    } else if tension_delta < -0.08 {
        SectionTransitionHint::Release
    } else if energy_delta.abs() < 0.08 && tension_delta.abs() < 0.08 {
        SectionTransitionHint::Sustain
    } else if energy_delta > 0.0 {
        SectionTransitionHint::Build
    } else {
        SectionTransitionHint::Sustain
    }
}

/// Read contract for tension consumers.
///
/// Index-taking methods fail on out-of-range sections or bars; nothing is
/// clamped on this side.
pub trait TensionQuery {
    fn macro_tension(&self, section: usize) -> Result<f64, PlanError>;
    fn micro_tension(&self, section: usize, bar: usize) -> Result<f64, PlanError>;
    fn micro_tension_map(&self, section: usize) -> Result<&MicroTensionMap, PlanError>;
    fn phrase_flags(&self, section: usize, bar: usize) -> Result<PhraseFlags, PlanError>;
    fn transition_hint(&self, section: usize) -> Result<SectionTransitionHint, PlanError>;
    fn has_tension_data(&self) -> bool;
    fn section_count(&self) -> usize;
}

fn bar_error(section: usize, bar: usize, map: &MicroTensionMap) -> PlanError {
    PlanError::BarIndexOutOfRange {
        section,
        bar,
        bar_count: map.bar_count(),
    }
}

/// Derived tension for a whole song.
#[derive(Debug, Clone)]
pub struct TensionPlan {
    profiles: Vec<SectionTensionProfile>,
    maps: Vec<MicroTensionMap>,
    transitions: Vec<SectionTransitionHint>,
}

impl TensionPlan {
    pub fn derive(arc: &EnergyArc, seed: u64) -> TensionPlan {
        Self::derive_with_phrase_length(arc, seed, None)
    }

    pub fn derive_with_phrase_length(
        arc: &EnergyArc,
        seed: u64,
        phrase_length: Option<usize>,
    ) -> TensionPlan {
        let sections = arc.sections();
        let energies = arc.energies();
        let mut rng = PlanRng::new(seed);

        let mut profiles = Vec::with_capacity(sections.len());
        let mut maps = Vec::with_capacity(sections.len());
        for i in 0..sections.len() {
            let (tension, drivers) = section_tension(sections, &energies, i, &mut rng);
            let profile = SectionTensionProfile::new(i, tension, drivers);
            maps.push(MicroTensionMap::build(
                sections[i].bar_count,
                profile.macro_tension,
                profile.micro_tension_default,
                phrase_length,
                mix_seed(seed, i),
            ));
            tracing::debug!(
                section = i,
                energy = energies[i],
                macro_tension = profile.macro_tension,
                drivers = %drivers,
                "derived section tension"
            );
            profiles.push(profile);
        }

        let transitions = (0..sections.len())
            .map(|i| {
                if i + 1 < sections.len() {
                    classify_transition(
                        energies[i + 1] - energies[i],
                        profiles[i + 1].macro_tension - profiles[i].macro_tension,
                    )
                } else {
                    SectionTransitionHint::None
                }
            })
            .collect();

        TensionPlan {
            profiles,
            maps,
            transitions,
        }
    }

    pub fn profile(&self, section: usize) -> Result<&SectionTensionProfile, PlanError> {
        check_section(section, self.profiles.len())?;
        Ok(&self.profiles[section])
    }

    pub fn profiles(&self) -> &[SectionTensionProfile] {
        &self.profiles
    }

    pub fn transitions(&self) -> &[SectionTransitionHint] {
        &self.transitions
    }
}

/// Macro tension (unclamped) and drivers for section `i`.
///
/// Draws exactly one jitter value from `rng`, so callers must visit sections
/// in index order.
fn section_tension(
    sections: &[Section],
    energies: &[f64],
    i: usize,
    rng: &mut PlanRng,
) -> (f64, TensionDrivers) {
    let energy = energies[i].clamp(0.0, 1.0);
    let mut tension = energy;
    let mut drivers = TensionDrivers::empty();

    match sections[i].section_type {
        SectionType::Intro => {
            tension += 0.05;
            drivers |= TensionDrivers::OPENING;
        }
        SectionType::Verse => {
            tension -= 0.05;
            drivers |= TensionDrivers::VERSE_SETTLE;
        }
        SectionType::Chorus => {
            let previous_chorus = (0..i)
                .rev()
                .find(|&j| sections[j].section_type == SectionType::Chorus);
            match previous_chorus {
                Some(j) if energies[i] - energies[j] > CHORUS_BUILD_MARGIN => {
                    tension += 0.03;
                    drivers |= TensionDrivers::CHORUS_BUILD;
                }
                _ => {
                    tension -= 0.08;
                    drivers |= TensionDrivers::CHORUS_RELEASE;
                }
            }
        }
        SectionType::Bridge => {
            tension += 0.12;
            drivers |= TensionDrivers::BRIDGE_CONTRAST;
        }
        SectionType::Solo => {
            tension += 0.07;
            drivers |= TensionDrivers::SOLO_LIFT;
        }
        SectionType::Outro => {
            tension -= 0.15;
            drivers |= TensionDrivers::RESOLUTION;
        }
        SectionType::PreChorus | SectionType::PostChorus | SectionType::Breakdown => {}
    }

    if let Some(&next) = energies.get(i + 1) {
        let rise = next - energies[i];
        if rise > ANTICIPATION_THRESHOLD {
            tension += (ANTICIPATION_GAIN * rise).min(ANTICIPATION_CAP);
            drivers |= TensionDrivers::ANTICIPATION;
        }
    }

    if sections[i].section_type == SectionType::Chorus
        && i > 0
        && sections[i - 1].section_type == SectionType::Verse
    {
        tension += PRE_CHORUS_LIFT;
        drivers |= TensionDrivers::PRE_CHORUS_BUILD | TensionDrivers::ANTICIPATION;
    }

    tension += rng.next_centered() * JITTER_SPAN;
    (tension, drivers)
}

impl TensionQuery for TensionPlan {
    fn macro_tension(&self, section: usize) -> Result<f64, PlanError> {
        Ok(self.profile(section)?.macro_tension)
    }

    fn micro_tension(&self, section: usize, bar: usize) -> Result<f64, PlanError> {
        let map = self.micro_tension_map(section)?;
        map.tension(bar).ok_or_else(|| bar_error(section, bar, map))
    }

    fn micro_tension_map(&self, section: usize) -> Result<&MicroTensionMap, PlanError> {
        check_section(section, self.maps.len())?;
        Ok(&self.maps[section])
    }

    fn phrase_flags(&self, section: usize, bar: usize) -> Result<PhraseFlags, PlanError> {
        let map = self.micro_tension_map(section)?;
        map.flags(bar).ok_or_else(|| bar_error(section, bar, map))
    }

    fn transition_hint(&self, section: usize) -> Result<SectionTransitionHint, PlanError> {
        check_section(section, self.transitions.len())?;
        Ok(self.transitions[section])
    }

    fn has_tension_data(&self) -> bool {
        !self.profiles.is_empty()
    }

    fn section_count(&self) -> usize {
        self.profiles.len()
    }
}

/// Flat tension for callers that have no derived plan.
#[derive(Debug, Clone)]
pub struct NeutralTensionQuery {
    maps: Vec<MicroTensionMap>,
}

impl NeutralTensionQuery {
    pub const MACRO: f64 = 0.5;

    pub fn new(sections: &[Section]) -> Self {
        NeutralTensionQuery {
            maps: sections
                .iter()
                .map(|s| MicroTensionMap::build(s.bar_count, Self::MACRO, Self::MACRO / 2.0, None, 0))
                .collect(),
        }
    }
}

impl TensionQuery for NeutralTensionQuery {
    fn macro_tension(&self, section: usize) -> Result<f64, PlanError> {
        check_section(section, self.maps.len())?;
        Ok(Self::MACRO)
    }

    fn micro_tension(&self, section: usize, bar: usize) -> Result<f64, PlanError> {
        let map = self.micro_tension_map(section)?;
        map.tension(bar).ok_or_else(|| bar_error(section, bar, map))
    }

    fn micro_tension_map(&self, section: usize) -> Result<&MicroTensionMap, PlanError> {
        check_section(section, self.maps.len())?;
        Ok(&self.maps[section])
    }

    fn phrase_flags(&self, section: usize, bar: usize) -> Result<PhraseFlags, PlanError> {
        let map = self.micro_tension_map(section)?;
        map.flags(bar).ok_or_else(|| bar_error(section, bar, map))
    }

    fn transition_hint(&self, section: usize) -> Result<SectionTransitionHint, PlanError> {
        check_section(section, self.maps.len())?;
        Ok(SectionTransitionHint::None)
    }

    fn has_tension_data(&self) -> bool {
        false
    }

    fn section_count(&self) -> usize {
        self.maps.len()
    }
}
