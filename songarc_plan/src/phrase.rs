// Phrase segmentation and per-bar shaping inside a section.
//
// Both per-bar structures here (`MicroTensionMap` and `SectionEnergyMicroArc`)
// segment a section with the same `infer_phrase_length` and `phrase_flags`,
// so a bar that is a phrase end in one is a phrase end in the other.
//
// Phrase length: an explicit length wins; otherwise 4-bar sections use 2-bar
// phrases and everything else uses 4-bar phrases. The last bar of a section
// always closes a phrase, even mid-phrase.
//
// Tension rises linearly across each phrase from the base value to 1.5x the
// base. Energy deltas follow phrase position (start, middle, peak, cadence)
// scaled by section energy, so louder sections get wider swings.

use crate::arc_template::PhraseOffsets;
use serde::{Deserialize, Serialize};
use songarc_prng::PlanRng;

/// Micro energy deltas never exceed this magnitude.
pub const MAX_ENERGY_DELTA: f64 = 0.10;

/// Phrase position ratio at or above which a non-cadence bar is a peak.
const PEAK_RATIO: f64 = 0.65;

pub fn infer_phrase_length(bar_count: usize, explicit: Option<usize>) -> usize {
    match explicit {
        Some(len) if len > 0 => len,
        _ if bar_count == 4 => 2,
        _ => 4,
    }
}

/// Where a bar sits relative to phrase and section boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseFlags {
    pub bar_in_phrase: usize,
    pub is_phrase_end: bool,
    pub is_section_start: bool,
    pub is_section_end: bool,
}

pub fn phrase_flags(bar: usize, bar_count: usize, phrase_length: usize) -> PhraseFlags {
    let phrase_length = phrase_length.max(1);
    PhraseFlags {
        bar_in_phrase: bar % phrase_length,
        is_phrase_end: (bar + 1) % phrase_length == 0 || bar + 1 == bar_count,
        is_section_start: bar == 0,
        is_section_end: bar + 1 == bar_count,
    }
}

/// Fraction of the way through the phrase, 0 at the first bar and 1 at the
/// last full-phrase bar. Single-bar phrases stay at 0.
fn phrase_ratio(bar_in_phrase: usize, phrase_length: usize) -> f64 {
    if phrase_length <= 1 {
        0.0
    } else {
        bar_in_phrase as f64 / (phrase_length - 1) as f64
    }
}

// ── Tension ──

/// Per-bar tension for one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroTensionMap {
    pub tension_by_bar: Vec<f64>,
    pub is_phrase_end: Vec<bool>,
    pub is_section_start: Vec<bool>,
    pub is_section_end: Vec<bool>,
    pub phrase_length: usize,
    /// Section macro tension the map was built for, clamped.
    pub macro_tension: f64,
}

impl MicroTensionMap {
    /// Shape per-bar tension from `micro_default`, rising to 1.5x across each
    /// phrase. Out-of-range tensions are clamped. A non-zero `seed` adds a
    /// ±0.005 jitter per bar.
    pub fn build(
        bar_count: usize,
        macro_tension: f64,
        micro_default: f64,
        phrase_length: Option<usize>,
        seed: u64,
    ) -> Self {
        let phrase_length = infer_phrase_length(bar_count, phrase_length);
        let base = micro_default.clamp(0.0, 1.0);
        let mut rng = (seed != 0).then(|| PlanRng::new(seed));

        let mut map = MicroTensionMap {
            tension_by_bar: Vec::with_capacity(bar_count),
            is_phrase_end: Vec::with_capacity(bar_count),
            is_section_start: Vec::with_capacity(bar_count),
            is_section_end: Vec::with_capacity(bar_count),
            phrase_length,
            macro_tension: macro_tension.clamp(0.0, 1.0),
        };

        for bar in 0..bar_count {
            let flags = phrase_flags(bar, bar_count, phrase_length);
            let ratio = phrase_ratio(flags.bar_in_phrase, phrase_length);
            let mut tension = base * (1.0 + 0.5 * ratio);
            if let Some(rng) = rng.as_mut() {
                tension += rng.next_centered() * 0.01;
            }
            map.tension_by_bar.push(tension.clamp(0.0, 1.0));
            map.is_phrase_end.push(flags.is_phrase_end);
            map.is_section_start.push(flags.is_section_start);
            map.is_section_end.push(flags.is_section_end);
        }
        map
    }

    pub fn bar_count(&self) -> usize {
        self.tension_by_bar.len()
    }

    pub fn tension(&self, bar: usize) -> Option<f64> {
        self.tension_by_bar.get(bar).copied()
    }

    pub fn flags(&self, bar: usize) -> Option<PhraseFlags> {
        (bar < self.bar_count()).then(|| phrase_flags(bar, self.bar_count(), self.phrase_length))
    }

    pub fn phrase_end_bars(&self) -> Vec<usize> {
        self.is_phrase_end
            .iter()
            .enumerate()
            .filter_map(|(i, &end)| end.then_some(i))
            .collect()
    }
}

// ── Energy ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhrasePosition {
    Start,
    Middle,
    Peak,
    Cadence,
}

impl PhrasePosition {
    pub fn classify(flags: PhraseFlags, phrase_length: usize) -> PhrasePosition {
        if flags.bar_in_phrase == 0 {
            PhrasePosition::Start
        } else if flags.is_phrase_end {
            PhrasePosition::Cadence
        } else if phrase_ratio(flags.bar_in_phrase, phrase_length) >= PEAK_RATIO {
            PhrasePosition::Peak
        } else {
            PhrasePosition::Middle
        }
    }

    /// Multiplier applied to the section's delta scale.
    fn weight(self) -> f64 {
        match self {
            PhrasePosition::Start => 0.0,
            PhrasePosition::Middle => 0.3,
            PhrasePosition::Peak => 1.0,
            PhrasePosition::Cadence => -0.5,
        }
    }

    fn offset(self, offsets: &PhraseOffsets) -> f64 {
        match self {
            PhrasePosition::Start => offsets.start,
            PhrasePosition::Middle => offsets.middle,
            PhrasePosition::Peak => offsets.peak,
            PhrasePosition::Cadence => offsets.cadence,
        }
    }
}

/// Per-bar energy deltas for one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionEnergyMicroArc {
    pub energy_delta_by_bar: Vec<f64>,
    pub phrase_position_by_bar: Vec<PhrasePosition>,
    pub phrase_length: usize,
}

impl SectionEnergyMicroArc {
    /// Delta scale for a section: 0.03 at silence up to 0.10 at full energy.
    pub fn scale_factor(section_energy: f64) -> f64 {
        0.03 + section_energy.clamp(0.0, 1.0) * 0.07
    }

    pub fn build(
        bar_count: usize,
        section_energy: f64,
        phrase_length: Option<usize>,
        phrase_offsets: Option<&PhraseOffsets>,
        seed: u64,
    ) -> Self {
        let phrase_length = infer_phrase_length(bar_count, phrase_length);
        let scale = Self::scale_factor(section_energy);
        let mut rng = (seed != 0).then(|| PlanRng::new(seed));

        let mut arc = SectionEnergyMicroArc {
            energy_delta_by_bar: Vec::with_capacity(bar_count),
            phrase_position_by_bar: Vec::with_capacity(bar_count),
            phrase_length,
        };
        for bar in 0..bar_count {
            let position =
                PhrasePosition::classify(phrase_flags(bar, bar_count, phrase_length), phrase_length);
            let mut delta = position.weight() * scale;
            if let Some(offsets) = phrase_offsets {
                delta += position.offset(offsets);
            }
            if let Some(rng) = rng.as_mut() {
                delta += rng.next_centered() * 0.01;
            }
            arc.energy_delta_by_bar
                .push(delta.clamp(-MAX_ENERGY_DELTA, MAX_ENERGY_DELTA));
            arc.phrase_position_by_bar.push(position);
        }
        tracing::trace!(bar_count, section_energy, scale, "built energy micro arc");
        arc
    }

    pub fn delta(&self, bar: usize) -> Option<f64> {
        self.energy_delta_by_bar.get(bar).copied()
    }

    pub fn position(&self, bar: usize) -> Option<PhrasePosition> {
        self.phrase_position_by_bar.get(bar).copied()
    }
}
