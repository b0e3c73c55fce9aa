// Songarc energy & tension planner
//
// Plans the large-scale dramatic shape of a procedurally generated song
// before any notes exist. Given an ordered list of typed sections and a
// style name, it decides how intense each section should feel (energy), how
// much harmonic and rhythmic pull toward resolution it carries (tension), how
// both vary bar by bar inside a section, and how repeated sections should be
// varied against their earlier occurrences.
//
// Architecture:
// - section.rs: Section types, song layout, type-local indexing
// - arc_template.rs: Style categories, song forms, energy arc templates and
//   the standard template catalog
// - constraint.rs: Constraint context, rule trait, and the four musical rules
// - policy.rs: Weighted rule policies (strength-weighted blending) and the
//   standard policy catalog
// - arc.rs: Template selection + left-to-right constraint resolution
// - tension.rs: Section tension profiles, drivers, transition hints, and the
//   `TensionQuery` read contract
// - phrase.rs: Phrase boundaries, per-bar micro tension and energy micro arcs
// - hooks.rs: Bounded tension biases for downstream generators
// - variation.rs: A / A′ / B base-reference selection and per-role deltas
// - pipeline.rs: `SongPlan`, which runs every stage and answers queries
// - report.rs: Read-only text diagnostics
// - config.rs: `PlanConfig` and JSON song files
// - error.rs: `PlanError`
//
// Every stage is deterministic given the seed (see `songarc_prng`).

pub mod arc;
pub mod arc_template;
pub mod config;
pub mod constraint;
pub mod error;
pub mod hooks;
pub mod phrase;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod section;
pub mod tension;
pub mod variation;

pub use config::{PlanConfig, SongFile};
pub use error::PlanError;
pub use pipeline::SongPlan;
