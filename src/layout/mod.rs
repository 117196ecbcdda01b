//! Layout engine for computing object positions
//!
//! This module takes a scene (objects, relationships and constraints on a
//! canvas) and computes positions for its objects, either heuristically or
//! with the exact constraint solver, then routes wires between them.

pub mod canvas;
pub mod collision;
pub mod config;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod exact;
pub mod force;
pub mod lint;
pub mod routing;
pub mod solver;
pub mod types;

pub use canvas::{content_bounds, CanvasFit, CanvasFitter, GridSnapper};
pub use collision::{CollisionReport, CollisionResolver};
pub use config::{
    CanvasConfig, CollisionConfig, ExactConfig, ForceConfig, LayoutConfig, RoutingConfig,
    StrategyKind,
};
pub use constraints::{
    Alignment, Axis, ConstraintKind, ConstraintSet, LayoutConstraint, ParamValue, Priority,
};
pub use engine::{
    ExactLayout, HeuristicLayout, HeuristicReport, LayoutEngine, LayoutOutcome, LayoutStrategy,
};
pub use error::LayoutError;
pub use exact::{ConstraintSolver, LayoutSolution, SolveMetadata, SolveStatus, UnknownReason};
pub use force::{ForceDirectedLayout, ForceReport, ForceSimulation};
pub use lint::{LintCategory, LintWarning};
pub use routing::{route_wire, RoutedWire, WireRouter};
pub use types::*;

use std::collections::BTreeSet;

use log::warn;
use serde::Serialize;

/// Maximum edit distance for "did you mean" suggestions
pub(crate) const SUGGESTION_DISTANCE: usize = 2;

/// Where an unknown object id was referenced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSite {
    Relationship,
    Constraint,
}

/// An object id used by a relationship or constraint that the scene lacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownReference {
    pub name: String,
    pub site: ReferenceSite,
    /// Existing ids close to `name`, closest first
    pub suggestions: Vec<String>,
}

/// List every reference to an object the scene does not contain.
///
/// Unknown references are never fatal: the stages skip them. This collects
/// them in one place and logs each once with suggestions.
pub fn validate_references(scene: &Scene) -> Vec<UnknownReference> {
    let defined: BTreeSet<&str> = scene.objects().iter().map(SceneObject::id).collect();
    let mut unknown = Vec::new();

    let mut note = |name: &str, site: ReferenceSite| {
        if defined.contains(name) {
            return;
        }
        let suggestions = find_similar(defined.iter().copied(), name, SUGGESTION_DISTANCE);
        warn!(
            name = name,
            suggestions = suggestions.join(", ").as_str();
            "Reference to unknown object"
        );
        unknown.push(UnknownReference {
            name: name.to_string(),
            site,
            suggestions,
        });
    };

    for rel in &scene.relationships {
        note(&rel.source_id, ReferenceSite::Relationship);
        note(&rel.target_id, ReferenceSite::Relationship);
    }
    for constraint in scene.constraints.all() {
        for id in &constraint.objects {
            note(id, ReferenceSite::Constraint);
        }
    }
    unknown
}

/// Compute Levenshtein edit distance between two strings
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Single rolling row
    let mut row: Vec<usize> = (0..=n).collect();
    for i in 1..=m {
        let mut diagonal = row[0];
        row[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            let next = (row[j] + 1).min(row[j - 1] + 1).min(diagonal + cost);
            diagonal = row[j];
            row[j] = next;
        }
    }
    row[n]
}

/// Find similar identifiers within a maximum edit distance
pub(crate) fn find_similar<'a>(
    defined: impl IntoIterator<Item = &'a str>,
    target: &str,
    max_distance: usize,
) -> Vec<String> {
    let mut candidates: Vec<(&str, usize)> = defined
        .into_iter()
        .filter_map(|name| {
            let dist = levenshtein_distance(name, target);
            (dist <= max_distance && dist > 0).then_some((name, dist))
        })
        .collect();

    candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    candidates
        .into_iter()
        .map(|(name, _)| name.to_string())
        .take(3)
        .collect()
}
