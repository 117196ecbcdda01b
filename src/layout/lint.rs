//! Lint checks for laid-out scenes.
//!
//! Runs after a layout pass to report what is still wrong with the
//! positions: overlapping objects, objects leaving the canvas, and scene
//! constraints that do not hold within their tolerance.

use std::fmt;

use serde::Serialize;

use super::constraints::{Axis, ConstraintKind, LayoutConstraint};
use super::types::{BoundingBox, Scene, SceneObject};

/// Absolute slack for floating point noise from the solvers
const NUMERIC_SLACK: f64 = 1e-6;

/// A lint warning about a layout defect
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LintWarning {
    pub category: LintCategory,
    pub message: String,
}

impl fmt::Display for LintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Category of lint defect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LintCategory {
    Overlap,
    Bounds,
    Constraint,
}

impl fmt::Display for LintCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintCategory::Overlap => write!(f, "overlap"),
            LintCategory::Bounds => write!(f, "bounds"),
            LintCategory::Constraint => write!(f, "constraint"),
        }
    }
}

/// Run all lint checks on a laid-out scene.
pub fn check(scene: &Scene) -> Vec<LintWarning> {
    let mut warnings = Vec::new();
    check_overlaps(scene.objects(), &mut warnings);
    check_bounds(scene, &mut warnings);
    warnings.extend(check_constraints(scene));
    warnings
}

// ── Overlap detection ─────────────────────────────────────────────

fn check_overlaps(objects: &[SceneObject], warnings: &mut Vec<LintWarning>) {
    for i in 0..objects.len() {
        for j in (i + 1)..objects.len() {
            let (a, b) = (&objects[i], &objects[j]);
            if let Some((w, h)) = a.bounds().overlap_extent(&b.bounds()) {
                if w.min(h) <= NUMERIC_SLACK {
                    continue;
                }
                warnings.push(LintWarning {
                    category: LintCategory::Overlap,
                    message: format!(
                        "objects \"{}\" and \"{}\" overlap by {:.0}x{:.0}px",
                        a.id(),
                        b.id(),
                        w,
                        h
                    ),
                });
            }
        }
    }
}

// ── Canvas bounds ─────────────────────────────────────────────────

fn check_bounds(scene: &Scene, warnings: &mut Vec<LintWarning>) {
    let canvas = BoundingBox::new(0.0, 0.0, scene.width, scene.height);
    for object in scene.objects() {
        let b = object.bounds();
        let outside = b.x < canvas.x - NUMERIC_SLACK
            || b.y < canvas.y - NUMERIC_SLACK
            || b.right() > canvas.right() + NUMERIC_SLACK
            || b.bottom() > canvas.bottom() + NUMERIC_SLACK;
        if outside {
            warnings.push(LintWarning {
                category: LintCategory::Bounds,
                message: format!(
                    "object \"{}\" at ({:.0}, {:.0}) size {:.0}x{:.0} leaves the {:.0}x{:.0} canvas",
                    object.id(),
                    b.x,
                    b.y,
                    b.width,
                    b.height,
                    scene.width,
                    scene.height
                ),
            });
        }
    }
}

// ── Constraint evaluation ─────────────────────────────────────────

/// How well a constraint holds for the current positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub satisfied: bool,
    /// Largest violation in pixels; zero when fully satisfied
    pub error: f64,
}

/// One warning per scene constraint that does not hold
pub fn check_constraints(scene: &Scene) -> Vec<LintWarning> {
    scene
        .constraints
        .all()
        .filter_map(|constraint| {
            let eval = evaluate(constraint, scene)?;
            (!eval.satisfied).then(|| LintWarning {
                category: LintCategory::Constraint,
                message: format!(
                    "{} violated by {:.3}px (tolerance {})",
                    constraint, eval.error, constraint.tolerance
                ),
            })
        })
        .collect()
}

/// Evaluate one constraint against the scene's positions.
///
/// Returns `None` when the constraint cannot be evaluated: an unknown object,
/// or a distance constraint without a target.
pub fn evaluate(constraint: &LayoutConstraint, scene: &Scene) -> Option<Evaluation> {
    let objects: Vec<&SceneObject> = constraint
        .objects
        .iter()
        .map(|id| scene.object(id))
        .collect::<Option<_>>()?;
    let first = objects.first()?;

    let error = match constraint.kind {
        ConstraintKind::NoOverlap => {
            let gap = constraint.margin();
            pairs(&objects)
                .map(|(a, b)| separation_shortfall(&a.bounds(), &b.bounds(), gap))
                .fold(0.0, f64::max)
        }
        ConstraintKind::Distance => {
            let target = constraint.target_distance()?;
            objects
                .windows(2)
                .map(|w| (w[0].center().distance_to(w[1].center()) - target).abs())
                .fold(0.0, f64::max)
        }
        ConstraintKind::AlignmentHorizontal => objects
            .iter()
            .map(|o| (o.position.y - first.position.y).abs())
            .fold(0.0, f64::max),
        ConstraintKind::AlignmentVertical => objects
            .iter()
            .map(|o| (o.position.x - first.position.x).abs())
            .fold(0.0, f64::max),
        ConstraintKind::Symmetry => {
            let n = objects.len();
            (0..(n + 1) / 2)
                .map(|p| {
                    let (ci, cj) = (objects[p].center(), objects[n - 1 - p].center());
                    match constraint.axis() {
                        Axis::Vertical => (ci.x + cj.x - scene.width).abs(),
                        Axis::Horizontal => (ci.y + cj.y - scene.height).abs(),
                    }
                })
                .fold(0.0, f64::max)
        }
        ConstraintKind::Bounds => {
            let limits = constraint.limits();
            objects
                .iter()
                .map(|o| {
                    let b = o.bounds();
                    // Infinite limits contribute negative excess
                    [
                        limits.min_x - b.x,
                        b.right() - limits.max_x,
                        limits.min_y - b.y,
                        b.bottom() - limits.max_y,
                    ]
                    .into_iter()
                    .fold(0.0, f64::max)
                })
                .fold(0.0, f64::max)
        }
        ConstraintKind::Centered => {
            let center = scene.center();
            objects
                .iter()
                .map(|o| {
                    let c = o.center();
                    (c.x - center.x).abs().max((c.y - center.y).abs())
                })
                .fold(0.0, f64::max)
        }
    };

    Some(Evaluation {
        satisfied: error <= constraint.tolerance.max(0.0) + NUMERIC_SLACK,
        error,
    })
}

fn pairs<'a>(
    objects: &'a [&'a SceneObject],
) -> impl Iterator<Item = (&'a SceneObject, &'a SceneObject)> + 'a {
    objects.iter().enumerate().flat_map(move |(i, a)| {
        objects[i + 1..]
            .iter()
            .filter(move |b| b.id() != a.id())
            .map(move |b| (*a, *b))
    })
}

/// How far two boxes are from being `gap` apart along their best axis
fn separation_shortfall(a: &BoundingBox, b: &BoundingBox, gap: f64) -> f64 {
    let slack = (b.x - a.right())
        .max(a.x - b.right())
        .max(b.y - a.bottom())
        .max(a.y - b.bottom());
    (gap - slack).max(0.0)
}
