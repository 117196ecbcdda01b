//! Layout constraints and their priorities
//!
//! Constraints are plain data. They are never checked against a scene here;
//! the exact solver skips entries naming unknown objects and the lint pass
//! evaluates them against positions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::LayoutError;

/// Tolerance used when a constraint does not set one
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Kind of geometric relation a constraint expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    NoOverlap,
    Distance,
    AlignmentHorizontal,
    AlignmentVertical,
    Symmetry,
    Bounds,
    Centered,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::NoOverlap => "no_overlap",
            ConstraintKind::Distance => "distance",
            ConstraintKind::AlignmentHorizontal => "alignment_horizontal",
            ConstraintKind::AlignmentVertical => "alignment_vertical",
            ConstraintKind::Symmetry => "symmetry",
            ConstraintKind::Bounds => "bounds",
            ConstraintKind::Centered => "centered",
        };
        write!(f, "{}", name)
    }
}

/// Importance of a constraint; `Low` ones are the first to be pruned
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Required,
}

impl Priority {
    pub fn all() -> &'static [Priority] {
        &[
            Priority::Required,
            Priority::High,
            Priority::Medium,
            Priority::Low,
        ]
    }
}

/// Direction used by alignment constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Same y for all objects
    Horizontal,
    /// Same x for all objects
    Vertical,
}

/// Mirror axis of a symmetry constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Axis {
    /// Mirror left/right around the canvas' vertical center line
    #[default]
    Vertical,
    /// Mirror top/bottom around the canvas' horizontal center line
    Horizontal,
}

impl Axis {
    fn as_str(&self) -> &'static str {
        match self {
            Axis::Vertical => "vertical",
            Axis::Horizontal => "horizontal",
        }
    }

    fn parse(s: &str) -> Option<Axis> {
        match s {
            "vertical" | "x" => Some(Axis::Vertical),
            "horizontal" | "y" => Some(Axis::Horizontal),
            _ => None,
        }
    }
}

/// A constraint parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Rectangle limits of a `bounds` constraint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// A constraint in the layout system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConstraint {
    #[serde(rename = "type")]
    pub kind: ConstraintKind,
    pub objects: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl LayoutConstraint {
    /// Create a constraint over a non-empty object list
    pub fn try_new<I, S>(kind: ConstraintKind, objects: I) -> Result<Self, LayoutError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let constraint = Self {
            kind,
            objects: objects.into_iter().map(Into::into).collect(),
            parameters: BTreeMap::new(),
            priority: Priority::default(),
            tolerance: DEFAULT_TOLERANCE,
        };
        constraint.validate()?;
        Ok(constraint)
    }

    /// Like [`LayoutConstraint::try_new`], for object lists known to be
    /// non-empty
    ///
    /// # Panics
    ///
    /// Panics if `objects` is empty.
    pub fn new<I, S>(kind: ConstraintKind, objects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match Self::try_new(kind, objects) {
            Ok(constraint) => constraint,
            Err(e) => panic!("{}: constraint needs at least one object", e),
        }
    }

    /// Structural check shared by construction and deserialization
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.objects.is_empty() {
            return Err(LayoutError::empty_constraint(self.kind.to_string()));
        }
        Ok(())
    }

    /// Pairwise non-overlap among `objects`
    pub fn no_overlap<I, S>(objects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ConstraintKind::NoOverlap, objects)
    }

    /// Center-to-center distance between two objects
    pub fn distance(a: impl Into<String>, b: impl Into<String>, distance: f64) -> Self {
        Self::new(ConstraintKind::Distance, [a.into(), b.into()])
            .with_parameter("distance", distance)
    }

    pub fn alignment<I, S>(objects: I, alignment: Alignment) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = match alignment {
            Alignment::Horizontal => ConstraintKind::AlignmentHorizontal,
            Alignment::Vertical => ConstraintKind::AlignmentVertical,
        };
        Self::new(kind, objects)
    }

    /// Mirror `objects[i]` with `objects[n-1-i]` around a canvas axis
    pub fn symmetry<I, S>(objects: I, axis: Axis) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ConstraintKind::Symmetry, objects).with_parameter("axis", axis.as_str())
    }

    /// Keep every object's rectangle inside the given limits
    pub fn bounds<I, S>(objects: I, min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ConstraintKind::Bounds, objects)
            .with_parameter("min_x", min_x)
            .with_parameter("max_x", max_x)
            .with_parameter("min_y", min_y)
            .with_parameter("max_y", max_y)
    }

    /// Pin an object's center to the canvas center
    pub fn centered(object: impl Into<String>) -> Self {
        Self::new(ConstraintKind::Centered, [object.into()])
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Numeric parameter, if present and numeric
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.parameters.get(key) {
            Some(ParamValue::Number(v)) => Some(*v),
            _ => None,
        }
    }

    /// Text parameter, if present and textual
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.parameters.get(key) {
            Some(ParamValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Target distance of a `distance` constraint
    pub fn target_distance(&self) -> Option<f64> {
        self.number("distance")
    }

    /// Extra gap required by a `no_overlap` constraint
    pub fn margin(&self) -> f64 {
        self.number("margin").unwrap_or(0.0).max(0.0)
    }

    /// Mirror axis of a `symmetry` constraint (vertical when unset or unknown)
    pub fn axis(&self) -> Axis {
        self.text("axis").and_then(Axis::parse).unwrap_or_default()
    }

    /// Limits of a `bounds` constraint; missing sides are unbounded
    pub fn limits(&self) -> Limits {
        Limits {
            min_x: self.number("min_x").unwrap_or(f64::NEG_INFINITY),
            max_x: self.number("max_x").unwrap_or(f64::INFINITY),
            min_y: self.number("min_y").unwrap_or(f64::NEG_INFINITY),
            max_y: self.number("max_y").unwrap_or(f64::INFINITY),
        }
    }
}

impl fmt::Display for LayoutConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.objects.join(", "))
    }
}

/// The constraint model of a scene: global constraints plus constraints
/// attached to individual objects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet {
    global: Vec<LayoutConstraint>,
    per_object: BTreeMap<String, Vec<LayoutConstraint>>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global constraint
    pub fn add(&mut self, constraint: LayoutConstraint) {
        self.global.push(constraint);
    }

    /// Attach a constraint to one object
    pub fn add_for_object(&mut self, object_id: impl Into<String>, constraint: LayoutConstraint) {
        self.per_object
            .entry(object_id.into())
            .or_default()
            .push(constraint);
    }

    /// All constraints: global ones first, then per-object ones by object id
    pub fn all(&self) -> impl Iterator<Item = &LayoutConstraint> {
        self.global
            .iter()
            .chain(self.per_object.values().flat_map(|v| v.iter()))
    }

    /// Constraints attached to one object
    pub fn for_object(&self, object_id: &str) -> &[LayoutConstraint] {
        self.per_object
            .get(object_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn count_by_priority(&self, priority: Priority) -> usize {
        self.all().filter(|c| c.priority == priority).count()
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.per_object.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
