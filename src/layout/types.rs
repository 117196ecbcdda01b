//! Core types for the layout engine

use std::collections::HashMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use super::constraints::{ConstraintSet, LayoutConstraint};
use super::error::LayoutError;

/// A 2D point in the coordinate system (y grows downwards)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Same point with x and y exchanged
    pub fn transposed(&self) -> Point {
        Point::new(self.y, self.x)
    }
}

/// Width and height of an object
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A bounding box representing the spatial extent of an object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box spanning two opposite corners, in any order
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let x = x1.min(x2);
        let y = y1.min(y2);
        Self::new(x, y, (x2 - x1).abs(), (y2 - y1).abs())
    }

    /// Smallest box containing a segment
    pub fn of_segment(a: Point, b: Point) -> Self {
        Self::from_corners(a.x, a.y, b.x, b.y)
    }

    /// Create a zero-sized bounding box at the origin
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Right edge x-coordinate
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Center point of the bounding box
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    /// Grow the box by `padding` on every side
    pub fn padded(&self, padding: f64) -> BoundingBox {
        BoundingBox::new(
            self.x - padding,
            self.y - padding,
            self.width + 2.0 * padding,
            self.height + 2.0 * padding,
        )
    }

    /// Check if this bounding box contains a point
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.right()
            && point.y >= self.y
            && point.y <= self.bottom()
    }

    /// Check if this bounding box intersects another
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Width and height of the intersection, if any
    pub fn overlap_extent(&self, other: &BoundingBox) -> Option<(f64, f64)> {
        if !self.intersects(other) {
            return None;
        }
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        Some((w, h))
    }

    /// Compute the union of two bounding boxes (smallest box containing both)
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox::new(x, y, right - x, bottom - y)
    }

    /// Same box with x and y exchanged
    pub fn transposed(&self) -> BoundingBox {
        BoundingBox::new(self.y, self.x, self.height, self.width)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::zero()
    }
}

/// Canvas margins in CSS order: top, right, bottom, left
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margins {
    pub fn new(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn uniform(margin: f64) -> Self {
        Self::new(margin, margin, margin, margin)
    }
}

impl From<[f64; 4]> for Margins {
    fn from([top, right, bottom, left]: [f64; 4]) -> Self {
        Self::new(top, right, bottom, left)
    }
}

impl From<Margins> for [f64; 4] {
    fn from(m: Margins) -> Self {
        [m.top, m.right, m.bottom, m.left]
    }
}

/// A positioned object of the scene.
///
/// `position` is the top-left corner. Layout passes mutate `position` only;
/// the id is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    id: String,
    pub position: Point,
    pub size: Size,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
}

impl SceneObject {
    pub fn new(id: impl Into<String>, position: Point, size: Size) -> Self {
        let id = id.into();
        let position = Point::new(
            finite_or_zero(&id, "x", position.x),
            finite_or_zero(&id, "y", position.y),
        );
        let size = Size::new(
            finite_or_zero(&id, "width", size.width).max(0.0),
            finite_or_zero(&id, "height", size.height).max(0.0),
        );
        Self {
            id,
            position,
            size,
            rotation: None,
        }
    }

    /// Set the rotation in degrees
    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = Some(degrees);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Rectangle occupied by the object
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.position.x,
            self.position.y,
            self.size.width,
            self.size.height,
        )
    }

    pub fn center(&self) -> Point {
        self.bounds().center()
    }

    /// Move the object by a delta
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.position.x += dx;
        self.position.y += dy;
    }
}

fn finite_or_zero(id: &str, field: &str, value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        warn!(object = id, field = field; "Non-finite value clamped to 0");
        0.0
    }
}

/// Semantic type of a relationship
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    #[default]
    Connected,
    Series,
    Parallel,
    Other(String),
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipKind::Connected => write!(f, "connected"),
            RelationshipKind::Series => write!(f, "series"),
            RelationshipKind::Parallel => write!(f, "parallel"),
            RelationshipKind::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A directed edge between two objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    #[serde(default, rename = "type")]
    pub kind: RelationshipKind,
}

impl Relationship {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind: RelationshipKind::Connected,
        }
    }

    pub fn with_kind(mut self, kind: RelationshipKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Objects, relationships and constraints to lay out on a canvas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SceneDescription", into = "SceneDescription")]
pub struct Scene {
    pub width: f64,
    pub height: f64,
    pub margins: Margins,
    pub grid_size: f64,
    pub min_spacing: f64,
    objects: Vec<SceneObject>,
    index: HashMap<String, usize>,
    pub relationships: Vec<Relationship>,
    pub constraints: ConstraintSet,
}

impl Scene {
    /// Create an empty scene with default grid (10) and spacing (20)
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            margins: Margins::default(),
            grid_size: 10.0,
            min_spacing: 20.0,
            objects: Vec::new(),
            index: HashMap::new(),
            relationships: Vec::new(),
            constraints: ConstraintSet::new(),
        }
    }

    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn with_grid_size(mut self, grid_size: f64) -> Self {
        self.grid_size = grid_size;
        self
    }

    pub fn with_min_spacing(mut self, min_spacing: f64) -> Self {
        self.min_spacing = min_spacing;
        self
    }

    /// Add an object; ids must be unique within the scene
    pub fn add_object(&mut self, object: SceneObject) -> Result<(), LayoutError> {
        if self.index.contains_key(object.id()) {
            return Err(LayoutError::duplicate(object.id()));
        }
        self.index.insert(object.id.clone(), self.objects.len());
        self.objects.push(object);
        Ok(())
    }

    pub fn add_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    pub fn add_constraint(&mut self, constraint: LayoutConstraint) {
        self.constraints.add(constraint);
    }

    /// Objects in insertion order
    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    /// Mutable access to objects; positions may change, the set may not
    pub fn objects_mut(&mut self) -> &mut [SceneObject] {
        &mut self.objects
    }

    pub fn object(&self, id: &str) -> Option<&SceneObject> {
        self.index.get(id).map(|&i| &self.objects[i])
    }

    pub fn object_mut(&mut self, id: &str) -> Option<&mut SceneObject> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.objects[i]),
            None => None,
        }
    }

    /// Position of an object in `objects()`
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    /// The canvas area inside the margins
    pub fn content_area(&self) -> BoundingBox {
        BoundingBox::new(
            self.margins.left,
            self.margins.top,
            (self.width - self.margins.left - self.margins.right).max(0.0),
            (self.height - self.margins.top - self.margins.bottom).max(0.0),
        )
    }

    /// Split borrow used by pipeline stages that read relationships while
    /// mutating positions
    pub(crate) fn parts_mut(&mut self) -> (&mut [SceneObject], &[Relationship]) {
        (&mut self.objects, &self.relationships)
    }
}

/// Serialized form of a scene, validated on conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDescription {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub margins: Margins,
    #[serde(default = "default_grid_size")]
    pub grid_size: f64,
    #[serde(default = "default_min_spacing")]
    pub min_spacing: f64,
    #[serde(default)]
    pub objects: Vec<SceneObject>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub constraints: Vec<LayoutConstraint>,
}

fn default_grid_size() -> f64 {
    10.0
}

fn default_min_spacing() -> f64 {
    20.0
}

impl TryFrom<SceneDescription> for Scene {
    type Error = LayoutError;

    fn try_from(desc: SceneDescription) -> Result<Self, Self::Error> {
        let mut scene = Scene::new(desc.width, desc.height)
            .with_margins(desc.margins)
            .with_grid_size(desc.grid_size)
            .with_min_spacing(desc.min_spacing);
        for object in desc.objects {
            // Re-run construction so non-finite input gets clamped
            let mut clean = SceneObject::new(object.id, object.position, object.size);
            clean.rotation = object.rotation;
            scene.add_object(clean)?;
        }
        scene.relationships = desc.relationships;
        for constraint in desc.constraints {
            constraint.validate()?;
            scene.constraints.add(constraint);
        }
        Ok(scene)
    }
}

impl From<Scene> for SceneDescription {
    fn from(scene: Scene) -> Self {
        SceneDescription {
            width: scene.width,
            height: scene.height,
            margins: scene.margins,
            grid_size: scene.grid_size,
            min_spacing: scene.min_spacing,
            constraints: scene.constraints.all().cloned().collect(),
            objects: scene.objects,
            relationships: scene.relationships,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_intersects() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        let c = BoundingBox::new(10.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&b));
        // Touching edges do not count as overlap
        assert!(!a.intersects(&c));
        assert_eq!(a.overlap_extent(&b), Some((5.0, 5.0)));
    }

    #[test]
    fn test_from_corners_normalizes() {
        let b = BoundingBox::from_corners(60.0, 10.0, 40.0, -10.0);
        assert_eq!(b, BoundingBox::new(40.0, -10.0, 20.0, 20.0));
    }

    #[test]
    fn test_non_finite_values_clamped() {
        let obj = SceneObject::new(
            "a",
            Point::new(f64::NAN, 5.0),
            Size::new(f64::INFINITY, -3.0),
        );
        assert_eq!(obj.position, Point::new(0.0, 5.0));
        assert_eq!(obj.size, Size::new(0.0, 0.0));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut scene = Scene::new(100.0, 100.0);
        scene
            .add_object(SceneObject::new("a", Point::default(), Size::new(1.0, 1.0)))
            .unwrap();
        let err = scene
            .add_object(SceneObject::new("a", Point::default(), Size::new(1.0, 1.0)))
            .unwrap_err();
        assert!(err.to_string().contains("'a'"));
        assert_eq!(scene.objects().len(), 1);
    }

    #[test]
    fn test_scene_from_toml() {
        let src = r#"
width = 400.0
height = 300.0
margins = [10.0, 20.0, 30.0, 40.0]

[[objects]]
id = "r1"
position = { x = 10.0, y = 20.0 }
size = { width = 50.0, height = 25.0 }

[[relationships]]
source_id = "r1"
target_id = "r2"
type = "series"
"#;
        let scene: Scene = toml::from_str(src).unwrap();
        assert_eq!(scene.margins, Margins::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(scene.grid_size, 10.0);
        assert_eq!(scene.object("r1").unwrap().size, Size::new(50.0, 25.0));
        assert_eq!(scene.relationships[0].kind, RelationshipKind::Series);
    }

    #[test]
    fn test_scene_toml_duplicate_ids_fail() {
        let src = r#"
width = 100.0
height = 100.0

[[objects]]
id = "a"
position = { x = 0.0, y = 0.0 }
size = { width = 1.0, height = 1.0 }

[[objects]]
id = "a"
position = { x = 5.0, y = 0.0 }
size = { width = 1.0, height = 1.0 }
"#;
        assert!(toml::from_str::<Scene>(src).is_err());
    }

    #[test]
    fn test_empty_constraint_rejected_like_try_new() {
        let src = r#"
width = 100.0
height = 100.0

[[constraints]]
type = "no_overlap"
objects = []
"#;
        let err = toml::from_str::<Scene>(src).unwrap_err();
        let expected = LayoutError::empty_constraint("no_overlap").to_string();
        assert!(err.to_string().contains(&expected), "{}", err);
    }
}
