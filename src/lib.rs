//! Scene Layout - positions the objects of a diagram scene
//!
//! This library takes objects with sizes, relationships between them and
//! geometric constraints, and computes positions either with a fast
//! force-directed heuristic or with an exact constraint solver. Wires between
//! related objects are routed around the other objects afterwards.
//!
//! # Example
//!
//! ```rust
//! use scene_layout::{layout, LayoutConfig, Point, Relationship, Scene, SceneObject, Size};
//!
//! let mut scene = Scene::new(400.0, 300.0);
//! scene.add_object(SceneObject::new("battery", Point::new(10.0, 10.0), Size::new(60.0, 40.0))).unwrap();
//! scene.add_object(SceneObject::new("bulb", Point::new(20.0, 15.0), Size::new(40.0, 40.0))).unwrap();
//! scene.add_relationship(Relationship::new("battery", "bulb"));
//!
//! let outcome = layout(&mut scene, LayoutConfig::default()).unwrap();
//! assert!(outcome.succeeded());
//! ```

pub mod error;
pub mod layout;

pub use error::ConfigError;
pub use layout::{
    route_wire, Alignment, Axis, BoundingBox, ConstraintKind, ConstraintSolver, ExactLayout,
    HeuristicLayout, HeuristicReport, LayoutConfig, LayoutConstraint, LayoutEngine, LayoutError,
    LayoutOutcome, LayoutSolution, LayoutStrategy, Point, Priority, Relationship,
    RelationshipKind, Scene, SceneObject, Size, SolveStatus, StrategyKind, WireRouter,
};

/// Lay out a scene in place with the strategy selected by `config`
pub fn layout(scene: &mut Scene, config: LayoutConfig) -> Result<LayoutOutcome, ConfigError> {
    let engine = LayoutEngine::new(config)?;
    Ok(engine.layout(scene))
}
