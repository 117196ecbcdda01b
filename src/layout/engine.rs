//! Layout engine
//!
//! Selects a [`LayoutStrategy`] from the configuration and runs it on a
//! scene. Two strategies ship with the crate:
//!
//! - [`HeuristicLayout`]: force simulation, collision resolution, grid
//!   snapping, canvas fitting and centering. Always produces positions.
//! - [`ExactLayout`]: the constraint solver. Positions are only written back
//!   when the constraints are satisfiable.
//!
//! Wires are routed separately with [`LayoutEngine::route_wires`] once
//! positions are final.

use std::fmt;

use log::{debug, info, warn};

use crate::error::ConfigError;

use super::canvas::{CanvasFit, CanvasFitter, GridSnapper};
use super::collision::{CollisionReport, CollisionResolver};
use super::config::{LayoutConfig, StrategyKind};
use super::exact::{ConstraintSolver, LayoutSolution};
use super::force::{ForceDirectedLayout, ForceReport};
use super::lint::{self, LintWarning};
use super::routing::{route_relationships, RoutedWire, WireRouter};
use super::types::Scene;
use super::{validate_references, UnknownReference};

/// A way of computing positions for a scene
pub trait LayoutStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Lay out the scene in place
    fn layout(&self, scene: &mut Scene) -> LayoutOutcome;
}

/// What a strategy reports back
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutOutcome {
    Heuristic(HeuristicReport),
    Exact(LayoutSolution),
}

impl LayoutOutcome {
    /// Whether the scene now holds the strategy's positions
    pub fn succeeded(&self) -> bool {
        match self {
            LayoutOutcome::Heuristic(_) => true,
            LayoutOutcome::Exact(solution) => solution.satisfiable,
        }
    }

    pub fn heuristic(&self) -> Option<&HeuristicReport> {
        match self {
            LayoutOutcome::Heuristic(report) => Some(report),
            LayoutOutcome::Exact(_) => None,
        }
    }

    pub fn solution(&self) -> Option<&LayoutSolution> {
        match self {
            LayoutOutcome::Exact(solution) => Some(solution),
            LayoutOutcome::Heuristic(_) => None,
        }
    }
}

/// Per-stage results of the heuristic pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicReport {
    pub force: ForceReport,
    pub collision: CollisionReport,
    pub canvas: CanvasFit,
    /// Defects left after the last stage
    pub warnings: Vec<LintWarning>,
    pub unknown_references: Vec<UnknownReference>,
}

/// Force simulation followed by collision resolution, snapping and canvas
/// fitting
#[derive(Debug, Clone, Default)]
pub struct HeuristicLayout {
    config: LayoutConfig,
}

impl HeuristicLayout {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }
}

impl LayoutStrategy for HeuristicLayout {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn layout(&self, scene: &mut Scene) -> LayoutOutcome {
        let unknown_references = validate_references(scene);

        let area = scene.content_area();
        let center = scene.center();
        let (objects, relationships) = scene.parts_mut();
        let force = ForceDirectedLayout::new(self.config.force.clone()).run(
            objects,
            relationships,
            area,
            center,
        );

        let collision = CollisionResolver::new(scene.min_spacing, self.config.collision.max_iterations)
            .resolve(scene.objects_mut());

        if self.config.canvas.snap_to_grid {
            GridSnapper::new(scene.grid_size).snap(scene.objects_mut());
        }

        let fitter = CanvasFitter::new(self.config.canvas.margin);
        let canvas = fitter.fit(scene.objects(), scene.width, scene.height);
        scene.width = canvas.width;
        scene.height = canvas.height;
        if self.config.canvas.center {
            let center = scene.center();
            fitter.center(scene.objects_mut(), center);
        }

        let warnings = lint::check(scene);
        for warning in &warnings {
            debug!(category = warning.category.to_string().as_str(); "{}", warning.message);
        }

        LayoutOutcome::Heuristic(HeuristicReport {
            force,
            collision,
            canvas,
            warnings,
            unknown_references,
        })
    }
}

/// Exact constraint solving; the scene is only touched on success
#[derive(Debug, Clone, Default)]
pub struct ExactLayout {
    solver: ConstraintSolver,
}

impl ExactLayout {
    pub fn new(solver: ConstraintSolver) -> Self {
        Self { solver }
    }
}

impl LayoutStrategy for ExactLayout {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn layout(&self, scene: &mut Scene) -> LayoutOutcome {
        let solution = self.solver.solve(scene);
        if solution.satisfiable {
            let applied = solution.apply(scene);
            debug!(applied = applied; "Exact positions applied");
        } else {
            warn!(
                reason = solution.reason().unwrap_or("unknown");
                "Exact layout failed, scene left unchanged"
            );
        }
        LayoutOutcome::Exact(solution)
    }
}

/// Entry point: a validated configuration plus the strategy it selects
pub struct LayoutEngine {
    config: LayoutConfig,
    strategy: Box<dyn LayoutStrategy>,
}

impl fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("config", &self.config)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl Default for LayoutEngine {
    fn default() -> Self {
        let config = LayoutConfig::default();
        let strategy = strategy_for(&config);
        Self { config, strategy }
    }
}

fn strategy_for(config: &LayoutConfig) -> Box<dyn LayoutStrategy> {
    match config.strategy {
        StrategyKind::Heuristic => Box::new(HeuristicLayout::new(config.clone())),
        StrategyKind::Exact => Box::new(ExactLayout::new(ConstraintSolver::new(config.exact.clone()))),
    }
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let strategy = strategy_for(&config);
        Ok(Self { config, strategy })
    }

    /// Replace the configured strategy
    pub fn with_strategy(mut self, strategy: impl LayoutStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Compute positions for the scene in place
    pub fn layout(&self, scene: &mut Scene) -> LayoutOutcome {
        info!(
            strategy = self.strategy.name(),
            objects = scene.objects().len(),
            constraints = scene.constraints.len();
            "Laying out scene"
        );
        self.strategy.layout(scene)
    }

    /// Route every relationship around the other objects
    pub fn route_wires(&self, scene: &Scene) -> Vec<RoutedWire> {
        route_relationships(scene, &WireRouter::new(self.config.routing.padding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::config::ExactConfig;
    use crate::layout::constraints::LayoutConstraint;
    use crate::layout::types::{Point, Relationship, SceneObject, Size};

    fn overlapping_scene() -> Scene {
        let mut scene = Scene::new(800.0, 600.0);
        scene
            .add_object(SceneObject::new("a", Point::new(100.0, 100.0), Size::new(50.0, 50.0)))
            .unwrap();
        scene
            .add_object(SceneObject::new("b", Point::new(120.0, 100.0), Size::new(50.0, 50.0)))
            .unwrap();
        scene.add_relationship(Relationship::new("a", "b"));
        scene
    }

    #[test]
    fn test_default_engine_is_heuristic() {
        let engine = LayoutEngine::default();
        assert_eq!(engine.strategy_name(), "heuristic");
    }

    #[test]
    fn test_config_selects_strategy() {
        let config = LayoutConfig::default().with_strategy(StrategyKind::Exact);
        let engine = LayoutEngine::new(config).unwrap();
        assert_eq!(engine.strategy_name(), "exact");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = LayoutConfig::default();
        config.force.damping = 1.5;
        assert!(LayoutEngine::new(config).is_err());
    }

    #[test]
    fn test_heuristic_separates_overlap() {
        let mut scene = overlapping_scene();
        let outcome = LayoutEngine::default().layout(&mut scene);
        assert!(outcome.succeeded());
        let report = outcome.heuristic().unwrap();
        assert!(report.collision.converged);
        assert!(report.unknown_references.is_empty());
        let a = scene.object("a").unwrap().bounds();
        let b = scene.object("b").unwrap().bounds();
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_exact_failure_leaves_scene() {
        let mut scene = overlapping_scene();
        scene.add_constraint(LayoutConstraint::centered("a"));
        scene.add_constraint(LayoutConstraint::centered("b"));
        let engine = LayoutEngine::default().with_strategy(ExactLayout::default());
        let outcome = engine.layout(&mut scene);
        assert!(!outcome.succeeded());
        assert_eq!(outcome.solution().unwrap().reason(), Some("unsatisfiable"));
        assert_eq!(scene.object("a").unwrap().position, Point::new(100.0, 100.0));
    }

    #[test]
    fn test_exact_success_applies_positions() {
        let mut scene = overlapping_scene();
        scene.add_constraint(LayoutConstraint::centered("a"));
        let engine = LayoutEngine::default()
            .with_strategy(ExactLayout::new(ConstraintSolver::new(ExactConfig::default())));
        let outcome = engine.layout(&mut scene);
        assert!(outcome.succeeded());
        let a = scene.object("a").unwrap().position;
        assert!((a.x - 375.0).abs() < 1e-6 && (a.y - 275.0).abs() < 1e-6, "{:?}", a);
        assert!(lint::check(&scene).is_empty());
    }

    struct Frozen;

    impl LayoutStrategy for Frozen {
        fn name(&self) -> &'static str {
            "frozen"
        }

        fn layout(&self, scene: &mut Scene) -> LayoutOutcome {
            LayoutOutcome::Exact(ConstraintSolver::default().solve(scene))
        }
    }

    #[test]
    fn test_custom_strategy() {
        let engine = LayoutEngine::default().with_strategy(Frozen);
        assert_eq!(engine.strategy_name(), "frozen");
        let mut scene = overlapping_scene();
        engine.layout(&mut scene);
        assert_eq!(scene.object("b").unwrap().position, Point::new(120.0, 100.0));
    }

    #[test]
    fn test_route_wires_between_objects() {
        let mut scene = Scene::new(400.0, 300.0);
        scene
            .add_object(SceneObject::new("a", Point::new(0.0, 0.0), Size::new(20.0, 20.0)))
            .unwrap();
        scene
            .add_object(SceneObject::new("b", Point::new(200.0, 0.0), Size::new(20.0, 20.0)))
            .unwrap();
        scene.add_relationship(Relationship::new("a", "b"));
        scene.add_relationship(Relationship::new("a", "ghost"));
        let wires = LayoutEngine::default().route_wires(&scene);
        assert_eq!(wires.len(), 1);
        assert_eq!(wires[0].points.first(), Some(&Point::new(20.0, 10.0)));
        assert_eq!(wires[0].points.last(), Some(&Point::new(200.0, 10.0)));
    }
}
