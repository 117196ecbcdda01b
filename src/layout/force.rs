//! Force-directed placement
//!
//! A small physics simulation: every pair of objects repels, related objects
//! attract, and everything is pulled towards the canvas center. Forces act
//! on object centers. After each step the top-left position is clamped into
//! the canvas area inside the margins, which is the only hard guarantee this
//! stage gives; overlaps are left to the collision resolver.

use log::debug;

use super::config::ForceConfig;
use super::types::{BoundingBox, Point, Relationship, SceneObject};

/// Summary of a finished simulation
#[derive(Debug, Clone, PartialEq)]
pub struct ForceReport {
    pub iterations: usize,
    /// Largest single-object displacement in the final iteration
    pub final_displacement: f64,
    /// Relationships skipped because an endpoint does not exist
    pub skipped_relationships: usize,
}

/// Force-directed layout stage.
///
/// Mutates object positions in place and preserves the object set and ids.
#[derive(Debug, Clone)]
pub struct ForceDirectedLayout {
    config: ForceConfig,
}

impl ForceDirectedLayout {
    pub fn new(config: ForceConfig) -> Self {
        Self { config }
    }

    /// Run the configured number of iterations
    pub fn run(
        &self,
        objects: &mut [SceneObject],
        relationships: &[Relationship],
        area: BoundingBox,
        center: Point,
    ) -> ForceReport {
        let mut sim = ForceSimulation::new(&self.config, objects, relationships, area, center);
        let mut final_displacement = 0.0;
        for _ in 0..self.config.iterations {
            final_displacement = sim.step(objects);
        }
        debug!(
            iterations = self.config.iterations,
            final_displacement = final_displacement;
            "Force simulation finished"
        );
        ForceReport {
            iterations: self.config.iterations,
            final_displacement,
            skipped_relationships: sim.skipped_relationships,
        }
    }
}

impl Default for ForceDirectedLayout {
    fn default() -> Self {
        Self::new(ForceConfig::default())
    }
}

/// Simulation state: one velocity per object plus resolved edges.
///
/// The object slice passed to [`ForceSimulation::step`] must be the one the
/// simulation was created for.
pub struct ForceSimulation {
    config: ForceConfig,
    velocities: Vec<Point>,
    edges: Vec<(usize, usize)>,
    area: BoundingBox,
    center: Point,
    skipped_relationships: usize,
}

impl ForceSimulation {
    pub fn new(
        config: &ForceConfig,
        objects: &[SceneObject],
        relationships: &[Relationship],
        area: BoundingBox,
        center: Point,
    ) -> Self {
        let mut edges = Vec::new();
        let mut skipped = 0;
        for rel in relationships {
            let source = objects.iter().position(|o| o.id() == rel.source_id);
            let target = objects.iter().position(|o| o.id() == rel.target_id);
            match (source, target) {
                (Some(s), Some(t)) if s != t => edges.push((s, t)),
                (Some(_), Some(_)) => {}
                _ => {
                    // Reported to the user by validate_references
                    debug!(
                        source = rel.source_id.as_str(),
                        target = rel.target_id.as_str();
                        "Skipping relationship with unknown endpoint"
                    );
                    skipped += 1;
                }
            }
        }
        Self {
            config: config.clone(),
            velocities: vec![Point::default(); objects.len()],
            edges,
            area,
            center,
            skipped_relationships: skipped,
        }
    }

    /// Advance one iteration; returns the largest displacement
    pub fn step(&mut self, objects: &mut [SceneObject]) -> f64 {
        let n = objects.len();
        if n == 0 {
            return 0.0;
        }
        let centers: Vec<Point> = objects.iter().map(SceneObject::center).collect();
        let mut forces = vec![Point::default(); n];

        for i in 0..n {
            for j in (i + 1)..n {
                let (ux, uy, d) = separation(centers[i], centers[j]);
                let magnitude = self.config.k_repulsion / (d * d);
                forces[i].x -= ux * magnitude;
                forces[i].y -= uy * magnitude;
                forces[j].x += ux * magnitude;
                forces[j].y += uy * magnitude;
            }
        }

        for &(s, t) in &self.edges {
            let dx = centers[t].x - centers[s].x;
            let dy = centers[t].y - centers[s].y;
            // Hooke: magnitude d * k along the unit vector is just (dx, dy) * k
            forces[s].x += dx * self.config.k_attraction;
            forces[s].y += dy * self.config.k_attraction;
            forces[t].x -= dx * self.config.k_attraction;
            forces[t].y -= dy * self.config.k_attraction;
        }

        let mut max_displacement: f64 = 0.0;
        for (i, object) in objects.iter_mut().enumerate() {
            forces[i].x += (self.center.x - centers[i].x) * self.config.k_center;
            forces[i].y += (self.center.y - centers[i].y) * self.config.k_center;

            let v = &mut self.velocities[i];
            v.x = (v.x + forces[i].x) * self.config.damping;
            v.y = (v.y + forces[i].y) * self.config.damping;
            if !v.x.is_finite() || !v.y.is_finite() {
                *v = Point::default();
            }

            let before = object.position;
            object.position.x = clamp(before.x + v.x, self.area.x, self.area.right());
            object.position.y = clamp(before.y + v.y, self.area.y, self.area.bottom());
            max_displacement = max_displacement.max(before.distance_to(object.position));
        }
        max_displacement
    }
}

/// Unit vector from `a` to `b` and the distance, floored at 1.
///
/// Coincident points separate along +x so that the earlier object moves left.
fn separation(a: Point, b: Point) -> (f64, f64, f64) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let raw = dx.hypot(dy);
    if raw < f64::EPSILON {
        return (1.0, 0.0, 1.0);
    }
    (dx / raw, dy / raw, raw.max(1.0))
}

/// Clamp into `[lo, hi]`, preferring `lo` when the range is empty.
/// NaN maps to `lo`.
pub(crate) fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    let hi = hi.max(lo);
    value.max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::types::Size;

    fn obj(id: &str, x: f64, y: f64) -> SceneObject {
        SceneObject::new(id, Point::new(x, y), Size::new(20.0, 20.0))
    }

    fn area() -> BoundingBox {
        BoundingBox::new(10.0, 10.0, 380.0, 280.0)
    }

    #[test]
    fn test_empty_is_noop() {
        let layout = ForceDirectedLayout::default();
        let mut objects: Vec<SceneObject> = vec![];
        let report = layout.run(&mut objects, &[], area(), Point::new(200.0, 150.0));
        assert_eq!(report.final_displacement, 0.0);
    }

    #[test]
    fn test_repulsion_pushes_apart() {
        let config = ForceConfig {
            k_center: 0.0,
            iterations: 5,
            ..ForceConfig::default()
        };
        let mut objects = vec![obj("a", 190.0, 140.0), obj("b", 200.0, 140.0)];
        let before = objects[0].center().distance_to(objects[1].center());
        ForceDirectedLayout::new(config).run(&mut objects, &[], area(), Point::new(200.0, 150.0));
        let after = objects[0].center().distance_to(objects[1].center());
        assert!(after > before, "expected {} > {}", after, before);
    }

    #[test]
    fn test_attraction_pulls_together() {
        let config = ForceConfig {
            k_repulsion: 0.0,
            k_center: 0.0,
            k_attraction: 0.05,
            iterations: 10,
            ..ForceConfig::default()
        };
        let mut objects = vec![obj("a", 20.0, 100.0), obj("b", 300.0, 100.0)];
        let rels = vec![Relationship::new("a", "b")];
        ForceDirectedLayout::new(config).run(&mut objects, &rels, area(), Point::new(200.0, 150.0));
        assert!(objects[1].position.x - objects[0].position.x < 280.0);
    }

    #[test]
    fn test_unknown_relationship_skipped() {
        let objects = vec![obj("a", 20.0, 100.0)];
        let rels = vec![Relationship::new("a", "ghost")];
        let sim = ForceSimulation::new(
            &ForceConfig::default(),
            &objects,
            &rels,
            area(),
            Point::default(),
        );
        assert_eq!(sim.skipped_relationships, 1);
        assert!(sim.edges.is_empty());
    }

    #[test]
    fn test_coincident_objects_separate_deterministically() {
        let mut objects = vec![obj("a", 100.0, 100.0), obj("b", 100.0, 100.0)];
        let config = ForceConfig {
            k_center: 0.0,
            iterations: 1,
            ..ForceConfig::default()
        };
        ForceDirectedLayout::new(config).run(&mut objects, &[], area(), Point::default());
        assert!(objects[0].position.x < objects[1].position.x);
        assert_eq!(objects[0].position.y, objects[1].position.y);
    }

    #[test]
    fn test_positions_clamped_each_step() {
        let config = ForceConfig {
            k_repulsion: 1e9,
            ..ForceConfig::default()
        };
        let mut objects = vec![obj("a", 195.0, 145.0), obj("b", 196.0, 146.0), obj("c", 197.0, 147.0)];
        let mut sim = ForceSimulation::new(&config, &objects, &[], area(), Point::new(200.0, 150.0));
        for _ in 0..20 {
            sim.step(&mut objects);
            for o in &objects {
                assert!(o.position.x >= 10.0 && o.position.x <= 390.0);
                assert!(o.position.y >= 10.0 && o.position.y <= 290.0);
            }
        }
    }

    #[test]
    fn test_clamp_handles_nan_and_empty_range() {
        assert_eq!(clamp(f64::NAN, 1.0, 5.0), 1.0);
        assert_eq!(clamp(10.0, 5.0, 2.0), 5.0);
        assert_eq!(clamp(f64::INFINITY, 0.0, 3.0), 3.0);
    }
}
