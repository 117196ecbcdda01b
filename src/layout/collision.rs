//! Overlap removal between padded object boxes
//!
//! Each pass scans all pairs in input order and pushes every overlapping pair
//! apart along the line through their centers. The pass count is capped, so
//! dense scenes can finish with residual overlap; that is reported, not fixed.

use log::{debug, warn};

use super::types::{BoundingBox, SceneObject};

/// Outcome of collision resolution
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionReport {
    /// Passes executed, including the final clean pass when converged
    pub passes: usize,
    /// True when a full pass found no overlap
    pub converged: bool,
    /// Pairs (by id) still overlapping after the last pass
    pub residual: Vec<(String, String)>,
}

/// Collision resolution stage.
///
/// Mutates object positions in place and preserves the object set and ids.
#[derive(Debug, Clone)]
pub struct CollisionResolver {
    padding: f64,
    max_iterations: usize,
}

impl CollisionResolver {
    /// `min_spacing` is split evenly between the two sides of every gap
    pub fn new(min_spacing: f64, max_iterations: usize) -> Self {
        Self {
            padding: (min_spacing / 2.0).max(0.0),
            max_iterations,
        }
    }

    pub fn padding(&self) -> f64 {
        self.padding
    }

    /// Padded box of one object
    pub fn padded_bounds(&self, object: &SceneObject) -> BoundingBox {
        object.bounds().padded(self.padding)
    }

    /// Index pairs whose padded boxes overlap
    pub fn collisions(&self, objects: &[SceneObject]) -> Vec<(usize, usize)> {
        let boxes: Vec<BoundingBox> = objects.iter().map(|o| self.padded_bounds(o)).collect();
        let mut pairs = Vec::new();
        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                if boxes[i].intersects(&boxes[j]) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    pub fn resolve(&self, objects: &mut [SceneObject]) -> CollisionReport {
        let mut passes = 0;
        let mut converged = false;

        while passes < self.max_iterations {
            passes += 1;
            let mut moved = 0;
            for i in 0..objects.len() {
                for j in (i + 1)..objects.len() {
                    // Boxes are recomputed because earlier pairs in this pass may
                    // already have moved either object
                    let a = self.padded_bounds(&objects[i]);
                    let b = self.padded_bounds(&objects[j]);
                    if !a.intersects(&b) {
                        continue;
                    }
                    let (ca, cb) = (a.center(), b.center());
                    let (mut dx, mut dy) = (cb.x - ca.x, cb.y - ca.y);
                    let mut actual = dx.hypot(dy);
                    if actual < f64::EPSILON {
                        dx = 1.0;
                        dy = 0.0;
                        actual = 0.0;
                    }
                    let required = (a.width + b.width) / 2.0;
                    let push = (required - actual).max(0.0) / 2.0;
                    let norm = dx.hypot(dy);
                    let (ux, uy) = (dx / norm, dy / norm);
                    objects[i].translate(-ux * push, -uy * push);
                    objects[j].translate(ux * push, uy * push);
                    moved += 1;
                }
            }
            if moved == 0 {
                converged = true;
                break;
            }
        }

        let residual: Vec<(String, String)> = if converged {
            Vec::new()
        } else {
            self.collisions(objects)
                .into_iter()
                .map(|(i, j)| (objects[i].id().to_string(), objects[j].id().to_string()))
                .collect()
        };
        // The last capped pass may have removed every overlap
        let converged = converged || residual.is_empty();

        if converged {
            debug!(passes = passes; "Collision resolution converged");
        } else {
            warn!(
                passes = passes,
                residual = residual.len();
                "Collision resolution hit its iteration cap with overlap left"
            );
        }
        CollisionReport {
            passes,
            converged,
            residual,
        }
    }
}
