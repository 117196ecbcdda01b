//! Wire routing between objects
//!
//! A bounded greedy router: the straight segment, then two elbow paths, then
//! the straight segment again even if it crosses an obstacle. At most three
//! candidates are examined per wire.

use log::{debug, warn};

use super::types::{BoundingBox, Point, RelationshipKind, Scene};

/// Clearance kept between wires and obstacles unless configured otherwise
pub const DEFAULT_PADDING: f64 = 5.0;

/// Endpoints closer than this on one axis count as axis-aligned
const ALIGN_EPSILON: f64 = 1e-9;

/// Edge of a bounding box for wire attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Get the attachment point on a bounding box edge
pub fn attachment_point(bounds: &BoundingBox, edge: Edge) -> Point {
    match edge {
        Edge::Top => Point::new(bounds.x + bounds.width / 2.0, bounds.y),
        Edge::Bottom => Point::new(bounds.x + bounds.width / 2.0, bounds.bottom()),
        Edge::Left => Point::new(bounds.x, bounds.y + bounds.height / 2.0),
        Edge::Right => Point::new(bounds.right(), bounds.y + bounds.height / 2.0),
    }
}

/// Determine the facing edges of two bounding boxes
pub fn best_edges(from: &BoundingBox, to: &BoundingBox) -> (Edge, Edge) {
    let dx = to.center().x - from.center().x;
    let dy = to.center().y - from.center().y;

    if dx.abs() >= dy.abs() {
        if dx >= 0.0 {
            (Edge::Right, Edge::Left)
        } else {
            (Edge::Left, Edge::Right)
        }
    } else if dy > 0.0 {
        (Edge::Bottom, Edge::Top)
    } else {
        (Edge::Top, Edge::Bottom)
    }
}

/// Greedy obstacle-avoiding router
#[derive(Debug, Clone, Copy)]
pub struct WireRouter {
    padding: f64,
}

impl Default for WireRouter {
    fn default() -> Self {
        Self::new(DEFAULT_PADDING)
    }
}

impl WireRouter {
    pub fn new(padding: f64) -> Self {
        Self { padding }
    }

    /// Route one wire. Returns 2 or 3 waypoints starting at `start` and
    /// ending at `end`.
    ///
    /// When no candidate is clear the direct segment is returned even though
    /// it crosses an obstacle.
    pub fn route(&self, start: Point, end: Point, obstacles: &[BoundingBox]) -> Vec<Point> {
        if self.swept_clear(start, end, obstacles) {
            return vec![start, end];
        }

        for corner in self.corner_candidates(start, end, obstacles) {
            if self.path_clear(start, corner, end, obstacles) {
                return vec![start, corner, end];
            }
        }

        warn!(
            start_x = start.x,
            start_y = start.y,
            end_x = end.x,
            end_y = end.y;
            "No clear wire path, falling back to the direct segment"
        );
        vec![start, end]
    }

    /// The two alternatives to the direct segment
    fn corner_candidates(
        &self,
        start: Point,
        end: Point,
        obstacles: &[BoundingBox],
    ) -> Vec<Point> {
        let horizontal = (end.y - start.y).abs() < ALIGN_EPSILON;
        let vertical = (end.x - start.x).abs() < ALIGN_EPSILON;

        if horizontal {
            self.detours(start, end, obstacles)
        } else if vertical {
            let flipped: Vec<BoundingBox> = obstacles.iter().map(|o| o.transposed()).collect();
            self.detours(start.transposed(), end.transposed(), &flipped)
                .into_iter()
                .map(|p| p.transposed())
                .collect()
        } else {
            // Horizontal-then-vertical, then vertical-then-horizontal
            vec![Point::new(end.x, start.y), Point::new(start.x, end.y)]
        }
    }

    /// Corners for a horizontal wire whose elbows would collapse onto the
    /// direct segment: one on each side of the blocking obstacles, negative
    /// y first.
    fn detours(&self, start: Point, end: Point, obstacles: &[BoundingBox]) -> Vec<Point> {
        let y0 = start.y;
        let (lx, rx) = (start.x.min(end.x), start.x.max(end.x));
        let swept = BoundingBox::of_segment(start, end).padded(self.padding);
        let Some(blocked) = obstacles
            .iter()
            .filter(|o| swept.intersects(o))
            .map(|o| o.padded(self.padding))
            .reduce(|acc, b| acc.union(&b))
        else {
            return Vec::new();
        };
        // An endpoint inside the blocked column cannot be detoured with one corner
        if blocked.x <= lx || blocked.right() >= rx {
            return Vec::new();
        }

        let cx = blocked.center().x;
        let left_run = (cx - lx) / (blocked.x - lx);
        let right_run = (rx - cx) / (rx - blocked.right());
        let rise = left_run.max(right_run);

        let above = y0 - (y0 - blocked.y) * rise - self.padding;
        let below = y0 + (blocked.bottom() - y0) * rise + self.padding;
        vec![Point::new(cx, above), Point::new(cx, below)]
    }

    fn path_clear(&self, start: Point, corner: Point, end: Point, obstacles: &[BoundingBox]) -> bool {
        self.leg_clear(start, corner, obstacles) && self.leg_clear(corner, end, obstacles)
    }

    /// Whether the padded box of segment `a`-`b` misses every obstacle
    fn swept_clear(&self, a: Point, b: Point, obstacles: &[BoundingBox]) -> bool {
        let swept = BoundingBox::of_segment(a, b).padded(self.padding);
        !obstacles.iter().any(|o| swept.intersects(o))
    }

    /// Axis-aligned legs use the padded segment box; diagonal legs are
    /// clipped exactly against padded obstacles, since their box always
    /// spans the obstacle they go around
    fn leg_clear(&self, a: Point, b: Point, obstacles: &[BoundingBox]) -> bool {
        let axis_aligned =
            (a.x - b.x).abs() < ALIGN_EPSILON || (a.y - b.y).abs() < ALIGN_EPSILON;
        if axis_aligned {
            self.swept_clear(a, b, obstacles)
        } else {
            !obstacles
                .iter()
                .any(|o| segment_crosses(a, b, &o.padded(self.padding)))
        }
    }
}

/// Route one wire with the default padding
pub fn route_wire(start: Point, end: Point, obstacles: &[BoundingBox]) -> Vec<Point> {
    WireRouter::default().route(start, end, obstacles)
}

/// Whether segment `a`-`b` passes through the interior of `rect`
/// (Liang-Barsky clipping)
pub fn segment_crosses(a: Point, b: Point, rect: &BoundingBox) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let p = [-dx, dx, -dy, dy];
    let q = [
        a.x - rect.x,
        rect.right() - a.x,
        a.y - rect.y,
        rect.bottom() - a.y,
    ];
    let (mut t0, mut t1): (f64, f64) = (0.0, 1.0);
    for i in 0..4 {
        if p[i] == 0.0 {
            if q[i] <= 0.0 {
                return false;
            }
        } else {
            let t = q[i] / p[i];
            if p[i] < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
        }
    }
    t0 < t1
}

/// A routed relationship
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedWire {
    pub source_id: String,
    pub target_id: String,
    pub kind: RelationshipKind,
    pub points: Vec<Point>,
}

/// Route every relationship of a scene between the facing edges of its
/// endpoints, treating all other objects as obstacles
pub fn route_relationships(scene: &Scene, router: &WireRouter) -> Vec<RoutedWire> {
    let mut wires = Vec::with_capacity(scene.relationships.len());
    for rel in &scene.relationships {
        let (Some(source), Some(target)) = (scene.object(&rel.source_id), scene.object(&rel.target_id))
        else {
            warn!(
                source = rel.source_id.as_str(),
                target = rel.target_id.as_str();
                "Skipping wire with unknown endpoint"
            );
            continue;
        };
        let (from_edge, to_edge) = best_edges(&source.bounds(), &target.bounds());
        let start = attachment_point(&source.bounds(), from_edge);
        let end = attachment_point(&target.bounds(), to_edge);
        let obstacles: Vec<BoundingBox> = scene
            .objects()
            .iter()
            .filter(|o| o.id() != source.id() && o.id() != target.id())
            .map(|o| o.bounds())
            .collect();
        let points = router.route(start, end, &obstacles);
        wires.push(RoutedWire {
            source_id: rel.source_id.clone(),
            target_id: rel.target_id.clone(),
            kind: rel.kind.clone(),
            points,
        });
    }
    debug!(wires = wires.len(); "Wires routed");
    wires
}
