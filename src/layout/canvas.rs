//! Grid snapping, canvas growth and centering

use log::debug;

use super::types::{BoundingBox, Point, SceneObject};

/// Rounds positions to the nearest grid multiple
#[derive(Debug, Clone, Copy)]
pub struct GridSnapper {
    grid_size: f64,
}

impl GridSnapper {
    pub fn new(grid_size: f64) -> Self {
        Self { grid_size }
    }

    /// Snap every object independently; a non-positive grid disables snapping
    pub fn snap(&self, objects: &mut [SceneObject]) {
        if !(self.grid_size > 0.0) {
            return;
        }
        for object in objects.iter_mut() {
            object.position.x = self.snap_value(object.position.x);
            object.position.y = self.snap_value(object.position.y);
        }
    }

    pub fn snap_value(&self, v: f64) -> f64 {
        (v / self.grid_size).round() * self.grid_size
    }
}

/// Canvas size after fitting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasFit {
    pub width: f64,
    pub height: f64,
    pub resized: bool,
}

/// Grows the canvas around the content and centers the content on it
#[derive(Debug, Clone, Copy)]
pub struct CanvasFitter {
    margin: f64,
}

impl CanvasFitter {
    pub fn new(margin: f64) -> Self {
        Self { margin }
    }

    /// New canvas dimensions: content extent plus margins, never smaller than
    /// the current canvas
    pub fn fit(&self, objects: &[SceneObject], width: f64, height: f64) -> CanvasFit {
        let Some(bounds) = content_bounds(objects) else {
            return CanvasFit {
                width,
                height,
                resized: false,
            };
        };
        let required_w = bounds.width + 2.0 * self.margin;
        let required_h = bounds.height + 2.0 * self.margin;
        let fit = CanvasFit {
            width: width.max(required_w),
            height: height.max(required_h),
            resized: required_w > width || required_h > height,
        };
        if fit.resized {
            debug!(width = fit.width, height = fit.height; "Canvas enlarged to fit content");
        }
        fit
    }

    /// Translate all objects so the content bounds are centered on `center`
    pub fn center(&self, objects: &mut [SceneObject], center: Point) {
        let Some(bounds) = content_bounds(objects) else {
            return;
        };
        let c = bounds.center();
        let (dx, dy) = (center.x - c.x, center.y - c.y);
        for object in objects.iter_mut() {
            object.translate(dx, dy);
        }
    }
}

/// Union of all object rectangles, `None` for an empty slice
pub fn content_bounds(objects: &[SceneObject]) -> Option<BoundingBox> {
    objects
        .iter()
        .map(SceneObject::bounds)
        .reduce(|acc, b| acc.union(&b))
}
