//! World <-> grid coordinate mapping and ray traversal over the horizontal occupancy grid.
//!
//! The DDA-style traversal in [`Grid2d::ray_cells`] follows the same cell-by-cell marching
//! idea as a uniform background grid in `splashsurf_lib::uniform_grid`, specialized to 2D and
//! to ray segments rather than whole-domain iteration.

use nalgebra::Vector2;

use crate::numeric_types::{GridIndex, Real};

/// The horizontal grid underlying the DP-SLAM map: a rectangle of `nx * ny` square cells of
/// side `resolution`, centered at `center`.
///
/// Queries outside `[0, nx) x [0, ny)` return `None` — the idiomatic replacement for the NaN
/// sentinel described in spec.md, since Rust's grid indices are integers rather than floats
/// (see DESIGN.md).
#[derive(Clone, Debug, PartialEq)]
pub struct Grid2d {
    origin: Vector2<Real>,
    resolution: Real,
    nx: GridIndex,
    ny: GridIndex,
}

impl Grid2d {
    /// Builds a grid centered at `center` spanning `span = (lx, ly)` meters at the given
    /// per-cell `resolution`.
    pub fn new(center: Vector2<Real>, span: Vector2<Real>, resolution: Real) -> Self {
        assert!(resolution > 0.0, "grid resolution must be positive");
        let nx = (span.x / resolution).round().max(1.0) as GridIndex;
        let ny = (span.y / resolution).round().max(1.0) as GridIndex;
        let origin = Vector2::new(
            center.x - (nx as Real) * resolution * 0.5,
            center.y - (ny as Real) * resolution * 0.5,
        );
        Self {
            origin,
            resolution,
            nx,
            ny,
        }
    }

    pub fn resolution(&self) -> Real {
        self.resolution
    }

    pub fn dims(&self) -> (GridIndex, GridIndex) {
        (self.nx, self.ny)
    }

    fn in_bounds(&self, ix: GridIndex, iy: GridIndex) -> bool {
        ix >= 0 && iy >= 0 && ix < self.nx && iy < self.ny
    }

    /// Quantizes a world position into grid coordinates, or `None` if outside the grid.
    pub fn to_grid(&self, x: Real, y: Real) -> Option<(GridIndex, GridIndex)> {
        let ix = ((x - self.origin.x) / self.resolution).floor() as GridIndex;
        let iy = ((y - self.origin.y) / self.resolution).floor() as GridIndex;
        if self.in_bounds(ix, iy) {
            Some((ix, iy))
        } else {
            None
        }
    }

    /// Returns the world-space center of cell `(ix, iy)`, regardless of whether it is in
    /// bounds (callers that already hold a valid cell index from e.g. a particle association
    /// should not have to re-check bounds just to project it back to world space).
    pub fn to_world(&self, ix: GridIndex, iy: GridIndex) -> (Real, Real) {
        (
            self.origin.x + (ix as Real + 0.5) * self.resolution,
            self.origin.y + (iy as Real + 0.5) * self.resolution,
        )
    }

    /// Ordered, unique grid cells intersected by the ray from `origin + r_min * hat(heading)`
    /// to `origin + r_max * hat(heading)`, nearest first.
    ///
    /// Uses a DDA (DigitalDifferentialAnalyzer) traversal: the ray is walked by always
    /// advancing into whichever neighboring cell boundary (x or y) is crossed next. On an
    /// exact tie between the two candidate crossing parameters, the x axis is advanced,
    /// matching spec.md's tie-break rule verbatim.
    pub fn ray_cells(
        &self,
        origin: Vector2<Real>,
        heading: Real,
        r_min: Real,
        r_max: Real,
        exclude_origin: bool,
    ) -> Vec<(GridIndex, GridIndex)> {
        let mut cells = Vec::new();
        if r_max <= r_min {
            return cells;
        }

        let dir = Vector2::new(heading.cos(), heading.sin());
        let start = origin + dir * r_min;
        let end = origin + dir * r_max;

        let mut current = match self.to_grid(start.x, start.y) {
            Some(c) => c,
            None => match self.clamp_entry(origin, dir, r_min, r_max) {
                Some(c) => c,
                None => return cells,
            },
        };

        if !(exclude_origin && self.to_grid(origin.x, origin.y) == Some(current)) {
            cells.push(current);
        }

        let step_x: GridIndex = if dir.x > 0.0 {
            1
        } else if dir.x < 0.0 {
            -1
        } else {
            0
        };
        let step_y: GridIndex = if dir.y > 0.0 {
            1
        } else if dir.y < 0.0 {
            -1
        } else {
            0
        };

        // Parametric distance (in units of r) to cross one full cell along each axis.
        let t_delta_x = if dir.x.abs() > Real::EPSILON {
            self.resolution / dir.x.abs()
        } else {
            Real::INFINITY
        };
        let t_delta_y = if dir.y.abs() > Real::EPSILON {
            self.resolution / dir.y.abs()
        } else {
            Real::INFINITY
        };

        let next_boundary = |idx: GridIndex, step: GridIndex, origin_axis: Real| -> Real {
            if step > 0 {
                origin_axis + ((idx + 1) as Real) * self.resolution
            } else {
                origin_axis + (idx as Real) * self.resolution
            }
        };

        let mut t_max_x = if step_x != 0 {
            (next_boundary(current.0, step_x, self.origin.x) - origin.x) / dir.x
        } else {
            Real::INFINITY
        };
        let mut t_max_y = if step_y != 0 {
            (next_boundary(current.1, step_y, self.origin.y) - origin.y) / dir.y
        } else {
            Real::INFINITY
        };

        let r_total = (end - origin).norm().max(r_max);
        let mut guard = 0usize;
        let guard_limit = 4 * ((self.nx + self.ny).max(1) as usize) + 16;

        loop {
            guard += 1;
            if guard > guard_limit {
                break;
            }

            // Tie-break: on exact equality advance x first.
            if t_max_x <= t_max_y {
                if t_max_x > r_total {
                    break;
                }
                current.0 += step_x;
                t_max_x += t_delta_x;
            } else {
                if t_max_y > r_total {
                    break;
                }
                current.1 += step_y;
                t_max_y += t_delta_y;
            }

            if !self.in_bounds(current.0, current.1) {
                break;
            }
            if cells.last() != Some(&current) {
                cells.push(current);
            }
        }

        cells
    }

    /// When the ray's starting point (`origin + r_min * hat(heading)`) is outside the grid,
    /// finds the first in-bounds cell the segment up to `r_max` actually enters, if any.
    fn clamp_entry(
        &self,
        origin: Vector2<Real>,
        dir: Vector2<Real>,
        r_min: Real,
        r_max: Real,
    ) -> Option<(GridIndex, GridIndex)> {
        let steps = ((r_max - r_min) / self.resolution).ceil().max(1.0) as usize;
        let steps = steps.min(100_000);
        for i in 0..=steps {
            let r = r_min + (r_max - r_min) * (i as Real) / (steps as Real);
            let p = origin + dir * r;
            if let Some(c) = self.to_grid(p.x, p.y) {
                return Some(c);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid2d {
        Grid2d::new(Vector2::new(5.0, 5.0), Vector2::new(10.0, 10.0), 1.0)
    }

    #[test]
    fn to_grid_round_trip_within_half_cell() {
        let g = grid();
        for &(x, y) in &[(0.5, 0.5), (9.4, 9.4), (5.0, 5.0), (3.3, 7.8)] {
            let (ix, iy) = g.to_grid(x, y).expect("inside map");
            let (wx, wy) = g.to_world(ix, iy);
            assert!((wx - x).abs() <= g.resolution(), "x round-trip");
            assert!((wy - y).abs() <= g.resolution(), "y round-trip");
        }
    }

    #[test]
    fn to_grid_out_of_bounds_is_none() {
        let g = grid();
        assert_eq!(g.to_grid(-1.0, 5.0), None);
        assert_eq!(g.to_grid(5.0, 100.0), None);
    }

    #[test]
    fn ray_cells_tangent_to_edge_returns_empty() {
        let g = grid();
        // Heading straight up, starting far outside to the east, never entering the grid.
        let cells = g.ray_cells(Vector2::new(100.0, 5.0), std::f64::consts::FRAC_PI_2, 0.0, 4.0, false);
        assert!(cells.is_empty());
    }

    #[test]
    fn ray_cells_along_x_axis_are_monotonic_and_unique() {
        let g = grid();
        let cells = g.ray_cells(Vector2::new(0.0, 0.0), 0.0, 0.0, 4.0, false);
        assert!(!cells.is_empty());
        let mut seen = std::collections::HashSet::new();
        for c in &cells {
            assert!(seen.insert(*c), "cells must be unique: {:?}", cells);
        }
        for w in cells.windows(2) {
            assert!(w[1].0 >= w[0].0, "x should be non-decreasing along +x ray");
        }
    }

    #[test]
    fn ray_cells_excludes_origin_when_requested() {
        let g = grid();
        let with_origin = g.ray_cells(Vector2::new(0.5, 0.5), 0.0, 0.0, 3.0, false);
        let without_origin = g.ray_cells(Vector2::new(0.5, 0.5), 0.0, 0.0, 3.0, true);
        assert_eq!(with_origin.len(), without_origin.len() + 1);
        assert_eq!(with_origin[0], g.to_grid(0.5, 0.5).unwrap());
    }
}
