//! Observation zone for motion detection.
//!
//! The zone is the union of two triangles sharing an edge, built from four
//! points in grid coordinates. It is computed once when the pipeline is built
//! and shared read-only afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in grid coordinates (`x` is the column, `y` the row).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Column coordinate.
    pub x: f32,
    /// Row coordinate.
    pub y: f32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Corners of the default observation zone on a 24x32 sensor.
pub const DEFAULT_POINTS: [Point; 4] = [
    Point::new(5.0, 5.0),
    Point::new(24.0, 5.0),
    Point::new(8.0, 20.0),
    Point::new(21.0, 20.0),
];

/// Boolean grid of cells that take part in motion analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAreaMask {
    rows: usize,
    columns: usize,
    cells: Vec<bool>,
}

impl ActiveAreaMask {
    /// Build the mask from four corner points.
    ///
    /// A cell is active if it lies inside triangle `(p1, p2, p3)` or
    /// triangle `(p2, p3, p4)`.
    #[must_use]
    pub fn from_points(rows: usize, columns: usize, points: &[Point; 4]) -> Self {
        let [p1, p2, p3, p4] = *points;
        let mut cells = Vec::with_capacity(rows * columns);
        for y in 0..rows {
            for x in 0..columns {
                let (fx, fy) = (x as f32, y as f32);
                cells.push(
                    point_in_triangle(p1, p2, p3, fx, fy) || point_in_triangle(p2, p3, p4, fx, fy),
                );
            }
        }
        Self {
            rows,
            columns,
            cells,
        }
    }

    /// A mask with every cell active.
    #[must_use]
    pub fn full(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            cells: vec![true; rows * columns],
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Whether the cell at row `y`, column `x` is active.
    ///
    /// Cells outside the grid are inactive.
    #[must_use]
    pub fn is_active(&self, y: usize, x: usize) -> bool {
        y < self.rows && x < self.columns && self.cells[y * self.columns + x]
    }

    /// Active flags in row-major order, matching [`crate::Frame::pixels`].
    #[must_use]
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Number of active cells.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    /// Render the mask as text, one line per row followed by its index.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ActiveAreaMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (y, row) in self.cells.chunks(self.columns.max(1)).enumerate() {
            for active in row {
                f.write_str(if *active { "###" } else { "___" })?;
            }
            writeln!(f, ": {y}")?;
        }
        Ok(())
    }
}

/// Barycentric point-in-triangle test. Points on an edge count as inside.
#[must_use]
pub fn point_in_triangle(p1: Point, p2: Point, p3: Point, x: f32, y: f32) -> bool {
    let d = (p2.y - p3.y) * (p1.x - p3.x) + (p3.x - p2.x) * (p1.y - p3.y);
    let a = ((p2.y - p3.y) * (x - p3.x) + (p3.x - p2.x) * (y - p3.y)) / d;
    let b = ((p3.y - p1.y) * (x - p3.x) + (p1.x - p3.x) * (y - p3.y)) / d;
    let c = 1.0 - a - b;
    (0.0..=1.0).contains(&a) && (0.0..=1.0).contains(&b) && (0.0..=1.0).contains(&c)
}
