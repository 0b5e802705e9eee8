//! Fixed-size square grid with world-coordinate addressing.
//!
//! A [`Grid`] owns a flat arena of `size × size` cells at a fixed
//! `resolution` (metres per cell). World coordinates map to cell indices via
//!
//! ```text
//! index = round(coord / resolution) + size / 2
//! ```
//!
//! so the origin sits at the grid centre. Reads outside the grid return
//! `T::default()` and writes outside the grid are ignored; callers rely on
//! this to treat everything beyond the map as free space.
//!
//! # Example
//!
//! ```rust
//! use conenav_perception::grid::Grid;
//!
//! let mut grid: Grid<u8> = Grid::new(10, 0.1);
//! grid.set(0.2, -0.1, 3);
//! assert_eq!(grid.get(0.2, -0.1), 3);
//!
//! // Far outside the 1 m × 1 m window.
//! grid.set(50.0, 50.0, 4);
//! assert_eq!(grid.get(50.0, 50.0), 0);
//! ```

/// A square arena of cells addressed either by `(i, j)` index or by world
/// coordinates `(x, y)`.
///
/// `i` indexes the X axis and `j` the Y axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    size: usize,
    resolution: f64,
    cells: Vec<T>,
}

impl<T: Copy + Default> Grid<T> {
    /// Create a grid of `size × size` default-valued cells.
    pub fn new(size: usize, resolution: f64) -> Self {
        Self {
            size,
            resolution,
            cells: vec![T::default(); size * size],
        }
    }

    /// Side length in cells.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Metres per cell.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Index along one axis for world coordinate `coord`, or `None` when the
    /// coordinate falls outside the grid (or is not finite).
    pub fn axis_index(&self, coord: f64) -> Option<usize> {
        if !coord.is_finite() {
            return None;
        }
        let i = (coord / self.resolution).round() as i64 + (self.size / 2) as i64;
        if i >= 0 && (i as usize) < self.size {
            Some(i as usize)
        } else {
            None
        }
    }

    /// Cell indices for world point `(x, y)`.
    pub fn index_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        Some((self.axis_index(x)?, self.axis_index(y)?))
    }

    /// World coordinate of the centre of cell `i` along one axis.
    pub fn cell_center(&self, i: usize) -> f64 {
        (i as f64 - (self.size / 2) as f64) * self.resolution
    }

    /// Value at cell `(i, j)`, or `None` outside the grid.
    pub fn cell(&self, i: usize, j: usize) -> Option<T> {
        if i < self.size && j < self.size {
            Some(self.cells[i * self.size + j])
        } else {
            None
        }
    }

    /// Value at signed cell `(i, j)`; out-of-range indices read as default.
    pub fn cell_or_default(&self, i: i64, j: i64) -> T {
        if i < 0 || j < 0 {
            return T::default();
        }
        self.cell(i as usize, j as usize).unwrap_or_default()
    }

    /// Write cell `(i, j)`. Returns `false` (and writes nothing) outside the
    /// grid.
    pub fn set_cell(&mut self, i: usize, j: usize, value: T) -> bool {
        if i < self.size && j < self.size {
            self.cells[i * self.size + j] = value;
            true
        } else {
            false
        }
    }

    /// Value at world point `(x, y)`; `T::default()` outside the grid.
    pub fn get(&self, x: f64, y: f64) -> T {
        match self.index_of(x, y) {
            Some((i, j)) => self.cells[i * self.size + j],
            None => T::default(),
        }
    }

    /// Write world point `(x, y)`; silently ignored outside the grid.
    pub fn set(&mut self, x: f64, y: f64, value: T) {
        if let Some((i, j)) = self.index_of(x, y) {
            self.cells[i * self.size + j] = value;
        }
    }

    /// Reset every cell to `value`.
    pub fn fill(&mut self, value: T) {
        self.cells.iter_mut().for_each(|c| *c = value);
    }

    /// Raw row-major cells (`i * size + j`).
    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }
}
