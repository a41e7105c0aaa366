use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::Position;

/// Offsets of the four orthogonal neighbours, in expansion order.
pub const NEIGHBOR_OFFSETS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}

/// A bounded 2D grid.
///
/// Stores elements of type `T` in a flat vector using row-major order
/// (`y * width + x`). All cell addressing goes through [`Position`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, every cell set to `value`.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn filled(width: usize, height: usize, value: T) -> Self
    where
        T: Clone,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        Grid {
            width,
            height,
            cells: vec![value; size],
        }
    }

    /// Creates a new grid whose cells are produced by `f`, called once per
    /// cell in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn from_generator<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(Position) -> T,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        let mut cells = Vec::with_capacity(size);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(Position { x, y }));
            }
        }
        Grid {
            width,
            height,
            cells,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Checks if the given cell lies within the grid boundaries.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    #[inline]
    fn index_of(&self, position: Position) -> Option<usize> {
        self.contains(position)
            .then(|| position.y * self.width + position.x)
    }

    fn out_of_bounds(&self, position: Position) -> GridError {
        GridError::OutOfBounds {
            x: position.x,
            y: position.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Returns `None` if the cell is out of bounds.
    pub fn get(&self, position: Position) -> Option<&T> {
        self.index_of(position).map(|index| &self.cells[index])
    }

    /// Returns `None` if the cell is out of bounds.
    pub fn get_mut(&mut self, position: Position) -> Option<&mut T> {
        self.index_of(position).map(|index| &mut self.cells[index])
    }

    /// Like [`Grid::get`], but reports the bounds violation.
    pub fn try_get(&self, position: Position) -> Result<&T, GridError> {
        self.get(position).ok_or_else(|| self.out_of_bounds(position))
    }

    /// Sets the value of a cell, failing with `GridError::OutOfBounds` for
    /// cells outside the grid.
    pub fn set(&mut self, position: Position, value: T) -> Result<(), GridError> {
        let index = self
            .index_of(position)
            .ok_or_else(|| self.out_of_bounds(position))?;
        self.cells[index] = value;
        Ok(())
    }

    /// Overwrites every cell with `value`.
    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        self.cells.fill(value);
    }

    /// Returns an iterator over the cells of the grid in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells.iter().enumerate().map(move |(index, cell)| {
            let position = Position {
                x: index % width,
                y: index / width,
            };
            (position, cell)
        })
    }

    /// All cells of the grid in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + use<T> {
        let (width, height) = (self.width, self.height);
        (0..height).flat_map(move |y| (0..width).map(move |x| Position { x, y }))
    }

    /// In-bounds 4-connected neighbours of `position`, in [`NEIGHBOR_OFFSETS`] order.
    pub fn neighbors(&self, position: Position) -> Vec<Position> {
        NEIGHBOR_OFFSETS
            .iter()
            .filter_map(|&(dx, dy)| position.offset(dx, dy))
            .filter(|neighbor| self.contains(*neighbor))
            .collect()
    }

    /// In-bounds cells within Chebyshev distance `radius` of `center`.
    pub fn area(&self, center: Position, radius: usize) -> Vec<Position> {
        if self.is_empty() {
            return Vec::new();
        }
        let x_range =
            center.x.saturating_sub(radius)..=center.x.saturating_add(radius).min(self.width - 1);
        let y_range =
            center.y.saturating_sub(radius)..=center.y.saturating_add(radius).min(self.height - 1);
        y_range
            .flat_map(|y| x_range.clone().map(move |x| Position { x, y }))
            .collect()
    }
}

/// Indexing using Position coordinates for access
impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, position: Position) -> &Self::Output {
        match self.index_of(position) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                position, self.width, self.height
            ),
        }
    }
}

/// Indexing using Position coordinates for mutable access
impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, position: Position) -> &mut Self::Output {
        let (width, height) = (self.width, self.height);
        match self.index_of(position) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                position, width, height
            ),
        }
    }
}
