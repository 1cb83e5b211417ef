//! Dense row-major 2D grid shared by every generation stage.
//!
//! Unlike a world tilemap this grid never wraps: a coordinate outside
//! `0..width` / `0..height` is simply absent.

use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GridError {
    #[error("buffer holds {actual} cells but the grid needs {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// A width × height buffer indexed as `y * width + x`.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Grid<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }
}

impl<T: Clone> Grid<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }
}

impl<T> Grid<T> {
    /// Wrap an existing row-major buffer.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self, GridError> {
        if data.len() != width * height {
            return Err(GridError::SizeMismatch {
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat index of `(x, y)`. Panics outside the grid instead of wrapping
    /// into the next row.
    pub fn index(&self, x: usize, y: usize) -> usize {
        assert!(x < self.width && y < self.height, "({x}, {y}) outside {}x{}", self.width, self.height);
        y * self.width + x
    }

    /// Coordinates of a flat index.
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx % self.width, idx / self.width)
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Read a cell. Panics outside the grid; use [`Grid::get_checked`] for
    /// coordinates that may fall off the edge.
    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    /// Read a cell by signed coordinates; `None` outside the grid.
    pub fn get_checked(&self, x: i64, y: i64) -> Option<&T> {
        if self.in_bounds(x, y) {
            Some(&self.data[y as usize * self.width + x as usize])
        } else {
            None
        }
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let width = self.width;
        self.data.iter().enumerate().map(move |(idx, val)| {
            let x = idx % width;
            let y = idx / width;
            (x, y, val)
        })
    }
}

impl<T: Send + Sync> Grid<T> {
    /// Build a same-sized grid in parallel, one destination cell per call.
    ///
    /// `f` receives the flat index and `(x, y)` of the destination cell. It
    /// may read any shared input but only ever produces its own cell.
    pub fn par_from_fn<F>(width: usize, height: usize, f: F) -> Self
    where
        F: Fn(usize, usize, usize) -> T + Sync + Send,
    {
        let data = (0..width * height)
            .into_par_iter()
            .map(|idx| f(idx, idx % width, idx / width))
            .collect();
        Self { width, height, data }
    }

    /// Parallel per-cell map into a new grid.
    pub fn par_map<U, F>(&self, f: F) -> Grid<U>
    where
        U: Send,
        F: Fn(&T) -> U + Sync + Send,
    {
        Grid {
            width: self.width,
            height: self.height,
            data: self.data.par_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_indexing() {
        let mut grid = Grid::new_with(4, 3, 0u8);
        grid.set(3, 1, 7);

        assert_eq!(grid.index(3, 1), 7);
        assert_eq!(grid.as_slice()[7], 7);
        assert_eq!(grid.coords(7), (3, 1));
    }

    #[test]
    fn test_checked_access_does_not_wrap() {
        let grid = Grid::new_with(3, 3, true);

        assert!(grid.get_checked(2, 2).is_some());
        assert!(grid.get_checked(3, 0).is_none());
        assert!(grid.get_checked(-1, 1).is_none());
        assert!(grid.get_checked(0, 3).is_none());
    }

    #[test]
    #[should_panic(expected = "outside 3x2")]
    fn test_get_past_row_end_panics() {
        let mut grid = Grid::new_with(3, 2, 0u8);
        grid.set(0, 1, 9);
        grid.get(3, 0);
    }

    #[test]
    #[should_panic(expected = "outside 3x2")]
    fn test_set_past_last_row_panics() {
        let mut grid = Grid::new_with(3, 2, 0u8);
        grid.set(0, 2, 1);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = Grid::from_vec(2, 2, vec![0; 3]).unwrap_err();
        assert_eq!(err, GridError::SizeMismatch { expected: 4, actual: 3 });
    }

    #[test]
    fn test_par_from_fn_matches_sequential_layout() {
        let grid = Grid::par_from_fn(5, 4, |idx, x, y| (idx, x, y));
        for (x, y, &(idx, gx, gy)) in grid.iter() {
            assert_eq!((gx, gy), (x, y));
            assert_eq!(idx, y * 5 + x);
        }
    }
}
